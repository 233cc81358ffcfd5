pub mod config;
pub mod document;
pub mod errors;
pub mod events;
pub mod manager;
pub mod module;
pub mod render;
pub mod unit;

#[cfg(test)]
mod testing;

pub use config::RenderConfig;
pub use errors::RenderError;
pub use manager::RenderManager;
