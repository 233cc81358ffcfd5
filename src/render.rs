pub mod backend;
pub mod backends;

pub use backend::{same_engine, Component, DrawingEngine, EngineRef, RenderBackend, Scene, SceneSize};
