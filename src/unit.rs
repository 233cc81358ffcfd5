// src/unit.rs
//! Unit system: [`UnitId`], [`UnitType`] and the [`RenderUnit`] aggregate.

pub mod capability;
mod id;
mod render_unit;

pub use capability::{Capability, CapabilityId};
pub use id::{UnitId, UnitType};
pub use render_unit::{Disposable, EngineOwnership, FullUnit, RenderContext, RenderUnit, ThumbnailUnit};
