use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::Arc;

/// Logical canvas size of a scene. It's a simple struct to hold width and height.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneSize { pub width: u32, pub height: u32 }

/// Shared handle to a drawing engine. Engines are compared by identity, never by value.
pub type EngineRef = Arc<dyn DrawingEngine>;

/// Owner of a drawing surface. Calls occur on the thread that owns the render manager.
pub trait DrawingEngine: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;

    /// Destroy the surface and every GPU/canvas resource held by the engine.
    fn dispose(&self) -> anyhow::Result<()>;
}

/// Hierarchical drawing graph attached to exactly one engine.
pub trait Scene: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;

    /// Namespaced key the scene was created under
    fn key(&self) -> &str;

    /// Logical canvas size
    fn size(&self) -> SceneSize;

    /// Engine the scene draws with
    fn engine(&self) -> &EngineRef;

    fn dispose(&self) -> anyhow::Result<()>;
}

/// A drawable mounted on a render unit (sheet grid, document text, slide shapes...).
pub trait Component: Send + Sync {
    fn dispose(&self) -> anyhow::Result<()>;
}

/// Factory for engines and scenes. The render manager never constructs these itself.
pub trait RenderBackend: Send + Sync {
    /// Name of the backend
    fn name(&self) -> &str;

    /// Create a new engine with its own drawing surface.
    fn create_engine(&self) -> anyhow::Result<EngineRef>;

    /// Create a new scene under `key`, attached to `engine`.
    fn create_scene(&self, key: &str, engine: EngineRef, size: SceneSize) -> anyhow::Result<Box<dyn Scene>>;
}

/// Returns true when both handles point at the same engine instance.
#[inline]
pub fn same_engine(a: &EngineRef, b: &EngineRef) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
