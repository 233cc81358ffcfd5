use crate::render::backend::{DrawingEngine, EngineRef, RenderBackend, Scene, SceneSize};
use anyhow::Result;
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Null backend that does not draw anything. Engines and scenes only remember
/// whether they have been disposed.
#[derive(Debug, Default)]
pub struct NullBackend;

impl NullBackend {
    /// Creates a new instance of the null backend.
    pub fn new() -> Self {
        Self
    }
}

impl RenderBackend for NullBackend {
    fn name(&self) -> &str {
        "NullBackend"
    }

    fn create_engine(&self) -> Result<EngineRef> {
        Ok(Arc::new(NullEngine::new()))
    }

    fn create_scene(&self, key: &str, engine: EngineRef, size: SceneSize) -> Result<Box<dyn Scene>> {
        Ok(Box::new(NullScene::new(key, engine, size)))
    }
}

#[derive(Debug)]
pub struct NullEngine {
    /// Unique id, only used for diagnostics
    pub id: Uuid,
    disposed: AtomicBool,
}

impl NullEngine {
    pub fn new() -> Self {
        Self { id: Uuid::new_v4(), disposed: AtomicBool::new(false) }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl Default for NullEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DrawingEngine for NullEngine {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dispose(&self) -> Result<()> {
        if self.disposed.swap(true, Ordering::AcqRel) {
            log::debug!("NullEngine {} disposed more than once", self.id);
        }
        Ok(())
    }
}

pub struct NullScene {
    key: String,
    /// Logical size of the scene
    size: SceneSize,
    engine: EngineRef,
    disposed: AtomicBool,
}

impl NullScene {
    pub fn new(key: &str, engine: EngineRef, size: SceneSize) -> Self {
        Self { key: key.to_string(), size, engine, disposed: AtomicBool::new(false) }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl Scene for NullScene {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn key(&self) -> &str {
        &self.key
    }
    fn size(&self) -> SceneSize {
        self.size
    }
    fn engine(&self) -> &EngineRef {
        &self.engine
    }
    fn dispose(&self) -> Result<()> {
        self.disposed.store(true, Ordering::Release);
        Ok(())
    }
}
