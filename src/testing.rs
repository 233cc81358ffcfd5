//! Test doubles that count how often resources are created and disposed.

use crate::render::{Component, DrawingEngine, EngineRef, RenderBackend, Scene, SceneSize};
use crate::unit::Capability;
use anyhow::{anyhow, Result};
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default)]
pub(crate) struct Counters {
    engines_created: AtomicUsize,
    engines_disposed: AtomicUsize,
    scenes_created: AtomicUsize,
    scenes_disposed: AtomicUsize,
}

impl Counters {
    pub(crate) fn engines_created(&self) -> usize {
        self.engines_created.load(Ordering::SeqCst)
    }
    pub(crate) fn engines_disposed(&self) -> usize {
        self.engines_disposed.load(Ordering::SeqCst)
    }
    pub(crate) fn scenes_created(&self) -> usize {
        self.scenes_created.load(Ordering::SeqCst)
    }
    pub(crate) fn scenes_disposed(&self) -> usize {
        self.scenes_disposed.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub(crate) struct RecordingBackend {
    pub(crate) counters: Arc<Counters>,
    fail_scene_create: AtomicBool,
    fail_scene_dispose: AtomicBool,
    fail_engine_dispose: AtomicBool,
}

impl RecordingBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }
    pub(crate) fn fail_scene_create(&self, on: bool) {
        self.fail_scene_create.store(on, Ordering::SeqCst);
    }
    pub(crate) fn fail_scene_dispose(&self, on: bool) {
        self.fail_scene_dispose.store(on, Ordering::SeqCst);
    }
    pub(crate) fn fail_engine_dispose(&self, on: bool) {
        self.fail_engine_dispose.store(on, Ordering::SeqCst);
    }
}

impl RenderBackend for RecordingBackend {
    fn name(&self) -> &str {
        "RecordingBackend"
    }

    fn create_engine(&self) -> Result<EngineRef> {
        self.counters.engines_created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(RecordingEngine {
            counters: self.counters.clone(),
            disposals: AtomicUsize::new(0),
            fail: self.fail_engine_dispose.load(Ordering::SeqCst),
        }))
    }

    fn create_scene(&self, key: &str, engine: EngineRef, size: SceneSize) -> Result<Box<dyn Scene>> {
        if self.fail_scene_create.load(Ordering::SeqCst) {
            return Err(anyhow!("scene {key} refused"));
        }
        self.counters.scenes_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(RecordingScene {
            key: key.to_string(),
            size,
            engine,
            counters: self.counters.clone(),
            fail: self.fail_scene_dispose.load(Ordering::SeqCst),
        }))
    }
}

pub(crate) struct RecordingEngine {
    counters: Arc<Counters>,
    disposals: AtomicUsize,
    fail: bool,
}

impl RecordingEngine {
    pub(crate) fn disposals(&self) -> usize {
        self.disposals.load(Ordering::SeqCst)
    }
}

impl DrawingEngine for RecordingEngine {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dispose(&self) -> Result<()> {
        self.disposals.fetch_add(1, Ordering::SeqCst);
        self.counters.engines_disposed.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(anyhow!("engine refused to die"));
        }
        Ok(())
    }
}

/// Disposal count of an engine handed out by [`RecordingBackend`].
pub(crate) fn engine_disposals(engine: &EngineRef) -> usize {
    engine
        .as_any()
        .downcast_ref::<RecordingEngine>()
        .map(RecordingEngine::disposals)
        .unwrap_or_default()
}

struct RecordingScene {
    key: String,
    size: SceneSize,
    engine: EngineRef,
    counters: Arc<Counters>,
    fail: bool,
}

impl Scene for RecordingScene {
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
        self.counters.scenes_disposed.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(anyhow!("scene refused to die"));
        }
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct RecordingComponent {
    disposals: AtomicUsize,
    fail: bool,
}

impl RecordingComponent {
    pub(crate) fn new() -> Self {
        Self::default()
    }
    pub(crate) fn failing() -> Self {
        Self { disposals: AtomicUsize::new(0), fail: true }
    }
    pub(crate) fn disposals(&self) -> usize {
        self.disposals.load(Ordering::SeqCst)
    }
}

impl Component for RecordingComponent {
    fn dispose(&self) -> Result<()> {
        self.disposals.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(anyhow!("component refused to die"));
        }
        Ok(())
    }
}

/// Capability that only carries a name.
pub(crate) struct Tag {
    pub(crate) name: &'static str,
    disposals: AtomicUsize,
}

impl Tag {
    pub(crate) fn new(name: &'static str) -> Arc<dyn Capability> {
        Arc::new(Tag { name, disposals: AtomicUsize::new(0) })
    }
    pub(crate) fn disposals(&self) -> usize {
        self.disposals.load(Ordering::SeqCst)
    }
}

impl Capability for Tag {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn dispose(&self) -> Result<()> {
        self.disposals.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
