//! Render units: the renderable state of one unit.
//!
//! A [`RenderUnit`] is either a [`FullUnit`], backed by a document model and
//! extensible through modules, or a [`ThumbnailUnit`], a preview-only unit
//! with no document behind it. Both share a [`RenderContext`] that holds the
//! engine, the scene and the drawable components.

use crate::document::DocumentModel;
use crate::errors::{DisposalFailure, DisposalStep, RenderError};
use crate::module::RegisteredModule;
use crate::render::{Component, EngineRef, Scene};
use crate::unit::capability::{Capability, CapabilityId, CapabilitySet};
use crate::unit::{UnitId, UnitType};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Who is responsible for destroying a unit's engine.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EngineOwnership {
    /// Created for this unit; destroyed when the unit is removed
    Owned,
    /// Supplied by the caller; left alone when the unit is removed
    Borrowed,
}

/// State shared by every kind of render unit.
pub struct RenderContext {
    unit_id: UnitId,
    unit_type: UnitType,
    engine: EngineRef,
    ownership: EngineOwnership,
    scene: Box<dyn Scene>,
    is_main_scene: bool,
    components: RwLock<HashMap<String, Arc<dyn Component>>>,
    /// Key of the main component inside `components`
    main_component: RwLock<Option<String>>,
    /// Open mutation windows; components can only change while this is non-zero
    mutable: AtomicUsize,
    disposed: AtomicBool,
}

/// Keeps the components of a [`RenderContext`] mutable until dropped.
pub(crate) struct MutationWindow<'a> {
    ctx: &'a RenderContext,
}

impl Drop for MutationWindow<'_> {
    fn drop(&mut self) {
        self.ctx.mutable.fetch_sub(1, Ordering::AcqRel);
    }
}

impl RenderContext {
    pub fn new(
        unit_id: UnitId,
        unit_type: UnitType,
        engine: EngineRef,
        ownership: EngineOwnership,
        scene: Box<dyn Scene>,
        is_main_scene: bool,
    ) -> Self {
        Self {
            unit_id,
            unit_type,
            engine,
            ownership,
            scene,
            is_main_scene,
            components: RwLock::new(HashMap::new()),
            main_component: RwLock::new(None),
            mutable: AtomicUsize::new(0),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn unit_id(&self) -> &UnitId {
        &self.unit_id
    }

    pub fn unit_type(&self) -> UnitType {
        self.unit_type
    }

    pub fn engine(&self) -> &EngineRef {
        &self.engine
    }

    pub fn engine_ownership(&self) -> EngineOwnership {
        self.ownership
    }

    pub fn scene(&self) -> &dyn Scene {
        self.scene.as_ref()
    }

    pub fn is_main_scene(&self) -> bool {
        self.is_main_scene
    }

    /// Opens a window in which components may be added. Windows nest.
    pub(crate) fn open_for_mutation(&self) -> MutationWindow<'_> {
        self.mutable.fetch_add(1, Ordering::AcqRel);
        MutationWindow { ctx: self }
    }

    /// True while the unit is being mounted by its document or extended by a module.
    pub fn is_mutable(&self) -> bool {
        self.mutable.load(Ordering::Acquire) > 0 && !self.is_disposed()
    }

    fn ensure_mutable(&self) -> Result<(), RenderError> {
        if !self.is_mutable() {
            return Err(RenderError::UnitSealed { unit_id: self.unit_id.clone() });
        }
        Ok(())
    }

    /// Mounts a drawable under `key`. A component already stored under the same key is returned.
    ///
    /// Only allowed from [`DocumentModel::mount_components`] or from a module building its
    /// capability; a live unit is otherwise read-only.
    pub fn add_component(
        &self,
        key: impl Into<String>,
        component: Arc<dyn Component>,
    ) -> Result<Option<Arc<dyn Component>>, RenderError> {
        self.ensure_mutable()?;
        Ok(self
            .components
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), component))
    }

    /// Marks the component stored under `key` as the main one. Returns false if there is no such component.
    /// Same restrictions as [`RenderContext::add_component`].
    pub fn set_main_component(&self, key: &str) -> Result<bool, RenderError> {
        self.ensure_mutable()?;
        if !self.components.read().unwrap_or_else(PoisonError::into_inner).contains_key(key) {
            return Ok(false);
        }
        *self.main_component.write().unwrap_or_else(PoisonError::into_inner) = Some(key.to_string());
        Ok(true)
    }

    pub fn component(&self, key: &str) -> Option<Arc<dyn Component>> {
        self.components
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn main_component(&self) -> Option<Arc<dyn Component>> {
        let key = self.main_component.read().unwrap_or_else(PoisonError::into_inner).clone()?;
        self.component(&key)
    }

    /// Snapshot of the mounted components
    pub fn components(&self) -> HashMap<String, Arc<dyn Component>> {
        self.components.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

/// Explicit disposal capability. Only unit kinds that own extra resources implement it.
pub trait Disposable {
    fn dispose(&self) -> anyhow::Result<()>;
}

#[derive(Default)]
struct Injected {
    /// Registration ids already applied, so a module is never injected twice into the same unit
    applied: HashSet<u64>,
    capabilities: CapabilitySet,
}

/// A render unit backed by a document model.
pub struct FullUnit {
    context: RenderContext,
    document: Arc<dyn DocumentModel>,
    injected: RwLock<Injected>,
}

impl FullUnit {
    pub fn new(context: RenderContext, document: Arc<dyn DocumentModel>) -> Self {
        Self { context, document, injected: RwLock::new(Injected::default()) }
    }

    pub fn context(&self) -> &RenderContext {
        &self.context
    }

    pub fn document(&self) -> &Arc<dyn DocumentModel> {
        &self.document
    }

    pub fn capability(&self, id: &CapabilityId) -> Option<Arc<dyn Capability>> {
        self.injected.read().unwrap_or_else(PoisonError::into_inner).capabilities.get(id)
    }

    pub fn capability_ids(&self) -> Vec<CapabilityId> {
        self.injected.read().unwrap_or_else(PoisonError::into_inner).capabilities.ids()
    }

    /// Injects the given modules in order. Modules already applied to this unit are skipped;
    /// a module whose factory fails is logged and skipped. Returns how many modules were injected.
    pub(crate) fn inject(&self, modules: &[RegisteredModule]) -> usize {
        let mut count = 0;
        let _window = self.context.open_for_mutation();

        for registered in modules {
            if self.context.is_disposed() {
                break;
            }

            // Reserve the id first so a concurrent injection of the same registration backs off.
            let fresh = self
                .injected
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .applied
                .insert(registered.id);
            if !fresh {
                continue;
            }

            // The lock is not held while the module runs: modules may look up earlier capabilities.
            match registered.module.create(self) {
                Ok(capability) => {
                    let id = registered.module.capability_id();
                    let mut injected = self.injected.write().unwrap_or_else(PoisonError::into_inner);
                    if self.context.is_disposed() {
                        // Unit was torn down while the module ran.
                        drop(injected);
                        if let Err(e) = capability.dispose() {
                            log::warn!("Unit[{}]: late capability {id} failed to dispose: {e:#}", self.context.unit_id);
                        }
                        break;
                    }
                    log::debug!("Unit[{}]: injected capability {}", self.context.unit_id, id);
                    injected.capabilities.push(id, capability);
                    count += 1;
                }
                Err(e) => {
                    log::warn!(
                        "Unit[{}]: module {} failed to inject: {e:#}",
                        self.context.unit_id,
                        registered.module.capability_id()
                    );
                }
            }
        }

        count
    }
}

impl Disposable for FullUnit {
    /// Disposes every injected capability, newest first. All capabilities are
    /// attempted; the first error is returned with the number of failures.
    fn dispose(&self) -> anyhow::Result<()> {
        let drained = self.injected.write().unwrap_or_else(PoisonError::into_inner).capabilities.drain();

        let mut errors = Vec::new();
        for (id, capability) in drained {
            if let Err(e) = capability.dispose() {
                errors.push(e.context(format!("capability {id}")));
            }
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            n => Err(errors.remove(0).context(format!("{n} capabilities failed to dispose"))),
        }
    }
}

/// Preview-only unit without a document model. It has no capabilities and no
/// components unless a caller mounts them.
pub struct ThumbnailUnit {
    context: RenderContext,
}

impl ThumbnailUnit {
    pub fn new(context: RenderContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &RenderContext {
        &self.context
    }
}

pub enum RenderUnit {
    Full(FullUnit),
    Thumbnail(ThumbnailUnit),
}

impl std::fmt::Debug for RenderUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ctx = self.context();
        f.debug_struct("RenderUnit")
            .field("unit_id", &ctx.unit_id)
            .field("unit_type", &ctx.unit_type)
            .field("is_thumbnail", &self.is_thumbnail())
            .field("is_main_scene", &ctx.is_main_scene)
            .field("scene", &ctx.scene.key())
            .finish_non_exhaustive()
    }
}

impl RenderUnit {
    pub fn context(&self) -> &RenderContext {
        match self {
            RenderUnit::Full(unit) => &unit.context,
            RenderUnit::Thumbnail(unit) => &unit.context,
        }
    }

    pub fn unit_id(&self) -> &UnitId {
        self.context().unit_id()
    }

    pub fn unit_type(&self) -> UnitType {
        self.context().unit_type()
    }

    pub fn engine(&self) -> &EngineRef {
        self.context().engine()
    }

    pub fn owns_engine(&self) -> bool {
        self.context().engine_ownership() == EngineOwnership::Owned
    }

    pub fn scene(&self) -> &dyn Scene {
        self.context().scene()
    }

    pub fn is_main_scene(&self) -> bool {
        self.context().is_main_scene()
    }

    pub fn is_thumbnail(&self) -> bool {
        matches!(self, RenderUnit::Thumbnail(_))
    }

    pub fn main_component(&self) -> Option<Arc<dyn Component>> {
        self.context().main_component()
    }

    pub fn component(&self, key: &str) -> Option<Arc<dyn Component>> {
        self.context().component(key)
    }

    pub fn components(&self) -> HashMap<String, Arc<dyn Component>> {
        self.context().components()
    }

    /// Backing document; always `None` for thumbnails.
    pub fn document(&self) -> Option<&Arc<dyn DocumentModel>> {
        match self {
            RenderUnit::Full(unit) => Some(unit.document()),
            RenderUnit::Thumbnail(_) => None,
        }
    }

    /// Looks up an injected capability; always `None` for thumbnails.
    pub fn capability(&self, id: &CapabilityId) -> Option<Arc<dyn Capability>> {
        match self {
            RenderUnit::Full(unit) => unit.capability(id),
            RenderUnit::Thumbnail(_) => None,
        }
    }

    /// Runs `f` on the capability stored under `id` if it exists and is a `T`.
    pub fn with_capability<T: 'static, R>(&self, id: &CapabilityId, f: impl FnOnce(&T) -> R) -> Option<R> {
        let capability = self.capability(id)?;
        capability.as_any().downcast_ref::<T>().map(f)
    }

    pub fn capability_ids(&self) -> Vec<CapabilityId> {
        match self {
            RenderUnit::Full(unit) => unit.capability_ids(),
            RenderUnit::Thumbnail(_) => Vec::new(),
        }
    }

    /// Injects modules into the unit. A no-op for thumbnails.
    pub(crate) fn inject(&self, modules: &[RegisteredModule]) -> usize {
        match self {
            RenderUnit::Full(unit) => unit.inject(modules),
            RenderUnit::Thumbnail(_) => 0,
        }
    }

    /// The unit's own disposal capability, if its kind has one.
    pub fn as_disposable(&self) -> Option<&dyn Disposable> {
        match self {
            RenderUnit::Full(unit) => Some(unit),
            RenderUnit::Thumbnail(_) => None,
        }
    }

    /// Runs the disposal protocol: components, scene, the unit's own disposal and
    /// optionally the engine. Every step is attempted even when an earlier one
    /// fails. Runs at most once per unit; later calls return no failures.
    pub(crate) fn dispose(&self, destroy_engine: bool) -> Vec<DisposalFailure> {
        let ctx = self.context();
        if ctx.disposed.swap(true, Ordering::AcqRel) {
            return Vec::new();
        }

        log::debug!("Unit[{}]: disposing (destroy engine: {destroy_engine})", ctx.unit_id);

        let mut failures = Vec::new();
        let mut fail = |step: DisposalStep, source: anyhow::Error| {
            log::warn!("Unit[{}]: {step} disposal failed: {source:#}", ctx.unit_id);
            failures.push(DisposalFailure { unit_id: Some(ctx.unit_id.clone()), step, source });
        };

        // The main component is one of these entries, so it is disposed exactly once.
        let components = std::mem::take(&mut *ctx.components.write().unwrap_or_else(PoisonError::into_inner));
        ctx.main_component.write().unwrap_or_else(PoisonError::into_inner).take();
        for (key, component) in components {
            if let Err(e) = component.dispose() {
                fail(DisposalStep::Component, e.context(format!("component {key}")));
            }
        }

        if let Err(e) = ctx.scene.dispose() {
            fail(DisposalStep::Scene, e);
        }

        if let Some(disposable) = self.as_disposable() {
            if let Err(e) = disposable.dispose() {
                fail(DisposalStep::Unit, e);
            }
        }

        if destroy_engine {
            if let Err(e) = ctx.engine.dispose() {
                fail(DisposalStep::Engine, e);
            }
        }

        failures
    }
}
