// src/manager.rs
//! Render unit lifecycle: [`RenderManager`].
//!
//! The manager owns one [`RenderUnit`] per unit id. It creates units (engine,
//! scene, document components and per-type modules), looks them up, and tears
//! them down again, and it tells the rest of the application about it through
//! the "created" and "disposed" event streams.
//!
//! # Threading
//!
//! All operations are synchronous. Creating, replacing and removing the unit of
//! one unit id is serialised by a per-id lock; when two callers create the same
//! id at the same time, the second one waits and then replaces the first
//! caller's unit. A new unit only becomes visible in the table once it is
//! fully built. Events are emitted after the per-id lock is released, so
//! subscribers may call back into the manager.
//!
//! The per-id lock is reentrant. A document mounting its components or a
//! module building its capability may call back into the manager for the unit
//! being built: removing it cancels the creation, creating it again replaces
//! it.

use crate::config::RenderConfig;
use crate::document::DocumentRegistry;
use crate::errors::{DisposalFailure, DisposalStep, RenderError};
use crate::events::{EventStream, Subscription};
use crate::module::{ModuleRef, ModuleRegistration, ModuleRegistry};
use crate::render::{same_engine, EngineRef, RenderBackend};
use crate::unit::{
    Capability, CapabilityId, EngineOwnership, FullUnit, RenderContext, RenderUnit, ThumbnailUnit, UnitId, UnitType,
};
use parking_lot::ReentrantMutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::broadcast;

mod current;

use current::CurrentUnit;

struct TableEntry {
    /// Insertion sequence; replacing a unit keeps its position
    seq: u64,
    unit: Arc<RenderUnit>,
}

#[derive(Default)]
struct UnitTable {
    next_seq: u64,
    entries: HashMap<UnitId, TableEntry>,
}

impl UnitTable {
    fn insert(&mut self, unit_id: UnitId, unit: Arc<RenderUnit>) {
        match self.entries.get_mut(&unit_id) {
            Some(entry) => entry.unit = unit,
            None => {
                self.next_seq += 1;
                self.entries.insert(unit_id, TableEntry { seq: self.next_seq, unit });
            }
        }
    }

    fn remove(&mut self, unit_id: &str) -> Option<Arc<RenderUnit>> {
        self.entries.remove(unit_id).map(|entry| entry.unit)
    }

    /// Entries in insertion order
    fn ordered(&self) -> Vec<(UnitId, Arc<RenderUnit>)> {
        let mut entries: Vec<_> = self.entries.iter().collect();
        entries.sort_by_key(|(_, entry)| entry.seq);
        entries.into_iter().map(|(id, entry)| (id.clone(), entry.unit.clone())).collect()
    }
}

/// Result of a create-or-replace run, carried out of the per-id lock.
struct Built {
    replaced: bool,
    /// Failures of the replaced unit's disposal
    failures: Vec<DisposalFailure>,
    result: Result<Arc<RenderUnit>, RenderError>,
}

impl Built {
    fn failed(replaced: bool, failures: Vec<DisposalFailure>, err: RenderError) -> Self {
        Self { replaced, failures, result: Err(err) }
    }
}

pub struct RenderManager {
    /// Configuration for scenes and event channels
    config: RenderConfig,
    /// Factory for engines and scenes
    backend: Box<dyn RenderBackend>,
    /// Documents known to the host
    documents: Arc<dyn DocumentRegistry>,
    /// Live render units, indexed by [`UnitId`]
    units: RwLock<UnitTable>,
    /// Per unit id locks around create-or-replace and removal
    unit_locks: Mutex<HashMap<UnitId, Arc<ReentrantMutex<()>>>>,
    /// Units being built, not yet in `units`. Only visible to the thread holding the unit's lock.
    building: Mutex<HashMap<UnitId, Arc<RenderUnit>>>,
    modules: ModuleRegistry,
    /// Engine for contexts without a document of their own, created on first use
    default_engine: Mutex<Option<EngineRef>>,
    current: CurrentUnit,
    created: EventStream<Arc<RenderUnit>>,
    disposed: EventStream<UnitId>,
    torn_down: AtomicBool,
}

impl std::fmt::Debug for RenderManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderManager")
            .field("backend", &self.backend.name())
            .field("units", &self.len())
            .field("torn_down", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

impl RenderManager {
    /// Create a new render manager.
    ///
    /// If `config` is `None`, [`RenderConfig::default`] is used.
    ///
    /// ```
    /// # use std::sync::Arc;
    /// use unit_render::{RenderManager, document::InMemoryDocumentRegistry};
    /// use unit_render::render::backends::null::NullBackend;
    ///
    /// let documents = Arc::new(InMemoryDocumentRegistry::new());
    /// let manager = RenderManager::new(None, Box::new(NullBackend::new()), documents);
    /// assert!(manager.is_empty());
    /// ```
    pub fn new(
        config: Option<RenderConfig>,
        backend: Box<dyn RenderBackend>,
        documents: Arc<dyn DocumentRegistry>,
    ) -> Self {
        let config = config.unwrap_or_default();
        let capacity = config.event_channel_capacity;

        Self {
            config,
            backend,
            documents,
            units: RwLock::new(UnitTable::default()),
            unit_locks: Mutex::new(HashMap::new()),
            building: Mutex::new(HashMap::new()),
            modules: ModuleRegistry::new(),
            default_engine: Mutex::new(None),
            current: CurrentUnit::new(capacity),
            created: EventStream::new(capacity),
            disposed: EventStream::new(capacity),
            torn_down: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    // ****************************************
    // ** Creation / removal

    /// Creates the render unit of `unit_id` with a fresh engine owned by the unit,
    /// replacing any unit that already exists for the id.
    pub fn create_render(&self, unit_id: impl Into<UnitId>) -> Result<Arc<RenderUnit>, RenderError> {
        self.ensure_live()?;
        let engine = self.backend.create_engine().map_err(RenderError::EngineCreation)?;
        self.create_or_replace(unit_id.into(), engine, EngineOwnership::Owned, true)
    }

    /// Creates the render unit of `unit_id` on a caller-supplied engine. The engine is
    /// borrowed: removing the unit leaves it alive.
    pub fn create_render_with_engine(
        &self,
        unit_id: impl Into<UnitId>,
        engine: EngineRef,
        is_main_scene: bool,
    ) -> Result<Arc<RenderUnit>, RenderError> {
        self.ensure_live()?;
        self.create_or_replace(unit_id.into(), engine, EngineOwnership::Borrowed, is_main_scene)
    }

    /// Stores an externally built unit under `unit_id`. A unit already stored under that
    /// id is replaced without being disposed; that is the caller's job. No "created"
    /// event is emitted.
    pub fn add_render(&self, unit_id: impl Into<UnitId>, unit: Arc<RenderUnit>) -> Result<(), RenderError> {
        self.ensure_live()?;
        let unit_id = unit_id.into();

        self.with_unit_lock(&unit_id, || {
            let mut table = self.units.write().unwrap_or_else(PoisonError::into_inner);
            if self.is_disposed() {
                return Err(RenderError::Disposed);
            }
            log::debug!("Unit[{unit_id}]: added external render unit");
            table.insert(unit_id.clone(), unit);
            Ok(())
        })
    }

    /// Removes and disposes the unit of `unit_id`. Removing an unknown id does nothing.
    /// The engine is destroyed only when the unit owns it. Disposal failures are
    /// reported after every step has been attempted and the "disposed" event has fired.
    ///
    /// Called while the unit is still being built (from its document or one of its
    /// modules), the unit is disposed and its creation is cancelled.
    pub fn remove_render(&self, unit_id: &str) -> Result<(), RenderError> {
        let unit_id = UnitId::from(unit_id);

        let (removed, failures) = self.with_unit_lock(&unit_id, || {
            let stored = self.units.write().unwrap_or_else(PoisonError::into_inner).remove(unit_id.as_str());
            let pending = self.building.lock().unwrap_or_else(PoisonError::into_inner).remove(unit_id.as_str());

            let mut removed = false;
            let mut failures = Vec::new();
            for unit in stored.into_iter().chain(pending) {
                removed = true;
                failures.extend(unit.dispose(unit.owns_engine()));
            }
            (removed, failures)
        });

        if removed {
            log::debug!("Unit[{unit_id}]: removed");
            self.disposed.emit(unit_id);
        }
        RenderError::from_failures(failures)
    }

    // ****************************************
    // ** Queries

    pub fn get_render_by_id(&self, unit_id: &str) -> Option<Arc<RenderUnit>> {
        self.units
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .get(unit_id)
            .map(|entry| entry.unit.clone())
    }

    pub fn has(&self, unit_id: &str) -> bool {
        self.units.read().unwrap_or_else(PoisonError::into_inner).entries.contains_key(unit_id)
    }

    /// Snapshot of every live unit
    pub fn get_render_all(&self) -> HashMap<UnitId, Arc<RenderUnit>> {
        self.units
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .iter()
            .map(|(id, entry)| (id.clone(), entry.unit.clone()))
            .collect()
    }

    /// Live units of the given type, in insertion order
    pub fn get_all_renderers_of_type(&self, unit_type: UnitType) -> Vec<Arc<RenderUnit>> {
        self.ordered_units()
            .into_iter()
            .filter(|unit| unit.unit_type() == unit_type)
            .collect()
    }

    /// Render unit of the document of `unit_type` the user is currently working in.
    pub fn get_current_type_of_renderer(&self, unit_type: UnitType) -> Option<Arc<RenderUnit>> {
        let document = self.documents.get_current_unit_for_type(unit_type)?;
        self.get_render_by_id(document.unit_id().as_str())
    }

    /// Capability `id` of the current render unit of `unit_type`.
    pub fn with_current_type_of_unit(&self, unit_type: UnitType, id: &CapabilityId) -> Option<Arc<dyn Capability>> {
        self.get_current_type_of_renderer(unit_type)?.capability(id)
    }

    /// Number of live units
    pub fn len(&self) -> usize {
        self.units.read().unwrap_or_else(PoisonError::into_inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ****************************************
    // ** Legacy current unit

    /// Marks `unit_id` as current and publishes it. The id does not need to have a
    /// render unit yet.
    pub fn set_current(&self, unit_id: impl Into<UnitId>) {
        self.current.set(unit_id.into());
    }

    pub fn current(&self) -> Option<UnitId> {
        self.current.get()
    }

    /// The oldest live unit
    pub fn first(&self) -> Option<Arc<RenderUnit>> {
        let table = self.units.read().unwrap_or_else(PoisonError::into_inner);
        table.entries.values().min_by_key(|entry| entry.seq).map(|entry| entry.unit.clone())
    }

    // ****************************************
    // ** Modules

    pub fn register_render_module(&self, unit_type: UnitType, module: ModuleRef) -> Result<ModuleRegistration, RenderError> {
        self.register_render_modules(unit_type, vec![module])
    }

    /// Registers modules for `unit_type` and injects them into every live unit of that
    /// type right away. Unregistering later does not take them out of those units.
    pub fn register_render_modules(
        &self,
        unit_type: UnitType,
        modules: Vec<ModuleRef>,
    ) -> Result<ModuleRegistration, RenderError> {
        self.ensure_live()?;
        let (registration, added) = self.modules.register(unit_type, modules);

        for unit in self.get_all_renderers_of_type(unit_type) {
            let injected = unit.inject(&added);
            if injected > 0 {
                log::debug!("Unit[{}]: {injected} module(s) injected after creation", unit.unit_id());
            }
        }

        Ok(registration)
    }

    // ****************************************
    // ** Engines

    /// Engine for contexts that have no document of their own. Created on first use
    /// and destroyed when the manager is disposed.
    pub fn default_engine(&self) -> Result<EngineRef, RenderError> {
        self.ensure_live()?;
        let mut slot = self.default_engine.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(engine) = slot.as_ref() {
            return Ok(engine.clone());
        }
        let engine = self.backend.create_engine().map_err(RenderError::EngineCreation)?;
        *slot = Some(engine.clone());
        Ok(engine)
    }

    // ****************************************
    // ** Events

    /// Emits every unit built by `create_render*`, after it is stored in the table.
    pub fn created_stream(&self) -> &EventStream<Arc<RenderUnit>> {
        &self.created
    }

    /// Emits the id of every unit that was disposed.
    pub fn disposed_stream(&self) -> &EventStream<UnitId> {
        &self.disposed
    }

    /// Emits every call to [`RenderManager::set_current`].
    pub fn current_stream(&self) -> &EventStream<UnitId> {
        self.current.changes()
    }

    pub fn subscribe_created(
        &self,
        callback: impl Fn(&Arc<RenderUnit>) + Send + Sync + 'static,
    ) -> Result<Subscription, RenderError> {
        self.created.subscribe(callback)
    }

    pub fn subscribe_disposed(&self, callback: impl Fn(&UnitId) + Send + Sync + 'static) -> Result<Subscription, RenderError> {
        self.disposed.subscribe(callback)
    }

    pub fn subscribe_current(&self, callback: impl Fn(&UnitId) + Send + Sync + 'static) -> Result<Subscription, RenderError> {
        self.current.changes().subscribe(callback)
    }

    pub fn listen_created(&self) -> Result<broadcast::Receiver<Arc<RenderUnit>>, RenderError> {
        self.created.listen()
    }

    pub fn listen_disposed(&self) -> Result<broadcast::Receiver<UnitId>, RenderError> {
        self.disposed.listen()
    }

    pub fn listen_current(&self) -> Result<broadcast::Receiver<UnitId>, RenderError> {
        self.current.changes().listen()
    }

    // ****************************************
    // ** Teardown

    pub fn is_disposed(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    /// Disposes every live unit, clears the module registry and completes all event
    /// streams. Every engine in use is destroyed once, the default engine included.
    /// Calling it again does nothing.
    pub fn dispose(&self) -> Result<(), RenderError> {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        log::debug!("Render manager shutting down");

        let units = {
            let mut table = self.units.write().unwrap_or_else(PoisonError::into_inner);
            let ordered = table.ordered();
            table.entries.clear();
            ordered
        };

        let mut failures = Vec::new();
        let mut destroyed: Vec<EngineRef> = Vec::new();
        for (unit_id, unit) in units {
            let engine = unit.engine().clone();
            let destroy_engine = !destroyed.iter().any(|e| same_engine(e, &engine));
            failures.extend(unit.dispose(destroy_engine));
            if destroy_engine {
                destroyed.push(engine);
            }
            self.disposed.emit(unit_id);
        }

        let default_engine = self.default_engine.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(engine) = default_engine {
            if !destroyed.iter().any(|e| same_engine(e, &engine)) {
                if let Err(source) = engine.dispose() {
                    log::warn!("Default engine disposal failed: {source:#}");
                    failures.push(DisposalFailure { unit_id: None, step: DisposalStep::Engine, source });
                }
            }
        }

        self.modules.clear();
        self.unit_locks.lock().unwrap_or_else(PoisonError::into_inner).clear();

        self.created.complete();
        self.disposed.complete();
        self.current.complete();

        RenderError::from_failures(failures)
    }

    // ****************************************
    // ** Internals

    fn ensure_live(&self) -> Result<(), RenderError> {
        if self.is_disposed() {
            return Err(RenderError::Disposed);
        }
        Ok(())
    }

    fn ordered_units(&self) -> Vec<Arc<RenderUnit>> {
        self.units
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .ordered()
            .into_iter()
            .map(|(_, unit)| unit)
            .collect()
    }

    /// Runs `f` while holding the lock of `unit_id`. The calling thread may take it again from within `f`.
    fn with_unit_lock<R>(&self, unit_id: &UnitId, f: impl FnOnce() -> R) -> R {
        let lock = self
            .unit_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(unit_id.clone())
            .or_insert_with(|| Arc::new(ReentrantMutex::new(())))
            .clone();

        let result = {
            let _guard = lock.lock();
            f()
        };

        // Clones are only taken under the map lock, so a count of one means nobody holds or waits on it.
        let mut locks = self.unit_locks.lock().unwrap_or_else(PoisonError::into_inner);
        drop(lock);
        if locks.get(unit_id).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(unit_id);
        }

        result
    }

    fn create_or_replace(
        &self,
        unit_id: UnitId,
        engine: EngineRef,
        ownership: EngineOwnership,
        is_main_scene: bool,
    ) -> Result<Arc<RenderUnit>, RenderError> {
        let built = self.with_unit_lock(&unit_id, || self.build(&unit_id, engine, ownership, is_main_scene));

        if built.replaced {
            self.disposed.emit(unit_id);
        }
        let unit = built.result?;
        self.created.emit(unit.clone());

        if built.failures.is_empty() {
            Ok(unit)
        } else {
            Err(RenderError::ReplacementDisposal { unit, failures: built.failures })
        }
    }

    /// Create-or-replace protocol; must run under the lock of `unit_id`.
    fn build(&self, unit_id: &UnitId, engine: EngineRef, ownership: EngineOwnership, is_main_scene: bool) -> Built {
        // A unit still being built further up this thread's stack is replaced like a stored one.
        let pending = self.building.lock().unwrap_or_else(PoisonError::into_inner).get(unit_id.as_str()).cloned();
        let previous = pending.or_else(|| self.get_render_by_id(unit_id.as_str()));
        let replaced = previous.is_some();

        let mut ownership = ownership;
        let mut failures = Vec::new();
        if let Some(old) = &previous {
            // A reused engine stays alive; whoever owned it keeps owning it through the new unit.
            let reused = same_engine(old.engine(), &engine);
            if reused && old.owns_engine() {
                ownership = EngineOwnership::Owned;
            }
            log::debug!("Unit[{unit_id}]: replacing existing render unit");
            failures = old.dispose(old.owns_engine() && !reused);
        }

        let key = self.config.scene_key(unit_id.as_str());
        let scene = match self.backend.create_scene(&key, engine.clone(), self.config.default_scene_size) {
            Ok(scene) => scene,
            Err(source) => {
                if let Some(old) = previous {
                    self.forget(unit_id, &old);
                }
                if ownership == EngineOwnership::Owned {
                    if let Err(e) = engine.dispose() {
                        log::warn!("Unit[{unit_id}]: engine disposal failed: {e:#}");
                    }
                }
                let err = RenderError::SceneCreation { unit_id: unit_id.clone(), source };
                return Built::failed(replaced, failures, err);
            }
        };

        let unit_type = self.documents.get_unit_type(unit_id);
        let context = RenderContext::new(unit_id.clone(), unit_type, engine, ownership, scene, is_main_scene);
        let unit = Arc::new(match self.documents.get_unit(unit_id) {
            Some(document) => RenderUnit::Full(FullUnit::new(context, document)),
            None => RenderUnit::Thumbnail(ThumbnailUnit::new(context)),
        });

        self.building
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(unit_id.clone(), unit.clone());

        if let Some(document) = unit.document() {
            let _window = unit.context().open_for_mutation();
            if let Err(e) = document.mount_components(unit.context()) {
                log::warn!("Unit[{unit_id}]: document failed to mount its components: {e:#}");
            }
        }
        unit.inject(&self.modules.list_for(unit_type));

        self.forget_building(unit_id, &unit);
        if unit.context().is_disposed() {
            log::debug!("Unit[{unit_id}]: creation cancelled while building");
            return Built::failed(replaced, failures, RenderError::CreationCancelled { unit_id: unit_id.clone() });
        }

        {
            let mut table = self.units.write().unwrap_or_else(PoisonError::into_inner);
            if self.is_disposed() {
                drop(table);
                let _ = unit.dispose(unit.owns_engine());
                return Built::failed(replaced, failures, RenderError::Disposed);
            }
            table.insert(unit_id.clone(), unit.clone());
        }

        // Catch modules registered while the unit was being built.
        unit.inject(&self.modules.list_for(unit_type));
        if unit.context().is_disposed() {
            return Built::failed(replaced, failures, RenderError::CreationCancelled { unit_id: unit_id.clone() });
        }

        log::debug!(
            "Unit[{unit_id}]: created {} unit of type {unit_type}",
            if unit.is_thumbnail() { "thumbnail" } else { "full" }
        );
        Built { replaced, failures, result: Ok(unit) }
    }

    /// Drops `unit` from the table or the building slot, whichever still holds it.
    fn forget(&self, unit_id: &UnitId, unit: &Arc<RenderUnit>) {
        let mut table = self.units.write().unwrap_or_else(PoisonError::into_inner);
        if table.entries.get(unit_id.as_str()).is_some_and(|entry| Arc::ptr_eq(&entry.unit, unit)) {
            table.remove(unit_id.as_str());
        }
        drop(table);
        self.forget_building(unit_id, unit);
    }

    fn forget_building(&self, unit_id: &UnitId, unit: &Arc<RenderUnit>) {
        let mut building = self.building.lock().unwrap_or_else(PoisonError::into_inner);
        if building.get(unit_id.as_str()).is_some_and(|pending| Arc::ptr_eq(pending, unit)) {
            building.remove(unit_id.as_str());
        }
    }
}

impl Drop for RenderManager {
    fn drop(&mut self) {
        if let Err(e) = self.dispose() {
            log::warn!("Render manager dropped with disposal failures: {e}");
        }
    }
}
