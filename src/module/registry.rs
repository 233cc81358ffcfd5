use super::ModuleRef;
use crate::unit::UnitType;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// A module together with the id of the registration that added it.
#[derive(Clone)]
pub struct RegisteredModule {
    /// Unique per registered module, increasing in registration order
    pub id: u64,
    pub module: ModuleRef,
}

#[derive(Default)]
struct RegistryState {
    next_id: u64,
    entries: HashMap<UnitType, Vec<RegisteredModule>>,
}

/// Ordered multimap from document type to modules. Registration order is
/// injection order; registering the same module twice injects it twice.
#[derive(Default)]
pub struct ModuleRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `modules` to the list of `unit_type`. The returned handle removes exactly these
    /// entries again; it does not touch units the modules were already injected into.
    pub fn register(&self, unit_type: UnitType, modules: Vec<ModuleRef>) -> (ModuleRegistration, Vec<RegisteredModule>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let mut added = Vec::with_capacity(modules.len());
        for module in modules {
            state.next_id += 1;
            added.push(RegisteredModule { id: state.next_id, module });
        }
        state.entries.entry(unit_type).or_default().extend(added.iter().cloned());

        let registration = ModuleRegistration {
            unit_type,
            ids: added.iter().map(|m| m.id).collect(),
            registry: Arc::downgrade(&self.state),
        };
        (registration, added)
    }

    /// Snapshot of the modules currently registered for `unit_type`, in registration order.
    pub fn list_for(&self, unit_type: UnitType) -> Vec<RegisteredModule> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .get(&unit_type)
            .cloned()
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).entries.clear();
    }
}

/// Handle returned by a registration. Dropping it keeps the modules registered;
/// call [`ModuleRegistration::unregister`] to remove them.
#[must_use = "dropping the handle keeps the modules registered forever"]
pub struct ModuleRegistration {
    unit_type: UnitType,
    ids: Vec<u64>,
    registry: Weak<Mutex<RegistryState>>,
}

impl std::fmt::Debug for ModuleRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistration")
            .field("unit_type", &self.unit_type)
            .field("ids", &self.ids)
            .finish()
    }
}

impl ModuleRegistration {
    pub fn unit_type(&self) -> UnitType {
        self.unit_type
    }

    /// Number of modules added by this registration
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Removes the modules of this registration, so units created from now on no longer
    /// receive them. Units that already received them keep them.
    pub fn unregister(self) {
        let Some(state) = self.registry.upgrade() else {
            return;
        };
        let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(list) = state.entries.get_mut(&self.unit_type) {
            list.retain(|m| !self.ids.contains(&m.id));
            if list.is_empty() {
                state.entries.remove(&self.unit_type);
            }
        }
    }
}
