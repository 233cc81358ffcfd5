//! Document registry contracts.
//!
//! The render manager never owns documents. It asks a [`DocumentRegistry`]
//! whether a unit has a document model behind it, which type that document
//! is, and which document of a given type is currently focused.
//! [`InMemoryDocumentRegistry`] is a simple implementation for hosts that
//! do not have a registry of their own, and for tests.

use crate::unit::{RenderContext, UnitId, UnitType};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// A loaded document (spreadsheet, document, slide deck).
pub trait DocumentModel: Send + Sync {
    fn unit_id(&self) -> &UnitId;

    fn unit_type(&self) -> UnitType;

    /// Mounts the document's own drawables on a freshly created render unit. This is the
    /// only place, besides module injection, where components can be added.
    fn mount_components(&self, _ctx: &RenderContext) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Read-only view on the documents known to the host.
pub trait DocumentRegistry: Send + Sync {
    /// Returns the document model of the unit, if there is one.
    fn get_unit(&self, unit_id: &UnitId) -> Option<Arc<dyn DocumentModel>>;

    /// Returns the type of the unit, [`UnitType::Unknown`] when it is not known.
    fn get_unit_type(&self, unit_id: &UnitId) -> UnitType;

    /// Returns the document of the given type the user is currently working in.
    fn get_current_unit_for_type(&self, unit_type: UnitType) -> Option<Arc<dyn DocumentModel>>;
}

/// Document model that only carries an id and a type.
#[derive(Debug, Clone)]
pub struct PlainDocument {
    unit_id: UnitId,
    unit_type: UnitType,
}

impl PlainDocument {
    pub fn new(unit_id: impl Into<UnitId>, unit_type: UnitType) -> Self {
        Self { unit_id: unit_id.into(), unit_type }
    }
}

impl DocumentModel for PlainDocument {
    fn unit_id(&self) -> &UnitId {
        &self.unit_id
    }

    fn unit_type(&self) -> UnitType {
        self.unit_type
    }
}

#[derive(Default)]
struct RegistryState {
    units: HashMap<UnitId, Arc<dyn DocumentModel>>,
    current: HashMap<UnitType, UnitId>,
}

/// In‑memory document registry. Used as a default when the host has no registry of its own.
#[derive(Default)]
pub struct InMemoryDocumentRegistry {
    state: RwLock<RegistryState>,
}

impl InMemoryDocumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a document, replacing any document with the same unit id.
    pub fn add_unit(&self, document: Arc<dyn DocumentModel>) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.units.insert(document.unit_id().clone(), document);
    }

    /// Removes a document. If it was current for its type, nothing is current for that type anymore.
    pub fn remove_unit(&self, unit_id: &UnitId) -> Option<Arc<dyn DocumentModel>> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let removed = state.units.remove(unit_id)?;
        state.current.retain(|_, id| id != unit_id);
        Some(removed)
    }

    /// Marks the unit as the current document of its type. Returns false when the unit is unknown.
    pub fn focus_unit(&self, unit_id: &UnitId) -> bool {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let Some(unit_type) = state.units.get(unit_id).map(|doc| doc.unit_type()) else {
            return false;
        };
        state.current.insert(unit_type, unit_id.clone());
        true
    }
}

impl DocumentRegistry for InMemoryDocumentRegistry {
    fn get_unit(&self, unit_id: &UnitId) -> Option<Arc<dyn DocumentModel>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner).units.get(unit_id).cloned()
    }

    fn get_unit_type(&self, unit_id: &UnitId) -> UnitType {
        self.get_unit(unit_id).map(|doc| doc.unit_type()).unwrap_or_default()
    }

    fn get_current_unit_for_type(&self, unit_type: UnitType) -> Option<Arc<dyn DocumentModel>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let id = state.current.get(&unit_type)?;
        state.units.get(id).cloned()
    }
}
