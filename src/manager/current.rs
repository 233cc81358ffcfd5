//! Legacy "current unit" pointer.
//!
//! Older single-document callers expect one unit to be "the" current one. The
//! render manager is multi-document, so this pointer is only a convenience:
//! nothing in the manager relies on it, and it may name a unit that has no
//! render unit (yet). Setting it ahead of creation is allowed on purpose, so a
//! caller can announce which unit it is about to open.

use crate::events::EventStream;
use crate::unit::UnitId;
use std::sync::{PoisonError, RwLock};

pub(crate) struct CurrentUnit {
    value: RwLock<Option<UnitId>>,
    changes: EventStream<UnitId>,
}

impl CurrentUnit {
    pub(crate) fn new(capacity: usize) -> Self {
        Self { value: RwLock::new(None), changes: EventStream::new(capacity) }
    }

    /// Stores `unit_id` and publishes it, even when it equals the previous value.
    pub(crate) fn set(&self, unit_id: UnitId) {
        *self.value.write().unwrap_or_else(PoisonError::into_inner) = Some(unit_id.clone());
        self.changes.emit(unit_id);
    }

    pub(crate) fn get(&self) -> Option<UnitId> {
        self.value.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub(crate) fn changes(&self) -> &EventStream<UnitId> {
        &self.changes
    }

    pub(crate) fn complete(&self) {
        self.changes.complete();
    }
}
