use serde::{Deserialize, Serialize};
use std::any::Any;
use std::borrow::Cow;
use std::fmt::Display;
use std::sync::Arc;

/// Name under which an injected capability can be looked up on a unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilityId(Cow<'static, str>);

impl CapabilityId {
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for CapabilityId {
    fn from(s: &'static str) -> Self {
        Self(Cow::Borrowed(s))
    }
}

impl From<String> for CapabilityId {
    fn from(s: String) -> Self {
        Self(Cow::Owned(s))
    }
}

impl Display for CapabilityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Behaviour a module injects into a render unit (a controller, a render extension, ...).
pub trait Capability: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;

    /// Called once when the owning unit is disposed.
    fn dispose(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Ordered set of injected capabilities. Duplicated ids are kept; lookups return
/// the most recently injected one.
#[derive(Default)]
pub(crate) struct CapabilitySet {
    entries: Vec<(CapabilityId, Arc<dyn Capability>)>,
}

impl CapabilitySet {
    pub(crate) fn push(&mut self, id: CapabilityId, capability: Arc<dyn Capability>) {
        self.entries.push((id, capability));
    }

    pub(crate) fn get(&self, id: &CapabilityId) -> Option<Arc<dyn Capability>> {
        self.entries
            .iter()
            .rev()
            .find(|(key, _)| key == id)
            .map(|(_, cap)| cap.clone())
    }

    pub(crate) fn ids(&self) -> Vec<CapabilityId> {
        self.entries.iter().map(|(id, _)| id.clone()).collect()
    }

    /// Takes every capability out of the set, newest first.
    pub(crate) fn drain(&mut self) -> Vec<(CapabilityId, Arc<dyn Capability>)> {
        let mut entries = std::mem::take(&mut self.entries);
        entries.reverse();
        entries
    }
}
