use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt::Display;

/// Identifier of a unit (one open spreadsheet, document or slide deck). Stable and
/// globally unique per document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(String);

impl UnitId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UnitId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UnitId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&UnitId> for UnitId {
    fn from(id: &UnitId) -> Self {
        id.clone()
    }
}

impl Borrow<str> for UnitId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for UnitId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Document type of a unit.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitType {
    /// Type could not be resolved (no backing document)
    #[default]
    Unknown,
    /// Rich text document
    Doc,
    /// Spreadsheet
    Sheet,
    /// Slide deck
    Slide,
    /// Project plan
    Project,
}

impl Display for UnitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitType::Unknown => write!(f, "Unknown"),
            UnitType::Doc => write!(f, "Doc"),
            UnitType::Sheet => write!(f, "Sheet"),
            UnitType::Slide => write!(f, "Slide"),
            UnitType::Project => write!(f, "Project"),
        }
    }
}
