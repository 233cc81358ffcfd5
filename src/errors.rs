use crate::config::RenderConfigError;
use crate::unit::{RenderUnit, UnitId};
use std::sync::Arc;
use std::fmt;

/// The step of the disposal protocol a failure happened in.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DisposalStep {
    /// Disposing one of the unit's drawable components
    Component,
    /// Disposing the unit's scene
    Scene,
    /// The unit's own dispose (injected capabilities)
    Unit,
    /// Destroying the drawing engine
    Engine,
}

impl fmt::Display for DisposalStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisposalStep::Component => write!(f, "component"),
            DisposalStep::Scene => write!(f, "scene"),
            DisposalStep::Unit => write!(f, "unit"),
            DisposalStep::Engine => write!(f, "engine"),
        }
    }
}

/// A single failed disposal step. Teardown continues after a failure, so
/// several of these may be reported for one unit.
#[derive(Debug)]
pub struct DisposalFailure {
    /// Unit being disposed, `None` for the manager's default engine
    pub unit_id: Option<UnitId>,
    pub step: DisposalStep,
    pub source: anyhow::Error,
}

impl fmt::Display for DisposalFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.unit_id {
            Some(id) => write!(f, "unit {id}: {} disposal failed: {}", self.step, self.source),
            None => write!(f, "default engine: {} disposal failed: {}", self.step, self.source),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Render manager has been disposed")]
    Disposed,

    #[error("Event stream has completed")]
    StreamCompleted,

    #[error("Cannot create drawing engine: {0}")]
    EngineCreation(#[source] anyhow::Error),

    #[error("Cannot create scene for unit {unit_id}: {source}")]
    SceneCreation {
        unit_id: UnitId,
        #[source]
        source: anyhow::Error,
    },

    #[error("Disposal finished with {} failure(s)", failures.len())]
    Disposal { failures: Vec<DisposalFailure> },

    /// The new unit is live, but the unit it replaced did not dispose cleanly.
    #[error("Unit {} replaced, previous unit disposal finished with {} failure(s)", unit.unit_id(), failures.len())]
    ReplacementDisposal {
        unit: Arc<RenderUnit>,
        failures: Vec<DisposalFailure>,
    },

    #[error("Creation of unit {unit_id} was cancelled while it was being built")]
    CreationCancelled { unit_id: UnitId },

    #[error("Unit {unit_id} only accepts components while it is being mounted or extended")]
    UnitSealed { unit_id: UnitId },

    #[error("Invalid configuration: {0}")]
    Config(#[from] RenderConfigError),
}

impl RenderError {
    /// Turns a list of collected disposal failures into a result.
    pub(crate) fn from_failures(failures: Vec<DisposalFailure>) -> Result<(), RenderError> {
        if failures.is_empty() {
            Ok(())
        } else {
            Err(RenderError::Disposal { failures })
        }
    }

    /// Failures carried by [`RenderError::Disposal`] and [`RenderError::ReplacementDisposal`],
    /// empty for every other variant.
    pub fn disposal_failures(&self) -> &[DisposalFailure] {
        match self {
            RenderError::Disposal { failures } => failures,
            RenderError::ReplacementDisposal { failures, .. } => failures,
            _ => &[],
        }
    }
}
