use serde::{Deserialize, Serialize};

use crate::kernel::config::CategoryId;
use crate::kernel::pipeline::{Severity, TickError};
use crate::kernel::recognition::Outcome;
use crate::kernel::time::Millis;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TelemetryEvent {
    /// No new slices; inference did not run.
    TickSkipped { timestamp: Millis },

    NoDetection { timestamp: Millis },

    Suppressed {
        timestamp: Millis,
        category: CategoryId,
        score: u8,
    },

    Detected {
        timestamp: Millis,
        category: CategoryId,
        score: u8,
    },

    TickFailed { timestamp: Millis, kind: FailureKind },

    Restarted { timestamp: Millis },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    ContractViolation,
    Collaborator,
}

impl From<&TickError> for FailureKind {
    fn from(err: &TickError) -> Self {
        match err.severity() {
            Severity::ContractViolation => FailureKind::ContractViolation,
            Severity::CollaboratorFailure => FailureKind::Collaborator,
        }
    }
}

impl TelemetryEvent {
    /// Maps a tick result. `inferred` distinguishes a skipped tick from a
    /// real `NoDetection`.
    pub fn from_outcome(timestamp: Millis, inferred: bool, outcome: &Outcome) -> Self {
        match *outcome {
            Outcome::NoDetection if !inferred => TelemetryEvent::TickSkipped { timestamp },
            Outcome::NoDetection => TelemetryEvent::NoDetection { timestamp },
            Outcome::Suppressed { category, score } => TelemetryEvent::Suppressed {
                timestamp,
                category,
                score,
            },
            Outcome::Detected { category, score } => TelemetryEvent::Detected {
                timestamp,
                category,
                score,
            },
        }
    }
}
