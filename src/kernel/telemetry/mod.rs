//! Tick telemetry.
//!
//! # SAFETY INVARIANT
//! Telemetry is a READ-ONLY side-effect layer fed by the host loop.
//! It must **NEVER** be read inside decision logic (assembler or recognizer).
//!
//! # PRIVACY INVARIANT
//! Events carry timestamps, category ids and scores only. Never features or audio.

pub mod event;
pub mod metrics;
pub mod recorder;

pub use event::{FailureKind, TelemetryEvent};
pub use metrics::{compute_snapshot, TelemetrySnapshot};
pub use recorder::TelemetryRecorder;
