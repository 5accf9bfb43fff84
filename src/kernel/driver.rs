use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::features::FeatureExtractor;
use super::inference::InferenceEngine;
use super::pipeline::{Pipeline, Severity, TickError};
use super::recognition::Outcome;
use super::telemetry::{FailureKind, TelemetryEvent, TelemetryRecorder};
use super::time::Clock;
use crate::outputs::CommandResponder;

pub const DEFAULT_TICK_MS: u64 = 20;

/// Host loop around a [`Pipeline`]: runs ticks, hands outcomes to the
/// responder and records telemetry. Logging lives here, not in the pipeline.
pub struct HostLoop<C, F, E, R> {
    pub pipeline: Pipeline<C, F, E>,
    pub responder: R,
    pub telemetry: TelemetryRecorder,
    halt_on_collaborator_failure: bool,
}

impl<C, F, E, R> HostLoop<C, F, E, R>
where
    C: Clock,
    F: FeatureExtractor,
    E: InferenceEngine,
    R: CommandResponder,
{
    pub fn new(pipeline: Pipeline<C, F, E>, responder: R) -> Self {
        Self {
            pipeline,
            responder,
            telemetry: TelemetryRecorder::new(),
            halt_on_collaborator_failure: false,
        }
    }

    /// Stop `run` on the first collaborator failure instead of skipping the tick.
    pub fn halt_on_collaborator_failure(mut self, halt: bool) -> Self {
        self.halt_on_collaborator_failure = halt;
        self
    }

    /// One tick, fully dispatched.
    pub fn step(&mut self) -> Result<Outcome, TickError> {
        let result = self.pipeline.tick();
        let info = self.pipeline.last_tick();

        match &result {
            Ok(outcome) => {
                if !info.inferred {
                    debug!(timestamp = info.timestamp, "No new slices, skipping inference");
                }
                self.responder
                    .respond(info.timestamp, outcome, self.pipeline.categories());
                self.telemetry.record(TelemetryEvent::from_outcome(
                    info.timestamp,
                    info.inferred,
                    outcome,
                ));
            }
            Err(err) => {
                warn!(timestamp = info.timestamp, "Tick failed: {}", err);
                self.telemetry.record(TelemetryEvent::TickFailed {
                    timestamp: info.timestamp,
                    kind: FailureKind::from(err),
                });
            }
        }
        result
    }

    pub fn restart(&mut self) {
        self.pipeline.restart();
        let timestamp = self.pipeline.last_tick().timestamp;
        info!(timestamp, "Recognition restarted");
        self.telemetry.record(TelemetryEvent::Restarted { timestamp });
    }

    /// Async driver: one tick per `tick_ms`, forever or for `max_ticks`.
    /// Returns the error that halted the loop, if any.
    pub async fn run(&mut self, tick_ms: u64, max_ticks: Option<u64>) -> Result<(), TickError> {
        info!("Recognition loop started. Tick: {}ms", tick_ms);

        let mut cadence = interval(Duration::from_millis(tick_ms.max(1)));
        cadence.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut ticks = 0u64;
        while max_ticks.map_or(true, |max| ticks < max) {
            cadence.tick().await;
            ticks += 1;

            if let Err(err) = self.step() {
                let halt = match err.severity() {
                    Severity::ContractViolation => true,
                    Severity::CollaboratorFailure => self.halt_on_collaborator_failure,
                };
                if halt {
                    return Err(err);
                }
            }
        }

        info!(ticks, "Recognition loop finished");
        Ok(())
    }
}
