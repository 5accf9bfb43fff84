use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use super::event::{FailureKind, TelemetryEvent};
use crate::kernel::config::CategoryId;
use crate::kernel::time::Millis;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub tick_stats: TickStats,
    pub detection_stats: DetectionStats,
    pub failure_stats: FailureStats,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickStats {
    pub total: u64,
    pub skipped: u64,
    pub inferred: u64,
    pub restarts: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionStats {
    pub detected: u64,
    pub suppressed: u64,
    pub per_category: BTreeMap<CategoryId, u64>,
    pub avg_detection_score: f64,
    pub avg_gap_ms: f64,
    /// Detections per inferred tick.
    pub detection_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailureStats {
    pub contract_violations: u64,
    pub collaborator_failures: u64,
}

pub fn compute_snapshot(events: &VecDeque<TelemetryEvent>) -> TelemetrySnapshot {
    let mut snap = TelemetrySnapshot::default();

    let mut score_total = 0u64;
    let mut gap_total: Millis = 0;
    let mut gap_count = 0u64;
    let mut last_detection: Option<Millis> = None;

    for event in events {
        match event {
            TelemetryEvent::TickSkipped { .. } => {
                snap.tick_stats.total += 1;
                snap.tick_stats.skipped += 1;
            }
            TelemetryEvent::NoDetection { .. } => {
                snap.tick_stats.total += 1;
                snap.tick_stats.inferred += 1;
            }
            TelemetryEvent::Suppressed { .. } => {
                snap.tick_stats.total += 1;
                snap.tick_stats.inferred += 1;
                snap.detection_stats.suppressed += 1;
            }
            TelemetryEvent::Detected {
                timestamp,
                category,
                score,
            } => {
                snap.tick_stats.total += 1;
                snap.tick_stats.inferred += 1;
                snap.detection_stats.detected += 1;
                *snap.detection_stats.per_category.entry(*category).or_insert(0) += 1;
                score_total += u64::from(*score);
                if let Some(prev) = last_detection {
                    gap_total += timestamp - prev;
                    gap_count += 1;
                }
                last_detection = Some(*timestamp);
            }
            TelemetryEvent::TickFailed { kind, .. } => {
                snap.tick_stats.total += 1;
                match kind {
                    FailureKind::ContractViolation => snap.failure_stats.contract_violations += 1,
                    FailureKind::Collaborator => snap.failure_stats.collaborator_failures += 1,
                }
            }
            TelemetryEvent::Restarted { .. } => {
                snap.tick_stats.restarts += 1;
                // Gaps never span a restart.
                last_detection = None;
            }
        }
    }

    // Compute Averages
    let detections = snap.detection_stats.detected;
    if detections > 0 {
        snap.detection_stats.avg_detection_score = score_total as f64 / detections as f64;
    }
    if gap_count > 0 {
        snap.detection_stats.avg_gap_ms = gap_total as f64 / gap_count as f64;
    }
    if snap.tick_stats.inferred > 0 {
        snap.detection_stats.detection_rate = detections as f64 / snap.tick_stats.inferred as f64;
    }

    snap
}
