use tracing::{debug, info};

use crate::kernel::config::CategorySet;
use crate::kernel::recognition::Outcome;
use crate::kernel::time::Millis;

/// Host-side reaction to each tick's outcome (LED, serial line, log, ...).
pub trait CommandResponder {
    fn respond(&mut self, timestamp: Millis, outcome: &Outcome, categories: &CategorySet);
}

impl<R: CommandResponder + ?Sized> CommandResponder for &mut R {
    fn respond(&mut self, timestamp: Millis, outcome: &Outcome, categories: &CategorySet) {
        (**self).respond(timestamp, outcome, categories)
    }
}

/// Reports outcomes through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogResponder;

impl CommandResponder for LogResponder {
    fn respond(&mut self, timestamp: Millis, outcome: &Outcome, categories: &CategorySet) {
        match *outcome {
            Outcome::Detected { category, score } => {
                let label = categories.label(category).unwrap_or("?");
                info!(timestamp, score, "Heard {}", label);
            }
            Outcome::Suppressed { category, score } => {
                let label = categories.label(category).unwrap_or("?");
                debug!(timestamp, score, "Suppressed repeat of {}", label);
            }
            Outcome::NoDetection => {}
        }
    }
}

/// Keeps every detection as `(timestamp, label, score)`.
#[derive(Debug, Default, Clone)]
pub struct RecordingResponder {
    pub detections: Vec<(Millis, String, u8)>,
    pub suppressed: usize,
}

impl CommandResponder for RecordingResponder {
    fn respond(&mut self, timestamp: Millis, outcome: &Outcome, categories: &CategorySet) {
        match *outcome {
            Outcome::Detected { category, score } => {
                let label = categories.label(category).unwrap_or("?").to_string();
                self.detections.push((timestamp, label, score));
            }
            Outcome::Suppressed { .. } => self.suppressed += 1,
            Outcome::NoDetection => {}
        }
    }
}
