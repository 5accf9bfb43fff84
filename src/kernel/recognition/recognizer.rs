use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::history::{HistoryError, ScoreHistory, ScoreVector};
use crate::kernel::config::{CategoryId, CategorySet, RecognizerConfig};
use crate::kernel::time::Millis;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecognizerError {
    #[error("timestamp {received} ms is not after the previous call at {previous} ms")]
    StaleTimestamp { previous: Millis, received: Millis },
    #[error("score vector has {actual} categories, expected {expected}")]
    ScoreShapeMismatch { expected: usize, actual: usize },
    #[error(transparent)]
    History(#[from] HistoryError),
}

/// Decision for one inference result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    NoDetection,
    /// Same command again inside the gap; part of the utterance already reported.
    Suppressed { category: CategoryId, score: u8 },
    Detected { category: CategoryId, score: u8 },
}

impl Outcome {
    pub fn is_detection(&self) -> bool {
        matches!(self, Outcome::Detected { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RecognizerPhase {
    /// No detection has fired yet.
    #[default]
    Cold,
    /// At least one detection has fired. Terminal.
    Warm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecognitionState {
    pub phase: RecognizerPhase,
    pub previous_top_category: Option<CategoryId>,
    pub time_of_last_detection: Option<Millis>,
    /// Timestamp of the last accepted `process` call.
    pub last_timestamp: Option<Millis>,
}

/// Averages scores over time and turns them into debounced detections.
#[derive(Debug)]
pub struct CommandRecognizer {
    config: RecognizerConfig,
    category_count: usize,
    reserved_mask: u32,
    history: ScoreHistory,
    state: RecognitionState,
    last_top: Option<(CategoryId, u8)>,
}

impl CommandRecognizer {
    pub fn new(config: RecognizerConfig, categories: &CategorySet) -> Self {
        let history = ScoreHistory::new(
            config.average_window_duration_ms,
            categories.len(),
            config.history_capacity,
        );
        Self {
            category_count: categories.len(),
            reserved_mask: categories.reserved_mask(),
            history,
            state: RecognitionState::default(),
            last_top: None,
            config,
        }
    }

    pub fn config(&self) -> &RecognizerConfig {
        &self.config
    }

    pub fn history(&self) -> &ScoreHistory {
        &self.history
    }

    pub fn state(&self) -> &RecognitionState {
        &self.state
    }

    pub fn phase(&self) -> RecognizerPhase {
        self.state.phase
    }

    /// Top non-reserved category and its averaged score from the last call
    /// that had a trustworthy average.
    pub fn last_top(&self) -> Option<(CategoryId, u8)> {
        self.last_top
    }

    /// Feeds one inference result. A rejected call changes nothing.
    pub fn process(&mut self, scores: &[u8], timestamp: Millis) -> Result<Outcome, RecognizerError> {
        if scores.len() != self.category_count {
            return Err(RecognizerError::ScoreShapeMismatch {
                expected: self.category_count,
                actual: scores.len(),
            });
        }
        if let Some(previous) = self.state.last_timestamp {
            if timestamp <= previous {
                return Err(RecognizerError::StaleTimestamp {
                    previous,
                    received: timestamp,
                });
            }
        }

        self.history.push(timestamp, scores)?;
        self.state.last_timestamp = Some(timestamp);

        if self.history.len() < self.config.minimum_count
            || self.history.duration_covered_ms() < self.config.minimum_required_duration_ms
        {
            return Ok(Outcome::NoDetection);
        }

        let Ok(average) = self.history.average() else {
            return Ok(Outcome::NoDetection);
        };
        let Some((category, score)) = self.best_category(&average) else {
            return Ok(Outcome::NoDetection);
        };
        self.last_top = Some((category, score));

        if score <= self.config.detection_threshold {
            return Ok(Outcome::NoDetection);
        }

        let within_gap = self
            .state
            .time_of_last_detection
            .map_or(false, |last| timestamp - last < self.config.minimum_gap_ms);
        let same_category = self.state.previous_top_category == Some(category);

        if within_gap && same_category {
            return Ok(Outcome::Suppressed { category, score });
        }

        self.state.phase = RecognizerPhase::Warm;
        self.state.previous_top_category = Some(category);
        self.state.time_of_last_detection = Some(timestamp);
        Ok(Outcome::Detected { category, score })
    }

    /// Highest averaged non-reserved category; ties go to the lowest index.
    fn best_category(&self, average: &ScoreVector) -> Option<(CategoryId, u8)> {
        average
            .iter()
            .enumerate()
            .filter(|(i, _)| self.reserved_mask & (1 << i) == 0)
            .fold(None, |best: Option<(usize, u8)>, (i, &score)| match best {
                Some((_, top)) if top >= score => best,
                _ => Some((i, score)),
            })
            .map(|(i, score)| (CategoryId(i), score))
    }

    /// Back to "no previous detection" with an empty history.
    pub fn reset(&mut self) {
        self.history.clear();
        self.state = RecognitionState::default();
        self.last_top = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YES: CategoryId = CategoryId(2);
    const NO: CategoryId = CategoryId(3);

    fn recognizer() -> CommandRecognizer {
        let config = RecognizerConfig {
            minimum_count: 1,
            minimum_required_duration_ms: 0,
            ..RecognizerConfig::default()
        };
        CommandRecognizer::new(config, &CategorySet::default())
    }

    #[test]
    fn reserved_categories_never_fire() {
        let mut r = recognizer();
        assert_eq!(r.process(&[255, 255, 0, 0], 0).unwrap(), Outcome::NoDetection);
        assert_eq!(r.last_top(), Some((YES, 0)));
    }

    #[test]
    fn ties_go_to_lowest_index() {
        let mut r = recognizer();
        let outcome = r.process(&[0, 0, 220, 220], 0).unwrap();
        assert_eq!(outcome, Outcome::Detected { category: YES, score: 220 });
    }

    #[test]
    fn threshold_is_exclusive() {
        let mut r = recognizer();
        assert_eq!(r.process(&[0, 0, 200, 0], 0).unwrap(), Outcome::NoDetection);
        assert_eq!(r.phase(), RecognizerPhase::Cold);
    }

    #[test]
    fn repeat_inside_gap_is_suppressed_then_fires_again() {
        let mut r = recognizer();
        assert!(r.process(&[0, 0, 250, 0], 0).unwrap().is_detection());
        assert_eq!(
            r.process(&[0, 0, 250, 0], 1499).unwrap(),
            Outcome::Suppressed { category: YES, score: 250 }
        );
        assert!(r.process(&[0, 0, 250, 0], 1500).unwrap().is_detection());
        assert_eq!(r.state().time_of_last_detection, Some(1500));
    }

    #[test]
    fn different_category_overrides_gap() {
        let mut config = RecognizerConfig::default();
        config.minimum_count = 1;
        config.minimum_required_duration_ms = 0;
        config.average_window_duration_ms = 10;
        let mut r = CommandRecognizer::new(config, &CategorySet::default());

        assert!(r.process(&[0, 0, 250, 0], 0).unwrap().is_detection());
        assert_eq!(
            r.process(&[0, 0, 0, 250], 100).unwrap(),
            Outcome::Detected { category: NO, score: 250 }
        );
        assert_eq!(r.state().previous_top_category, Some(NO));
    }

    #[test]
    fn phase_turns_warm_on_first_detection() {
        let mut r = recognizer();
        assert_eq!(r.phase(), RecognizerPhase::Cold);
        r.process(&[0, 0, 250, 0], 0).unwrap();
        assert_eq!(r.phase(), RecognizerPhase::Warm);
        r.process(&[0, 0, 0, 0], 5000).unwrap();
        assert_eq!(r.phase(), RecognizerPhase::Warm);
    }

    #[test]
    fn stale_timestamp_mutates_nothing() {
        let mut r = recognizer();
        r.process(&[0, 0, 100, 0], 100).unwrap();
        let before = r.history().average().unwrap();
        let state = *r.state();

        for t in [100, 50] {
            assert_eq!(
                r.process(&[0, 0, 250, 0], t),
                Err(RecognizerError::StaleTimestamp { previous: 100, received: t })
            );
        }
        assert_eq!(r.history().average().unwrap(), before);
        assert_eq!(*r.state(), state);
    }

    #[test]
    fn wrong_score_shape_is_rejected() {
        let mut r = recognizer();
        assert_eq!(
            r.process(&[1, 2, 3], 0),
            Err(RecognizerError::ScoreShapeMismatch { expected: 4, actual: 3 })
        );
        assert!(r.history().is_empty());
        assert_eq!(r.state().last_timestamp, None);
    }

    #[test]
    fn waits_for_minimum_count_and_duration() {
        let config = RecognizerConfig {
            minimum_count: 3,
            minimum_required_duration_ms: 250,
            ..RecognizerConfig::default()
        };
        let mut r = CommandRecognizer::new(config, &CategorySet::default());
        let hot = [0, 0, 250, 0];
        assert_eq!(r.process(&hot, 0).unwrap(), Outcome::NoDetection);
        assert_eq!(r.process(&hot, 300).unwrap(), Outcome::NoDetection);
        assert!(r.process(&hot, 310).unwrap().is_detection());
    }

    #[test]
    fn reset_returns_to_cold() {
        let mut r = recognizer();
        r.process(&[0, 0, 250, 0], 0).unwrap();
        r.reset();
        assert_eq!(r.phase(), RecognizerPhase::Cold);
        assert!(r.history().is_empty());
        assert!(r.process(&[0, 0, 250, 0], 0).unwrap().is_detection());
    }
}
