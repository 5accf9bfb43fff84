use arrayvec::ArrayVec;
use ringbuf::traits::{Consumer, Observer, RingBuffer};
use ringbuf::HeapRb;
use std::fmt;
use thiserror::Error;

use crate::kernel::config::MAX_CATEGORIES;
use crate::kernel::time::Millis;

/// One quantized score (0..=255) per category.
pub type ScoreVector = ArrayVec<u8, MAX_CATEGORIES>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    #[error("score history is empty")]
    EmptyHistory,
    #[error("score vector has {actual} categories, expected {expected}")]
    ScoreShapeMismatch { expected: usize, actual: usize },
    #[error("snapshot at {received} ms is older than the newest at {newest} ms")]
    OutOfOrder { newest: Millis, received: Millis },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreSnapshot {
    pub timestamp: Millis,
    pub scores: ScoreVector,
}

/// Rolling, time-bounded window of score snapshots.
///
/// Every push drops the snapshots that fell out of the averaging window, and
/// the ring never grows past the capacity given at construction.
pub struct ScoreHistory {
    window_ms: Millis,
    category_count: usize,
    snapshots: HeapRb<ScoreSnapshot>,
    newest: Option<Millis>,
}

impl ScoreHistory {
    pub fn new(window_ms: Millis, category_count: usize, capacity: usize) -> Self {
        Self {
            window_ms,
            category_count,
            snapshots: HeapRb::new(capacity.max(1)),
            newest: None,
        }
    }

    pub fn len(&self) -> usize {
        self.snapshots.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScoreSnapshot> + '_ {
        self.snapshots.iter()
    }

    /// Appends a snapshot, then evicts everything older than `timestamp - window`.
    /// When the ring is full the oldest snapshot is overwritten.
    pub fn push(&mut self, timestamp: Millis, scores: &[u8]) -> Result<(), HistoryError> {
        if scores.len() != self.category_count {
            return Err(HistoryError::ScoreShapeMismatch {
                expected: self.category_count,
                actual: scores.len(),
            });
        }
        if let Some(newest) = self.newest {
            if timestamp < newest {
                return Err(HistoryError::OutOfOrder {
                    newest,
                    received: timestamp,
                });
            }
        }
        let scores = ScoreVector::try_from(scores).map_err(|_| HistoryError::ScoreShapeMismatch {
            expected: MAX_CATEGORIES,
            actual: scores.len(),
        })?;

        self.snapshots.push_overwrite(ScoreSnapshot { timestamp, scores });
        self.newest = Some(timestamp);

        let cutoff = timestamp - self.window_ms;
        while self
            .snapshots
            .try_peek()
            .map_or(false, |oldest| oldest.timestamp < cutoff)
        {
            self.snapshots.try_pop();
        }
        Ok(())
    }

    /// Unweighted per-category mean over all retained snapshots, truncated.
    pub fn average(&self) -> Result<ScoreVector, HistoryError> {
        if self.snapshots.is_empty() {
            return Err(HistoryError::EmptyHistory);
        }
        let mut sums: ArrayVec<u32, MAX_CATEGORIES> = (0..self.category_count).map(|_| 0).collect();
        for snapshot in self.snapshots.iter() {
            for (sum, &score) in sums.iter_mut().zip(snapshot.scores.iter()) {
                *sum += u32::from(score);
            }
        }
        let count = self.len() as u32;
        Ok(sums.iter().map(|&sum| (sum / count) as u8).collect())
    }

    /// Distance from the oldest retained snapshot to the newest.
    pub fn duration_covered_ms(&self) -> Millis {
        match (self.snapshots.try_peek(), self.newest) {
            (Some(oldest), Some(newest)) => newest - oldest.timestamp,
            _ => 0,
        }
    }

    pub fn newest_timestamp(&self) -> Option<Millis> {
        self.newest
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
        self.newest = None;
    }
}

impl fmt::Debug for ScoreHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScoreHistory")
            .field("window_ms", &self.window_ms)
            .field("category_count", &self.category_count)
            .field("len", &self.len())
            .field("capacity", &self.snapshots.capacity().get())
            .field("newest", &self.newest)
            .finish()
    }
}
