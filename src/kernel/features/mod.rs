//! Feature front-end: slice storage and window assembly.
//!
//! Turning PCM into a slice is owned by a [`FeatureExtractor`]; this module
//! only decides which slices to request and how to lay them out for the model.

pub mod assembler;
pub mod slice_store;

use thiserror::Error;

use crate::kernel::time::TimeRange;
use slice_store::FeatureSlice;

pub use assembler::{AssemblerError, Advance, FeatureWindowAssembler};
pub use slice_store::{Placement, SliceStore, SliceStoreError, SlotIndex};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeatureError {
    /// Capture does not cover the range yet. Not a fault: retry next tick.
    #[error("audio for {0:?} is not captured yet")]
    AudioUnavailable(TimeRange),
    #[error("feature extraction failed: {0}")]
    Extraction(String),
}

/// Produces one feature slice for a span of captured audio.
pub trait FeatureExtractor {
    /// Writes exactly `out.len()` values for `range`. Must be deterministic for
    /// identical audio.
    fn compute_slice(&mut self, range: TimeRange, out: &mut [i8]) -> Result<(), FeatureError>;

    /// True when the audio behind an already stored slice has changed since it
    /// was computed, so the slot has to be recomputed.
    fn is_stale(&self, _slice: &FeatureSlice<'_>) -> bool {
        false
    }
}

impl<F: FeatureExtractor + ?Sized> FeatureExtractor for &mut F {
    fn compute_slice(&mut self, range: TimeRange, out: &mut [i8]) -> Result<(), FeatureError> {
        (**self).compute_slice(range, out)
    }

    fn is_stale(&self, slice: &FeatureSlice<'_>) -> bool {
        (**self).is_stale(slice)
    }
}

impl<F: FeatureExtractor + ?Sized> FeatureExtractor for Box<F> {
    fn compute_slice(&mut self, range: TimeRange, out: &mut [i8]) -> Result<(), FeatureError> {
        (**self).compute_slice(range, out)
    }

    fn is_stale(&self, slice: &FeatureSlice<'_>) -> bool {
        (**self).is_stale(slice)
    }
}
