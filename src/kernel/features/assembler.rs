use thiserror::Error;

use super::slice_store::{SliceStore, SliceStoreError, SlotIndex};
use super::{FeatureError, FeatureExtractor};
use crate::kernel::config::ModelSettings;
use crate::kernel::time::{Millis, TimeRange};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblerError {
    #[error("time ran backwards: previous {previous} ms, current {current} ms")]
    InvalidTimeRange { previous: Millis, current: Millis },
    #[error("feature extraction failed: {0}")]
    Extraction(String),
    #[error(transparent)]
    Store(#[from] SliceStoreError),
}

/// Result of one [`FeatureWindowAssembler::advance`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Advance<'a> {
    /// Model input, `window_slice_count * slice_size` values. All zero while
    /// the window is still incomplete.
    pub features: &'a [i8],
    /// Zero means there is nothing new worth running inference on.
    pub slices_added: usize,
}

/// Keeps the slice ring current and lays out the model input.
///
/// Slices already held are reused; only missing, partial or stale slots are
/// handed to the extractor.
#[derive(Debug)]
pub struct FeatureWindowAssembler {
    settings: ModelSettings,
    store: SliceStore,
    scratch: Vec<i8>,
    features: Vec<i8>,
}

impl FeatureWindowAssembler {
    pub fn new(settings: ModelSettings) -> Self {
        let store = SliceStore::new(
            settings.window_slice_count,
            settings.slice_size,
            settings.slice_stride_ms,
        );
        Self {
            scratch: vec![0; settings.slice_size],
            features: vec![0; settings.feature_element_count()],
            store,
            settings,
        }
    }

    pub fn store(&self) -> &SliceStore {
        &self.store
    }

    /// The window laid out by the last `advance`.
    pub fn window(&self) -> &[i8] {
        &self.features
    }

    /// Brings the store up to `current` and returns the newest window.
    pub fn advance<F>(
        &mut self,
        extractor: &mut F,
        previous: Millis,
        current: Millis,
    ) -> Result<Advance<'_>, AssemblerError>
    where
        F: FeatureExtractor + ?Sized,
    {
        if current < previous {
            return Err(AssemblerError::InvalidTimeRange { previous, current });
        }

        let mut added = 0;
        if current > previous {
            let (first, last) = self.pending_slots(previous, current);
            for slot in first..=last {
                if !self.needs_compute(extractor, slot, current) {
                    continue;
                }
                let range = self.analysis_range(slot, current);
                match extractor.compute_slice(range, &mut self.scratch) {
                    Ok(()) => {}
                    // Later slots depend on even newer audio; stop here.
                    Err(FeatureError::AudioUnavailable(_)) => break,
                    Err(FeatureError::Extraction(reason)) => {
                        return Err(AssemblerError::Extraction(reason))
                    }
                }
                self.store.put(range, &self.scratch)?;
                added += 1;
            }
        }

        let slices_added = if self.assemble() { added } else { 0 };
        Ok(Advance {
            features: &self.features,
            slices_added,
        })
    }

    /// Slots touched by `(previous, current]`, limited to one window's worth.
    fn pending_slots(&self, previous: Millis, current: Millis) -> (SlotIndex, SlotIndex) {
        let last = self.store.slot_of(current - 1);
        let mut floor = last - self.store.capacity() as SlotIndex + 1;
        if let Some(oldest) = self.store.oldest_retainable() {
            floor = floor.max(oldest);
        }

        // Overlapping slices can leave several trailing slots partial.
        let mut first = self.store.slot_of(previous);
        while first > floor && self.is_partial(first - 1, current) {
            first -= 1;
        }
        (first.max(floor), last)
    }

    fn needs_compute<F>(&self, extractor: &F, slot: SlotIndex, current: Millis) -> bool
    where
        F: FeatureExtractor + ?Sized,
    {
        match self.store.get(slot) {
            None => true,
            Some(held) => self.is_partial(slot, current) || extractor.is_stale(&held),
        }
    }

    /// Held slice covers less audio than is available now.
    fn is_partial(&self, slot: SlotIndex, current: Millis) -> bool {
        self.store
            .get(slot)
            .map(|held| held.range.end < self.analysis_range(slot, current).end)
            .unwrap_or(false)
    }

    /// `[slot start, slot start + slice duration)`, clipped to captured time.
    fn analysis_range(&self, slot: SlotIndex, current: Millis) -> TimeRange {
        let start = slot * self.settings.slice_stride_ms;
        let end = (start + self.settings.slice_duration_ms).min(current);
        TimeRange::new(start, end)
    }

    /// Copies the newest window into the feature buffer. Zero-fills and
    /// returns false when the store cannot supply a full window yet.
    fn assemble(&mut self) -> bool {
        let size = self.settings.slice_size;
        match self.store.latest(self.settings.window_slice_count) {
            Ok(slices) => {
                for (chunk, slice) in self.features.chunks_exact_mut(size).zip(slices) {
                    chunk.copy_from_slice(slice.data);
                }
                true
            }
            Err(_) => {
                self.features.iter_mut().for_each(|v| *v = 0);
                false
            }
        }
    }

    pub fn reset(&mut self) {
        self.store.clear();
        self.features.iter_mut().for_each(|v| *v = 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::features::slice_store::FeatureSlice;

    /// Fills each slice with its start time / stride and records every request.
    #[derive(Default)]
    struct Recording {
        requests: Vec<TimeRange>,
        captured_until: Option<Millis>,
        stale_slot: Option<SlotIndex>,
    }

    impl FeatureExtractor for Recording {
        fn compute_slice(&mut self, range: TimeRange, out: &mut [i8]) -> Result<(), FeatureError> {
            if let Some(limit) = self.captured_until {
                if range.end > limit {
                    return Err(FeatureError::AudioUnavailable(range));
                }
            }
            self.requests.push(range);
            out.iter_mut().for_each(|v| *v = (range.start / 20) as i8);
            Ok(())
        }

        fn is_stale(&self, slice: &FeatureSlice<'_>) -> bool {
            self.stale_slot == Some(slice.slot)
        }
    }

    fn settings(window: usize) -> ModelSettings {
        ModelSettings {
            slice_size: 2,
            slice_stride_ms: 20,
            slice_duration_ms: 20,
            window_slice_count: window,
        }
    }

    #[test]
    fn requests_exactly_the_touched_slots() {
        let mut assembler = FeatureWindowAssembler::new(settings(2));
        let mut extractor = Recording::default();

        let out = assembler.advance(&mut extractor, 0, 30).unwrap();
        assert_eq!(out.slices_added, 2);
        assert_eq!(out.features, &[0, 0, 1, 1]);
        assert_eq!(
            extractor.requests,
            vec![TimeRange::new(0, 20), TimeRange::new(20, 30)]
        );
    }

    #[test]
    fn equal_times_are_a_no_op() {
        let mut assembler = FeatureWindowAssembler::new(settings(2));
        let mut extractor = Recording::default();
        assembler.advance(&mut extractor, 0, 40).unwrap();
        extractor.requests.clear();

        let out = assembler.advance(&mut extractor, 40, 40).unwrap();
        assert_eq!(out.slices_added, 0);
        assert!(extractor.requests.is_empty());
    }

    #[test]
    fn backwards_time_is_rejected() {
        let mut assembler = FeatureWindowAssembler::new(settings(2));
        let mut extractor = Recording::default();
        let err = assembler.advance(&mut extractor, 50, 10).unwrap_err();
        assert_eq!(err, AssemblerError::InvalidTimeRange { previous: 50, current: 10 });
        assert!(assembler.store().is_empty());
    }

    #[test]
    fn held_slices_are_reused() {
        let mut assembler = FeatureWindowAssembler::new(settings(3));
        let mut extractor = Recording::default();
        assembler.advance(&mut extractor, 0, 60).unwrap();
        extractor.requests.clear();

        let out = assembler.advance(&mut extractor, 60, 80).unwrap();
        assert_eq!(out.slices_added, 1);
        assert_eq!(extractor.requests, vec![TimeRange::new(60, 80)]);
        assert_eq!(out.features, &[1, 1, 2, 2, 3, 3]);
    }

    #[test]
    fn partial_trailing_slice_is_recomputed() {
        let mut assembler = FeatureWindowAssembler::new(settings(2));
        let mut extractor = Recording::default();
        assembler.advance(&mut extractor, 0, 30).unwrap();
        extractor.requests.clear();

        let out = assembler.advance(&mut extractor, 30, 40).unwrap();
        assert_eq!(out.slices_added, 1);
        assert_eq!(extractor.requests, vec![TimeRange::new(20, 40)]);
        assert_eq!(assembler.store().get(1).unwrap().range, TimeRange::new(20, 40));
    }

    #[test]
    fn long_gap_only_computes_the_last_window() {
        let mut assembler = FeatureWindowAssembler::new(settings(3));
        let mut extractor = Recording::default();

        let out = assembler.advance(&mut extractor, 0, 1000).unwrap();
        assert_eq!(out.slices_added, 3);
        assert_eq!(
            extractor.requests,
            vec![
                TimeRange::new(940, 960),
                TimeRange::new(960, 980),
                TimeRange::new(980, 1000)
            ]
        );
    }

    #[test]
    fn startup_returns_zeroed_window() {
        let mut assembler = FeatureWindowAssembler::new(settings(4));
        let mut extractor = Recording::default();

        let out = assembler.advance(&mut extractor, 0, 40).unwrap();
        assert_eq!(out.slices_added, 0);
        assert!(out.features.iter().all(|&v| v == 0));
        assert_eq!(assembler.store().len(), 2);
    }

    #[test]
    fn unavailable_audio_is_not_an_error() {
        let mut assembler = FeatureWindowAssembler::new(settings(2));
        let mut extractor = Recording {
            captured_until: Some(0),
            ..Default::default()
        };

        let out = assembler.advance(&mut extractor, 0, 40).unwrap();
        assert_eq!(out.slices_added, 0);
        assert!(assembler.store().is_empty());
    }

    #[test]
    fn capture_gap_keeps_slots_already_computed() {
        let mut assembler = FeatureWindowAssembler::new(settings(3));
        let mut extractor = Recording {
            captured_until: Some(50),
            ..Default::default()
        };

        let out = assembler.advance(&mut extractor, 0, 60).unwrap();
        assert_eq!(out.slices_added, 0);
        assert_eq!(assembler.store().len(), 2);
        assert_eq!(assembler.store().newest_slot(), Some(1));

        extractor.captured_until = Some(80);
        let out = assembler.advance(&mut extractor, 40, 80).unwrap();
        assert_eq!(out.slices_added, 2);
        assert_eq!(out.features, &[1, 1, 2, 2, 3, 3]);
        assert_eq!(extractor.requests.len(), 4);
    }

    #[test]
    fn stale_slot_is_recomputed() {
        let mut assembler = FeatureWindowAssembler::new(settings(2));
        let mut extractor = Recording::default();
        assembler.advance(&mut extractor, 0, 40).unwrap();
        extractor.requests.clear();
        extractor.stale_slot = Some(1);

        let out = assembler.advance(&mut extractor, 39, 60).unwrap();
        assert_eq!(out.slices_added, 2);
        assert_eq!(
            extractor.requests,
            vec![TimeRange::new(20, 40), TimeRange::new(40, 60)]
        );
    }

    #[test]
    fn extraction_fault_propagates() {
        struct Broken;
        impl FeatureExtractor for Broken {
            fn compute_slice(&mut self, _: TimeRange, _: &mut [i8]) -> Result<(), FeatureError> {
                Err(FeatureError::Extraction("dsp fault".into()))
            }
        }
        let mut assembler = FeatureWindowAssembler::new(settings(2));
        let err = assembler.advance(&mut Broken, 0, 20).unwrap_err();
        assert_eq!(err, AssemblerError::Extraction("dsp fault".into()));
    }
}
