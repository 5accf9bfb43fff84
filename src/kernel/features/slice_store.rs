use thiserror::Error;

use crate::kernel::time::{Millis, TimeRange};

/// Slot index: `start_time / slice_stride`.
pub type SlotIndex = i64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SliceStoreError {
    #[error("requested {requested} slices but only {available} contiguous slices are held")]
    InsufficientHistory { requested: usize, available: usize },
    #[error("slot {slot} is older than the oldest retainable slot {oldest}")]
    StaleSlot { slot: SlotIndex, oldest: SlotIndex },
    #[error("slice has {actual} values, store expects {expected}")]
    SliceSizeMismatch { expected: usize, actual: usize },
}

/// Borrowed view of one stored slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureSlice<'a> {
    pub slot: SlotIndex,
    pub range: TimeRange,
    pub data: &'a [i8],
}

#[derive(Debug, Clone, Copy)]
struct SlotEntry {
    slot: SlotIndex,
    range: TimeRange,
}

/// Whether `put` filled an empty slot or replaced an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Inserted,
    Replaced,
}

/// Fixed-capacity ring of feature slices keyed by slot index.
///
/// Slot `s` always lives at position `s mod capacity`, so a slot can be held
/// at most once and a repeated slot overwrites in place. All storage is
/// allocated in [`SliceStore::new`].
#[derive(Debug)]
pub struct SliceStore {
    slice_size: usize,
    stride_ms: Millis,
    data: Vec<i8>,
    entries: Vec<Option<SlotEntry>>,
    newest: Option<SlotIndex>,
}

impl SliceStore {
    pub fn new(capacity: usize, slice_size: usize, stride_ms: Millis) -> Self {
        let capacity = capacity.max(1);
        Self {
            slice_size,
            stride_ms: stride_ms.max(1),
            data: vec![0; capacity * slice_size],
            entries: vec![None; capacity],
            newest: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    pub fn slot_of(&self, t: Millis) -> SlotIndex {
        t.div_euclid(self.stride_ms)
    }

    /// Nominal `[start, start + stride)` span of a slot.
    pub fn slot_range(&self, slot: SlotIndex) -> TimeRange {
        TimeRange::new(slot * self.stride_ms, (slot + 1) * self.stride_ms)
    }

    pub fn newest_slot(&self) -> Option<SlotIndex> {
        self.newest
    }

    /// Oldest slot that can still be held, given the newest one written.
    pub fn oldest_retainable(&self) -> Option<SlotIndex> {
        self.newest.map(|n| n - self.capacity() as SlotIndex + 1)
    }

    fn position(&self, slot: SlotIndex) -> usize {
        slot.rem_euclid(self.capacity() as SlotIndex) as usize
    }

    /// Inserts a slice, or overwrites the one already held for its slot.
    pub fn put(&mut self, range: TimeRange, values: &[i8]) -> Result<Placement, SliceStoreError> {
        if values.len() != self.slice_size {
            return Err(SliceStoreError::SliceSizeMismatch {
                expected: self.slice_size,
                actual: values.len(),
            });
        }
        let slot = self.slot_of(range.start);
        if let Some(oldest) = self.oldest_retainable() {
            if slot < oldest {
                return Err(SliceStoreError::StaleSlot { slot, oldest });
            }
        }

        let placement = if self.get(slot).is_some() {
            Placement::Replaced
        } else {
            Placement::Inserted
        };

        let pos = self.position(slot);
        let offset = pos * self.slice_size;
        self.data[offset..offset + self.slice_size].copy_from_slice(values);
        self.entries[pos] = Some(SlotEntry { slot, range });
        self.newest = Some(self.newest.map_or(slot, |n| n.max(slot)));
        Ok(placement)
    }

    pub fn get(&self, slot: SlotIndex) -> Option<FeatureSlice<'_>> {
        let oldest = self.oldest_retainable()?;
        if slot < oldest {
            return None;
        }
        let pos = self.position(slot);
        let entry = self.entries[pos].filter(|e| e.slot == slot)?;
        let offset = pos * self.slice_size;
        Some(FeatureSlice {
            slot,
            range: entry.range,
            data: &self.data[offset..offset + self.slice_size],
        })
    }

    /// Number of slices currently retained.
    pub fn len(&self) -> usize {
        let Some(oldest) = self.oldest_retainable() else {
            return 0;
        };
        self.entries
            .iter()
            .flatten()
            .filter(|e| e.slot >= oldest)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Length of the gap-free run of slots ending at the newest one.
    pub fn contiguous_len(&self) -> usize {
        let Some(newest) = self.newest else {
            return 0;
        };
        (0..self.capacity())
            .take_while(|&back| self.get(newest - back as SlotIndex).is_some())
            .count()
    }

    /// The `n` most recent slots, oldest first.
    pub fn latest(
        &self,
        n: usize,
    ) -> Result<impl Iterator<Item = FeatureSlice<'_>> + '_, SliceStoreError> {
        let available = self.contiguous_len();
        let newest = match self.newest {
            Some(newest) if n <= available => newest,
            _ => {
                return Err(SliceStoreError::InsufficientHistory {
                    requested: n,
                    available,
                })
            }
        };
        let first = newest - n as SlotIndex + 1;
        Ok((first..=newest).filter_map(move |slot| self.get(slot)))
    }

    pub fn clear(&mut self) {
        self.entries.iter_mut().for_each(|e| *e = None);
        self.data.iter_mut().for_each(|v| *v = 0);
        self.newest = None;
    }
}
