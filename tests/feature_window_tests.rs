use speech_commands::kernel::config::ModelSettings;
use speech_commands::kernel::features::{
    FeatureError, FeatureExtractor, FeatureWindowAssembler, Placement, SliceStore,
};
use speech_commands::kernel::time::TimeRange;

/// Counts requests and stamps every value with the slot number.
#[derive(Default)]
struct CountingExtractor {
    requested: Vec<TimeRange>,
}

impl FeatureExtractor for CountingExtractor {
    fn compute_slice(&mut self, range: TimeRange, out: &mut [i8]) -> Result<(), FeatureError> {
        self.requested.push(range);
        out.fill((range.start / 20) as i8);
        Ok(())
    }
}

#[test]
fn test_overlapping_slices_share_one_slot() {
    let mut store = SliceStore::new(4, 3, 20);

    assert_eq!(store.put(TimeRange::new(40, 55), &[1, 1, 1]).unwrap(), Placement::Inserted);
    // Starts later but still inside slot 2: replaces, does not add.
    assert_eq!(store.put(TimeRange::new(45, 60), &[9, 9, 9]).unwrap(), Placement::Replaced);

    assert_eq!(store.len(), 1);
    let held = store.get(2).expect("slot 2 held");
    assert_eq!(held.range, TimeRange::new(45, 60));
    assert_eq!(held.data, &[9, 9, 9]);
}

#[test]
fn test_partial_trailing_slice_on_first_advance() {
    // Two slots cover the whole window here.
    let settings = ModelSettings {
        slice_size: 4,
        slice_stride_ms: 20,
        slice_duration_ms: 20,
        window_slice_count: 2,
    };
    let mut assembler = FeatureWindowAssembler::new(settings);
    let mut extractor = CountingExtractor::default();

    let out = assembler.advance(&mut extractor, 0, 30).unwrap();

    assert_eq!(out.slices_added, 2);
    assert_eq!(out.features.len(), 8);
    assert_eq!(out.features, &[0, 0, 0, 0, 1, 1, 1, 1]);
    assert_eq!(
        extractor.requested,
        vec![TimeRange::new(0, 20), TimeRange::new(20, 30)]
    );
}

#[test]
fn test_overlapping_partial_slices_are_all_completed() {
    // Slices are longer than the stride, so a tick can split two of them.
    let settings = ModelSettings {
        slice_size: 1,
        slice_stride_ms: 20,
        slice_duration_ms: 30,
        window_slice_count: 3,
    };
    let mut assembler = FeatureWindowAssembler::new(settings);
    let mut extractor = CountingExtractor::default();

    let out = assembler.advance(&mut extractor, 0, 45).unwrap();
    assert_eq!(out.slices_added, 3);
    assert_eq!(assembler.store().get(1).unwrap().range, TimeRange::new(20, 45));
    assert_eq!(assembler.store().get(2).unwrap().range, TimeRange::new(40, 45));
    extractor.requested.clear();

    let out = assembler.advance(&mut extractor, 45, 65).unwrap();
    assert_eq!(out.slices_added, 3);
    assert_eq!(out.features, &[1, 2, 3]);
    assert_eq!(
        extractor.requested,
        vec![
            TimeRange::new(20, 50),
            TimeRange::new(40, 65),
            TimeRange::new(60, 65)
        ]
    );
    assert_eq!(assembler.store().get(1).unwrap().range, TimeRange::new(20, 50));
}

#[test]
fn test_window_slides_with_time() {
    let settings = ModelSettings {
        slice_size: 1,
        slice_stride_ms: 20,
        slice_duration_ms: 20,
        window_slice_count: 3,
    };
    let mut assembler = FeatureWindowAssembler::new(settings);
    let mut extractor = CountingExtractor::default();

    let mut previous = 0;
    for current in (20..=200).step_by(20) {
        let out = assembler.advance(&mut extractor, previous, current).unwrap();
        if current >= 60 {
            let newest = (current / 20 - 1) as i8;
            assert_eq!(out.features, &[newest - 2, newest - 1, newest]);
            assert_eq!(out.slices_added, 1);
        } else {
            assert_eq!(out.slices_added, 0);
        }
        previous = current;
    }
    // Every slot was computed exactly once.
    assert_eq!(extractor.requested.len(), 10);
    assert_eq!(assembler.store().len(), 3);
}

#[test]
fn test_gap_longer_than_window_skips_old_slots() {
    let settings = ModelSettings {
        slice_size: 1,
        slice_stride_ms: 20,
        slice_duration_ms: 20,
        window_slice_count: 4,
    };
    let mut assembler = FeatureWindowAssembler::new(settings);
    let mut extractor = CountingExtractor::default();

    assembler.advance(&mut extractor, 0, 80).unwrap();
    extractor.requested.clear();

    let out = assembler.advance(&mut extractor, 80, 10_000).unwrap();
    assert_eq!(out.slices_added, 4);
    assert_eq!(extractor.requested.first(), Some(&TimeRange::new(9_920, 9_940)));
    assert_eq!(extractor.requested.len(), 4);
}
