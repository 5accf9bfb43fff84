use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

/// Milliseconds since an arbitrary, process-local epoch.
pub type Millis = i64;

/// Half-open span of audio time: `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Millis,
    pub end: Millis,
}

impl TimeRange {
    pub fn new(start: Millis, end: Millis) -> Self {
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Millis {
        self.end - self.start
    }

    pub fn contains(&self, t: Millis) -> bool {
        self.start <= t && t < self.end
    }
}

/// Monotonic, non-decreasing millisecond source.
pub trait Clock {
    fn now_ms(&self) -> Millis;
}

/// Wall-clock source anchored at construction.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> Millis {
        self.origin.elapsed().as_millis() as Millis
    }
}

/// Hand-driven clock. Clones share the same underlying time, so a test can
/// keep one handle while the pipeline owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<Millis>>,
}

impl ManualClock {
    pub fn new(start: Millis) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
        }
    }

    pub fn set(&self, t: Millis) {
        // Never run backwards.
        if t > self.now.get() {
            self.now.set(t);
        }
    }

    pub fn advance(&self, delta_ms: Millis) {
        self.set(self.now.get() + delta_ms.max(0));
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Millis {
        self.now.get()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_ms(&self) -> Millis {
        (**self).now_ms()
    }
}

impl<C: Clock + ?Sized> Clock for Box<C> {
    fn now_ms(&self) -> Millis {
        (**self).now_ms()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_handles_share_time() {
        let clock = ManualClock::new(0);
        let handle = clock.clone();
        handle.advance(30);
        assert_eq!(clock.now_ms(), 30);
    }

    #[test]
    fn manual_clock_never_runs_backwards() {
        let clock = ManualClock::new(100);
        clock.set(40);
        assert_eq!(clock.now_ms(), 100);
        clock.advance(-5);
        assert_eq!(clock.now_ms(), 100);
    }

    #[test]
    fn time_range_is_half_open() {
        let range = TimeRange::new(20, 40);
        assert!(range.contains(20));
        assert!(!range.contains(40));
        assert_eq!(range.duration_ms(), 20);
    }
}
