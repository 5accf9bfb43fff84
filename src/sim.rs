//! Deterministic stand-ins for the capture front-end and the model, used by
//! the replay binary and the integration tests.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::kernel::config::ConfigError;
use crate::kernel::features::{FeatureError, FeatureExtractor};
use crate::kernel::inference::{InferenceEngine, InferenceError, ModelShape};
use crate::kernel::time::{Clock, TimeRange};

/// Audio is "captured" up to the clock's current time. Slice values are a
/// pure function of the range, so recomputing a slot gives the same data.
#[derive(Debug, Clone)]
pub struct SyntheticFeatures<C> {
    clock: C,
    computed: usize,
}

impl<C: Clock> SyntheticFeatures<C> {
    pub fn new(clock: C) -> Self {
        Self { clock, computed: 0 }
    }

    /// Slices handed out so far.
    pub fn computed(&self) -> usize {
        self.computed
    }
}

impl<C: Clock> FeatureExtractor for SyntheticFeatures<C> {
    fn compute_slice(&mut self, range: TimeRange, out: &mut [i8]) -> Result<(), FeatureError> {
        if range.end > self.clock.now_ms() {
            return Err(FeatureError::AudioUnavailable(range));
        }
        let seed = range.start.wrapping_mul(31).wrapping_add(range.end);
        for (i, v) in out.iter_mut().enumerate() {
            *v = (seed.wrapping_add(i as i64 * 7) % 256 - 128) as i8;
        }
        self.computed += 1;
        Ok(())
    }
}

/// Score frames for [`ScriptedEngine`], one per inference call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreScript {
    pub frames: Vec<Vec<u8>>,
}

impl ScoreScript {
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Quiet frames, a spoken `category` for `burst` frames, then quiet again.
    pub fn burst(categories: usize, category: usize, quiet: usize, burst: usize) -> Self {
        let frame = |hot: bool| -> Vec<u8> {
            (0..categories)
                .map(|i| match (hot, i) {
                    (true, i) if i == category => 240,
                    (false, 0) => 230,
                    _ => 5,
                })
                .collect()
        };
        let frames = (0..quiet)
            .map(|_| frame(false))
            .chain((0..burst).map(|_| frame(true)))
            .chain((0..quiet).map(|_| frame(false)))
            .collect();
        Self { frames }
    }
}

/// Replays a [`ScoreScript`], holding the last frame once the script runs out.
#[derive(Debug, Clone)]
pub struct ScriptedEngine {
    shape: ModelShape,
    arena_bytes: usize,
    script: ScoreScript,
    cursor: usize,
    fail_on_call: Option<usize>,
}

impl ScriptedEngine {
    pub fn new(shape: ModelShape, script: ScoreScript) -> Self {
        Self {
            shape,
            arena_bytes: 0,
            script,
            cursor: 0,
            fail_on_call: None,
        }
    }

    pub fn with_arena_bytes(mut self, bytes: usize) -> Self {
        self.arena_bytes = bytes;
        self
    }

    /// The `n`-th call (zero-based) reports an internal fault.
    pub fn failing_on_call(mut self, n: usize) -> Self {
        self.fail_on_call = Some(n);
        self
    }

    pub fn calls(&self) -> usize {
        self.cursor
    }
}

impl InferenceEngine for ScriptedEngine {
    fn shape(&self) -> ModelShape {
        self.shape
    }

    fn arena_bytes_required(&self) -> usize {
        self.arena_bytes
    }

    fn infer(
        &mut self,
        _arena: &mut [u8],
        features: &[i8],
        scores: &mut [u8],
    ) -> Result<(), InferenceError> {
        let call = self.cursor;
        self.cursor += 1;

        if self.fail_on_call == Some(call) {
            return Err(InferenceError::InferenceFailure(format!(
                "scripted fault on call {call}"
            )));
        }
        if features.len() != self.shape.input_len {
            return Err(InferenceError::InferenceFailure(format!(
                "expected {} features, got {}",
                self.shape.input_len,
                features.len()
            )));
        }

        let frame = self
            .script
            .frames
            .get(call)
            .or_else(|| self.script.frames.last());
        match frame {
            Some(frame) if frame.len() == scores.len() => scores.copy_from_slice(frame),
            Some(frame) => {
                return Err(InferenceError::InferenceFailure(format!(
                    "script frame has {} scores, model has {}",
                    frame.len(),
                    scores.len()
                )))
            }
            None => scores.iter_mut().for_each(|s| *s = 0),
        }
        Ok(())
    }
}
