use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InferenceError {
    #[error("inference failed: {0}")]
    InferenceFailure(String),
}

/// Flat input length and output category count the model was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelShape {
    pub input_len: usize,
    pub output_len: usize,
}

/// Black-box classifier: a feature window in, one quantized score per category out.
pub trait InferenceEngine {
    fn shape(&self) -> ModelShape;

    /// Scratch bytes the engine needs for tensors and intermediates.
    fn arena_bytes_required(&self) -> usize;

    /// One-time planning of tensors inside the arena.
    fn prepare(&mut self, _arena: &mut [u8]) -> Result<(), InferenceError> {
        Ok(())
    }

    /// Fills `scores` (length `shape().output_len`). On error `scores` must be ignored.
    fn infer(
        &mut self,
        arena: &mut [u8],
        features: &[i8],
        scores: &mut [u8],
    ) -> Result<(), InferenceError>;
}

impl<E: InferenceEngine + ?Sized> InferenceEngine for Box<E> {
    fn shape(&self) -> ModelShape {
        (**self).shape()
    }

    fn arena_bytes_required(&self) -> usize {
        (**self).arena_bytes_required()
    }

    fn prepare(&mut self, arena: &mut [u8]) -> Result<(), InferenceError> {
        (**self).prepare(arena)
    }

    fn infer(
        &mut self,
        arena: &mut [u8],
        features: &[i8],
        scores: &mut [u8],
    ) -> Result<(), InferenceError> {
        (**self).infer(arena, features, scores)
    }
}

/// Fixed scratch buffer with an explicit size and start alignment.
///
/// Allocated once at setup and lent to the engine on every call.
#[derive(Debug)]
pub struct TensorArena {
    buffer: Vec<u8>,
    offset: usize,
    size: usize,
    alignment: usize,
}

impl TensorArena {
    /// `alignment` must be a non-zero power of two.
    pub fn new(size: usize, alignment: usize) -> Self {
        let alignment = alignment.max(1);
        let buffer = vec![0u8; size + alignment - 1];
        let offset = buffer.as_ptr().align_offset(alignment).min(alignment - 1);
        Self {
            buffer,
            offset,
            size,
            alignment,
        }
    }

    pub fn alignment(&self) -> usize {
        self.alignment
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buffer[self.offset..self.offset + self.size]
    }
}
