use thiserror::Error;
use tracing::info;

use super::config::{CategorySet, ConfigError, PipelineConfig};
use super::features::{AssemblerError, FeatureExtractor, FeatureWindowAssembler};
use super::inference::{InferenceEngine, InferenceError, ModelShape, TensorArena};
use super::recognition::{CommandRecognizer, Outcome, RecognizerError, ScoreVector};
use super::time::{Clock, Millis};

/// Reasons `setup` refuses to build a pipeline.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("model shape {actual:?} does not match configured {expected:?}")]
    IncompatibleModelShape { expected: ModelShape, actual: ModelShape },
    #[error("engine needs {required} arena bytes, only {available} configured")]
    AllocationTooLarge { required: usize, available: usize },
    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
    #[error("engine failed to prepare its arena: {0}")]
    Engine(InferenceError),
}

pub type InitializationFailure = SetupError;

#[derive(Debug, Error)]
pub enum TickError {
    #[error(transparent)]
    Features(#[from] AssemblerError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error(transparent)]
    Recognition(#[from] RecognizerError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Caller misuse: time ran backwards or a malformed score vector.
    ContractViolation,
    /// A collaborator failed. Nothing was retried.
    CollaboratorFailure,
}

impl TickError {
    pub fn severity(&self) -> Severity {
        match self {
            TickError::Features(AssemblerError::Extraction(_)) | TickError::Inference(_) => {
                Severity::CollaboratorFailure
            }
            TickError::Features(_) | TickError::Recognition(_) => Severity::ContractViolation,
        }
    }
}

/// What the last tick did, for hosts that want more than the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickInfo {
    pub timestamp: Millis,
    pub slices_added: usize,
    pub inferred: bool,
}

/// One owned recognition loop: feature window, model, and decision state.
///
/// Collaborators are owned values; there is no global state. Everything the
/// per-tick path touches is allocated in [`Pipeline::setup`].
pub struct Pipeline<C, F, E> {
    config: PipelineConfig,
    clock: C,
    extractor: F,
    engine: E,
    arena: TensorArena,
    assembler: FeatureWindowAssembler,
    recognizer: CommandRecognizer,
    scores: ScoreVector,
    previous_time: Millis,
    last_tick: TickInfo,
}

impl<C, F, E> Pipeline<C, F, E>
where
    C: Clock,
    F: FeatureExtractor,
    E: InferenceEngine,
{
    pub fn setup(
        config: PipelineConfig,
        clock: C,
        extractor: F,
        mut engine: E,
    ) -> Result<Self, SetupError> {
        config.validate()?;

        let expected = ModelShape {
            input_len: config.model.feature_element_count(),
            output_len: config.categories.len(),
        };
        let actual = engine.shape();
        if actual != expected {
            return Err(SetupError::IncompatibleModelShape { expected, actual });
        }

        let required = engine.arena_bytes_required();
        if required > config.arena.size_bytes {
            return Err(SetupError::AllocationTooLarge {
                required,
                available: config.arena.size_bytes,
            });
        }
        let mut arena = TensorArena::new(config.arena.size_bytes, config.arena.alignment);
        engine
            .prepare(arena.as_mut_slice())
            .map_err(SetupError::Engine)?;

        let assembler = FeatureWindowAssembler::new(config.model.clone());
        let recognizer = CommandRecognizer::new(config.recognizer.clone(), &config.categories);
        let scores = (0..config.categories.len()).map(|_| 0).collect();
        let previous_time = clock.now_ms();

        info!(
            input_len = expected.input_len,
            categories = expected.output_len,
            arena_bytes = config.arena.size_bytes,
            "Initialization complete"
        );

        Ok(Self {
            config,
            clock,
            extractor,
            engine,
            arena,
            assembler,
            recognizer,
            scores,
            previous_time,
            last_tick: TickInfo {
                timestamp: previous_time,
                ..TickInfo::default()
            },
        })
    }

    /// One pass: advance the feature window, run the model if anything new
    /// arrived, and decide.
    ///
    /// Scores are stamped with the end of the newest stored slice rather than
    /// the clock, so a tick that only catches up on audio that lagged behind
    /// the clock still moves forward in recognizer time.
    pub fn tick(&mut self) -> Result<Outcome, TickError> {
        let now = self.clock.now_ms();
        let slices_added = self
            .assembler
            .advance(&mut self.extractor, self.previous_time, now)?
            .slices_added;

        self.last_tick = TickInfo {
            timestamp: now,
            slices_added,
            inferred: false,
        };
        let audio_time = self.settle_previous_time();

        let Some(audio_time) = audio_time.filter(|_| slices_added > 0) else {
            return Ok(Outcome::NoDetection);
        };
        if let Some(last) = self.recognizer.state().last_timestamp {
            // Only older slots were refreshed; nothing newer to score.
            if audio_time <= last {
                return Ok(Outcome::NoDetection);
            }
        }

        self.engine.infer(
            self.arena.as_mut_slice(),
            self.assembler.window(),
            &mut self.scores,
        )?;
        self.last_tick.inferred = true;

        Ok(self.recognizer.process(&self.scores, audio_time)?)
    }

    /// Moves `previous_time` up to the end of the newest stored slice, so audio
    /// that was unavailable this tick is requested again next tick. Returns
    /// that end time.
    fn settle_previous_time(&mut self) -> Option<Millis> {
        let store = self.assembler.store();
        let newest = store.newest_slot().and_then(|slot| store.get(slot))?;
        self.previous_time = self.previous_time.max(newest.range.end);
        Some(newest.range.end)
    }

    /// Discards the feature window and recognition state, listening afresh
    /// from the current time.
    pub fn restart(&mut self) {
        self.assembler.reset();
        self.recognizer.reset();
        self.previous_time = self.clock.now_ms();
        self.last_tick = TickInfo {
            timestamp: self.previous_time,
            ..TickInfo::default()
        };
    }

    pub fn categories(&self) -> &CategorySet {
        &self.config.categories
    }

    pub fn recognizer(&self) -> &CommandRecognizer {
        &self.recognizer
    }

    pub fn assembler(&self) -> &FeatureWindowAssembler {
        &self.assembler
    }

    pub fn previous_time(&self) -> Millis {
        self.previous_time
    }

    pub fn last_tick(&self) -> TickInfo {
        self.last_tick
    }
}
