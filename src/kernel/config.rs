use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use thiserror::Error;

use super::time::Millis;

/// Upper bound on output categories. Score vectors live on the stack.
pub const MAX_CATEGORIES: usize = 16;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Index into the configured category list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CategoryId(pub usize);

/// Shape of the feature front-end and model input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Values per feature slice.
    pub slice_size: usize,
    /// Distance between consecutive slice starts.
    pub slice_stride_ms: Millis,
    /// Audio span analysed by one slice. May exceed the stride.
    pub slice_duration_ms: Millis,
    /// Slices concatenated into one model input.
    pub window_slice_count: usize,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            slice_size: 40,
            slice_stride_ms: 20,
            slice_duration_ms: 30,
            window_slice_count: 49,
        }
    }
}

impl ModelSettings {
    pub fn feature_element_count(&self) -> usize {
        self.slice_size * self.window_slice_count
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    pub average_window_duration_ms: Millis,
    /// Averaging is not trusted until the retained history spans this long.
    pub minimum_required_duration_ms: Millis,
    /// ...and holds at least this many snapshots.
    pub minimum_count: usize,
    /// Averaged score must be strictly greater than this.
    pub detection_threshold: u8,
    pub minimum_gap_ms: Millis,
    /// Fixed snapshot capacity of the score history.
    pub history_capacity: usize,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            average_window_duration_ms: 1000,
            minimum_required_duration_ms: 250,
            minimum_count: 3,
            detection_threshold: 200,
            minimum_gap_ms: 1500,
            history_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategorySet {
    pub labels: Vec<String>,
    /// Labels that never trigger a detection (silence, unknown).
    pub reserved: Vec<String>,
}

impl Default for CategorySet {
    fn default() -> Self {
        Self {
            labels: ["silence", "unknown", "yes", "no"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            reserved: vec!["silence".to_string(), "unknown".to_string()],
        }
    }
}

impl CategorySet {
    pub fn new<L, R>(labels: L, reserved: R) -> Self
    where
        L: IntoIterator,
        L::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
            reserved: reserved.into_iter().map(Into::into).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn label(&self, id: CategoryId) -> Option<&str> {
        self.labels.get(id.0).map(String::as_str)
    }

    pub fn id_of(&self, label: &str) -> Option<CategoryId> {
        self.labels.iter().position(|l| l == label).map(CategoryId)
    }

    /// Bit `i` set when category `i` is reserved.
    pub fn reserved_mask(&self) -> u32 {
        self.labels
            .iter()
            .enumerate()
            .filter(|(_, label)| self.reserved.iter().any(|r| r == *label))
            .fold(0u32, |mask, (i, _)| mask | (1 << i))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    pub size_bytes: usize,
    pub alignment: usize,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            size_bytes: 10 * 1024,
            alignment: 16,
        }
    }
}

/// Everything fixed at construction. Nothing here is mutated at runtime.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub model: ModelSettings,
    pub recognizer: RecognizerConfig,
    pub categories: CategorySet,
    pub arena: ArenaConfig,
}

impl PipelineConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let m = &self.model;
        let r = &self.recognizer;
        let c = &self.categories;

        if m.slice_size == 0 || m.window_slice_count == 0 {
            return Err(invalid("slice_size and window_slice_count must be non-zero"));
        }
        if m.slice_stride_ms <= 0 || m.slice_duration_ms <= 0 {
            return Err(invalid("slice stride and duration must be positive"));
        }
        if c.is_empty() || c.len() > MAX_CATEGORIES {
            return Err(invalid(format!(
                "category count must be within 1..={MAX_CATEGORIES}, got {}",
                c.len()
            )));
        }
        if let Some(unknown) = c.reserved.iter().find(|r| c.id_of(r).is_none()) {
            return Err(invalid(format!("reserved label '{unknown}' is not a category")));
        }
        if c.reserved_mask().count_ones() as usize == c.len() {
            return Err(invalid("at least one category must be non-reserved"));
        }
        if r.detection_threshold == 0 {
            return Err(invalid("detection_threshold must be non-zero"));
        }
        if r.average_window_duration_ms <= 0 || r.minimum_gap_ms < 0 {
            return Err(invalid("averaging window must be positive and gap non-negative"));
        }
        if r.minimum_required_duration_ms > r.average_window_duration_ms {
            return Err(invalid(
                "minimum_required_duration_ms cannot exceed the averaging window",
            ));
        }
        if r.history_capacity == 0 || r.minimum_count > r.history_capacity {
            return Err(invalid("history_capacity must hold at least minimum_count snapshots"));
        }
        if self.arena.alignment == 0 || !self.arena.alignment.is_power_of_two() {
            return Err(invalid("arena alignment must be a power of two"));
        }
        Ok(())
    }

    /// Overrides from `KWS_*` environment variables. Unparseable values are ignored.
    pub fn apply_env(&mut self) {
        if let Some(v) = env_parse::<u8>("KWS_THRESHOLD") {
            self.recognizer.detection_threshold = v;
        }
        if let Some(v) = env_parse::<Millis>("KWS_MIN_GAP_MS") {
            self.recognizer.minimum_gap_ms = v;
        }
        if let Some(v) = env_parse::<Millis>("KWS_AVERAGE_WINDOW_MS") {
            self.recognizer.average_window_duration_ms = v;
        }
    }

    /// Applies `--flag value` overrides; unknown flags are left for the caller.
    pub fn apply_args<I>(&mut self, args: I)
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut iter = args.into_iter().map(Into::into).peekable();
        while let Some(arg) = iter.next() {
            let target = match arg.as_str() {
                "--threshold" => Flag::Threshold,
                "--min-gap-ms" => Flag::MinGap,
                "--average-window-ms" => Flag::AverageWindow,
                _ => continue,
            };
            let Some(value) = iter.peek().cloned() else {
                continue;
            };
            iter.next();
            match target {
                Flag::Threshold => {
                    if let Ok(v) = value.trim().parse() {
                        self.recognizer.detection_threshold = v;
                    }
                }
                Flag::MinGap => {
                    if let Ok(v) = value.trim().parse() {
                        self.recognizer.minimum_gap_ms = v;
                    }
                }
                Flag::AverageWindow => {
                    if let Ok(v) = value.trim().parse() {
                        self.recognizer.average_window_duration_ms = v;
                    }
                }
            }
        }
    }
}

enum Flag {
    Threshold,
    MinGap,
    AverageWindow,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|raw| raw.trim().parse().ok())
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}
