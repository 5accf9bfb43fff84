pub mod history;
pub mod recognizer;

pub use history::{HistoryError, ScoreHistory, ScoreSnapshot, ScoreVector};
pub use recognizer::{
    CommandRecognizer, Outcome, RecognitionState, RecognizerError, RecognizerPhase,
};
