pub mod responder;

pub use responder::{CommandResponder, LogResponder, RecordingResponder};
