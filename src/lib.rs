pub mod kernel;
pub mod outputs;
pub mod sim;

// Re-export specific items if needed for convenient access
pub use kernel::config::{CategoryId, CategorySet, PipelineConfig};
pub use kernel::driver::HostLoop;
pub use kernel::pipeline::{Pipeline, SetupError, TickError};
pub use kernel::recognition::Outcome;
