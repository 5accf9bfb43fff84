pub mod config;
pub mod driver;
pub mod features;
pub mod inference;
pub mod pipeline;
pub mod recognition;
pub mod telemetry;
pub mod time;
