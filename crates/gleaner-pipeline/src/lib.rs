pub mod backpressure;
pub mod controller;
pub mod tracker;

pub use backpressure::{spawn_backpressure, BackpressureConfig};
pub use controller::{PipelineController, SubmissionReceipt};
pub use tracker::ProgressTracker;
