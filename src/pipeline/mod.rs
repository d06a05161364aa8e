pub mod contract; // Output contract + structural validator
pub mod grounding; // Exact-substring evidence verification
pub mod prompt_templates;
pub mod strategy; // Attempt index → template + generation parameters
pub mod response; // Raw model text → JSON value
pub mod backend;
pub mod types;
pub mod controller; // Retry state machine
pub mod failure_sink;
pub mod batch;
pub mod export;

pub use controller::RetryController;
pub use types::{PipelineOutcome, SourceNote};
