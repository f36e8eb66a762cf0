//! Parsing jobs: state machine, per-job controller and the registry

pub mod controller;
pub mod registry;
pub mod state;

pub use controller::JobController;
pub use registry::JobRegistry;
pub use state::{JobEvent, JobPhase, JobStatus, ParsingResult, CANCELLED_MESSAGE};
