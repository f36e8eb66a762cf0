//! apiparse: asynchronous API description parsing jobs with process-isolated workers
//!
//! Clients submit a single document or a zip archive of a multi-file project, the
//! service resolves the entry point, hands the parse to a dedicated worker process,
//! and exposes the job as a pollable state machine over HTTP. Idle jobs are evicted
//! by a TTL sweep, and every exit path releases the job's worker and workspace.

pub mod archive;
pub mod config;
pub mod engine;
pub mod error;
pub mod jobs;
pub mod locator;
pub mod server;
pub mod worker;

pub use config::ServiceConfig;
pub use error::{Error, Result};
pub use jobs::{JobController, JobRegistry, JobStatus, ParsingResult};
pub use server::ParseServer;
