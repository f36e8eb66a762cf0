//! Job state machine
//!
//! ```text
//! Initialized ──▶ Running ──▶ Finished
//!                  │  ▲   └──▶ Failed
//!                  ▼  │
//!                 Waiting
//! ```
//!
//! Cancellation moves any state to `Failed`.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::Error;

/// Message stored on a cancelled job
pub const CANCELLED_MESSAGE: &str = "The process was cancelled.";

/// Public status of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Initialized,
    Running,
    Waiting,
    Finished,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Initialized => write!(f, "initialized"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Waiting => write!(f, "waiting"),
            JobStatus::Finished => write!(f, "finished"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Output of a successful parse
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsingResult {
    /// Serialized document produced by the parsing engine
    pub rendered: String,
    /// Vendor the document was parsed as
    pub vendor: String,
}

/// A job's state together with the data that only exists in that state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobPhase {
    Initialized,
    Running,
    Waiting { candidates: Vec<String> },
    Finished(ParsingResult),
    Failed { error: String },
}

/// Something that happened to a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    /// Work started, either from submission or from an entry point selection
    Started,
    /// Several entry points are plausible
    CandidatesFound(Vec<String>),
    WorkerFinished(ParsingResult),
    WorkerFailed(String),
    /// The worker went away without replying
    WorkerDisconnected { fallback_vendor: String },
    Cancelled,
}

impl JobEvent {
    fn name(&self) -> &'static str {
        match self {
            JobEvent::Started => "started",
            JobEvent::CandidatesFound(_) => "candidates_found",
            JobEvent::WorkerFinished(_) => "worker_finished",
            JobEvent::WorkerFailed(_) => "worker_failed",
            JobEvent::WorkerDisconnected { .. } => "worker_disconnected",
            JobEvent::Cancelled => "cancelled",
        }
    }
}

/// An event that is not valid in the job's current state
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Event {event} is not valid while the job is {from}")]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub event: &'static str,
}

impl From<InvalidTransition> for Error {
    fn from(err: InvalidTransition) -> Self {
        Error::invalid_state(err.to_string())
    }
}

impl JobPhase {
    pub fn status(&self) -> JobStatus {
        match self {
            JobPhase::Initialized => JobStatus::Initialized,
            JobPhase::Running => JobStatus::Running,
            JobPhase::Waiting { .. } => JobStatus::Waiting,
            JobPhase::Finished(_) => JobStatus::Finished,
            JobPhase::Failed { .. } => JobStatus::Failed,
        }
    }

    pub fn result(&self) -> Option<&ParsingResult> {
        match self {
            JobPhase::Finished(result) => Some(result),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            JobPhase::Failed { error } => Some(error),
            _ => None,
        }
    }

    pub fn candidates(&self) -> Option<&[String]> {
        match self {
            JobPhase::Waiting { candidates } => Some(candidates),
            _ => None,
        }
    }

    /// Compute the phase that follows `event`.
    ///
    /// A failure already recorded wins over a later disconnect, and a
    /// disconnect without a reply while running counts as completion.
    pub fn next(&self, event: JobEvent) -> Result<JobPhase, InvalidTransition> {
        use JobPhase::*;

        let next = match (self, event) {
            (_, JobEvent::Cancelled) => Failed {
                error: CANCELLED_MESSAGE.to_string(),
            },
            (Initialized | Waiting { .. }, JobEvent::Started) => Running,
            (Running, JobEvent::CandidatesFound(candidates)) => Waiting { candidates },
            (Running, JobEvent::WorkerFinished(result)) => Finished(result),
            (Initialized | Running | Waiting { .. }, JobEvent::WorkerFailed(error)) => {
                Failed { error }
            }
            (Running, JobEvent::WorkerDisconnected { fallback_vendor }) => {
                Finished(ParsingResult {
                    rendered: String::new(),
                    vendor: fallback_vendor,
                })
            }
            (Finished(_) | Failed { .. }, JobEvent::WorkerDisconnected { .. }) => self.clone(),
            (current, event) => {
                return Err(InvalidTransition {
                    from: current.status(),
                    event: event.name(),
                })
            }
        };

        Ok(next)
    }
}
