//! Worker bridge: process-isolated execution of parse commands
//!
//! Every job gets its own worker process so a crash or runaway memory use in
//! the parsing engine only takes down that job.

pub mod bridge;
pub mod process;
pub mod protocol;

#[cfg(test)]
pub(crate) mod testing;

pub use bridge::{ProcessSpawner, ProcessWorker, Worker, WorkerSpawner};
pub use protocol::{WorkerCommand, WorkerEvent, WorkerReply};
