//! Parent side of the worker bridge

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::protocol::{decode_reply, WorkerCommand, WorkerEvent, HANDSHAKE, MEMORY_LIMIT_ENV};
use crate::config::WorkerConfig;
use crate::error::{Error, Result};

/// Starts isolated execution units for jobs
///
/// Implementations:
/// - `ProcessSpawner`: one child process per job
#[async_trait]
pub trait WorkerSpawner: Send + Sync {
    /// Start a worker and wait until it is ready to accept a command
    async fn spawn(&self) -> Result<Box<dyn Worker>>;
}

/// Handle to one running worker
#[async_trait]
pub trait Worker: Send {
    /// OS process id, when there is one
    fn id(&self) -> Option<u32>;

    /// Deliver a command
    async fn send(&mut self, command: &WorkerCommand) -> Result<()>;

    /// Take the event stream. Yields `Some` once.
    fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<WorkerEvent>>;

    /// Close the command channel; the worker exits once it sees the close
    fn disconnect(&mut self);

    /// Stop listening and force-terminate. Safe to call repeatedly.
    fn kill(&mut self);

    fn is_running(&mut self) -> bool;
}

/// Spawns `apiparse-worker` child processes
#[derive(Debug, Clone)]
pub struct ProcessSpawner {
    program: PathBuf,
    args: Vec<String>,
    memory_limit_mb: u64,
    handshake_timeout: Duration,
}

impl ProcessSpawner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        let defaults = WorkerConfig::default();
        let handshake_timeout = defaults.handshake_timeout();
        Self {
            program: program.into(),
            args: defaults.args,
            memory_limit_mb: defaults.memory_limit_mb,
            handshake_timeout,
        }
    }

    pub fn from_config(config: &WorkerConfig) -> Result<Self> {
        Ok(Self {
            program: config.resolve_program()?,
            args: config.args.clone(),
            memory_limit_mb: config.memory_limit_mb,
            handshake_timeout: config.handshake_timeout(),
        })
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_memory_limit_mb(mut self, limit: u64) -> Self {
        self.memory_limit_mb = limit;
        self
    }

    pub fn program(&self) -> &PathBuf {
        &self.program
    }
}

#[async_trait]
impl WorkerSpawner for ProcessSpawner {
    async fn spawn(&self) -> Result<Box<dyn Worker>> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env(MEMORY_LIMIT_ENV, self.memory_limit_mb.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::worker(format!(
                    "Unable to start worker {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.start_kill();
                return Err(Error::worker("Worker pipes are not available"));
            }
        };

        let (ready_tx, ready_rx) = oneshot::channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(read_events(stdout, ready_tx, events_tx));

        let handshake = match tokio::time::timeout(self.handshake_timeout, ready_rx).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(message))) => Err(message),
            Ok(Err(_)) => Err("Worker exited before it was ready".to_string()),
            Err(_) => Err(format!(
                "Worker did not become ready within {:?}",
                self.handshake_timeout
            )),
        };

        if let Err(message) = handshake {
            reader.abort();
            let _ = child.start_kill();
            return Err(Error::worker(message));
        }

        let pid = child.id();
        tracing::debug!(pid = ?pid, "Worker ready");

        Ok(Box::new(ProcessWorker {
            child,
            stdin: Some(stdin),
            events: Some(events_rx),
            reader,
            pid,
        }))
    }
}

/// Forward the worker's stdout as events. The first line is the handshake.
async fn read_events(
    stdout: ChildStdout,
    ready: oneshot::Sender<std::result::Result<(), String>>,
    events: mpsc::UnboundedSender<WorkerEvent>,
) {
    let mut lines = BufReader::new(stdout).lines();

    match lines.next_line().await {
        Ok(Some(line)) => {
            let greeting = serde_json::from_str::<String>(line.trim()).unwrap_or_default();
            if greeting != HANDSHAKE {
                let _ = ready.send(Err(format!("Unexpected worker handshake: {}", line)));
                return;
            }
            let _ = ready.send(Ok(()));
        }
        // Dropping `ready` reports the early exit.
        Ok(None) | Err(_) => return,
    }

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                if events.send(decode_reply(&line)).is_err() {
                    return;
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!("Worker output closed: {}", e);
                break;
            }
        }
    }

    let _ = events.send(WorkerEvent::Disconnected);
}

/// A worker running as a child process
pub struct ProcessWorker {
    child: Child,
    stdin: Option<ChildStdin>,
    events: Option<mpsc::UnboundedReceiver<WorkerEvent>>,
    reader: JoinHandle<()>,
    pid: Option<u32>,
}

#[async_trait]
impl Worker for ProcessWorker {
    fn id(&self) -> Option<u32> {
        self.pid
    }

    async fn send(&mut self, command: &WorkerCommand) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| Error::worker("Worker channel is closed"))?;

        let mut line = serde_json::to_string(command)?;
        line.push('\n');

        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| Error::worker(format!("Unable to send command to worker: {}", e)))?;
        stdin
            .flush()
            .await
            .map_err(|e| Error::worker(format!("Unable to send command to worker: {}", e)))?;

        tracing::debug!(pid = ?self.pid, action = command.action(), "Command sent to worker");
        Ok(())
    }

    fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<WorkerEvent>> {
        self.events.take()
    }

    fn disconnect(&mut self) {
        self.stdin.take();
    }

    fn kill(&mut self) {
        self.disconnect();
        self.reader.abort();
        match self.child.start_kill() {
            Ok(()) => tracing::debug!(pid = ?self.pid, "Worker killed"),
            // Already exited and reaped
            Err(e) => tracing::debug!(pid = ?self.pid, "Worker kill skipped: {}", e),
        }
        let _ = self.child.try_wait();
    }

    fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }
}
