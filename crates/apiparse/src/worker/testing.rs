//! Scripted in-process workers for tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::bridge::{Worker, WorkerSpawner};
use super::protocol::{WorkerCommand, WorkerEvent, WorkerReply};
use crate::error::{Error, Result};
use crate::jobs::ParsingResult;

/// How a fake worker behaves once it receives its command
#[derive(Debug, Clone)]
pub(crate) enum Script {
    /// Send the reply, then report a disconnect once the parent disconnects
    Reply(WorkerReply),
    /// Disconnect without replying
    Disconnect,
    /// Send an unparseable line
    Malformed,
    /// Never answer
    Silent,
    /// Fail to start
    SpawnError(String),
}

impl Script {
    pub(crate) fn finished(vendor: &str) -> Self {
        Script::Reply(WorkerReply::Finished(ParsingResult {
            rendered: format!(r#"{{"vendor":"{}"}}"#, vendor),
            vendor: vendor.to_string(),
        }))
    }

    pub(crate) fn failed(message: &str) -> Self {
        Script::Reply(WorkerReply::Failed(message.to_string()))
    }
}

/// What the fakes observed
#[derive(Debug, Default)]
pub(crate) struct Probe {
    pub spawned: AtomicUsize,
    pub killed: AtomicUsize,
    pub commands: Mutex<Vec<WorkerCommand>>,
}

impl Probe {
    pub(crate) fn spawned(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }

    pub(crate) fn killed(&self) -> usize {
        self.killed.load(Ordering::SeqCst)
    }

    pub(crate) fn commands(&self) -> Vec<WorkerCommand> {
        self.commands.lock().clone()
    }
}

/// Hands out fake workers following queued scripts, then the default script
pub(crate) struct ScriptedSpawner {
    scripts: Mutex<VecDeque<Script>>,
    default: Script,
    delay: Option<Duration>,
    pub probe: Arc<Probe>,
}

impl ScriptedSpawner {
    pub(crate) fn new(default: Script) -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            default,
            delay: None,
            probe: Arc::new(Probe::default()),
        }
    }

    pub(crate) fn then(self, script: Script) -> Self {
        self.scripts.lock().push_back(script);
        self
    }

    /// Delay every spawn, as if waiting for a slow handshake
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl WorkerSpawner for ScriptedSpawner {
    async fn spawn(&self) -> Result<Box<dyn Worker>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let script = self
            .scripts
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.default.clone());
        if let Script::SpawnError(message) = script {
            return Err(Error::worker(message));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.probe.spawned.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeWorker {
            script,
            probe: self.probe.clone(),
            tx: Some(tx),
            rx: Some(rx),
            replied: false,
            killed: false,
        }))
    }
}

pub(crate) struct FakeWorker {
    script: Script,
    probe: Arc<Probe>,
    tx: Option<mpsc::UnboundedSender<WorkerEvent>>,
    rx: Option<mpsc::UnboundedReceiver<WorkerEvent>>,
    replied: bool,
    killed: bool,
}

impl FakeWorker {
    fn emit(&mut self, event: WorkerEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

#[async_trait]
impl Worker for FakeWorker {
    fn id(&self) -> Option<u32> {
        None
    }

    async fn send(&mut self, command: &WorkerCommand) -> Result<()> {
        if self.tx.is_none() {
            return Err(Error::worker("Worker channel is closed"));
        }
        self.probe.commands.lock().push(command.clone());
        match self.script.clone() {
            Script::Reply(reply) => {
                self.replied = true;
                self.emit(WorkerEvent::Reply(reply));
            }
            Script::Disconnect => {
                self.emit(WorkerEvent::Disconnected);
                self.tx = None;
            }
            Script::Malformed => self.emit(WorkerEvent::Malformed("garbage".to_string())),
            Script::Silent | Script::SpawnError(_) => {}
        }
        Ok(())
    }

    fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<WorkerEvent>> {
        self.rx.take()
    }

    fn disconnect(&mut self) {
        if self.replied {
            self.emit(WorkerEvent::Disconnected);
        }
        self.tx = None;
    }

    fn kill(&mut self) {
        if !self.killed {
            self.killed = true;
            self.probe.killed.fetch_add(1, Ordering::SeqCst);
        }
        self.tx = None;
    }

    fn is_running(&mut self) -> bool {
        !self.killed && self.tx.is_some()
    }
}
