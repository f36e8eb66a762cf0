//! Job controller: owns one job from submission to its terminal state
//!
//! All mutable job data sits behind one mutex that is never held across an
//! `.await`. Every asynchronous continuation (extraction, spawning, the worker
//! event pump) remembers the job's epoch when it started and only applies its
//! outcome if the epoch is unchanged, so cancellation cleanly detaches any work
//! still in flight.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use super::state::{InvalidTransition, JobEvent, JobPhase, JobStatus, ParsingResult};
use crate::archive::{self, ArchiveExtractor, Workspace};
use crate::error::{Error, Result};
use crate::locator::{self, EntryPoints};
use crate::worker::{Worker, WorkerCommand, WorkerEvent, WorkerReply, WorkerSpawner};

/// Check a text submission before any job resources are touched
pub fn validate_text(body: &str, vendor: &str) -> Result<()> {
    if vendor.trim().is_empty() {
        return Err(Error::invalid_input("The API vendor is not set"));
    }
    if body.is_empty() {
        return Err(Error::invalid_input("Request body is not set"));
    }
    Ok(())
}

/// Check an archive submission before any job resources are touched
pub fn validate_archive(body: &[u8]) -> Result<()> {
    if body.is_empty() {
        return Err(Error::invalid_input("Request body is not set"));
    }
    archive::ensure_zip(body)
}

/// Resolve an entry point inside the workspace. Absolute paths and `..` are refused.
pub fn resolve_entry(root: &Path, entry: &str) -> Result<PathBuf> {
    let relative = Path::new(entry);
    let contained = relative
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    let path = root.join(relative);
    if !contained || !path.is_file() {
        return Err(Error::invalid_input("API main file does not exist."));
    }
    Ok(path)
}

struct JobState {
    phase: JobPhase,
    worker: Option<Box<dyn Worker>>,
    pump: Option<JoinHandle<()>>,
    workspace: Option<Workspace>,
    /// Bumped on cancel; stale continuations compare against it
    epoch: u64,
    /// Vendor reported if the worker goes away without a reply
    vendor: Option<String>,
    created_at: DateTime<Utc>,
    last_access: Instant,
}

impl JobState {
    fn new() -> Self {
        Self {
            phase: JobPhase::Initialized,
            worker: None,
            pump: None,
            workspace: None,
            epoch: 0,
            vendor: None,
            created_at: Utc::now(),
            last_access: Instant::now(),
        }
    }

    fn touch(&mut self) {
        self.last_access = Instant::now();
    }

    fn apply(&mut self, id: Uuid, event: JobEvent) -> std::result::Result<(), InvalidTransition> {
        let from = self.phase.status();
        let cancelled = event == JobEvent::Cancelled;
        self.phase = self.phase.next(event)?;
        let to = self.phase.status();

        if cancelled {
            if from.is_terminal() {
                tracing::debug!(job_id = %id, "Job discarded");
            } else {
                tracing::info!(job_id = %id, from = %from, "Job cancelled");
            }
        } else if from != to {
            match &self.phase {
                JobPhase::Running => tracing::info!(job_id = %id, "Job running"),
                JobPhase::Waiting { candidates } => tracing::info!(
                    job_id = %id,
                    candidates = candidates.len(),
                    "Job waiting for entry point selection"
                ),
                JobPhase::Finished(result) => {
                    tracing::info!(job_id = %id, vendor = %result.vendor, "Job finished")
                }
                JobPhase::Failed { error } => {
                    tracing::info!(job_id = %id, error = %error, "Job failed")
                }
                JobPhase::Initialized => {}
            }
        }

        if to.is_terminal() {
            if let Some(workspace) = self.workspace.take() {
                workspace.release();
            }
        }
        Ok(())
    }

    /// Apply an event raised by background work, which may race with other events
    fn apply_quietly(&mut self, id: Uuid, event: JobEvent) {
        if let Err(e) = self.apply(id, event) {
            tracing::debug!(job_id = %id, "Ignoring event: {}", e);
        }
    }

    /// Detach from the current worker and force it down
    fn stop_worker(&mut self, id: Uuid) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        if let Some(mut worker) = self.worker.take() {
            worker.disconnect();
            worker.kill();
            tracing::debug!(job_id = %id, pid = ?worker.id(), "Worker stopped");
        }
    }
}

/// Controller for a single job
pub struct JobController {
    id: Uuid,
    shared: Arc<Mutex<JobState>>,
    spawner: Arc<dyn WorkerSpawner>,
    extractor: ArchiveExtractor,
}

impl JobController {
    pub fn new(id: Uuid, spawner: Arc<dyn WorkerSpawner>, extractor: ArchiveExtractor) -> Self {
        Self {
            id,
            shared: Arc::new(Mutex::new(JobState::new())),
            spawner,
            extractor,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Parse a single document given inline.
    ///
    /// Returns an error only when the submission is rejected up front. Failures
    /// after the job started are recorded on the job.
    pub async fn submit_text(&self, body: &str, vendor: &str) -> Result<()> {
        validate_text(body, vendor)?;
        let epoch = self.begin(Some(vendor.to_string()))?;

        self.launch(
            epoch,
            WorkerCommand::ParseContent {
                vendor: vendor.to_string(),
                content: body.to_string(),
            },
        )
        .await;
        Ok(())
    }

    /// Parse a zip archive holding a multi-file project.
    ///
    /// An explicit entry point only has to exist inside the archive. Without one
    /// the entry point is located, which may leave the job waiting for a choice.
    pub async fn submit_archive(&self, body: Bytes, entrypoint: Option<String>) -> Result<()> {
        validate_archive(&body)?;
        let epoch = self.begin(None)?;

        let workspace = match self.extractor.extract(body).await {
            Ok(workspace) => workspace,
            Err(e) => {
                self.fail_if_current(epoch, e.to_string());
                return Ok(());
            }
        };
        let root = workspace.path().to_path_buf();
        if let Some(stale) = self.adopt_workspace(epoch, workspace) {
            stale.release();
            return Ok(());
        }

        let entry = match entrypoint.filter(|e| !e.trim().is_empty()) {
            Some(entry) => match resolve_entry(&root, &entry) {
                Ok(_) => entry,
                Err(e) => {
                    self.fail_if_current(epoch, e.to_string());
                    return Ok(());
                }
            },
            None => match locator::locate(&root).await {
                Ok(EntryPoints::Single(entry)) => entry,
                Ok(EntryPoints::Candidates(candidates)) => {
                    self.apply_if_current(epoch, JobEvent::CandidatesFound(candidates));
                    return Ok(());
                }
                Err(e) => {
                    self.fail_if_current(epoch, e.to_string());
                    return Ok(());
                }
            },
        };

        tracing::debug!(job_id = %self.id, entrypoint = %entry, "Entry point resolved");
        self.parse_project(epoch, &root, entry).await;
        Ok(())
    }

    /// Continue a waiting job with the caller's choice of entry point.
    ///
    /// The name is not required to be one of the candidates, any file inside
    /// the workspace is accepted.
    pub async fn select_entry_point(&self, name: &str) -> Result<()> {
        let name = name.trim();
        let (epoch, root) = {
            let mut state = self.shared.lock();
            state.touch();
            if state.phase.status() != JobStatus::Waiting {
                return Err(Error::invalid_state("The job is not waiting for the input"));
            }
            if name.is_empty() {
                return Err(Error::invalid_input("The entrypoint is not set"));
            }
            let root = match &state.workspace {
                Some(workspace) => workspace.path().to_path_buf(),
                None => return Err(Error::invalid_state("The job workspace is not available")),
            };
            state.apply(self.id, JobEvent::Started)?;
            (state.epoch, root)
        };

        match resolve_entry(&root, name) {
            Ok(_) => self.parse_project(epoch, &root, name.to_string()).await,
            Err(e) => self.fail_if_current(epoch, e.to_string()),
        }
        Ok(())
    }

    /// Stop the job: detach and kill its worker, release its workspace and
    /// record it as cancelled. Safe to call in any state, any number of times.
    pub fn cancel(&self) {
        let mut state = self.shared.lock();
        state.epoch += 1;
        state.stop_worker(self.id);
        state.apply_quietly(self.id, JobEvent::Cancelled);
    }

    pub fn touch(&self) {
        self.shared.lock().touch();
    }

    pub fn status(&self) -> JobStatus {
        self.shared.lock().phase.status()
    }

    /// Consistent copy of the state and its data
    pub fn phase(&self) -> JobPhase {
        self.shared.lock().phase.clone()
    }

    pub fn result(&self) -> Option<ParsingResult> {
        self.shared.lock().phase.result().cloned()
    }

    pub fn error(&self) -> Option<String> {
        self.shared.lock().phase.error().map(str::to_string)
    }

    pub fn candidates(&self) -> Option<Vec<String>> {
        self.shared.lock().phase.candidates().map(<[String]>::to_vec)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.shared.lock().created_at
    }

    pub fn last_access(&self) -> Instant {
        self.shared.lock().last_access
    }

    /// Whether a worker is attached and its process still running
    pub fn worker_running(&self) -> bool {
        self.shared
            .lock()
            .worker
            .as_mut()
            .is_some_and(|worker| worker.is_running())
    }

    pub fn has_worker(&self) -> bool {
        self.shared.lock().worker.is_some()
    }

    pub fn workspace_path(&self) -> Option<PathBuf> {
        self.shared
            .lock()
            .workspace
            .as_ref()
            .map(|workspace| workspace.path().to_path_buf())
    }

    /// Move a fresh submission to `Running`
    fn begin(&self, vendor: Option<String>) -> Result<u64> {
        let mut state = self.shared.lock();
        state.touch();
        if state.phase.status() != JobStatus::Initialized {
            return Err(Error::invalid_state("The job has already been submitted"));
        }
        state.vendor = vendor;
        state.apply(self.id, JobEvent::Started)?;
        Ok(state.epoch)
    }

    /// Store the workspace, or hand it back if the job moved on meanwhile
    fn adopt_workspace(&self, epoch: u64, workspace: Workspace) -> Option<Workspace> {
        let mut state = self.shared.lock();
        if state.epoch != epoch || state.phase.status() != JobStatus::Running {
            return Some(workspace);
        }
        state.workspace = Some(workspace);
        None
    }

    fn apply_if_current(&self, epoch: u64, event: JobEvent) {
        let mut state = self.shared.lock();
        if state.epoch == epoch {
            state.apply_quietly(self.id, event);
        }
    }

    fn fail_if_current(&self, epoch: u64, message: String) {
        self.apply_if_current(epoch, JobEvent::WorkerFailed(message));
    }

    async fn parse_project(&self, epoch: u64, root: &Path, entry: String) {
        let vendor = match locator::classify_file(&root.join(&entry)).await {
            Ok(Some(api)) => api.vendor,
            Ok(None) => {
                self.fail_if_current(
                    epoch,
                    format!("Unable to determine the API type of {}", entry),
                );
                return;
            }
            Err(e) => {
                self.fail_if_current(epoch, e.to_string());
                return;
            }
        };

        {
            let mut state = self.shared.lock();
            if state.epoch != epoch {
                return;
            }
            state.vendor = Some(vendor.clone());
        }

        self.launch(
            epoch,
            WorkerCommand::ParseProject {
                dir: root.to_string_lossy().into_owned(),
                entrypoint: entry,
                vendor,
            },
        )
        .await;
    }

    /// Spawn a worker, hand it the command and start pumping its events
    async fn launch(&self, epoch: u64, command: WorkerCommand) {
        let mut worker = match self.spawner.spawn().await {
            Ok(worker) => worker,
            Err(e) => {
                tracing::error!(job_id = %self.id, "Failed to start worker: {}", e);
                self.fail_if_current(epoch, e.to_string());
                return;
            }
        };
        let events = worker.take_events();
        let sent = worker.send(&command).await;

        let mut state = self.shared.lock();
        if state.epoch != epoch || state.phase.status() != JobStatus::Running {
            drop(state);
            worker.kill();
            tracing::debug!(job_id = %self.id, "Discarded worker of a cancelled job");
            return;
        }

        let events = match (sent, events) {
            (Ok(()), Some(events)) => events,
            (Err(e), _) => {
                worker.kill();
                state.apply_quietly(self.id, JobEvent::WorkerFailed(e.to_string()));
                return;
            }
            (Ok(()), None) => {
                worker.kill();
                state.apply_quietly(
                    self.id,
                    JobEvent::WorkerFailed("Worker events are not available".to_string()),
                );
                return;
            }
        };

        state.stop_worker(self.id);
        tracing::info!(
            job_id = %self.id,
            pid = ?worker.id(),
            action = command.action(),
            "Worker started"
        );
        state.worker = Some(worker);
        state.pump = Some(tokio::spawn(pump(
            self.id,
            Arc::clone(&self.shared),
            epoch,
            events,
        )));
    }
}

impl Drop for JobController {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.epoch += 1;
        state.stop_worker(self.id);
        state.workspace.take();
    }
}

/// Apply worker events to the job until the worker goes away
async fn pump(
    id: Uuid,
    shared: Arc<Mutex<JobState>>,
    epoch: u64,
    mut events: mpsc::UnboundedReceiver<WorkerEvent>,
) {
    loop {
        let event = events.recv().await.unwrap_or(WorkerEvent::Disconnected);

        let mut state = shared.lock();
        if state.epoch != epoch {
            return;
        }

        match event {
            WorkerEvent::Reply(reply) => {
                let event = match reply {
                    WorkerReply::Finished(result) => JobEvent::WorkerFinished(result),
                    WorkerReply::Failed(message) => JobEvent::WorkerFailed(message),
                };
                state.apply_quietly(id, event);
                if let Some(worker) = state.worker.as_mut() {
                    worker.disconnect();
                }
            }
            WorkerEvent::Malformed(message) => {
                tracing::warn!(job_id = %id, "{}", message);
                state.apply_quietly(id, JobEvent::WorkerFailed(message));
                if let Some(worker) = state.worker.as_mut() {
                    worker.disconnect();
                }
            }
            WorkerEvent::Disconnected => {
                if state.phase.status() == JobStatus::Running {
                    tracing::warn!(
                        job_id = %id,
                        "Worker disconnected without a reply, treating the job as finished"
                    );
                }
                let fallback_vendor = state.vendor.clone().unwrap_or_default();
                state.apply_quietly(id, JobEvent::WorkerDisconnected { fallback_vendor });
                if let Some(mut worker) = state.worker.take() {
                    worker.kill();
                }
                state.pump = None;
                return;
            }
        }
    }
}
