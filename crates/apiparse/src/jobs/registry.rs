//! Registry of live jobs with time-based eviction

use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

use super::controller::{validate_archive, validate_text, JobController};
use crate::archive::ArchiveExtractor;
use crate::config::JobsConfig;
use crate::error::{Error, Result};
use crate::worker::WorkerSpawner;

/// Owns every live job, keyed by its id
pub struct JobRegistry {
    jobs: DashMap<Uuid, Arc<JobController>>,
    ttl: Option<Duration>,
    sweep_interval: Duration,
    spawner: Arc<dyn WorkerSpawner>,
    extractor: ArchiveExtractor,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl JobRegistry {
    pub fn new(
        config: &JobsConfig,
        spawner: Arc<dyn WorkerSpawner>,
        extractor: ArchiveExtractor,
    ) -> Self {
        Self {
            jobs: DashMap::new(),
            ttl: config.ttl(),
            sweep_interval: config.sweep_interval(),
            spawner,
            extractor,
            sweeper: Mutex::new(None),
        }
    }

    /// Start the periodic sweep. Does nothing when eviction is disabled.
    pub fn start_sweeper(self: &Arc<Self>) {
        let Some(ttl) = self.ttl else {
            tracing::warn!("Job TTL is 0, idle jobs will never be evicted");
            return;
        };

        let registry: Weak<Self> = Arc::downgrade(self);
        let period = self.sweep_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                registry.sweep();
            }
        });

        tracing::info!(ttl_ms = ttl.as_millis() as u64, "Job sweeper started");
        if let Some(previous) = self.sweeper.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Allocate a new job in the `Initialized` state
    pub fn create(&self) -> Uuid {
        let id = Uuid::new_v4();
        let job = JobController::new(id, Arc::clone(&self.spawner), self.extractor.clone());
        self.jobs.insert(id, Arc::new(job));
        tracing::debug!(job_id = %id, "Job created");
        id
    }

    /// Look up a job and refresh its last access time
    pub fn get(&self, id: &Uuid) -> Result<Arc<JobController>> {
        let job = self
            .jobs
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::not_found(id.to_string()))?;
        job.touch();
        Ok(job)
    }

    pub fn touch(&self, id: &Uuid) -> Result<()> {
        self.get(id).map(|_| ())
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.jobs.contains_key(id)
    }

    /// Cancel a job and forget it
    pub fn remove(&self, id: &Uuid) -> Result<()> {
        let (_, job) = self
            .jobs
            .remove(id)
            .ok_or_else(|| Error::not_found(id.to_string()))?;
        job.cancel();
        tracing::debug!(job_id = %id, "Job removed");
        Ok(())
    }

    /// Remove every job idle for at least the TTL. Returns how many were evicted.
    pub fn sweep(&self) -> usize {
        let Some(ttl) = self.ttl else {
            return 0;
        };

        let now = Instant::now();
        let stale: Vec<(Uuid, DateTime<Utc>)> = self
            .jobs
            .iter()
            .filter(|entry| now.saturating_duration_since(entry.value().last_access()) >= ttl)
            .map(|entry| (*entry.key(), entry.value().created_at()))
            .collect();

        let mut evicted = 0;
        for (id, created_at) in stale {
            if self.remove(&id).is_ok() {
                let age_ms = (Utc::now() - created_at).num_milliseconds();
                tracing::info!(job_id = %id, age_ms, "Job evicted after idle timeout");
                evicted += 1;
            }
        }
        evicted
    }

    /// Stop the sweeper and remove every job
    pub fn shutdown_all(&self) {
        if let Some(sweeper) = self.sweeper.lock().take() {
            sweeper.abort();
        }
        let ids: Vec<Uuid> = self.jobs.iter().map(|entry| *entry.key()).collect();
        let count = ids.len();
        for id in ids {
            let _ = self.remove(&id);
        }
        tracing::info!(jobs = count, "All jobs shut down");
    }

    /// Validate a text submission, create its job and start it in the background
    pub fn submit_text(&self, body: String, vendor: String) -> Result<Uuid> {
        validate_text(&body, &vendor)?;
        let id = self.create();
        let job = self.get(&id)?;
        tokio::spawn(async move {
            if let Err(e) = job.submit_text(&body, &vendor).await {
                tracing::error!(job_id = %job.id(), "Text submission rejected: {}", e);
            }
        });
        Ok(id)
    }

    /// Validate an archive submission, create its job and start it in the background
    pub fn submit_archive(&self, body: Bytes, entrypoint: Option<String>) -> Result<Uuid> {
        validate_archive(&body)?;
        let id = self.create();
        let job = self.get(&id)?;
        tokio::spawn(async move {
            if let Err(e) = job.submit_archive(body, entrypoint).await {
                tracing::error!(job_id = %job.id(), "Archive submission rejected: {}", e);
            }
        });
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl Drop for JobRegistry {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.get_mut().take() {
            sweeper.abort();
        }
    }
}
