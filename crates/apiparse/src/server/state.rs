//! Application state for the parsing server

use std::sync::Arc;

use crate::archive::ArchiveExtractor;
use crate::config::ServiceConfig;
use crate::error::Result;
use crate::jobs::JobRegistry;
use crate::worker::{ProcessSpawner, WorkerSpawner};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Configuration
    config: ServiceConfig,
    /// Live jobs
    registry: Arc<JobRegistry>,
}

impl AppState {
    /// Create the state with process-backed workers and start the TTL sweeper
    pub async fn new(config: ServiceConfig) -> Result<Self> {
        let spawner = ProcessSpawner::from_config(&config.worker)?;
        tracing::info!(
            "Worker executable: {} (memory limit {} MB)",
            spawner.program().display(),
            config.worker.memory_limit_mb
        );

        Ok(Self::with_spawner(config, Arc::new(spawner)))
    }

    /// Create the state around any worker spawner
    pub fn with_spawner(config: ServiceConfig, spawner: Arc<dyn WorkerSpawner>) -> Self {
        let extractor = ArchiveExtractor::new(config.workspace.clone());
        let registry = Arc::new(JobRegistry::new(&config.jobs, spawner, extractor));
        registry.start_sweeper();

        Self {
            inner: Arc::new(AppStateInner { config, registry }),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.inner.registry
    }

    /// Public location of a job, including the route prefix
    pub fn job_location(&self, key: &uuid::Uuid) -> String {
        format!("{}/job/{}", self.inner.config.server.prefix, key)
    }
}
