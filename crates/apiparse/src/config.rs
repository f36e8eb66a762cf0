//! Configuration for the parsing service

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Name of the worker executable looked up next to the running binary
pub const WORKER_BINARY: &str = "apiparse-worker";

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Job lifecycle configuration
    pub jobs: JobsConfig,
    /// Worker process configuration
    pub worker: WorkerConfig,
    /// Job workspace configuration
    pub workspace: WorkspaceConfig,
}

impl ServiceConfig {
    /// Load configuration from a TOML file, or defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("Failed to read {}: {}", path.display(), e))
                })?;
                Self::from_toml(&contents)?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text; missing keys use defaults
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))
    }

    /// Check values that would make the service unusable
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(Error::Config("server.port must be non-zero".to_string()));
        }
        if !self.server.prefix.is_empty() && !self.server.prefix.starts_with('/') {
            return Err(Error::Config(format!(
                "server.prefix must start with '/': {}",
                self.server.prefix
            )));
        }
        if self.jobs.sweep_interval_ms == 0 {
            return Err(Error::Config(
                "jobs.sweep_interval_ms must be non-zero".to_string(),
            ));
        }
        if self.worker.handshake_timeout_secs == 0 {
            return Err(Error::Config(
                "worker.handshake_timeout_secs must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Route prefix, e.g. `/api/v1`
    pub prefix: String,
    /// Enable CORS
    pub enable_cors: bool,
    /// Maximum upload size in bytes (default: 100MB)
    pub max_upload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            prefix: String::new(),
            enable_cors: true,
            max_upload_size: 100 * 1024 * 1024, // 100MB
        }
    }
}

/// Job lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Idle time after which a job is evicted, in milliseconds. 0 disables eviction.
    pub ttl_ms: u64,
    /// How often the eviction sweep runs, in milliseconds
    pub sweep_interval_ms: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 60_000,
            sweep_interval_ms: 1_000,
        }
    }
}

impl JobsConfig {
    /// Configured TTL, or `None` when eviction is disabled
    pub fn ttl(&self) -> Option<Duration> {
        (self.ttl_ms > 0).then(|| Duration::from_millis(self.ttl_ms))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(1))
    }
}

/// Worker process configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Worker executable. Defaults to `apiparse-worker` next to the current binary.
    pub program: Option<PathBuf>,
    /// Extra arguments passed to the worker
    pub args: Vec<String>,
    /// Memory ceiling handed to each worker, in megabytes
    pub memory_limit_mb: u64,
    /// How long to wait for the worker's readiness handshake
    pub handshake_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            program: None,
            args: Vec::new(),
            memory_limit_mb: 4096,
            handshake_timeout_secs: 30,
        }
    }
}

impl WorkerConfig {
    /// Resolve the worker executable path
    pub fn resolve_program(&self) -> Result<PathBuf> {
        if let Some(program) = &self.program {
            return Ok(program.clone());
        }
        let current = std::env::current_exe()
            .map_err(|e| Error::Config(format!("Unable to locate current executable: {}", e)))?;
        let dir = current.parent().ok_or_else(|| {
            Error::Config("Current executable has no parent directory".to_string())
        })?;
        Ok(dir.join(format!("{}{}", WORKER_BINARY, std::env::consts::EXE_SUFFIX)))
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}

/// Job workspace configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Parent directory for job workspaces (default: system temp dir)
    pub temp_dir: Option<PathBuf>,
    /// Name prefix of each workspace directory
    pub prefix: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            temp_dir: None,
            prefix: "apiparse-".to_string(),
        }
    }
}
