//! Parsing server binary
//!
//! Run with: cargo run -p apiparse --bin apiparse-server -- --config apiparse.toml

use std::path::PathBuf;

use apiparse::{config::ServiceConfig, server::ParseServer};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Asynchronous API description parsing service
#[derive(Debug, Parser)]
#[command(name = "apiparse-server", version, about)]
struct Args {
    /// TOML configuration file
    #[arg(long, short, env = "APIPARSE_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long, env = "APIPARSE_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(long, short, env = "APIPARSE_PORT")]
    port: Option<u16>,

    /// Route prefix, e.g. /parser
    #[arg(long, env = "APIPARSE_PREFIX")]
    prefix: Option<String>,

    /// Idle job lifetime in milliseconds, 0 disables eviction
    #[arg(long, env = "APIPARSE_JOB_TTL_MS")]
    ttl_ms: Option<u64>,

    /// Worker executable
    #[arg(long, env = "APIPARSE_WORKER")]
    worker: Option<PathBuf>,

    /// Worker memory ceiling in megabytes
    #[arg(long, env = "APIPARSE_WORKER_MEMORY_MB")]
    memory_limit_mb: Option<u64>,
}

impl Args {
    fn apply(self, config: &mut ServiceConfig) {
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(prefix) = self.prefix {
            config.server.prefix = prefix.trim_end_matches('/').to_string();
        }
        if let Some(ttl_ms) = self.ttl_ms {
            config.jobs.ttl_ms = ttl_ms;
        }
        if let Some(worker) = self.worker {
            config.worker.program = Some(worker);
        }
        if let Some(memory_limit_mb) = self.memory_limit_mb {
            config.worker.memory_limit_mb = memory_limit_mb;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "apiparse=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args = Args::parse();
    let mut config = ServiceConfig::load(args.config.take().as_deref())?;
    args.apply(&mut config);

    tracing::info!("Configuration loaded");
    tracing::info!("  - Job TTL: {} ms", config.jobs.ttl_ms);
    tracing::info!("  - Sweep interval: {} ms", config.jobs.sweep_interval_ms);
    tracing::info!("  - Worker memory limit: {} MB", config.worker.memory_limit_mb);
    tracing::info!("  - Upload limit: {} bytes", config.server.max_upload_size);

    let server = ParseServer::new(config).await?;

    println!("\nServer starting...");
    println!("  API: http://{}", server.address());
    println!("  Health: http://{}/health", server.address());
    println!("\nEndpoints:");
    println!("  POST   /text     - Submit an API description (x-api-vendor header)");
    println!("  POST   /file     - Submit a zip archive (optional x-entrypoint header)");
    println!("  GET    /job/:id  - Poll a job");
    println!("  PUT    /job/:id  - Choose the entry point of a waiting job");
    println!("  DELETE /job/:id  - Cancel a job");
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
