//! Worker binary, spawned by the server once per job
//!
//! Speaks newline-delimited JSON on stdin/stdout. Logs go to stderr so they
//! never interleave with replies.

use apiparse::engine::DocumentEngine;
use apiparse::worker::process::{memory_limit_from_env, serve};

const DEFAULT_MEMORY_LIMIT_MB: u64 = 4096;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "apiparse=warn".into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let limit_mb = memory_limit_from_env().unwrap_or(DEFAULT_MEMORY_LIMIT_MB);
    tracing::debug!(pid = std::process::id(), limit_mb, "Worker started");

    let engine = DocumentEngine::with_memory_limit_mb(limit_mb);
    serve(tokio::io::stdin(), tokio::io::stdout(), &engine).await?;

    Ok(())
}
