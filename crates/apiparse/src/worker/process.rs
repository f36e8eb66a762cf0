//! Worker side of the bridge: runs inside `apiparse-worker`

use std::path::Path;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use super::protocol::{WorkerCommand, WorkerReply, HANDSHAKE, MEMORY_LIMIT_ENV};
use crate::engine::ParsingEngine;
use crate::jobs::ParsingResult;

/// Memory ceiling in megabytes from the environment, if set and valid
pub fn memory_limit_from_env() -> Option<u64> {
    std::env::var(MEMORY_LIMIT_ENV)
        .ok()
        .and_then(|v| v.trim().parse().ok())
}

/// Serve commands from `input` until it closes.
///
/// Writes the handshake first, then one reply line per command line.
pub async fn serve<R, W, E>(input: R, mut output: W, engine: &E) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    E: ParsingEngine + ?Sized,
{
    write_line(&mut output, &serde_json::to_string(HANDSHAKE)?).await?;

    let mut lines = BufReader::new(input).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<WorkerCommand>(&line) {
            Ok(command) => execute(engine, command),
            Err(e) => WorkerReply::Failed(format!("Unknown action: {}", e)),
        };

        write_line(&mut output, &serde_json::to_string(&reply)?).await?;
    }

    tracing::debug!("Command channel closed");
    Ok(())
}

/// Run one command against the engine
pub fn execute<E: ParsingEngine + ?Sized>(engine: &E, command: WorkerCommand) -> WorkerReply {
    let outcome = match &command {
        WorkerCommand::ParseContent { vendor, content } => engine
            .parse_content(vendor, content)
            .map(|rendered| (rendered, vendor)),
        WorkerCommand::ParseProject {
            dir,
            entrypoint,
            vendor,
        } => engine
            .parse_project(Path::new(dir), entrypoint, vendor)
            .map(|rendered| (rendered, vendor)),
    };

    match outcome {
        Ok((rendered, vendor)) => {
            tracing::info!(action = command.action(), vendor = %vendor, "Parsing finished");
            WorkerReply::Finished(ParsingResult {
                rendered,
                vendor: vendor.clone(),
            })
        }
        Err(e) => {
            tracing::info!(action = command.action(), "Parsing failed: {}", e);
            WorkerReply::Failed(e.to_string())
        }
    }
}

async fn write_line<W: AsyncWrite + Unpin>(output: &mut W, line: &str) -> std::io::Result<()> {
    output.write_all(line.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::DocumentEngine;
    use crate::worker::protocol::decode_reply;
    use crate::worker::WorkerEvent;

    async fn run(input: &str) -> Vec<String> {
        let mut output = Vec::new();
        serve(input.as_bytes(), &mut output, &DocumentEngine::default())
            .await
            .unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn test_handshake_only_on_empty_input() {
        assert_eq!(run("").await, vec![r#""hello""#.to_string()]);
    }

    #[tokio::test]
    async fn test_parse_content_reply() {
        let command = serde_json::to_string(&WorkerCommand::ParseContent {
            vendor: "RAML 1.0".to_string(),
            content: "#%RAML 1.0\ntitle: Demo".to_string(),
        })
        .unwrap();

        let lines = run(&format!("{}\n", command)).await;
        assert_eq!(lines.len(), 2);
        match decode_reply(&lines[1]) {
            WorkerEvent::Reply(WorkerReply::Finished(result)) => {
                assert_eq!(result.vendor, "RAML 1.0");
                assert!(result.rendered.contains("Demo"));
            }
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_action() {
        let lines = run("{\"action\":\"explode\",\"command\":{}}\n").await;
        match decode_reply(&lines[1]) {
            WorkerEvent::Reply(WorkerReply::Failed(message)) => {
                assert!(message.starts_with("Unknown action"));
            }
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    #[test]
    fn test_engine_failure_is_reported() {
        let reply = execute(
            &DocumentEngine::default(),
            WorkerCommand::ParseContent {
                vendor: "WSDL".to_string(),
                content: "<xml/>".to_string(),
            },
        );
        assert_eq!(
            reply,
            WorkerReply::Failed("Unsupported API vendor: WSDL".to_string())
        );
    }
}
