//! Messages exchanged with a worker process
//!
//! The protocol is newline-delimited JSON over the worker's stdin and stdout.
//! The worker's first line is the readiness handshake; after that it answers
//! each command with exactly one [`WorkerReply`].

use serde::{Deserialize, Serialize};

use crate::jobs::ParsingResult;

/// First line a worker writes once it is ready to accept a command
pub const HANDSHAKE: &str = "hello";

/// Environment variable carrying the worker's memory ceiling in megabytes
pub const MEMORY_LIMIT_ENV: &str = "APIPARSE_WORKER_MEMORY_MB";

/// Command sent from the service to a worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "command", rename_all = "kebab-case")]
pub enum WorkerCommand {
    /// Parse a single document given inline
    ParseContent { vendor: String, content: String },
    /// Parse a multi-file project rooted at `dir`
    ParseProject {
        dir: String,
        entrypoint: String,
        vendor: String,
    },
}

impl WorkerCommand {
    pub fn action(&self) -> &'static str {
        match self {
            WorkerCommand::ParseContent { .. } => "parse-content",
            WorkerCommand::ParseProject { .. } => "parse-project",
        }
    }
}

/// Terminal message sent by a worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "result", rename_all = "snake_case")]
pub enum WorkerReply {
    Finished(ParsingResult),
    Failed(String),
}

/// Something observed on a worker's output channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// A well-formed reply
    Reply(WorkerReply),
    /// A line that is not a valid reply
    Malformed(String),
    /// The channel closed
    Disconnected,
}

/// Decode one line of worker output
pub fn decode_reply(line: &str) -> WorkerEvent {
    match serde_json::from_str::<WorkerReply>(line) {
        Ok(reply) => WorkerEvent::Reply(reply),
        Err(e) => WorkerEvent::Malformed(format!("Invalid worker message: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_command_wire_shape() {
        let command = WorkerCommand::ParseProject {
            dir: "/tmp/x".to_string(),
            entrypoint: "api.raml".to_string(),
            vendor: "RAML 1.0".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&command).unwrap(),
            json!({
                "action": "parse-project",
                "command": {"dir": "/tmp/x", "entrypoint": "api.raml", "vendor": "RAML 1.0"}
            })
        );
        assert_eq!(command.action(), "parse-project");
    }

    #[test]
    fn test_decode_replies() {
        let event = decode_reply(r#"{"status":"failed","result":"boom"}"#);
        assert_eq!(event, WorkerEvent::Reply(WorkerReply::Failed("boom".to_string())));

        let event =
            decode_reply(r#"{"status":"finished","result":{"rendered":"{}","vendor":"OAS 3.0"}}"#);
        assert_eq!(
            event,
            WorkerEvent::Reply(WorkerReply::Finished(ParsingResult {
                rendered: "{}".to_string(),
                vendor: "OAS 3.0".to_string(),
            }))
        );

        assert!(matches!(decode_reply("garbage"), WorkerEvent::Malformed(_)));
    }
}
