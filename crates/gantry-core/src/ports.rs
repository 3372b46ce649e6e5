//! Port traits (hexagonal architecture).
//!
//! These traits define the interfaces between the orchestration core and
//! external capabilities it does not implement: running a command in an
//! isolated environment, durable blob storage, secret lookup, event fan-out.

use crate::events::Event;
use crate::secrets::SecretValue;
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;

/// One captured output line from a command or action.
#[derive(Debug, Clone)]
pub struct OutputLine {
    pub stream: crate::run::LogStream,
    pub content: String,
}

impl OutputLine {
    pub fn stdout(content: impl Into<String>) -> Self {
        Self {
            stream: crate::run::LogStream::Stdout,
            content: content.into(),
        }
    }

    pub fn stderr(content: impl Into<String>) -> Self {
        Self {
            stream: crate::run::LogStream::Stderr,
            content: content.into(),
        }
    }
}

/// Request to run one step command in an isolated environment.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub command: String,
    pub env: HashMap<String, String>,
    pub workspace: PathBuf,
}

/// What the worker observed: exit code, captured output, and environment
/// mutations the command made for later steps of the same job.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub exit_code: i32,
    pub output: Vec<OutputLine>,
    pub env_mutations: HashMap<String, String>,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// External capability that executes step commands. Satisfied by a process
/// sandbox, container, or VM; the orchestrator never implements isolation
/// itself.
#[async_trait]
pub trait CommandWorker: Send + Sync {
    async fn run(&self, request: CommandRequest) -> Result<CommandOutcome>;

    /// Label advertising what this worker can host (`runs_on` matching).
    fn label(&self) -> &str {
        "local"
    }
}

/// Durable blob storage behind a put/get contract. Keys are opaque,
/// `/`-separated strings scoped by the caller.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// `None` when the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Keys under a prefix, unordered.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// External key-value secret source queried at JobRun start.
#[async_trait]
pub trait SecretProvider: Send + Sync {
    async fn get(&self, name: &str) -> Result<SecretValue>;
}

/// Fan-out for lifecycle events. Implementations must not block the
/// scheduler for long; delivery is fire-and-forget from its point of view.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: Event) -> Result<()>;
}

/// Sink that drops every event, for tests and bare runs.
pub struct NullEventSink;

#[async_trait]
impl EventSink for NullEventSink {
    async fn publish(&self, _event: Event) -> Result<()> {
        Ok(())
    }
}
