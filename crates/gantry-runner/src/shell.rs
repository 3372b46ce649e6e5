//! Process-backed command worker.

use async_trait::async_trait;
use gantry_core::ports::{CommandOutcome, CommandRequest, CommandWorker, OutputLine};
use gantry_core::run::LogStream;
use gantry_core::{Error, Result};
use std::collections::HashMap;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::debug;

/// Environment variable naming the file a command may append `KEY=value`
/// lines to in order to mutate the environment of later steps.
pub const ENV_FILE_VAR: &str = "GANTRY_ENV";

/// Runs step commands as local `sh -c` processes. This is the simplest
/// worker; containers or VMs satisfy the same contract.
pub struct ShellWorker {
    shell: String,
    label: String,
}

impl ShellWorker {
    pub fn new() -> Self {
        Self {
            shell: "sh".to_string(),
            label: "local".to_string(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

impl Default for ShellWorker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandWorker for ShellWorker {
    async fn run(&self, request: CommandRequest) -> Result<CommandOutcome> {
        tokio::fs::create_dir_all(&request.workspace).await?;

        // Env file through which the command mutates later steps' env.
        let env_file = tempfile::NamedTempFile::new_in(&request.workspace)
            .map_err(|e| Error::Internal(format!("Failed to create env file: {}", e)))?;
        let env_path = env_file.path().to_path_buf();

        let mut child = Command::new(&self.shell)
            .arg("-c")
            .arg(&request.command)
            .envs(&request.env)
            .env(ENV_FILE_VAR, &env_path)
            .current_dir(&request.workspace)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Internal(format!("Failed to spawn command: {}", e)))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // One channel keeps output lines in arrival order across streams.
        let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();

        let stdout_task = stdout.map(|out| {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(out).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let _ = tx.send(OutputLine {
                        stream: LogStream::Stdout,
                        content: line,
                    });
                }
            })
        });
        let stderr_task = stderr.map(|err| {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(err).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let _ = tx.send(OutputLine {
                        stream: LogStream::Stderr,
                        content: line,
                    });
                }
            })
        });
        drop(tx);

        let status = child
            .wait()
            .await
            .map_err(|e| Error::Internal(format!("Command wait failed: {}", e)))?;

        if let Some(task) = stdout_task {
            let _ = task.await;
        }
        if let Some(task) = stderr_task {
            let _ = task.await;
        }

        let mut output = Vec::new();
        while let Ok(line) = rx.try_recv() {
            output.push(line);
        }

        let env_mutations = parse_env_file(&env_path).await;
        let exit_code = status.code().unwrap_or(-1);
        debug!(exit_code, mutations = env_mutations.len(), "Command finished");

        Ok(CommandOutcome {
            exit_code,
            output,
            env_mutations,
        })
    }

    fn label(&self) -> &str {
        &self.label
    }
}

/// Parse `KEY=value` lines; malformed lines are ignored.
async fn parse_env_file(path: &std::path::Path) -> HashMap<String, String> {
    let mut mutations = HashMap::new();
    if let Ok(content) = tokio::fs::read_to_string(path).await {
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                if !key.is_empty() {
                    mutations.insert(key.to_string(), value.trim().to_string());
                }
            }
        }
    }
    mutations
}
