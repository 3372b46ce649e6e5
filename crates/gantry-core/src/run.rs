//! Run and execution record types.

use crate::ids::RunId;
use crate::pipeline::{JobDefinition, TriggerKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// One execution instance of a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: RunId,
    pub pipeline_name: String,
    pub status: RunStatus,
    pub trigger: TriggerInfo,
    pub jobs: Vec<JobRun>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
}

impl PipelineRun {
    pub fn job(&self, name: &str) -> Option<&JobRun> {
        self.jobs.iter().find(|j| j.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Success,
    Failure,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Success | RunStatus::Failure | RunStatus::Cancelled
        )
    }
}

/// How and from where the run was started.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerInfo {
    pub kind: TriggerKind,
    pub branch: Option<String>,
    pub commit: Option<String>,
    pub actor: Option<String>,
}

impl TriggerInfo {
    pub fn manual() -> Self {
        Self {
            kind: TriggerKind::Manual,
            branch: None,
            commit: None,
            actor: None,
        }
    }
}

/// Instantiation of a [`JobDefinition`] within one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRun {
    pub name: String,
    pub status: JobStatus,
    pub reason: Option<FailureReason>,
    pub steps: Vec<StepRun>,
    /// Step output lines in execution order, secrets already masked.
    pub log: Vec<LogLine>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
}

impl JobRun {
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: JobStatus::Pending,
            reason: None,
            steps: vec![],
            log: vec![],
            started_at: None,
            completed_at: None,
            duration_ms: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Success,
    Failure,
    Cancelled,
    Skipped,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Success | JobStatus::Failure | JobStatus::Cancelled | JobStatus::Skipped
        )
    }

    /// Whether a dependent gated only on this job may proceed.
    pub fn satisfies_dependents(&self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Skipped)
    }
}

/// Why a job ended in `failure` or `cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    StepFailed,
    Timeout,
    Cancelled,
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRun {
    pub name: String,
    pub status: StepStatus,
    pub exit_code: Option<i32>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Success,
    Failure,
    Cancelled,
    Skipped,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Success | StepStatus::Failure | StepStatus::Cancelled | StepStatus::Skipped
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLine {
    pub step: String,
    pub stream: LogStream,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStream {
    Stdout,
    Stderr,
}

/// Everything a job executor needs to run one job in isolation. The
/// environment already contains pipeline env, job env and resolved secrets;
/// there is no ambient state to reach for.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub run_id: RunId,
    pub job: JobDefinition,
    pub env: HashMap<String, String>,
    /// Secret values to mask in captured output.
    pub masked: Vec<String>,
    pub workspace: PathBuf,
}

/// Terminal result of executing one job's step sequence.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub status: JobStatus,
    pub reason: Option<FailureReason>,
    pub steps: Vec<StepRun>,
    pub log: Vec<LogLine>,
}

impl JobOutcome {
    pub fn cancelled() -> Self {
        Self {
            status: JobStatus::Cancelled,
            reason: Some(FailureReason::Cancelled),
            steps: vec![],
            log: vec![],
        }
    }
}
