//! Lifecycle events emitted by the orchestrator.

use crate::ids::RunId;
use crate::run::{JobStatus, LogStream, RunStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// All events in the Gantry system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    RunStarted(RunStartedPayload),
    RunCompleted(RunCompletedPayload),
    JobStarted(JobStartedPayload),
    JobCompleted(JobCompletedPayload),
    JobSkipped(JobSkippedPayload),
    StepOutput(StepOutputPayload),
    ArtifactUploaded(ArtifactUploadedPayload),
}

impl Event {
    /// Subject string for routing, `run.<id>.<topic>` shaped.
    pub fn subject(&self) -> String {
        match self {
            Event::RunStarted(p) => format!("run.{}.started", p.run_id),
            Event::RunCompleted(p) => format!("run.{}.completed", p.run_id),
            Event::JobStarted(p) => format!("run.{}.job.{}.started", p.run_id, p.job),
            Event::JobCompleted(p) => format!("run.{}.job.{}.completed", p.run_id, p.job),
            Event::JobSkipped(p) => format!("run.{}.job.{}.skipped", p.run_id, p.job),
            Event::StepOutput(p) => format!("run.{}.job.{}.output", p.run_id, p.job),
            Event::ArtifactUploaded(p) => format!("run.{}.artifact.{}", p.run_id, p.name),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStartedPayload {
    pub run_id: RunId,
    pub pipeline_name: String,
    pub job_count: u32,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunCompletedPayload {
    pub run_id: RunId,
    pub pipeline_name: String,
    pub status: RunStatus,
    pub duration_ms: u64,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStartedPayload {
    pub run_id: RunId,
    pub job: String,
    pub step_count: u32,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobCompletedPayload {
    pub run_id: RunId,
    pub job: String,
    pub status: JobStatus,
    pub duration_ms: u64,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSkippedPayload {
    pub run_id: RunId,
    pub job: String,
    /// Why the job was skipped: unmet condition or failed dependency.
    pub cause: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutputPayload {
    pub run_id: RunId,
    pub job: String,
    pub step: String,
    pub stream: LogStream,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactUploadedPayload {
    pub run_id: RunId,
    pub name: String,
    pub size_bytes: u64,
}
