//! Notification payloads and senders.

use async_trait::async_trait;
use gantry_core::run::{JobStatus, PipelineRun, RunStatus};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),
}

/// What gets posted when a run reaches a terminal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub run_id: String,
    pub pipeline_name: String,
    pub status: RunStatus,
    pub branch: Option<String>,
    pub duration_ms: Option<u64>,
    pub jobs: Vec<JobSummary>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub name: String,
    pub status: JobStatus,
    pub duration_ms: Option<u64>,
}

impl NotificationPayload {
    pub fn from_run(run: &PipelineRun) -> Self {
        Self {
            run_id: run.id.to_string(),
            pipeline_name: run.pipeline_name.clone(),
            status: run.status,
            branch: run.trigger.branch.clone(),
            duration_ms: run.duration_ms,
            jobs: run
                .jobs
                .iter()
                .map(|j| JobSummary {
                    name: j.name.clone(),
                    status: j.status,
                    duration_ms: j.duration_ms,
                })
                .collect(),
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Terminal-status notification channel.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, payload: &NotificationPayload) -> Result<(), NotifyError>;
}

/// Posts the payload as JSON to a webhook URL.
pub struct WebhookSender {
    url: String,
    client: reqwest::Client,
}

impl WebhookSender {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookSender {
    async fn send(&self, payload: &NotificationPayload) -> Result<(), NotifyError> {
        let response = self.client.post(&self.url).json(payload).send().await?;
        if !response.status().is_success() {
            return Err(NotifyError::DeliveryFailed(format!(
                "webhook returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Writes the summary to the log; the zero-configuration default.
pub struct LogSender;

#[async_trait]
impl NotificationSink for LogSender {
    async fn send(&self, payload: &NotificationPayload) -> Result<(), NotifyError> {
        info!(
            run_id = %payload.run_id,
            pipeline = %payload.pipeline_name,
            status = ?payload.status,
            jobs = payload.jobs.len(),
            "Run finished"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::ids::RunId;
    use gantry_core::pipeline::TriggerKind;
    use gantry_core::run::{JobRun, TriggerInfo};

    fn sample_run() -> PipelineRun {
        PipelineRun {
            id: RunId::new(),
            pipeline_name: "release".to_string(),
            status: RunStatus::Failure,
            trigger: TriggerInfo {
                kind: TriggerKind::Push,
                branch: Some("main".to_string()),
                commit: None,
                actor: None,
            },
            jobs: vec![
                {
                    let mut j = JobRun::pending("build");
                    j.status = JobStatus::Success;
                    j
                },
                {
                    let mut j = JobRun::pending("scan");
                    j.status = JobStatus::Failure;
                    j
                },
            ],
            created_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
            duration_ms: Some(12_000),
        }
    }

    #[test]
    fn test_payload_from_run() {
        let payload = NotificationPayload::from_run(&sample_run());
        assert_eq!(payload.status, RunStatus::Failure);
        assert_eq!(payload.jobs.len(), 2);
        assert_eq!(payload.jobs[1].status, JobStatus::Failure);
        assert_eq!(payload.branch.as_deref(), Some("main"));
    }

    #[tokio::test]
    async fn test_log_sender_never_fails() {
        let payload = NotificationPayload::from_run(&sample_run());
        assert!(LogSender.send(&payload).await.is_ok());
    }
}
