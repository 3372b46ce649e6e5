//! In-process job execution with the local shell worker.

use async_trait::async_trait;
use gantry_core::run::{JobOutcome, JobRequest};
use gantry_runner::StepExecutor;
use gantry_scheduler::JobExecutor;
use tokio::sync::watch;

pub struct LocalJobExecutor {
    inner: StepExecutor,
}

impl LocalJobExecutor {
    pub fn new(inner: StepExecutor) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl JobExecutor for LocalJobExecutor {
    async fn execute(&self, request: JobRequest, cancel: watch::Receiver<bool>) -> JobOutcome {
        self.inner.execute_job(&request, cancel).await
    }
}
