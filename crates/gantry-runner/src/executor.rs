//! Sequential step execution for one job.

use crate::actions::{ActionContext, ActionRegistry};
use chrono::Utc;
use gantry_core::ports::{CommandRequest, CommandWorker, OutputLine};
use gantry_core::run::{
    FailureReason, JobOutcome, JobRequest, JobStatus, LogLine, StepRun, StepStatus,
};
use gantry_core::{Error, Result};
use gantry_core::pipeline::StepDefinition;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// Executes a job's steps strictly in declared order on one worker.
pub struct StepExecutor {
    worker: Arc<dyn CommandWorker>,
    actions: Arc<ActionRegistry>,
}

struct StepExecution {
    exit_code: i32,
    output: Vec<OutputLine>,
    env_mutations: HashMap<String, String>,
}

impl StepExecutor {
    pub fn new(worker: Arc<dyn CommandWorker>, actions: Arc<ActionRegistry>) -> Self {
        Self { worker, actions }
    }

    /// Run every step of the job. Never returns an error: anything that
    /// goes wrong is recorded on the outcome so the scheduler sees a
    /// complete picture.
    pub async fn execute_job(
        &self,
        request: &JobRequest,
        mut cancel: watch::Receiver<bool>,
    ) -> JobOutcome {
        if let Some(label) = &request.job.runs_on
            && label != self.worker.label()
        {
            warn!(job = %request.job.name, runs_on = %label, "No worker matches runner label");
            return JobOutcome {
                status: JobStatus::Failure,
                reason: Some(FailureReason::Internal),
                steps: request
                    .job
                    .steps
                    .iter()
                    .map(|s| untouched_step(s, StepStatus::Skipped))
                    .collect(),
                log: vec![LogLine {
                    step: "setup".to_string(),
                    stream: gantry_core::run::LogStream::Stderr,
                    content: format!("no worker matches runs_on label '{}'", label),
                    timestamp: Utc::now(),
                }],
            };
        }

        let mut env = request.env.clone();
        let mut steps = Vec::with_capacity(request.job.steps.len());
        let mut log = Vec::new();
        let mut job_failed = false;
        let mut reason = None;
        let mut halted = false;
        let mut cancelled = *cancel.borrow();

        for step in &request.job.steps {
            if cancelled {
                steps.push(untouched_step(step, StepStatus::Cancelled));
                continue;
            }
            if halted {
                steps.push(untouched_step(step, StepStatus::Skipped));
                continue;
            }

            let started_at = Utc::now();
            info!(run_id = %request.run_id, job = %request.job.name, step = %step.name, "Executing step");

            let budget = Duration::from_secs(step.timeout_minutes * 60);
            let result = tokio::select! {
                res = tokio::time::timeout(budget, self.run_step(request, step, &env)) => Some(res),
                _ = cancelled_signal(&mut cancel) => None,
            };

            let mut step_run = StepRun {
                name: step.name.clone(),
                status: StepStatus::Running,
                exit_code: None,
                started_at: Some(started_at),
                completed_at: None,
            };

            match result {
                // Cancellation observed mid-step; the in-flight command is
                // dropped, which kills the underlying process.
                None => {
                    cancelled = true;
                    reason = Some(FailureReason::Cancelled);
                    step_run.status = StepStatus::Cancelled;
                    step_run.completed_at = Some(Utc::now());
                    steps.push(step_run);
                    continue;
                }
                Some(Err(_elapsed)) => {
                    warn!(step = %step.name, "Step timed out");
                    log.push(LogLine {
                        step: step.name.clone(),
                        stream: gantry_core::run::LogStream::Stderr,
                        content: format!(
                            "step timed out after {} minute(s)",
                            step.timeout_minutes
                        ),
                        timestamp: Utc::now(),
                    });
                    step_run.status = StepStatus::Failure;
                    step_run.completed_at = Some(Utc::now());
                    steps.push(step_run);
                    if !step.ignore_failure {
                        job_failed = true;
                        reason.get_or_insert(FailureReason::Timeout);
                    }
                    if !step.tolerates_failure() {
                        halted = true;
                    }
                }
                Some(Ok(Err(e))) => {
                    // Action lookup failure, artifact errors, spawn errors:
                    // step-level failures, tolerated the same way a bad
                    // exit code is.
                    log.push(LogLine {
                        step: step.name.clone(),
                        stream: gantry_core::run::LogStream::Stderr,
                        content: mask(&e.to_string(), &request.masked),
                        timestamp: Utc::now(),
                    });
                    step_run.status = StepStatus::Failure;
                    step_run.completed_at = Some(Utc::now());
                    steps.push(step_run);
                    if !step.ignore_failure {
                        job_failed = true;
                        reason.get_or_insert(FailureReason::StepFailed);
                    }
                    if !step.tolerates_failure() {
                        halted = true;
                    }
                }
                Some(Ok(Ok(execution))) => {
                    for line in &execution.output {
                        log.push(LogLine {
                            step: step.name.clone(),
                            stream: line.stream,
                            content: mask(&line.content, &request.masked),
                            timestamp: Utc::now(),
                        });
                    }
                    for (key, value) in execution.env_mutations {
                        env.insert(key, value);
                    }

                    step_run.exit_code = Some(execution.exit_code);
                    step_run.completed_at = Some(Utc::now());
                    if execution.exit_code == 0 {
                        step_run.status = StepStatus::Success;
                        steps.push(step_run);
                    } else {
                        step_run.status = StepStatus::Failure;
                        steps.push(step_run);
                        if !step.ignore_failure {
                            job_failed = true;
                            reason.get_or_insert(FailureReason::StepFailed);
                        }
                        if !step.tolerates_failure() {
                            halted = true;
                        }
                    }
                }
            }
        }

        let status = if cancelled {
            JobStatus::Cancelled
        } else if job_failed {
            JobStatus::Failure
        } else {
            JobStatus::Success
        };

        JobOutcome {
            status,
            reason: if status == JobStatus::Success {
                None
            } else {
                reason
            },
            steps,
            log,
        }
    }

    async fn run_step(
        &self,
        request: &JobRequest,
        step: &StepDefinition,
        env: &HashMap<String, String>,
    ) -> Result<StepExecution> {
        let mut merged = env.clone();
        for (key, value) in &step.env {
            merged.insert(key.clone(), value.clone());
        }

        if let Some(command) = &step.run {
            let outcome = self
                .worker
                .run(CommandRequest {
                    command: command.clone(),
                    env: merged,
                    workspace: request.workspace.clone(),
                })
                .await?;
            Ok(StepExecution {
                exit_code: outcome.exit_code,
                output: outcome.output,
                env_mutations: outcome.env_mutations,
            })
        } else {
            let name = step.uses.as_deref().unwrap_or_default();
            let adapter = self
                .actions
                .get(name)
                .ok_or_else(|| Error::ActionNotFound(name.to_string()))?;
            let outcome = adapter
                .execute(ActionContext {
                    run_id: request.run_id,
                    workspace: request.workspace.clone(),
                    config: step.with.clone(),
                    env: merged,
                })
                .await?;
            Ok(StepExecution {
                exit_code: outcome.exit_code,
                output: outcome.output,
                env_mutations: outcome.env_mutations,
            })
        }
    }
}

fn untouched_step(step: &StepDefinition, status: StepStatus) -> StepRun {
    StepRun {
        name: step.name.clone(),
        status,
        exit_code: None,
        started_at: None,
        completed_at: None,
    }
}

/// Resolves when cancellation is requested; pends forever if the sender is
/// gone (no cancellation can ever arrive).
async fn cancelled_signal(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Replace secret values with `***` in captured output.
fn mask(content: &str, masked: &[String]) -> String {
    let mut output = content.to_string();
    for value in masked {
        if !value.is_empty() {
            output = output.replace(value, "***");
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::ShellWorker;
    use gantry_core::ids::RunId;
    use gantry_core::pipeline::JobDefinition;
    use gantry_core::run::LogStream;

    fn executor() -> StepExecutor {
        StepExecutor::new(Arc::new(ShellWorker::new()), Arc::new(ActionRegistry::new()))
    }

    fn step(name: &str, run: &str) -> StepDefinition {
        StepDefinition {
            name: name.to_string(),
            run: Some(run.to_string()),
            uses: None,
            with: HashMap::new(),
            env: HashMap::new(),
            continue_on_error: false,
            ignore_failure: false,
            timeout_minutes: 1,
        }
    }

    fn request(steps: Vec<StepDefinition>, workspace: &std::path::Path) -> JobRequest {
        JobRequest {
            run_id: RunId::new(),
            job: JobDefinition {
                name: "job".to_string(),
                display_name: None,
                needs: vec![],
                condition: None,
                optional: false,
                runs_on: None,
                env: HashMap::new(),
                secrets: vec![],
                timeout_minutes: 5,
                steps,
            },
            env: HashMap::new(),
            masked: vec![],
            workspace: workspace.to_path_buf(),
        }
    }

    fn never_cancelled() -> watch::Receiver<bool> {
        let (_tx, rx) = watch::channel(false);
        rx
    }

    #[tokio::test]
    async fn test_steps_run_in_order() {
        let ws = tempfile::tempdir().unwrap();
        let outcome = executor()
            .execute_job(
                &request(
                    vec![step("first", "echo one"), step("second", "echo two")],
                    ws.path(),
                ),
                never_cancelled(),
            )
            .await;

        assert_eq!(outcome.status, JobStatus::Success);
        let lines: Vec<&str> = outcome.log.iter().map(|l| l.content.as_str()).collect();
        assert_eq!(lines, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_failure_halts_remaining_steps() {
        let ws = tempfile::tempdir().unwrap();
        let outcome = executor()
            .execute_job(
                &request(
                    vec![
                        step("ok", "true"),
                        step("bad", "exit 1"),
                        step("never", "echo unreachable"),
                    ],
                    ws.path(),
                ),
                never_cancelled(),
            )
            .await;

        assert_eq!(outcome.status, JobStatus::Failure);
        assert_eq!(outcome.reason, Some(FailureReason::StepFailed));
        assert_eq!(outcome.steps[1].status, StepStatus::Failure);
        assert_eq!(outcome.steps[2].status, StepStatus::Skipped);
        assert!(!outcome.log.iter().any(|l| l.content == "unreachable"));
    }

    #[tokio::test]
    async fn test_continue_on_error_still_fails_job() {
        let ws = tempfile::tempdir().unwrap();
        let mut bad = step("bad", "exit 1");
        bad.continue_on_error = true;
        let outcome = executor()
            .execute_job(
                &request(vec![bad, step("after", "echo kept-going")], ws.path()),
                never_cancelled(),
            )
            .await;

        assert_eq!(outcome.status, JobStatus::Failure);
        assert!(outcome.log.iter().any(|l| l.content == "kept-going"));
    }

    #[tokio::test]
    async fn test_ignore_failure_keeps_job_green() {
        let ws = tempfile::tempdir().unwrap();
        let mut flaky = step("flaky", "exit 1");
        flaky.ignore_failure = true;
        let outcome = executor()
            .execute_job(
                &request(vec![flaky, step("after", "true")], ws.path()),
                never_cancelled(),
            )
            .await;

        assert_eq!(outcome.status, JobStatus::Success);
        assert_eq!(outcome.steps[0].status, StepStatus::Failure);
    }

    #[tokio::test]
    async fn test_env_accumulates_across_steps() {
        let ws = tempfile::tempdir().unwrap();
        let outcome = executor()
            .execute_job(
                &request(
                    vec![
                        step("set", "echo RELEASE=v9 >> \"$GANTRY_ENV\""),
                        step("use", "echo got $RELEASE"),
                    ],
                    ws.path(),
                ),
                never_cancelled(),
            )
            .await;

        assert_eq!(outcome.status, JobStatus::Success);
        assert!(outcome.log.iter().any(|l| l.content == "got v9"));
    }

    #[tokio::test]
    async fn test_secrets_masked_in_log() {
        let ws = tempfile::tempdir().unwrap();
        let mut req = request(vec![step("leak", "echo token is s3cr3t")], ws.path());
        req.masked = vec!["s3cr3t".to_string()];

        let outcome = executor().execute_job(&req, never_cancelled()).await;
        assert!(outcome.log.iter().any(|l| l.content == "token is ***"));
        assert!(!outcome.log.iter().any(|l| l.content.contains("s3cr3t")));
    }

    #[tokio::test]
    async fn test_runner_label_mismatch_fails_job() {
        let ws = tempfile::tempdir().unwrap();
        let mut req = request(vec![step("build", "true")], ws.path());
        req.job.runs_on = Some("gpu".to_string());

        let outcome = executor().execute_job(&req, never_cancelled()).await;
        assert_eq!(outcome.status, JobStatus::Failure);
        assert_eq!(outcome.reason, Some(FailureReason::Internal));
        assert_eq!(outcome.steps[0].status, StepStatus::Skipped);
    }

    #[tokio::test]
    async fn test_matching_runner_label_runs() {
        let ws = tempfile::tempdir().unwrap();
        let mut req = request(vec![step("build", "true")], ws.path());
        req.job.runs_on = Some("local".to_string());

        let outcome = executor().execute_job(&req, never_cancelled()).await;
        assert_eq!(outcome.status, JobStatus::Success);
    }

    #[tokio::test]
    async fn test_unknown_action_fails_step() {
        let ws = tempfile::tempdir().unwrap();
        let mut action_step = step("missing", "");
        action_step.run = None;
        action_step.uses = Some("no/such-action".to_string());

        let outcome = executor()
            .execute_job(&request(vec![action_step], ws.path()), never_cancelled())
            .await;
        assert_eq!(outcome.status, JobStatus::Failure);
        assert!(outcome
            .log
            .iter()
            .any(|l| l.stream == LogStream::Stderr && l.content.contains("no/such-action")));
    }

    #[tokio::test]
    async fn test_cancellation_mid_job() {
        let ws = tempfile::tempdir().unwrap();
        let (tx, rx) = watch::channel(false);

        let exec = executor();
        let req = request(
            vec![step("slow", "sleep 30"), step("after", "echo no")],
            ws.path(),
        );

        let handle = tokio::spawn(async move { exec.execute_job(&req, rx).await });
        tokio::time::sleep(Duration::from_millis(200)).await;
        tx.send(true).unwrap();

        let outcome = handle.await.unwrap();
        assert_eq!(outcome.status, JobStatus::Cancelled);
        assert_eq!(outcome.reason, Some(FailureReason::Cancelled));
        assert_eq!(outcome.steps[0].status, StepStatus::Cancelled);
        assert_eq!(outcome.steps[1].status, StepStatus::Cancelled);
    }
}
