//! The run loop: dispatches jobs in dependency order, bounded by the
//! concurrency limit, until every job is terminal or the run is cancelled.

use crate::dag::{DagError, JobGraph, JobNode};
use async_trait::async_trait;
use chrono::Utc;
use gantry_core::condition::RunContext;
use gantry_core::events::{
    Event, JobCompletedPayload, JobSkippedPayload, JobStartedPayload, RunCompletedPayload,
    RunStartedPayload, StepOutputPayload,
};
use gantry_core::ids::RunId;
use gantry_core::pipeline::PipelineDefinition;
use gantry_core::ports::EventSink;
use gantry_core::run::{
    FailureReason, JobOutcome, JobRequest, JobRun, JobStatus, LogLine, LogStream, PipelineRun,
    RunStatus, TriggerInfo,
};
use gantry_core::{Error, Result};
use gantry_notify::{NotificationPayload, NotificationSink};
use gantry_secrets::SecretManager;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, error, info, warn};

/// Executes one job's step sequence to a terminal outcome. The receiver
/// flips to `true` when the run is being cancelled.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, request: JobRequest, cancel: watch::Receiver<bool>) -> JobOutcome;
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum jobs in flight; overrides the pipeline's own limit when set.
    pub concurrency: Option<usize>,
    /// How long running jobs get to wind down after cancellation before
    /// they are aborted outright.
    pub grace_period: Duration,
    pub workspace_root: PathBuf,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: None,
            grace_period: Duration::from_secs(10),
            workspace_root: std::env::temp_dir().join("gantry"),
        }
    }
}

pub struct Scheduler {
    executor: Arc<dyn JobExecutor>,
    secrets: Arc<SecretManager>,
    events: Arc<dyn EventSink>,
    notifier: Option<Arc<dyn NotificationSink>>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        executor: Arc<dyn JobExecutor>,
        secrets: Arc<SecretManager>,
        events: Arc<dyn EventSink>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            executor,
            secrets,
            events,
            notifier: None,
            config,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Run the pipeline to completion without an external cancel source.
    pub async fn run(
        &self,
        pipeline: &PipelineDefinition,
        trigger: TriggerInfo,
    ) -> Result<PipelineRun> {
        let (_tx, rx) = watch::channel(false);
        self.run_with_cancel(pipeline, trigger, rx).await
    }

    /// Run the pipeline, stopping early when the receiver flips to `true`.
    pub async fn run_with_cancel(
        &self,
        pipeline: &PipelineDefinition,
        trigger: TriggerInfo,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<PipelineRun> {
        let graph = JobGraph::build(pipeline).map_err(|e: DagError| match e {
            DagError::UnknownDependency(d) => {
                Error::InvalidPipeline(format!("unknown dependency '{d}'"))
            }
            other => Error::InvalidPipeline(other.to_string()),
        })?;

        let run_id = RunId::new();
        let workspace = self.config.workspace_root.join(run_id.to_string());
        tokio::fs::create_dir_all(&workspace).await?;

        let started_at = Utc::now();
        let mut run = PipelineRun {
            id: run_id,
            pipeline_name: pipeline.name.clone(),
            status: RunStatus::Running,
            trigger: trigger.clone(),
            jobs: graph.jobs().iter().map(|n| JobRun::pending(&n.name)).collect(),
            created_at: started_at,
            started_at: Some(started_at),
            completed_at: None,
            duration_ms: None,
        };

        info!(
            run_id = %run_id,
            pipeline = %pipeline.name,
            jobs = run.jobs.len(),
            "Run started"
        );
        self.emit(Event::RunStarted(RunStartedPayload {
            run_id,
            pipeline_name: pipeline.name.clone(),
            job_count: run.jobs.len() as u32,
            started_at,
        }))
        .await;

        let limit = self
            .config
            .concurrency
            .or(pipeline.concurrency)
            .unwrap_or(usize::MAX)
            .max(1);

        let mut statuses: HashMap<String, JobStatus> = graph
            .jobs()
            .iter()
            .map(|n| (n.name.clone(), JobStatus::Pending))
            .collect();
        let mut in_flight: HashSet<String> = HashSet::new();
        let mut running: JoinSet<(String, JobOutcome)> = JoinSet::new();
        let mut cancelling = *cancel.borrow();
        let mut cancel_open = true;

        loop {
            if cancelling {
                self.cancel_pending(&mut run, &mut statuses);
            } else {
                self.dispatch_ready(
                    pipeline, &graph, &trigger, run_id, &workspace, limit, &mut run,
                    &mut statuses, &mut in_flight, &mut running, &cancel,
                )
                .await;
            }

            if statuses.values().all(|s| s.is_terminal()) {
                break;
            }

            if cancelling {
                self.drain_with_grace(&mut run, &mut statuses, &mut in_flight, &mut running)
                    .await;
                continue;
            }

            // A job task that panicked leaves in_flight without an outcome.
            if running.is_empty() {
                for name in in_flight.drain() {
                    statuses.insert(name.clone(), JobStatus::Failure);
                    if let Some(job_run) = run.jobs.iter_mut().find(|j| j.name == name) {
                        job_run.status = JobStatus::Failure;
                        job_run.reason = Some(FailureReason::Internal);
                        job_run.completed_at = Some(Utc::now());
                    }
                }
                continue;
            }

            tokio::select! {
                changed = cancel.changed(), if cancel_open => match changed {
                    Ok(()) if *cancel.borrow() => {
                        info!(run_id = %run_id, "Cancellation requested");
                        cancelling = true;
                    }
                    Ok(()) => {}
                    Err(_) => cancel_open = false,
                },
                Some(joined) = running.join_next() => {
                    self.record_joined(joined, run_id, &mut run, &mut statuses, &mut in_flight)
                        .await;
                }
            }
        }

        let completed_at = Utc::now();
        run.completed_at = Some(completed_at);
        run.duration_ms = Some((completed_at - started_at).num_milliseconds().max(0) as u64);
        run.status = if cancelling {
            RunStatus::Cancelled
        } else if self.any_required_failure(&graph, &statuses) {
            RunStatus::Failure
        } else {
            RunStatus::Success
        };

        info!(
            run_id = %run_id,
            status = ?run.status,
            duration_ms = run.duration_ms.unwrap_or(0),
            "Run completed"
        );
        self.emit(Event::RunCompleted(RunCompletedPayload {
            run_id,
            pipeline_name: pipeline.name.clone(),
            status: run.status,
            duration_ms: run.duration_ms.unwrap_or(0),
            completed_at,
        }))
        .await;

        if let Some(notifier) = &self.notifier {
            let payload = NotificationPayload::from_run(&run);
            if let Err(e) = notifier.send(&payload).await {
                warn!(run_id = %run_id, error = %e, "Notification delivery failed");
            }
        }

        Ok(run)
    }

    /// Dispatch every pending job whose dependencies are terminal, skipping
    /// those whose gate fails. Loops until a pass makes no progress, because
    /// skipping a job can make its dependents eligible.
    #[allow(clippy::too_many_arguments)]
    async fn dispatch_ready(
        &self,
        pipeline: &PipelineDefinition,
        graph: &JobGraph,
        trigger: &TriggerInfo,
        run_id: RunId,
        workspace: &PathBuf,
        limit: usize,
        run: &mut PipelineRun,
        statuses: &mut HashMap<String, JobStatus>,
        in_flight: &mut HashSet<String>,
        running: &mut JoinSet<(String, JobOutcome)>,
        cancel: &watch::Receiver<bool>,
    ) {
        loop {
            let mut progressed = false;

            for node in graph.jobs() {
                if statuses[&node.name] != JobStatus::Pending {
                    continue;
                }
                let preds = graph.predecessors(&node.name);
                if !preds.iter().all(|p| statuses[&p.name].is_terminal()) {
                    continue;
                }

                let (proceed, skip_cause) = self.gate(node, &preds, trigger, statuses);
                if !proceed {
                    debug!(run_id = %run_id, job = %node.name, cause = %skip_cause, "Job skipped");
                    statuses.insert(node.name.clone(), JobStatus::Skipped);
                    if let Some(job_run) = run.jobs.iter_mut().find(|j| j.name == node.name) {
                        job_run.status = JobStatus::Skipped;
                    }
                    self.emit(Event::JobSkipped(JobSkippedPayload {
                        run_id,
                        job: node.name.clone(),
                        cause: skip_cause,
                    }))
                    .await;
                    progressed = true;
                    continue;
                }

                if in_flight.len() >= limit {
                    continue;
                }

                let spawned = self
                    .start_job(pipeline, node, run_id, workspace, run, statuses, running, cancel)
                    .await;
                if spawned {
                    in_flight.insert(node.name.clone());
                }
                progressed = true;
            }

            if !progressed {
                break;
            }
        }
    }

    /// Default gate requires every dependency to have succeeded or been
    /// skipped; a failed optional dependency also passes. An explicit
    /// condition replaces the default entirely, so `always` and
    /// `job_failed` cleanup jobs run after failures.
    fn gate(
        &self,
        node: &JobNode,
        preds: &[&JobNode],
        trigger: &TriggerInfo,
        statuses: &HashMap<String, JobStatus>,
    ) -> (bool, String) {
        if let Some(condition) = &node.definition.condition {
            let ctx = RunContext {
                branch: trigger.branch.clone(),
                event: Some(trigger.kind),
                job_status: statuses.clone(),
            };
            if condition.evaluate(&ctx) {
                (true, String::new())
            } else {
                (false, "condition not met".to_string())
            }
        } else {
            let blocked = preds.iter().any(|p| {
                !statuses[&p.name].satisfies_dependents() && !p.definition.optional
            });
            if blocked {
                (false, "dependency failed".to_string())
            } else {
                (true, String::new())
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn start_job(
        &self,
        pipeline: &PipelineDefinition,
        node: &JobNode,
        run_id: RunId,
        workspace: &PathBuf,
        run: &mut PipelineRun,
        statuses: &mut HashMap<String, JobStatus>,
        running: &mut JoinSet<(String, JobOutcome)>,
        cancel: &watch::Receiver<bool>,
    ) -> bool {
        let job = &node.definition;

        let resolved = match self.secrets.resolve_all(&job.secrets).await {
            Ok(resolved) => resolved,
            Err(e) => {
                error!(run_id = %run_id, job = %node.name, error = %e, "Secret resolution failed");
                statuses.insert(node.name.clone(), JobStatus::Failure);
                if let Some(job_run) = run.jobs.iter_mut().find(|j| j.name == node.name) {
                    job_run.status = JobStatus::Failure;
                    job_run.reason = Some(FailureReason::Internal);
                    job_run.log.push(LogLine {
                        step: "setup".to_string(),
                        stream: LogStream::Stderr,
                        content: e.to_string(),
                        timestamp: Utc::now(),
                    });
                }
                return false;
            }
        };

        let mut env = pipeline.env.clone();
        env.extend(job.env.clone());
        env.extend(resolved.env);
        env.insert("GANTRY_RUN_ID".to_string(), run_id.to_string());
        env.insert("GANTRY_PIPELINE".to_string(), pipeline.name.clone());
        env.insert("GANTRY_JOB".to_string(), node.name.clone());
        if let Some(branch) = &run.trigger.branch {
            env.insert("GANTRY_BRANCH".to_string(), branch.clone());
        }

        let request = JobRequest {
            run_id,
            job: job.clone(),
            env,
            masked: resolved.masked,
            workspace: workspace.clone(),
        };

        let started_at = Utc::now();
        statuses.insert(node.name.clone(), JobStatus::Running);
        if let Some(job_run) = run.jobs.iter_mut().find(|j| j.name == node.name) {
            job_run.status = JobStatus::Running;
            job_run.started_at = Some(started_at);
        }

        info!(run_id = %run_id, job = %node.name, steps = job.steps.len(), "Job started");
        self.emit(Event::JobStarted(JobStartedPayload {
            run_id,
            job: node.name.clone(),
            step_count: job.steps.len() as u32,
            started_at,
        }))
        .await;

        let executor = Arc::clone(&self.executor);
        let cancel = cancel.clone();
        let name = node.name.clone();
        let budget = Duration::from_secs(job.timeout_minutes * 60);
        running.spawn(async move {
            // An elapsed budget drops the executor future, which kills any
            // in-flight process.
            let outcome = match tokio::time::timeout(budget, executor.execute(request, cancel))
                .await
            {
                Ok(outcome) => outcome,
                Err(_) => JobOutcome {
                    status: JobStatus::Failure,
                    reason: Some(FailureReason::Timeout),
                    steps: vec![],
                    log: vec![LogLine {
                        step: "timeout".to_string(),
                        stream: LogStream::Stderr,
                        content: "job exceeded its timeout".to_string(),
                        timestamp: Utc::now(),
                    }],
                },
            };
            (name, outcome)
        });
        true
    }

    async fn record_joined(
        &self,
        joined: std::result::Result<(String, JobOutcome), tokio::task::JoinError>,
        run_id: RunId,
        run: &mut PipelineRun,
        statuses: &mut HashMap<String, JobStatus>,
        in_flight: &mut HashSet<String>,
    ) {
        match joined {
            Ok((name, outcome)) => {
                in_flight.remove(&name);
                self.record_outcome(run_id, &name, outcome, run, statuses).await;
            }
            Err(e) => {
                // The executor task itself died. We learn which job only
                // when the grace drain reconciles in_flight.
                error!(run_id = %run_id, error = %e, "Job task failed");
            }
        }
    }

    async fn record_outcome(
        &self,
        run_id: RunId,
        name: &str,
        outcome: JobOutcome,
        run: &mut PipelineRun,
        statuses: &mut HashMap<String, JobStatus>,
    ) {
        statuses.insert(name.to_string(), outcome.status);

        let completed_at = Utc::now();
        let mut duration_ms = 0;
        if let Some(job_run) = run.jobs.iter_mut().find(|j| j.name == name) {
            job_run.status = outcome.status;
            job_run.reason = outcome.reason;
            job_run.steps = outcome.steps;
            job_run.log = outcome.log.clone();
            job_run.completed_at = Some(completed_at);
            if let Some(started) = job_run.started_at {
                duration_ms = (completed_at - started).num_milliseconds().max(0) as u64;
            }
            job_run.duration_ms = Some(duration_ms);
        }

        info!(
            run_id = %run_id,
            job = %name,
            status = ?outcome.status,
            duration_ms,
            "Job completed"
        );

        for line in &outcome.log {
            self.emit(Event::StepOutput(StepOutputPayload {
                run_id,
                job: name.to_string(),
                step: line.step.clone(),
                stream: line.stream,
                content: line.content.clone(),
            }))
            .await;
        }
        self.emit(Event::JobCompleted(JobCompletedPayload {
            run_id,
            job: name.to_string(),
            status: outcome.status,
            duration_ms,
            completed_at,
        }))
        .await;
    }

    /// Mark every job not yet dispatched as cancelled.
    fn cancel_pending(&self, run: &mut PipelineRun, statuses: &mut HashMap<String, JobStatus>) {
        for (name, status) in statuses.iter_mut() {
            if *status == JobStatus::Pending {
                *status = JobStatus::Cancelled;
                if let Some(job_run) = run.jobs.iter_mut().find(|j| j.name == *name) {
                    job_run.status = JobStatus::Cancelled;
                    job_run.reason = Some(FailureReason::Cancelled);
                }
            }
        }
    }

    /// Give running jobs the grace period to observe the cancel signal and
    /// report their own outcome, then abort whatever is left.
    async fn drain_with_grace(
        &self,
        run: &mut PipelineRun,
        statuses: &mut HashMap<String, JobStatus>,
        in_flight: &mut HashSet<String>,
        running: &mut JoinSet<(String, JobOutcome)>,
    ) {
        let run_id = run.id;
        let deadline = Instant::now() + self.config.grace_period;

        loop {
            match timeout_at(deadline, running.join_next()).await {
                Ok(Some(joined)) => {
                    self.record_joined(joined, run_id, run, statuses, in_flight).await;
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(run_id = %run_id, stragglers = in_flight.len(), "Grace period elapsed, aborting jobs");
                    running.abort_all();
                    while running.join_next().await.is_some() {}
                    break;
                }
            }
        }

        // Anything that never reported an outcome ends cancelled.
        for name in in_flight.drain() {
            statuses.insert(name.clone(), JobStatus::Cancelled);
            if let Some(job_run) = run.jobs.iter_mut().find(|j| j.name == name) {
                job_run.status = JobStatus::Cancelled;
                job_run.reason = Some(FailureReason::Cancelled);
                job_run.completed_at = Some(Utc::now());
            }
        }
    }

    fn any_required_failure(&self, graph: &JobGraph, statuses: &HashMap<String, JobStatus>) -> bool {
        graph.jobs().iter().any(|node| {
            statuses[&node.name] == JobStatus::Failure && !node.definition.optional
        })
    }

    async fn emit(&self, event: Event) {
        if let Err(e) = self.events.publish(event).await {
            warn!(error = %e, "Event publish failed");
        }
    }
}
