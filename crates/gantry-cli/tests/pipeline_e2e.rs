//! End-to-end pipeline runs with the local shell worker.

use async_trait::async_trait;
use gantry_artifacts::{ArtifactStore, FilesystemStore};
use gantry_core::pipeline::PipelineDefinition;
use gantry_core::ports::NullEventSink;
use gantry_core::run::{
    JobOutcome, JobRequest, JobStatus, PipelineRun, RunStatus, TriggerInfo,
};
use gantry_runner::{ActionRegistry, ShellWorker, StepExecutor};
use gantry_scheduler::{JobExecutor, Scheduler, SchedulerConfig};
use gantry_secrets::{SecretManager, StaticProvider};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

struct ShellJobExecutor {
    inner: StepExecutor,
}

#[async_trait]
impl JobExecutor for ShellJobExecutor {
    async fn execute(&self, request: JobRequest, cancel: watch::Receiver<bool>) -> JobOutcome {
        self.inner.execute_job(&request, cancel).await
    }
}

struct Harness {
    scheduler: Scheduler,
    artifacts: Arc<ArtifactStore>,
    _data_dir: tempfile::TempDir,
}

fn harness(secrets: SecretManager) -> Harness {
    let data_dir = tempfile::tempdir().unwrap();
    let artifacts = Arc::new(ArtifactStore::new(Arc::new(FilesystemStore::new(
        data_dir.path().join("artifacts"),
    ))));
    let actions = Arc::new(ActionRegistry::with_builtins(artifacts.clone()));
    let executor = Arc::new(ShellJobExecutor {
        inner: StepExecutor::new(Arc::new(ShellWorker::new()), actions),
    });
    let config = SchedulerConfig {
        concurrency: None,
        grace_period: Duration::from_secs(5),
        workspace_root: data_dir.path().join("workspaces"),
    };
    let scheduler = Scheduler::new(executor, Arc::new(secrets), Arc::new(NullEventSink), config);
    Harness {
        scheduler,
        artifacts,
        _data_dir: data_dir,
    }
}

async fn run_yaml(harness: &Harness, yaml: &str) -> PipelineRun {
    let pipeline = PipelineDefinition::from_yaml(yaml).unwrap();
    harness
        .scheduler
        .run(&pipeline, TriggerInfo::manual())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_artifact_passing_between_jobs() {
    let h = harness(SecretManager::new("static"));
    let run = run_yaml(
        &h,
        r#"
name: artifact-flow
jobs:
  - name: build
    steps:
      - name: make
        run: mkdir -p dist && printf 'payload-bytes' > dist/app.bin
      - name: upload
        uses: artifact/upload
        with:
          name: dist
          paths: dist/*
  - name: verify
    needs: [build]
    steps:
      - name: download
        uses: artifact/download
        with:
          name: dist
          dest: restored
      - name: compare
        run: cmp dist/app.bin restored/dist/app.bin
"#,
    )
    .await;

    assert_eq!(run.status, RunStatus::Success);
    assert_eq!(run.job("build").unwrap().status, JobStatus::Success);
    assert_eq!(run.job("verify").unwrap().status, JobStatus::Success);

    let stored = h.artifacts.list(run.id).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].name, "dist");
    assert_eq!(stored[0].file_count, 1);
}

#[tokio::test]
async fn test_env_accumulates_across_steps() {
    let h = harness(SecretManager::new("static"));
    let run = run_yaml(
        &h,
        r#"
name: env-flow
jobs:
  - name: greet
    steps:
      - name: set
        run: echo "GREETING=hello" >> "$GANTRY_ENV"
      - name: use
        run: test "$GREETING" = hello
"#,
    )
    .await;

    assert_eq!(run.status, RunStatus::Success);
}

#[tokio::test]
async fn test_secret_values_masked_in_logs() {
    let mut secrets = SecretManager::new("static");
    secrets.register_provider(
        "static",
        Arc::new(StaticProvider::new(
            [("DEPLOY_TOKEN".to_string(), "super-secret-42".to_string())]
                .into_iter()
                .collect(),
        )),
    );
    let h = harness(secrets);
    let run = run_yaml(
        &h,
        r#"
name: secret-flow
jobs:
  - name: deploy
    secrets:
      - name: DEPLOY_TOKEN
    steps:
      - name: leak
        run: echo "token is $DEPLOY_TOKEN"
"#,
    )
    .await;

    assert_eq!(run.status, RunStatus::Success);
    let log = &run.job("deploy").unwrap().log;
    assert!(log.iter().any(|l| l.content.contains("***")));
    assert!(log.iter().all(|l| !l.content.contains("super-secret-42")));
}

#[tokio::test]
async fn test_failing_step_fails_run() {
    let h = harness(SecretManager::new("static"));
    let run = run_yaml(
        &h,
        r#"
name: broken
jobs:
  - name: flaky
    steps:
      - name: boom
        run: exit 3
      - name: never
        run: echo unreachable
  - name: after
    needs: [flaky]
    steps:
      - name: noop
        run: "true"
"#,
    )
    .await;

    assert_eq!(run.status, RunStatus::Failure);
    let flaky = run.job("flaky").unwrap();
    assert_eq!(flaky.status, JobStatus::Failure);
    assert_eq!(flaky.steps[0].exit_code, Some(3));
    assert_eq!(run.job("after").unwrap().status, JobStatus::Skipped);
}
