//! Command handlers.

use crate::commands::{EventKind, RunArgs};
use crate::executor::LocalJobExecutor;
use crate::output::ConsoleEventSink;
use anyhow::Context;
use chrono::Utc;
use console::style;
use gantry_artifacts::{ArtifactStore, FilesystemStore};
use gantry_core::ids::RunId;
use gantry_core::pipeline::PipelineDefinition;
use gantry_core::run::RunStatus;
use gantry_notify::WebhookSender;
use gantry_runner::{ActionRegistry, ShellWorker, StepExecutor};
use gantry_scheduler::{JobGraph, Scheduler, SchedulerConfig, TriggerEvent, TriggerMatcher};
use gantry_secrets::{EnvProvider, SecretManager, StaticProvider};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Parse and structurally validate a pipeline file, including its job
/// graph.
pub fn validate(path: &str) -> anyhow::Result<()> {
    let pipeline = load_pipeline(path)?;
    JobGraph::build(&pipeline)?;

    println!(
        "{} Pipeline \"{}\" is valid",
        style("✓").green(),
        pipeline.name
    );
    println!("  Jobs: {}", pipeline.jobs.len());
    for job in &pipeline.jobs {
        if job.needs.is_empty() {
            println!("    - {}", job.name);
        } else {
            println!("    - {} (needs {})", job.name, job.needs.join(", "));
        }
    }
    Ok(())
}

/// Execute a pipeline locally. Returns the process exit code.
pub async fn run(args: RunArgs) -> anyhow::Result<i32> {
    let pipeline = load_pipeline(&args.path)?;

    let event = build_event(&args);
    let mut matcher = TriggerMatcher::new();
    if !args.force && !matcher.matches(&pipeline.triggers, &event) {
        println!(
            "{} No trigger rule matches this event; use --force to run anyway",
            style("!").yellow()
        );
        return Ok(0);
    }

    let mut secrets = SecretManager::new("env");
    secrets.register_provider("env", Arc::new(EnvProvider::with_prefix("GANTRY_SECRET_")));
    if !args.secrets.is_empty() {
        let mut values = std::collections::HashMap::new();
        for entry in &args.secrets {
            let (name, value) = entry
                .split_once('=')
                .ok_or_else(|| anyhow::anyhow!("--secret expects NAME=VALUE, got '{entry}'"))?;
            values.insert(name.to_string(), value.to_string());
        }
        secrets.register_provider("cli", Arc::new(StaticProvider::new(values)));
    }

    let blobs = Arc::new(FilesystemStore::new(args.data_dir.join("artifacts")));
    let artifacts = Arc::new(
        ArtifactStore::new(blobs).with_events(Arc::new(ConsoleEventSink)),
    );
    let actions = Arc::new(ActionRegistry::with_builtins(artifacts));
    let worker = Arc::new(ShellWorker::new());
    let executor = Arc::new(LocalJobExecutor::new(StepExecutor::new(worker, actions)));

    let config = SchedulerConfig {
        concurrency: args.concurrency,
        grace_period: Duration::from_secs(10),
        workspace_root: args.data_dir.join("workspaces"),
    };
    let mut scheduler = Scheduler::new(
        executor,
        Arc::new(secrets),
        Arc::new(ConsoleEventSink),
        config,
    );
    if let Some(url) = &args.webhook {
        scheduler = scheduler.with_notifier(Arc::new(WebhookSender::new(url)));
    }

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{} Cancelling run...", style("!").yellow());
            let _ = cancel_tx.send(true);
        }
    });

    let run = scheduler
        .run_with_cancel(&pipeline, event.to_trigger_info(), cancel_rx)
        .await?;

    let records = args.data_dir.join("runs");
    std::fs::create_dir_all(&records)?;
    let record_path = records.join(format!("{}.json", run.id));
    std::fs::write(&record_path, serde_json::to_vec_pretty(&run)?)?;
    println!("  Run record: {}", record_path.display());

    Ok(match run.status {
        RunStatus::Success => 0,
        _ => 1,
    })
}

pub async fn list_artifacts(run_id: &str, data_dir: &Path) -> anyhow::Result<()> {
    let run_id: RunId = run_id.parse().context("invalid run id")?;
    let store = artifact_store(data_dir);

    let artifacts = store.list(run_id).await?;
    if artifacts.is_empty() {
        println!("{} No artifacts for this run", style("i").blue());
        return Ok(());
    }
    for artifact in artifacts {
        println!(
            "{}  {} files, {} bytes, expires {}",
            style(&artifact.name).bold(),
            artifact.file_count,
            artifact.size_bytes,
            artifact.expires_at.format("%Y-%m-%d")
        );
    }
    Ok(())
}

pub async fn download_artifact(
    run_id: &str,
    name: &str,
    dest: &Path,
    data_dir: &Path,
) -> anyhow::Result<()> {
    let run_id: RunId = run_id.parse().context("invalid run id")?;
    let store = artifact_store(data_dir);

    let artifact = store.download(run_id, name, dest).await?;
    println!(
        "{} Downloaded {} ({} files) to {}",
        style("✓").green(),
        artifact.name,
        artifact.file_count,
        dest.display()
    );
    Ok(())
}

pub async fn sweep_artifacts(data_dir: &Path) -> anyhow::Result<()> {
    let store = artifact_store(data_dir);
    let removed = store.sweep_expired(Utc::now()).await?;
    println!("{} Removed {} expired artifacts", style("✓").green(), removed.len());
    Ok(())
}

fn load_pipeline(path: &str) -> anyhow::Result<PipelineDefinition> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read pipeline file {path}"))?;
    let pipeline = PipelineDefinition::from_yaml(&content)
        .with_context(|| format!("invalid pipeline in {path}"))?;
    Ok(pipeline)
}

fn artifact_store(data_dir: &Path) -> ArtifactStore {
    ArtifactStore::new(Arc::new(FilesystemStore::new(data_dir.join("artifacts"))))
}

fn build_event(args: &RunArgs) -> TriggerEvent {
    let branch = args.branch.clone().unwrap_or_else(|| "main".to_string());
    match args.event {
        EventKind::Push => TriggerEvent::Push {
            branch,
            commit: args.commit.clone(),
        },
        EventKind::PullRequest => TriggerEvent::PullRequest {
            source_branch: "local".to_string(),
            target_branch: branch,
        },
        EventKind::Manual => TriggerEvent::Manual {
            actor: std::env::var("USER").ok(),
        },
        EventKind::Schedule => TriggerEvent::Tick { at: Utc::now() },
    }
}
