//! Reusable action adapters.
//!
//! Actions are opaque capabilities referenced by `uses:` steps. Each adapter
//! receives the step's flat configuration mapping and reports the same shape
//! a command does: exit code, output lines, environment mutations. Adapters
//! are registered explicitly; there is no dynamic plugin loading.

use async_trait::async_trait;
use gantry_artifacts::ArtifactStore;
use gantry_core::ids::RunId;
use gantry_core::ports::OutputLine;
use gantry_core::{Error, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Input to an action invocation.
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub run_id: RunId,
    pub workspace: PathBuf,
    /// The step's `with:` mapping.
    pub config: HashMap<String, String>,
    /// The job's accumulated environment at this step.
    pub env: HashMap<String, String>,
}

impl ActionContext {
    fn require(&self, key: &str) -> Result<&str> {
        self.config
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| Error::ActionFailed(format!("missing required option '{}'", key)))
    }
}

/// Result of an action invocation.
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub exit_code: i32,
    pub output: Vec<OutputLine>,
    pub env_mutations: HashMap<String, String>,
}

impl ActionOutcome {
    pub fn ok(output: Vec<OutputLine>) -> Self {
        Self {
            exit_code: 0,
            output,
            env_mutations: HashMap::new(),
        }
    }
}

#[async_trait]
pub trait ActionAdapter: Send + Sync {
    async fn execute(&self, ctx: ActionContext) -> Result<ActionOutcome>;
}

/// Name-keyed adapter registry.
#[derive(Default)]
pub struct ActionRegistry {
    adapters: HashMap<String, Arc<dyn ActionAdapter>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in adapters wired to an artifact store.
    pub fn with_builtins(artifacts: Arc<ArtifactStore>) -> Self {
        let mut registry = Self::new();
        registry.register(
            "artifact/upload",
            Arc::new(UploadArtifactAction::new(artifacts.clone())),
        );
        registry.register(
            "artifact/download",
            Arc::new(DownloadArtifactAction::new(artifacts)),
        );
        registry.register("core/set-env", Arc::new(SetEnvAction));
        registry
    }

    pub fn register(&mut self, name: &str, adapter: Arc<dyn ActionAdapter>) {
        debug!(action = %name, "Registering action adapter");
        self.adapters.insert(name.to_string(), adapter);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ActionAdapter>> {
        self.adapters.get(name).cloned()
    }
}

/// `artifact/upload` — pack workspace files into a named run artifact.
///
/// Options: `name`, `paths` (comma-separated globs), `retention_days`.
pub struct UploadArtifactAction {
    store: Arc<ArtifactStore>,
}

impl UploadArtifactAction {
    pub fn new(store: Arc<ArtifactStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ActionAdapter for UploadArtifactAction {
    async fn execute(&self, ctx: ActionContext) -> Result<ActionOutcome> {
        let name = ctx.require("name")?;
        let patterns: Vec<String> = ctx
            .require("paths")?
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        let retention_days = ctx
            .config
            .get("retention_days")
            .map(|v| {
                v.parse::<i64>()
                    .map_err(|_| Error::ActionFailed(format!("bad retention_days: '{}'", v)))
            })
            .transpose()?;

        let artifact = self
            .store
            .upload(ctx.run_id, name, &ctx.workspace, &patterns, retention_days)
            .await?;

        Ok(ActionOutcome::ok(vec![OutputLine::stdout(format!(
            "uploaded artifact '{}' ({} files, {} bytes)",
            artifact.name, artifact.file_count, artifact.size_bytes
        ))]))
    }
}

/// `artifact/download` — restore a run artifact into the workspace.
///
/// Options: `name`, optional `dest` subdirectory.
pub struct DownloadArtifactAction {
    store: Arc<ArtifactStore>,
}

impl DownloadArtifactAction {
    pub fn new(store: Arc<ArtifactStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ActionAdapter for DownloadArtifactAction {
    async fn execute(&self, ctx: ActionContext) -> Result<ActionOutcome> {
        let name = ctx.require("name")?;
        let dest = match ctx.config.get("dest") {
            Some(sub) => ctx.workspace.join(sub),
            None => ctx.workspace.clone(),
        };

        let artifact = self.store.download(ctx.run_id, name, &dest).await?;

        Ok(ActionOutcome::ok(vec![OutputLine::stdout(format!(
            "downloaded artifact '{}' ({} files)",
            artifact.name, artifact.file_count
        ))]))
    }
}

/// `core/set-env` — expose each option as an environment mutation for the
/// remaining steps of the job.
pub struct SetEnvAction;

#[async_trait]
impl ActionAdapter for SetEnvAction {
    async fn execute(&self, ctx: ActionContext) -> Result<ActionOutcome> {
        Ok(ActionOutcome {
            exit_code: 0,
            output: vec![],
            env_mutations: ctx.config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_artifacts::FilesystemStore;

    fn context(config: &[(&str, &str)], workspace: &std::path::Path) -> ActionContext {
        ActionContext {
            run_id: RunId::new(),
            workspace: workspace.to_path_buf(),
            config: config
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            env: HashMap::new(),
        }
    }

    fn artifact_store(dir: &std::path::Path) -> Arc<ArtifactStore> {
        Arc::new(ArtifactStore::new(Arc::new(FilesystemStore::new(dir))))
    }

    #[tokio::test]
    async fn test_upload_then_download_roundtrip() {
        let blobs = tempfile::tempdir().unwrap();
        let ws = tempfile::tempdir().unwrap();
        std::fs::write(ws.path().join("out.bin"), b"bits").unwrap();
        let store = artifact_store(blobs.path());

        let upload = UploadArtifactAction::new(store.clone());
        let mut ctx = context(&[("name", "out"), ("paths", "*.bin")], ws.path());
        let outcome = upload.execute(ctx.clone()).await.unwrap();
        assert_eq!(outcome.exit_code, 0);

        let dest = tempfile::tempdir().unwrap();
        let download = DownloadArtifactAction::new(store);
        ctx.workspace = dest.path().to_path_buf();
        ctx.config.remove("paths");
        download.execute(ctx).await.unwrap();

        assert_eq!(std::fs::read(dest.path().join("out.bin")).unwrap(), b"bits");
    }

    #[tokio::test]
    async fn test_upload_missing_option() {
        let blobs = tempfile::tempdir().unwrap();
        let ws = tempfile::tempdir().unwrap();
        let upload = UploadArtifactAction::new(artifact_store(blobs.path()));

        let err = upload
            .execute(context(&[("name", "out")], ws.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ActionFailed(_)));
    }

    #[tokio::test]
    async fn test_set_env_mutations() {
        let ws = tempfile::tempdir().unwrap();
        let outcome = SetEnvAction
            .execute(context(&[("DEPLOY_ENV", "staging")], ws.path()))
            .await
            .unwrap();
        assert_eq!(outcome.env_mutations.get("DEPLOY_ENV").unwrap(), "staging");
    }

    #[test]
    fn test_registry_lookup() {
        let blobs = tempfile::tempdir().unwrap();
        let registry = ActionRegistry::with_builtins(artifact_store(blobs.path()));
        assert!(registry.get("artifact/upload").is_some());
        assert!(registry.get("artifact/download").is_some());
        assert!(registry.get("no/such-action").is_none());
    }
}
