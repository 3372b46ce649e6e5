//! The artifact store: upload, download, retention.

use crate::archive;
use chrono::{DateTime, Duration, Utc};
use gantry_core::events::{ArtifactUploadedPayload, Event};
use gantry_core::ids::{ArtifactId, RunId};
use gantry_core::ports::{BlobStore, EventSink, NullEventSink};
use gantry_core::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Durable record of an uploaded artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    pub run_id: RunId,
    pub name: String,
    pub size_bytes: u64,
    pub file_count: usize,
    /// Hex sha256 of the packed blob.
    pub checksum: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Name-addressed artifact storage scoped per run.
pub struct ArtifactStore {
    blobs: Arc<dyn BlobStore>,
    events: Arc<dyn EventSink>,
    default_retention_days: i64,
}

impl ArtifactStore {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            blobs,
            events: Arc::new(NullEventSink),
            default_retention_days: 30,
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_retention_days(mut self, days: i64) -> Self {
        self.default_retention_days = days;
        self
    }

    fn data_key(run_id: RunId, name: &str) -> String {
        format!("runs/{}/{}.tar", run_id, name)
    }

    fn meta_key(run_id: RunId, name: &str) -> String {
        format!("runs/{}/{}.json", run_id, name)
    }

    fn check_name(name: &str) -> Result<()> {
        if name.is_empty() || name.contains('/') {
            return Err(Error::InvalidPipeline(format!(
                "invalid artifact name: '{}'",
                name
            )));
        }
        Ok(())
    }

    /// Pack the files matched by `patterns` (relative to `workspace`) and
    /// store them under `name` for this run. Fails with `EmptyArtifact`
    /// when nothing matches.
    pub async fn upload(
        &self,
        run_id: RunId,
        name: &str,
        workspace: &Path,
        patterns: &[String],
        retention_days: Option<i64>,
    ) -> Result<Artifact> {
        Self::check_name(name)?;

        let files = match_patterns(workspace, patterns)?;
        if files.is_empty() {
            return Err(Error::EmptyArtifact(name.to_string()));
        }

        let blob = archive::create_archive(&files, workspace)?;
        let checksum = hex::encode(Sha256::digest(&blob));

        let created_at = Utc::now();
        let retention = Duration::days(retention_days.unwrap_or(self.default_retention_days));
        let artifact = Artifact {
            id: ArtifactId::new(),
            run_id,
            name: name.to_string(),
            size_bytes: blob.len() as u64,
            file_count: files.len(),
            checksum,
            created_at,
            expires_at: created_at + retention,
        };

        self.blobs.put(&Self::data_key(run_id, name), &blob).await?;
        self.blobs
            .put(
                &Self::meta_key(run_id, name),
                &serde_json::to_vec(&artifact)?,
            )
            .await?;

        info!(
            run_id = %run_id,
            artifact = %name,
            files = artifact.file_count,
            size = artifact.size_bytes,
            "Artifact uploaded"
        );
        let event = Event::ArtifactUploaded(ArtifactUploadedPayload {
            run_id,
            name: name.to_string(),
            size_bytes: artifact.size_bytes,
        });
        if let Err(e) = self.events.publish(event).await {
            warn!(artifact = %name, error = %e, "Event publish failed");
        }
        Ok(artifact)
    }

    /// Restore the named artifact's files into `dest`, byte-identical to
    /// what was uploaded. The blob is read fully before unpacking, so a
    /// concurrent retention sweep cannot truncate an in-flight download.
    pub async fn download(&self, run_id: RunId, name: &str, dest: &Path) -> Result<Artifact> {
        let artifact = self.get(run_id, name).await?;

        let blob = self
            .blobs
            .get(&Self::data_key(run_id, name))
            .await?
            .ok_or_else(|| Error::ArtifactNotFound(name.to_string()))?;

        let checksum = hex::encode(Sha256::digest(&blob));
        if checksum != artifact.checksum {
            return Err(Error::BlobStorage(format!(
                "checksum mismatch for artifact '{}'",
                name
            )));
        }

        archive::extract_archive(&blob, dest)?;
        debug!(run_id = %run_id, artifact = %name, "Artifact downloaded");
        Ok(artifact)
    }

    /// Metadata for one artifact of a run.
    pub async fn get(&self, run_id: RunId, name: &str) -> Result<Artifact> {
        let bytes = self
            .blobs
            .get(&Self::meta_key(run_id, name))
            .await?
            .ok_or_else(|| Error::ArtifactNotFound(name.to_string()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// All artifacts uploaded by a run.
    pub async fn list(&self, run_id: RunId) -> Result<Vec<Artifact>> {
        let prefix = format!("runs/{}", run_id);
        let mut artifacts = Vec::new();
        for key in self.blobs.list(&prefix).await? {
            if !key.ends_with(".json") {
                continue;
            }
            if let Some(bytes) = self.blobs.get(&key).await? {
                artifacts.push(serde_json::from_slice(&bytes)?);
            }
        }
        Ok(artifacts)
    }

    /// Delete artifacts past their retention window. Returns what was
    /// removed.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<Vec<Artifact>> {
        let mut removed = Vec::new();
        for key in self.blobs.list("runs").await? {
            if !key.ends_with(".json") {
                continue;
            }
            let Some(bytes) = self.blobs.get(&key).await? else {
                continue;
            };
            let artifact: Artifact = serde_json::from_slice(&bytes)?;
            if artifact.expires_at <= now {
                self.blobs
                    .delete(&Self::data_key(artifact.run_id, &artifact.name))
                    .await?;
                self.blobs.delete(&key).await?;
                info!(artifact = %artifact.name, run_id = %artifact.run_id, "Artifact expired");
                removed.push(artifact);
            }
        }
        Ok(removed)
    }
}

/// Expand glob patterns into file paths relative to the workspace.
fn match_patterns(workspace: &Path, patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for pattern in patterns {
        let full = workspace.join(pattern);
        let full = full.to_string_lossy();
        let matched = glob::glob(&full)
            .map_err(|e| Error::InvalidPipeline(format!("bad glob '{}': {}", pattern, e)))?;
        for entry in matched {
            let path =
                entry.map_err(|e| Error::Internal(format!("glob walk failed: {}", e)))?;
            if path.is_file()
                && let Ok(relative) = path.strip_prefix(workspace)
            {
                files.push(relative.to_path_buf());
            }
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}
