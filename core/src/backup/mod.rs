// Copyright 2024, The Kaspa AIO Project
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
// following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
// disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
// following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
// products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
// INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
// DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
// SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
// WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
// USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

//! # Backup manager
//!
//! Timestamped snapshots of the declarative artifacts under
//! `.kaspa-backups/<snapshotId>/`, with a `backup-metadata.json` sidecar.
//! Restores swap files back with the same two-phase write the store uses, and
//! roll already-swapped files back if a later file fails.

use crate::{
    config_store::{fs, ConfigDiff, EnvFile},
    error::{BoundaryError, ErrorKind},
};
use chrono::{DateTime, Utc};
use log::*;
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::sync::Mutex;

const LOG_TARGET: &str = "aio::backup";

pub const BACKUPS_DIR: &str = ".kaspa-backups";
pub const METADATA_FILE: &str = "backup-metadata.json";
pub const DEFAULT_RETENTION: usize = 20;

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("Snapshot failed: {0}")]
    SnapshotFailed(String),
    #[error("Restore failed: {0}")]
    RestoreFailed(String),
    #[error("Unknown snapshot `{0}`")]
    NotFound(String),
    #[error("IO error in backup directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid snapshot metadata: {0}")]
    Json(#[from] serde_json::Error),
}

impl BoundaryError for BackupError {
    fn kind(&self) -> ErrorKind {
        match self {
            BackupError::SnapshotFailed(_) | BackupError::Io(_) => ErrorKind::SnapshotFailed,
            BackupError::RestoreFailed(_) => ErrorKind::RestoreFailed,
            BackupError::NotFound(_) => ErrorKind::Validation,
            BackupError::Json(_) => ErrorKind::Internal,
        }
    }
}

/// One artifact the manager snapshots. Optional artifacts may be absent from
/// the live tree without failing the snapshot.
#[derive(Debug, Clone)]
pub struct ArtifactSpec {
    pub logical_name: String,
    pub file_name: String,
    pub description: String,
    pub required: bool,
}

impl ArtifactSpec {
    fn new(logical_name: &str, file_name: &str, description: &str, required: bool) -> Self {
        Self {
            logical_name: logical_name.to_string(),
            file_name: file_name.to_string(),
            description: description.to_string(),
            required,
        }
    }
}

fn default_artifacts() -> Vec<ArtifactSpec> {
    vec![
        ArtifactSpec::new(".env", ".env", "Environment configuration", true),
        ArtifactSpec::new("docker-compose.yml", "docker-compose.yml", "Service definitions", true),
        ArtifactSpec::new(
            "docker-compose.override.yml",
            "docker-compose.override.yml",
            "Local service overrides",
            false,
        ),
        ArtifactSpec::new(
            "installation-state.json",
            ".kaspa-aio/installation-state.json",
            "Installation state",
            false,
        ),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotFile {
    pub logical_name: String,
    pub file_name: String,
    pub size_bytes: u64,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    pub snapshot_id: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    pub files: Vec<SnapshotFile>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotInfo {
    #[serde(flatten)]
    pub metadata: SnapshotMetadata,
    pub age_secs: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreOutcome {
    pub snapshot_id: String,
    pub pre_restore_snapshot_id: Option<String>,
    pub restored_files: Vec<String>,
}

#[derive(Clone)]
pub struct BackupManager {
    root: PathBuf,
    artifacts: Arc<Vec<ArtifactSpec>>,
    retention: usize,
    write_lock: Arc<Mutex<()>>,
}

impl BackupManager {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self::with_retention(root, DEFAULT_RETENTION)
    }

    pub fn with_retention<P: AsRef<Path>>(root: P, retention: usize) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            artifacts: Arc::new(default_artifacts()),
            retention: retention.max(1),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.root.join(BACKUPS_DIR)
    }

    fn snapshot_dir(&self, id: &str) -> PathBuf {
        self.backups_dir().join(id)
    }

    /// Copies every configured artifact into a fresh snapshot directory and
    /// writes the metadata sidecar. A missing optional artifact is skipped; a
    /// missing required artifact aborts and removes the partial directory.
    pub async fn create(&self, reason: &str, metadata: serde_json::Value) -> Result<SnapshotMetadata, BackupError> {
        let _guard = self.write_lock.lock().await;
        let created_at = Utc::now();
        let snapshot_id = self.next_snapshot_id(created_at).await?;
        let dir = self.snapshot_dir(&snapshot_id);
        tokio::fs::create_dir_all(&dir).await?;

        let mut files = Vec::new();
        for artifact in self.artifacts.iter() {
            let source = self.root.join(&artifact.file_name);
            match fs::read_opt(&source).await? {
                Some(bytes) => {
                    let target = dir.join(&artifact.logical_name);
                    if let Err(err) = fs::write_atomic(&target, &bytes).await {
                        tokio::fs::remove_dir_all(&dir).await.ok();
                        return Err(BackupError::SnapshotFailed(format!(
                            "failed to copy {}: {}",
                            artifact.logical_name, err
                        )));
                    }
                    files.push(SnapshotFile {
                        logical_name: artifact.logical_name.clone(),
                        file_name: artifact.file_name.clone(),
                        size_bytes: bytes.len() as u64,
                        description: artifact.description.clone(),
                    });
                },
                None if artifact.required => {
                    tokio::fs::remove_dir_all(&dir).await.ok();
                    return Err(BackupError::SnapshotFailed(format!(
                        "required artifact {} is missing",
                        artifact.logical_name
                    )));
                },
                None => {
                    debug!(target: LOG_TARGET, "optional artifact {} absent, skipping", artifact.logical_name);
                },
            }
        }

        let meta = SnapshotMetadata {
            snapshot_id: snapshot_id.clone(),
            reason: reason.to_string(),
            created_at,
            files,
            metadata,
        };
        fs::write_atomic(&dir.join(METADATA_FILE), &serde_json::to_vec_pretty(&meta)?).await?;
        info!(target: LOG_TARGET, "created snapshot {} ({})", snapshot_id, reason);

        self.apply_retention().await?;
        Ok(meta)
    }

    /// Newest first.
    pub async fn list(&self, limit: Option<usize>) -> Result<Vec<SnapshotInfo>, BackupError> {
        let mut ids = self.snapshot_ids().await?;
        ids.reverse();
        if let Some(limit) = limit {
            ids.truncate(limit);
        }
        let mut infos = Vec::with_capacity(ids.len());
        for id in ids {
            infos.push(self.get(&id).await?);
        }
        Ok(infos)
    }

    pub async fn get(&self, snapshot_id: &str) -> Result<SnapshotInfo, BackupError> {
        let metadata = self.read_metadata(snapshot_id).await?;
        let age_secs = (Utc::now() - metadata.created_at).num_seconds();
        Ok(SnapshotInfo { metadata, age_secs })
    }

    pub async fn delete(&self, snapshot_id: &str) -> Result<(), BackupError> {
        let _guard = self.write_lock.lock().await;
        let dir = self.snapshot_dir(snapshot_id);
        if !dir.exists() {
            return Err(BackupError::NotFound(snapshot_id.to_string()));
        }
        tokio::fs::remove_dir_all(&dir).await?;
        Ok(())
    }

    /// Swaps every file of the snapshot into the live tree. On a mid-restore
    /// failure the files already swapped are put back, so the live state keeps
    /// pointing at the pre-restore content.
    pub async fn restore(&self, snapshot_id: &str, create_backup_before_restore: bool) -> Result<RestoreOutcome, BackupError> {
        let metadata = self.read_metadata(snapshot_id).await?;

        let pre_restore_snapshot_id = if create_backup_before_restore {
            let meta = self
                .create("pre-restore", serde_json::json!({ "restoringTo": snapshot_id }))
                .await?;
            Some(meta.snapshot_id)
        } else {
            None
        };

        let _guard = self.write_lock.lock().await;
        let dir = self.snapshot_dir(snapshot_id);
        let mut swapped: Vec<(PathBuf, Option<Vec<u8>>)> = Vec::new();
        let mut restored_files = Vec::new();

        for file in &metadata.files {
            let source = dir.join(&file.logical_name);
            let target = self.root.join(&file.file_name);
            let result = async {
                let bytes = fs::read_opt(&source)
                    .await?
                    .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "snapshot file missing"))?;
                let previous = fs::read_opt(&target).await?;
                fs::write_atomic(&target, &bytes).await?;
                Ok::<_, std::io::Error>(previous)
            }
            .await;

            match result {
                Ok(previous) => {
                    swapped.push((target, previous));
                    restored_files.push(file.logical_name.clone());
                },
                Err(err) => {
                    error!(
                        target: LOG_TARGET,
                        "restore of {} failed at {}: {}; rolling back {} file(s)",
                        snapshot_id,
                        file.logical_name,
                        err,
                        swapped.len()
                    );
                    for (path, previous) in swapped.into_iter().rev() {
                        match previous {
                            Some(bytes) => {
                                fs::write_atomic(&path, &bytes).await.ok();
                            },
                            None => {
                                tokio::fs::remove_file(&path).await.ok();
                            },
                        }
                    }
                    return Err(BackupError::RestoreFailed(format!("{}: {}", file.logical_name, err)));
                },
            }
        }

        info!(target: LOG_TARGET, "restored snapshot {}", snapshot_id);
        Ok(RestoreOutcome {
            snapshot_id: snapshot_id.to_string(),
            pre_restore_snapshot_id,
            restored_files,
        })
    }

    /// `ConfigDiff` between the environment artifacts of two snapshots, in the
    /// direction a → b.
    pub async fn diff(&self, a: &str, b: &str) -> Result<ConfigDiff, BackupError> {
        let env_a = self.read_env_artifact(a).await?;
        let env_b = self.read_env_artifact(b).await?;
        Ok(env_a.diff(&env_b.to_map()))
    }

    async fn read_env_artifact(&self, snapshot_id: &str) -> Result<EnvFile, BackupError> {
        // Validates the snapshot exists even when the artifact is absent.
        self.read_metadata(snapshot_id).await?;
        let path = self.snapshot_dir(snapshot_id).join(".env");
        let contents = fs::read_string_opt(&path).await?.unwrap_or_default();
        Ok(EnvFile::parse(&contents))
    }

    async fn read_metadata(&self, snapshot_id: &str) -> Result<SnapshotMetadata, BackupError> {
        let path = self.snapshot_dir(snapshot_id).join(METADATA_FILE);
        let contents = fs::read_string_opt(&path)
            .await?
            .ok_or_else(|| BackupError::NotFound(snapshot_id.to_string()))?;
        Ok(serde_json::from_str(&contents)?)
    }

    async fn snapshot_ids(&self) -> Result<Vec<String>, BackupError> {
        let dir = self.backups_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    ids.push(name.to_string());
                }
            }
        }
        // Ids are timestamp-derived, so the lexicographic order is the
        // chronological order.
        ids.sort();
        Ok(ids)
    }

    /// Timestamp-derived and strictly increasing even within one millisecond.
    async fn next_snapshot_id(&self, now: DateTime<Utc>) -> Result<String, BackupError> {
        let base = now.format("%Y%m%d-%H%M%S-%3f").to_string();
        if !self.snapshot_dir(&base).exists() {
            return Ok(base);
        }
        for n in 2..100 {
            let candidate = format!("{}-{:02}", base, n);
            if !self.snapshot_dir(&candidate).exists() {
                return Ok(candidate);
            }
        }
        Err(BackupError::SnapshotFailed("could not allocate a snapshot id".to_string()))
    }

    /// Keeps the newest `retention` snapshots.
    async fn apply_retention(&self) -> Result<(), BackupError> {
        let ids = self.snapshot_ids().await?;
        if ids.len() <= self.retention {
            return Ok(());
        }
        let excess = ids.len() - self.retention;
        for id in ids.into_iter().take(excess) {
            debug!(target: LOG_TARGET, "retention: deleting snapshot {}", id);
            tokio::fs::remove_dir_all(self.snapshot_dir(&id)).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    async fn seed_project(root: &Path) {
        fs::write_atomic(&root.join(".env"), b"A=1\nB=2\n").await.unwrap();
        fs::write_atomic(&root.join("docker-compose.yml"), b"services:\n  kaspa-node:\n    image: kaspanet/kaspad:v0.12.19\n")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn create_then_restore_reproduces_exact_bytes() {
        let dir = tempfile::tempdir().unwrap();
        seed_project(dir.path()).await;
        let manager = BackupManager::new(dir.path());

        let snapshot = manager.create("test", serde_json::json!({})).await.unwrap();
        assert_eq!(snapshot.files.len(), 2);

        // Mutate the live artifacts.
        fs::write_atomic(&dir.path().join(".env"), b"A=9\n").await.unwrap();
        fs::write_atomic(&dir.path().join("docker-compose.yml"), b"services: {}\n").await.unwrap();

        let outcome = manager.restore(&snapshot.snapshot_id, false).await.unwrap();
        assert_eq!(outcome.restored_files.len(), 2);
        assert_eq!(tokio::fs::read(dir.path().join(".env")).await.unwrap(), b"A=1\nB=2\n");
        assert_eq!(
            tokio::fs::read(dir.path().join("docker-compose.yml")).await.unwrap(),
            b"services:\n  kaspa-node:\n    image: kaspanet/kaspad:v0.12.19\n"
        );
    }

    #[tokio::test]
    async fn restore_can_snapshot_the_current_state_first() {
        let dir = tempfile::tempdir().unwrap();
        seed_project(dir.path()).await;
        let manager = BackupManager::new(dir.path());

        let snapshot = manager.create("initial", serde_json::json!({})).await.unwrap();
        fs::write_atomic(&dir.path().join(".env"), b"A=9\n").await.unwrap();

        let outcome = manager.restore(&snapshot.snapshot_id, true).await.unwrap();
        let pre_id = outcome.pre_restore_snapshot_id.unwrap();
        let diff = manager.diff(&pre_id, &snapshot.snapshot_id).await.unwrap();
        // Pre-restore snapshot captured A=9; restoring brought back A=1, B=2.
        assert_eq!(diff.changes.len(), 2);
    }

    #[tokio::test]
    async fn missing_required_artifact_aborts_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        // No .env present.
        fs::write_atomic(&dir.path().join("docker-compose.yml"), b"services: {}\n").await.unwrap();
        let manager = BackupManager::new(dir.path());

        let err = manager.create("test", serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, BackupError::SnapshotFailed(_)));
        // No partial snapshot directory is left behind.
        assert!(manager.list(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_is_newest_first_and_ids_are_monotonic() {
        let dir = tempfile::tempdir().unwrap();
        seed_project(dir.path()).await;
        let manager = BackupManager::new(dir.path());

        let first = manager.create("one", serde_json::json!({})).await.unwrap();
        let second = manager.create("two", serde_json::json!({})).await.unwrap();
        assert!(second.snapshot_id > first.snapshot_id);

        let listed = manager.list(None).await.unwrap();
        assert_eq!(listed[0].metadata.snapshot_id, second.snapshot_id);
        assert!(listed[0].age_secs >= 0);

        let limited = manager.list(Some(1)).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn retention_deletes_the_oldest() {
        let dir = tempfile::tempdir().unwrap();
        seed_project(dir.path()).await;
        let manager = BackupManager::with_retention(dir.path(), 2);

        let first = manager.create("one", serde_json::json!({})).await.unwrap();
        manager.create("two", serde_json::json!({})).await.unwrap();
        manager.create("three", serde_json::json!({})).await.unwrap();

        let listed = manager.list(None).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|s| s.metadata.snapshot_id != first.snapshot_id));
    }

    #[tokio::test]
    async fn diff_between_snapshots_follows_env_semantics() {
        let dir = tempfile::tempdir().unwrap();
        seed_project(dir.path()).await;
        let manager = BackupManager::new(dir.path());
        let a = manager.create("a", serde_json::json!({})).await.unwrap();

        fs::write_atomic(&dir.path().join(".env"), b"A=1\nB=3\nC=4\n").await.unwrap();
        let b = manager.create("b", serde_json::json!({})).await.unwrap();

        let diff = manager.diff(&a.snapshot_id, &b.snapshot_id).await.unwrap();
        let kinds: Vec<_> = diff.changes.iter().map(|c| (c.key.as_str(), c.kind)).collect();
        assert_eq!(
            kinds,
            vec![("B", crate::config_store::ChangeKind::Modified), ("C", crate::config_store::ChangeKind::Added)]
        );
    }

    #[tokio::test]
    async fn unknown_snapshot_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let manager = BackupManager::new(dir.path());
        assert!(matches!(manager.get("nope").await.unwrap_err(), BackupError::NotFound(_)));
    }
}
