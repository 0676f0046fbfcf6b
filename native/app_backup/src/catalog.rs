use std::{
    error::Error,
    path::{Path, PathBuf},
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::{Context, Result, ensure};
use derive_more::Debug;
use serde::Serialize;
use tokio::fs;
use tracing::{debug, info, instrument, trace, warn};

use crate::{
    crypto::ENCRYPTED_EXTENSION,
    metadata_store::MetadataStore,
    models::{BackupMode, PackageName},
    orchestrator::package_dir,
    utils::dir_size,
};

/// One package backup found under the backups root
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupEntry {
    pub package_name: PackageName,
    pub label: String,
    pub path: PathBuf,
    pub backup_mode: BackupMode,
    pub is_encrypted: bool,
    /// Whether the recorded artifact (plain or encrypted) is present
    pub has_apk: bool,
    /// Milliseconds since Unix epoch
    pub timestamp: u64,
    pub total_size: u64,
}

/// Lists and deletes package backups under a backups root
#[derive(Debug, Clone)]
pub struct BackupCatalog {
    #[debug(skip)]
    metadata: Arc<dyn MetadataStore>,
}

impl BackupCatalog {
    pub fn new(metadata: Arc<dyn MetadataStore>) -> Self {
        Self { metadata }
    }

    /// Every package backup under `root` with readable metadata, newest first
    #[instrument(skip(self), fields(root = %root.display()), err)]
    pub async fn list(&self, root: &Path) -> Result<Vec<BackupEntry>> {
        ensure!(root.is_dir(), "Backups directory does not exist: {}", root.display());

        let mut entries = Vec::new();
        let mut rd = fs::read_dir(root).await.context("Failed to read backups directory")?;
        while let Some(item) = rd.next_entry().await? {
            if !item.file_type().await?.is_dir() {
                continue;
            }
            let Some(package) =
                item.file_name().to_str().and_then(|name| PackageName::parse(name).ok())
            else {
                trace!(path = %item.path().display(), "Skipping non-package directory");
                continue;
            };
            match self.build_entry(root, &package).await {
                Ok(Some(entry)) => entries.push(entry),
                Ok(None) => trace!(%package, "No metadata, skipping"),
                Err(e) => {
                    warn!(%package, error = e.as_ref() as &dyn Error, "Skipping unreadable backup")
                }
            }
        }

        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        debug!(count = entries.len(), "Finished scanning backups");
        Ok(entries)
    }

    async fn build_entry(&self, root: &Path, package: &PackageName) -> Result<Option<BackupEntry>> {
        let dir = package_dir(root, package);
        let Some(metadata) = self.metadata.read(&dir, package).await? else {
            return Ok(None);
        };

        let mut timestamp = metadata.last_backup_millis;
        if timestamp == 0
            && let Ok(meta) = fs::metadata(&dir).await
            && let Ok(modified) = meta.modified()
        {
            timestamp = system_time_to_millis(modified);
        }

        let has_apk = match metadata.apk_name() {
            Some(apk) => {
                dir.join(apk).is_file()
                    || dir.join(format!("{apk}.{ENCRYPTED_EXTENSION}")).is_file()
            }
            None => false,
        };
        let total_size = dir_size(&dir).await.unwrap_or(0);

        Ok(Some(BackupEntry {
            package_name: metadata.package_name,
            label: metadata.label,
            path: dir,
            backup_mode: metadata.backup_mode,
            is_encrypted: metadata.is_encrypted,
            has_apk,
            timestamp,
            total_size,
        }))
    }

    /// Deletes the backup of `package` under `root`
    #[instrument(skip(self), fields(root = %root.display()), err)]
    pub async fn delete(&self, root: &Path, package: &PackageName) -> Result<()> {
        let canon_root = fs::canonicalize(root).await.context("Failed to resolve backups root")?;
        let canon_dir = fs::canonicalize(package_dir(root, package))
            .await
            .with_context(|| format!("No backup found for {package}"))?;
        debug!(root = %canon_root.display(), target = %canon_dir.display(), "Canonicalized paths for deletion");

        ensure!(
            canon_dir.starts_with(&canon_root) && canon_dir != canon_root,
            "Requested path is outside backups directory"
        );
        ensure!(canon_dir.is_dir(), "Backup path is not a directory");

        info!(path = %canon_dir.display(), "Deleting backup directory");
        fs::remove_dir_all(&canon_dir).await.context("Failed to delete backup directory")?;
        Ok(())
    }
}

fn system_time_to_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}
