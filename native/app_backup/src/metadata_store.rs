use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, instrument};

use crate::{
    crypto::encrypted_files,
    models::{AppRecord, BackupMode, Metadata, PackageName},
    utils::now_millis,
};

/// Reads and writes the record of what was last backed up for a package
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Loads the metadata stored in the package backup directory `dir`
    async fn read(&self, dir: &Path, package: &PackageName) -> Result<Option<Metadata>>;

    /// Records what the backup of `app` that just ran captured
    async fn write(&self, dir: &Path, app: &AppRecord, mode: BackupMode) -> Result<()>;
}

/// Stores metadata as `<package>.log` JSON files inside each package backup directory.
///
/// `is_encrypted` is recorded from the `.gpg` files present after the backup.
#[derive(Debug, Clone, Default)]
pub struct JsonMetadataStore;

impl JsonMetadataStore {
    pub fn new() -> Self {
        Self
    }

    pub fn metadata_path(dir: &Path, package: &PackageName) -> PathBuf {
        dir.join(format!("{package}.log"))
    }
}

#[async_trait]
impl MetadataStore for JsonMetadataStore {
    #[instrument(level = "debug", skip(self), fields(dir = %dir.display()), err)]
    async fn read(&self, dir: &Path, package: &PackageName) -> Result<Option<Metadata>> {
        let path = Self::metadata_path(dir, package);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No metadata recorded");
                return Ok(None);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };
        let metadata: Metadata = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(metadata))
    }

    #[instrument(level = "debug", skip(self, app), fields(dir = %dir.display(), package = %app.package_name), err)]
    async fn write(&self, dir: &Path, app: &AppRecord, mode: BackupMode) -> Result<()> {
        let is_encrypted = !encrypted_files(dir, None, BackupMode::Both)
            .await
            .context("Failed to look for encrypted files")?
            .is_empty();
        let metadata = Metadata::for_backup(app, mode, is_encrypted, now_millis());
        let json =
            serde_json::to_string_pretty(&metadata).context("Failed to serialize metadata")?;

        let path = Self::metadata_path(dir, &app.package_name);
        let tmp = path.with_extension("log.tmp");
        fs::write(&tmp, json).await.context("Failed to write temporary metadata file")?;
        fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        debug!(path = %path.display(), apk = ?metadata.apk, "Wrote metadata");
        Ok(())
    }
}
