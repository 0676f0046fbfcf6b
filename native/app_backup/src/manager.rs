use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use derive_more::Debug;
use tokio_stream::wrappers::WatchStream;
use tracing::{info, instrument};

use crate::{
    batch::{BatchAction, BatchReport, BatchRunner, DecryptionFactory},
    catalog::{BackupCatalog, BackupEntry},
    crypto::{DecryptionService, GpgDecryption},
    error_log::FileErrorLog,
    executor::{RootShell, StatusCode},
    metadata_store::{JsonMetadataStore, MetadataStore},
    models::{AppRecord, BackupMode, PackageName, Settings},
    notifier::{ResultNotifier, WatchNotifier},
    orchestrator::{BackupOrchestrator, Collaborators, RestoreOrchestrator, RestoreOutcome},
};

/// Backup and restore services configured from [`Settings`]
#[derive(Debug, Clone)]
pub struct BackupManager {
    settings: Settings,
    backup: BackupOrchestrator,
    restore: RestoreOrchestrator,
    batch: BatchRunner,
    catalog: BackupCatalog,
    #[debug(skip)]
    metadata: Arc<dyn MetadataStore>,
    notifier: Arc<WatchNotifier>,
}

impl BackupManager {
    /// Wires the root shell, metadata files and error log described by `settings`.
    ///
    /// `anchor_dir` is the data directory of this process.
    #[instrument(skip_all, err)]
    pub fn from_settings(settings: &Settings, anchor_dir: impl Into<PathBuf>) -> Result<Self> {
        let executor = RootShell::new(&settings.su_path).context("Failed to set up root shell")?;
        let notifier = Arc::new(WatchNotifier::new());
        let services = Collaborators {
            executor: Arc::new(executor),
            metadata: Arc::new(JsonMetadataStore::new()),
            notifier: notifier.clone(),
            error_log: Arc::new(FileErrorLog::new(settings.error_log_path())),
        };
        info!(backups = %settings.backups_location, "Backup manager ready");
        Ok(Self::with_services(settings, services, notifier, anchor_dir))
    }

    /// Builds a manager around existing collaborators. `notifier` must be the
    /// one inside `services` for [`subscribe`](Self::subscribe) to see changes.
    pub fn with_services(
        settings: &Settings,
        services: Collaborators,
        notifier: Arc<WatchNotifier>,
        anchor_dir: impl Into<PathBuf>,
    ) -> Self {
        let backup = BackupOrchestrator::new(services.clone());
        let restore = RestoreOrchestrator::new(services.clone(), anchor_dir);
        let batch = BatchRunner::new(backup.clone(), restore.clone(), settings.batch_concurrency);
        Self {
            settings: settings.clone(),
            backup,
            restore,
            batch,
            catalog: BackupCatalog::new(services.metadata.clone()),
            metadata: services.metadata,
            notifier,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// A decryption service for restoring encrypted backups
    pub fn decryption(&self, passphrase: Option<String>) -> Result<GpgDecryption> {
        GpgDecryption::new(&self.settings.gpg_path, passphrase, self.metadata.clone())
    }

    pub async fn backup(&self, app: &mut AppRecord, mode: BackupMode) -> StatusCode {
        self.backup.backup(&self.settings.backups_location(), app, mode).await
    }

    pub async fn restore(
        &self,
        app: &AppRecord,
        mode: BackupMode,
        decryption: Option<&dyn DecryptionService>,
    ) -> RestoreOutcome {
        self.restore
            .restore_detailed(&self.settings.backups_location(), app, mode, decryption)
            .await
    }

    pub async fn run_batch(
        &self,
        apps: Vec<AppRecord>,
        action: BatchAction,
        mode: BackupMode,
        decryption: Option<&DecryptionFactory>,
    ) -> Result<BatchReport> {
        self.batch.run(&self.settings.backups_location(), apps, action, mode, decryption).await
    }

    pub async fn list_backups(&self) -> Result<Vec<BackupEntry>> {
        self.catalog.list(&self.settings.backups_location()).await
    }

    pub async fn delete_backup(&self, package: &PackageName) -> Result<()> {
        self.catalog.delete(&self.settings.backups_location(), package).await?;
        self.notifier.notify_changed();
        Ok(())
    }

    /// Yields a new generation after every completed operation
    pub fn subscribe(&self) -> WatchStream<u64> {
        self.notifier.subscribe()
    }
}
