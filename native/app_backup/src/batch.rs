use std::{collections::HashSet, path::Path};

use anyhow::{Result, ensure};
use futures::{StreamExt, stream};
use tracing::{debug, info, instrument};

use crate::{
    crypto::DecryptionService,
    executor::StatusCode,
    models::{AppRecord, BackupMode},
    orchestrator::{BackupOrchestrator, RestoreOrchestrator},
};

/// Builds a fresh decryption service for each restore in a batch
pub type DecryptionFactory = dyn Fn() -> Box<dyn DecryptionService> + Send + Sync;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchAction {
    Backup,
    Restore,
}

#[derive(Debug, Clone)]
pub struct BatchItem {
    /// The app as it is after the operation (backups update `backup_mode`)
    pub app: AppRecord,
    pub code: StatusCode,
}

/// Per-package results of a batch, in input order
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub items: Vec<BatchItem>,
}

impl BatchReport {
    pub fn failed(&self) -> impl Iterator<Item = &BatchItem> {
        self.items.iter().filter(|item| item.code != 0)
    }

    pub fn is_success(&self) -> bool {
        self.failed().next().is_none()
    }
}

/// Runs backups or restores of many apps with a bounded number in flight
#[derive(Debug, Clone)]
pub struct BatchRunner {
    backup: BackupOrchestrator,
    restore: RestoreOrchestrator,
    concurrency: usize,
}

impl BatchRunner {
    pub fn new(
        backup: BackupOrchestrator,
        restore: RestoreOrchestrator,
        concurrency: usize,
    ) -> Self {
        Self { backup, restore, concurrency: concurrency.max(1) }
    }

    /// Runs `action` for every app in `apps`.
    ///
    /// Fails without running anything if a package appears twice, since two
    /// operations on one package must never overlap.
    #[instrument(skip_all, fields(count = apps.len(), ?action, %mode), err)]
    pub async fn run(
        &self,
        root: &Path,
        apps: Vec<AppRecord>,
        action: BatchAction,
        mode: BackupMode,
        decryption: Option<&DecryptionFactory>,
    ) -> Result<BatchReport> {
        let mut seen = HashSet::new();
        for app in &apps {
            ensure!(
                seen.insert(app.package_name.clone()),
                "Package {} appears more than once in the batch",
                app.package_name
            );
        }

        debug!(concurrency = self.concurrency, "Starting batch");
        let mut results = stream::iter(apps.into_iter().enumerate())
            .map(|(index, mut app)| async move {
                let code = match action {
                    BatchAction::Backup => self.backup.backup(root, &mut app, mode).await,
                    BatchAction::Restore => {
                        let service = decryption.map(|make| make());
                        self.restore.restore(root, &app, mode, service.as_deref()).await
                    }
                };
                (index, BatchItem { app, code })
            })
            .buffer_unordered(self.concurrency)
            .collect::<Vec<_>>()
            .await;
        results.sort_by_key(|(index, _)| *index);

        let report = BatchReport { items: results.into_iter().map(|(_, item)| item).collect() };
        info!(failed = report.failed().count(), "Batch finished");
        Ok(report)
    }
}
