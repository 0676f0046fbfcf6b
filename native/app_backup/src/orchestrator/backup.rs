use std::{error::Error, path::Path};

use tokio::fs;
use tracing::{debug, error, info, instrument};

use super::{Collaborators, package_dir};
use crate::{
    executor::StatusCode,
    models::{AppRecord, BackupMode},
};

/// Drives the backup of one application
#[derive(Debug, Clone)]
pub struct BackupOrchestrator {
    services: Collaborators,
}

impl BackupOrchestrator {
    pub fn new(services: Collaborators) -> Self {
        Self { services }
    }

    /// Backs up `app` into `<root>/<package>` and returns the executor's code.
    ///
    /// Updates `app.backup_mode` to what was captured: special-case apps are
    /// always recorded as [`BackupMode::Data`].
    #[instrument(skip_all, fields(package = %app.package_name, %mode))]
    pub async fn backup(&self, root: &Path, app: &mut AppRecord, mode: BackupMode) -> StatusCode {
        let backup_dir = package_dir(root, &app.package_name);
        if !backup_dir.is_dir() {
            debug!(dir = %backup_dir.display(), "Creating package backup directory");
            if let Err(e) = fs::create_dir_all(&backup_dir).await {
                error!(error = &e as &dyn Error, "Failed to create package backup directory");
            }
        } else if mode != BackupMode::Data && !app.source_dir.is_empty() {
            self.remove_stale_artifact(&backup_dir, app).await;
        }

        let executor = &self.services.executor;
        let code = if app.is_special {
            let code = executor.backup_special(&backup_dir, &app.label, &app.files).await;
            app.backup_mode = Some(BackupMode::Data);
            code
        } else {
            let code = executor
                .backup_normal(
                    &backup_dir,
                    &app.label,
                    &app.data_dir,
                    &app.device_protected_data_dir,
                    &app.source_dir,
                    mode,
                )
                .await;
            app.backup_mode = Some(mode);
            code
        };

        self.services.notifier.notify_changed();
        executor.report_result(code);

        if let Err(e) = self.services.metadata.write(&backup_dir, app, mode).await {
            error!(error = e.as_ref() as &dyn Error, "Failed to write backup metadata");
        }

        info!(code, "Backup finished");
        code
    }

    /// Deletes the artifact of a previous backup taken from a different source path
    async fn remove_stale_artifact(&self, backup_dir: &Path, app: &AppRecord) {
        let Some(previous) = &app.log_info else {
            return;
        };
        if previous.source_dir.is_empty() || previous.source_dir == app.source_dir {
            return;
        }
        let Some(apk) = previous.apk_name() else {
            return;
        };
        info!(apk, previous_source = %previous.source_dir, "Removing stale artifact");
        let executor = &self.services.executor;
        executor.delete_backup_file(&backup_dir.join(apk)).await;
        if previous.is_encrypted {
            executor.delete_backup_file(&backup_dir.join(format!("{apk}.gpg"))).await;
        }
    }
}
