use std::{
    error::Error,
    fmt,
    path::{Path, PathBuf},
};

use tracing::{debug, error, info, instrument, warn};

use super::{Collaborators, package_dir};
use crate::{
    crypto::DecryptionService,
    executor::StatusCode,
    models::{AppRecord, BackupMode, Metadata},
};

const DATA_WITHOUT_APK_ERROR: &str =
    "cannot restore data without restoring apk, package is not installed";

/// A step of a restore that can fail independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RestorePhase {
    Apk,
    Data,
    Permissions,
    Decryption,
}

impl fmt::Display for RestorePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Apk => "apk",
            Self::Data => "data",
            Self::Permissions => "permissions",
            Self::Decryption => "decryption",
        })
    }
}

/// Which phases of a restore failed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreOutcome {
    pub apk_failed: bool,
    pub data_failed: bool,
    pub permissions_failed: bool,
    pub decryption_failed: bool,
}

impl RestoreOutcome {
    pub fn failed_phases(&self) -> Vec<RestorePhase> {
        [
            (self.apk_failed, RestorePhase::Apk),
            (self.data_failed, RestorePhase::Data),
            (self.permissions_failed, RestorePhase::Permissions),
            (self.decryption_failed, RestorePhase::Decryption),
        ]
        .into_iter()
        .filter_map(|(failed, phase)| failed.then_some(phase))
        .collect()
    }

    /// Number of failed phases, the integer result of a restore
    pub fn code(&self) -> StatusCode {
        self.failed_phases().len() as StatusCode
    }

    pub fn is_success(&self) -> bool {
        self.code() == 0
    }
}

/// Drives the restore of one application
#[derive(Debug, Clone)]
pub struct RestoreOrchestrator {
    services: Collaborators,
    /// Data directory of this process, used to stage artifacts for install
    anchor_dir: PathBuf,
}

impl RestoreOrchestrator {
    pub fn new(services: Collaborators, anchor_dir: impl Into<PathBuf>) -> Self {
        Self { services, anchor_dir: anchor_dir.into() }
    }

    /// Restores `app` from `<root>/<package>`.
    ///
    /// Returns the number of failed phases; 0 means full success.
    pub async fn restore(
        &self,
        root: &Path,
        app: &AppRecord,
        mode: BackupMode,
        decryption: Option<&dyn DecryptionService>,
    ) -> StatusCode {
        self.restore_detailed(root, app, mode, decryption).await.code()
    }

    /// Same as [`restore`](Self::restore), reporting which phases failed
    #[instrument(skip_all, fields(package = %app.package_name, %mode, encrypted = decryption.is_some()))]
    pub async fn restore_detailed(
        &self,
        root: &Path,
        app: &AppRecord,
        mode: BackupMode,
        decryption: Option<&dyn DecryptionService>,
    ) -> RestoreOutcome {
        let mut outcome = RestoreOutcome::default();
        let backup_dir = package_dir(root, &app.package_name);
        let recorded = match self.services.metadata.read(&backup_dir, &app.package_name).await {
            Ok(recorded) => recorded,
            Err(e) => {
                warn!(error = e.as_ref() as &dyn Error, "Failed to read backup metadata");
                None
            }
        };

        if let Some(decryption) = decryption
            && decryption.needs_decryption(root, app, mode).await
        {
            debug!("Decrypting backup before restore");
            decryption.decrypt(root, app, mode).await;
        }

        if mode.includes_apk() {
            let apk = recorded.as_ref().and_then(Metadata::apk_name);
            outcome.apk_failed = self.restore_artifact(&backup_dir, app, apk).await;
        }

        if mode.includes_data() {
            if !outcome.apk_failed && (app.is_installed || mode == BackupMode::Both) {
                let (data_failed, permissions_failed) =
                    self.restore_data(&backup_dir, app, recorded.as_ref()).await;
                outcome.data_failed = data_failed;
                outcome.permissions_failed = permissions_failed;
            } else {
                error!("Cannot restore data without restoring apk, package is not installed");
                outcome.apk_failed = true;
                self.services.error_log.append(&app.package_name, DATA_WITHOUT_APK_ERROR);
            }
        }

        if let Some(decryption) = decryption {
            decryption.cleanup_after_restore(app, &backup_dir, mode).await;
            outcome.decryption_failed = decryption.has_error();
        }

        let code = outcome.code();
        self.services.notifier.notify_changed();
        self.services.executor.report_result(code);
        if outcome.is_success() {
            info!("Restore finished");
        } else {
            let failed = outcome.failed_phases().iter().map(ToString::to_string).collect::<Vec<_>>();
            warn!(code, failed = %failed.join(", "), "Restore finished with failures");
        }
        outcome
    }

    /// Installs the recorded artifact. Returns whether the phase failed.
    async fn restore_artifact(&self, backup_dir: &Path, app: &AppRecord, apk: Option<&str>) -> bool {
        let executor = &self.services.executor;
        let Some(apk) = apk else {
            if app.is_special {
                debug!("Special-case app has no artifact to restore");
                return false;
            }
            let message = format!("no apk to install: {}", app.package_name);
            error!("{message}");
            self.services.error_log.append(&app.package_name, &message);
            return true;
        };

        let code = if app.is_system {
            executor.restore_system_artifact(backup_dir, &app.label, apk).await
        } else {
            executor.restore_user_artifact(backup_dir, &app.label, apk, &self.anchor_dir).await
        };

        if app.is_system
            && let Some(previous_apk) = app.log_info.as_ref().and_then(Metadata::apk_name)
        {
            let apk_file = backup_dir.join(previous_apk);
            let libs_code =
                executor.copy_native_libraries(&apk_file, backup_dir, &app.package_name).await;
            if libs_code != 0 {
                warn!(code = libs_code, "Failed to copy native libraries");
            }
        }
        code != 0
    }

    /// Restores data and fixes permissions. Returns which of the two failed.
    async fn restore_data(
        &self,
        backup_dir: &Path,
        app: &AppRecord,
        recorded: Option<&Metadata>,
    ) -> (bool, bool) {
        let executor = &self.services.executor;
        if app.is_special {
            let code = executor.restore_special(backup_dir, &app.label, &app.files).await;
            return (code != 0, false);
        }

        let recorded_data_dir = recorded
            .or(app.log_info.as_ref())
            .map(|meta| meta.data_dir.as_str())
            .unwrap_or_default();
        let code = executor
            .restore_normal_data(
                backup_dir,
                &app.label,
                &app.package_name,
                recorded_data_dir,
                &app.device_protected_data_dir,
            )
            .await;
        let permissions_code = executor.set_permissions(&app.data_dir).await;
        (code != 0, permissions_code != 0)
    }
}
