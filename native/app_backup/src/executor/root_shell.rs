use std::{
    error::Error,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, ensure};
use async_trait::async_trait;
use lazy_regex::regex_is_match;
use tokio::process::Command;
use tracing::{debug, error, info, instrument, trace, warn};

use super::{PrivilegedExecutor, StatusCode, native_libs::extract_native_libraries, scripts};
use crate::{
    models::{BackupMode, PackageName},
    utils::resolve_binary_path,
};

/// Runs privileged operations as shell scripts through `su -c`
#[derive(Debug, Clone)]
pub struct RootShell {
    su_path: PathBuf,
}

impl RootShell {
    /// Creates a root shell using the given `su` binary (name or path)
    pub fn new(su_path: &str) -> Result<Self> {
        let su_path = resolve_binary_path(su_path).context("Root shell binary not found")?;
        debug!(su_path = %su_path.display(), "Using root shell");
        Ok(Self { su_path })
    }

    /// Runs `script` as root and returns its stdout
    #[instrument(level = "debug", skip(self, script), err)]
    async fn run(&self, script: &str) -> Result<String> {
        trace!(script, "Running privileged script");
        let output = Command::new(&self.su_path)
            .arg("-c")
            .arg(script)
            .output()
            .await
            .with_context(|| format!("Failed to spawn {}", self.su_path.display()))?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        ensure!(
            output.status.success(),
            "Script exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
        if !stdout.is_empty() {
            trace!(stdout = %stdout, "Script output");
        }
        Ok(stdout)
    }

    fn status(operation: &str, result: Result<()>) -> StatusCode {
        match result {
            Ok(()) => {
                debug!(operation, "Privileged operation succeeded");
                0
            }
            Err(e) => {
                error!(operation, error = e.as_ref() as &dyn Error, "Privileged operation failed");
                1
            }
        }
    }

    async fn try_copy_native_libraries(
        &self,
        apk_file: &Path,
        dir: &Path,
        package: &PackageName,
    ) -> Result<()> {
        let staging = tempfile::Builder::new()
            .prefix(".native_libs")
            .tempdir_in(dir)
            .context("Failed to create staging directory for native libraries")?;
        let apk = apk_file.to_path_buf();
        let dest = staging.path().to_path_buf();
        let libs = tokio::task::spawn_blocking(move || extract_native_libraries(&apk, &dest))
            .await
            .context("Native library extraction task failed")??;
        let Some(libs) = libs else {
            return Ok(());
        };
        info!(%package, abi = libs.abi, count = libs.files.len(), "Installing native libraries");
        self.run(&scripts::install_native_libraries(staging.path(), libs.system_lib_dir)).await?;
        Ok(())
    }

    async fn try_set_permissions(&self, data_dir: &str) -> Result<()> {
        ensure!(!data_dir.is_empty(), "No data directory to fix permissions for");
        let owner = self.run(&scripts::data_dir_owner(data_dir)).await?;
        let owner = owner.trim();
        ensure!(regex_is_match!(r"^\d+:\d+$", owner), "Unexpected owner of {data_dir}: '{owner}'");
        self.run(&scripts::set_permissions(data_dir, owner)).await?;
        Ok(())
    }
}

/// Directory name used for a system app under `/system/app`
fn system_install_name(label: &str, apk: &str) -> String {
    let name = sanitize_filename::sanitize(label).replace(' ', "");
    if !name.is_empty() {
        return name;
    }
    Path::new(apk)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| apk.to_string())
}

#[async_trait]
impl PrivilegedExecutor for RootShell {
    #[instrument(skip(self, label), fields(dir = %dir.display()))]
    async fn backup_normal(
        &self,
        dir: &Path,
        label: &str,
        data_dir: &str,
        protected_data_dir: &str,
        source_dir: &str,
        mode: BackupMode,
    ) -> StatusCode {
        let Some(script) =
            scripts::backup_normal(dir, data_dir, protected_data_dir, source_dir, mode)
        else {
            warn!(label, "Nothing to back up");
            return 0;
        };
        info!(label, "Backing up");
        Self::status("backup_normal", self.run(&script).await.map(drop))
    }

    #[instrument(skip(self, label, files), fields(dir = %dir.display(), files = files.len()))]
    async fn backup_special(&self, dir: &Path, label: &str, files: &[String]) -> StatusCode {
        let Some(script) = scripts::backup_special(dir, files) else {
            warn!(label, "Special backup has no files");
            return 0;
        };
        info!(label, "Backing up special files");
        Self::status("backup_special", self.run(&script).await.map(drop))
    }

    #[instrument(skip(self, label), fields(dir = %dir.display()))]
    async fn restore_user_artifact(
        &self,
        dir: &Path,
        label: &str,
        apk: &str,
        anchor_dir: &Path,
    ) -> StatusCode {
        info!(label, "Installing APK");
        let script = scripts::restore_user_artifact(dir, apk, anchor_dir);
        Self::status("restore_user_artifact", self.run(&script).await.map(drop))
    }

    #[instrument(skip(self), fields(dir = %dir.display()))]
    async fn restore_system_artifact(&self, dir: &Path, label: &str, apk: &str) -> StatusCode {
        info!("Restoring system APK");
        let script = scripts::restore_system_artifact(dir, apk, &system_install_name(label, apk));
        Self::status("restore_system_artifact", self.run(&script).await.map(drop))
    }

    #[instrument(skip(self), fields(apk_file = %apk_file.display(), dir = %dir.display()))]
    async fn copy_native_libraries(
        &self,
        apk_file: &Path,
        dir: &Path,
        package: &PackageName,
    ) -> StatusCode {
        Self::status(
            "copy_native_libraries",
            self.try_copy_native_libraries(apk_file, dir, package).await,
        )
    }

    #[instrument(skip(self, label), fields(dir = %dir.display()))]
    async fn restore_normal_data(
        &self,
        dir: &Path,
        label: &str,
        package: &PackageName,
        recorded_data_dir: &str,
        protected_data_dir: &str,
    ) -> StatusCode {
        let Some(script) =
            scripts::restore_normal_data(dir, package, recorded_data_dir, protected_data_dir)
        else {
            error!(label, "No recorded data directory to restore into");
            return 1;
        };
        info!(label, "Restoring data");
        Self::status("restore_normal_data", self.run(&script).await.map(drop))
    }

    #[instrument(skip(self, label, files), fields(dir = %dir.display(), files = files.len()))]
    async fn restore_special(&self, dir: &Path, label: &str, files: &[String]) -> StatusCode {
        let script = match scripts::restore_special(dir, files) {
            Ok(Some(script)) => script,
            Ok(None) => {
                warn!(label, "Special restore has no files");
                return 0;
            }
            Err(e) => return Self::status("restore_special", Err(e)),
        };
        info!(label, "Restoring special files");
        Self::status("restore_special", self.run(&script).await.map(drop))
    }

    #[instrument(skip(self))]
    async fn set_permissions(&self, data_dir: &str) -> StatusCode {
        Self::status("set_permissions", self.try_set_permissions(data_dir).await)
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn delete_backup_file(&self, path: &Path) -> StatusCode {
        Self::status("delete_backup_file", self.run(&scripts::delete(path)).await.map(drop))
    }

    fn report_result(&self, code: StatusCode) {
        if code == 0 {
            info!("Operation completed successfully");
        } else {
            error!(code, "Operation finished with errors");
        }
    }
}
