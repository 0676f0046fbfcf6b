use std::path::Path;

use async_trait::async_trait;

use crate::models::{BackupMode, PackageName};

mod native_libs;
mod root_shell;
mod scripts;

pub use root_shell::RootShell;

/// Status returned by privileged operations: 0 on success, nonzero on failure
pub type StatusCode = i32;

/// Performs the privileged file operations behind backup and restore.
///
/// Every operation blocks its caller until the underlying work is done and
/// reports failure only through the returned code.
#[async_trait]
pub trait PrivilegedExecutor: Send + Sync {
    async fn backup_normal(
        &self,
        dir: &Path,
        label: &str,
        data_dir: &str,
        protected_data_dir: &str,
        source_dir: &str,
        mode: BackupMode,
    ) -> StatusCode;

    async fn backup_special(&self, dir: &Path, label: &str, files: &[String]) -> StatusCode;

    /// Installs a user artifact, staging it in `anchor_dir` first
    async fn restore_user_artifact(
        &self,
        dir: &Path,
        label: &str,
        apk: &str,
        anchor_dir: &Path,
    ) -> StatusCode;

    async fn restore_system_artifact(&self, dir: &Path, label: &str, apk: &str) -> StatusCode;

    async fn copy_native_libraries(
        &self,
        apk_file: &Path,
        dir: &Path,
        package: &PackageName,
    ) -> StatusCode;

    async fn restore_normal_data(
        &self,
        dir: &Path,
        label: &str,
        package: &PackageName,
        recorded_data_dir: &str,
        protected_data_dir: &str,
    ) -> StatusCode;

    async fn restore_special(&self, dir: &Path, label: &str, files: &[String]) -> StatusCode;

    async fn set_permissions(&self, data_dir: &str) -> StatusCode;

    async fn delete_backup_file(&self, path: &Path) -> StatusCode;

    /// Reports the final code of a backup or restore through the executor's own channel
    fn report_result(&self, code: StatusCode);
}
