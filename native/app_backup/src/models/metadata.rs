use serde::{Deserialize, Serialize};

use super::{AppRecord, BackupMode, PackageName};

/// Persisted record of what a backup captured for one package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub package_name: PackageName,
    #[serde(default)]
    pub label: String,
    /// File name of the backed-up artifact inside the package directory
    #[serde(default)]
    pub apk: Option<String>,
    #[serde(default)]
    pub is_encrypted: bool,
    /// Artifact path at the time of the backup
    #[serde(default)]
    pub source_dir: String,
    #[serde(default)]
    pub data_dir: String,
    #[serde(default)]
    pub device_protected_data_dir: String,
    pub backup_mode: BackupMode,
    #[serde(default)]
    pub is_system: bool,
    #[serde(default)]
    pub is_special: bool,
    /// Milliseconds since Unix epoch
    #[serde(default)]
    pub last_backup_millis: u64,
}

impl Metadata {
    /// Builds the metadata describing a backup of `app` that just ran.
    ///
    /// The artifact name is carried over from the previous record when this
    /// backup did not capture an artifact.
    pub fn for_backup(
        app: &AppRecord,
        mode: BackupMode,
        is_encrypted: bool,
        last_backup_millis: u64,
    ) -> Self {
        let recorded_mode = app.backup_mode.unwrap_or(mode);
        let apk = if recorded_mode.includes_apk() && !app.is_special {
            app.apk_file_name()
        } else {
            None
        }
        .or_else(|| app.log_info.as_ref().and_then(|prev| prev.apk.clone()));

        Self {
            package_name: app.package_name.clone(),
            label: app.label.clone(),
            apk,
            is_encrypted,
            source_dir: app.source_dir.clone(),
            data_dir: app.data_dir.clone(),
            device_protected_data_dir: app.device_protected_data_dir.clone(),
            backup_mode: recorded_mode,
            is_system: app.is_system,
            is_special: app.is_special,
            last_backup_millis,
        }
    }

    /// Recorded artifact file name, ignoring empty values
    pub fn apk_name(&self) -> Option<&str> {
        self.apk.as_deref().filter(|apk| !apk.is_empty())
    }
}
