use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    pub backups_location: String,
    pub su_path: String,
    pub gpg_path: String,
    /// Error log file; empty means `<backups_location>/errors.log`
    #[serde(default)]
    pub error_log_path: String,
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,
}

fn default_batch_concurrency() -> usize {
    2
}

impl Settings {
    pub fn backups_location(&self) -> PathBuf {
        PathBuf::from(&self.backups_location)
    }

    pub fn error_log_path(&self) -> PathBuf {
        if self.error_log_path.is_empty() {
            self.backups_location().join("errors.log")
        } else {
            PathBuf::from(&self.error_log_path)
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backups_location: dirs::document_dir()
                .unwrap_or_else(|| PathBuf::from("/sdcard"))
                .join("app_backups")
                .to_string_lossy()
                .to_string(),
            su_path: "su".to_string(),
            gpg_path: "gpg".to_string(),
            error_log_path: "".to_string(),
            batch_concurrency: default_batch_concurrency(),
        }
    }
}
