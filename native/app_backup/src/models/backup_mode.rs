use std::fmt;

use serde::{Deserialize, Serialize};

/// Which parts of an application a backup or restore targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupMode {
    /// Installer artifact only
    Apk,
    /// Private data only
    Data,
    /// Artifact and data
    Both,
}

impl BackupMode {
    pub fn includes_apk(self) -> bool {
        matches!(self, Self::Apk | Self::Both)
    }

    pub fn includes_data(self) -> bool {
        matches!(self, Self::Data | Self::Both)
    }
}

impl fmt::Display for BackupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Apk => "apk",
            Self::Data => "data",
            Self::Both => "both",
        })
    }
}
