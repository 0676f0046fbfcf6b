use std::{fmt, path::Path};

use anyhow::{Result, ensure};
use lazy_regex::{Lazy, Regex, lazy_regex};
use serde::{Deserialize, Serialize};

use super::{BackupMode, Metadata};

pub static PACKAGE_NAME_REGEX: Lazy<Regex> =
    lazy_regex!(r"^(?:[A-Za-z]{1}[\w]*\.)+[A-Za-z][\w]*$");

/// Validated Android package name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageName(String);

impl PackageName {
    /// Validates and constructs a `PackageName` from the provided string-like value.
    pub fn parse(value: impl AsRef<str>) -> Result<Self> {
        let value_ref = value.as_ref();
        ensure!(PACKAGE_NAME_REGEX.is_match(value_ref), "Invalid package name: '{}'", value_ref);
        Ok(Self(value_ref.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PackageName {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<PackageName> for String {
    fn from(value: PackageName) -> Self {
        value.0
    }
}

impl AsRef<Path> for PackageName {
    fn as_ref(&self) -> &Path {
        Path::new(&self.0)
    }
}

/// One application known to the system, as resolved by the caller.
///
/// Path fields use an empty string for "not applicable".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppRecord {
    pub package_name: PackageName,
    pub label: String,
    /// Installed artifact (base APK) path
    pub source_dir: String,
    pub data_dir: String,
    pub device_protected_data_dir: String,
    /// Absolute paths captured for special-case apps
    pub files: Vec<String>,
    /// Has no installable artifact and is handled as a plain set of files
    pub is_special: bool,
    pub is_system: bool,
    pub is_installed: bool,
    /// Metadata of the previous backup, if any
    pub log_info: Option<Metadata>,
    /// What the last backup actually captured
    pub backup_mode: Option<BackupMode>,
}

impl AppRecord {
    pub fn new(package_name: PackageName, label: impl Into<String>) -> Self {
        Self {
            package_name,
            label: label.into(),
            source_dir: String::new(),
            data_dir: String::new(),
            device_protected_data_dir: String::new(),
            files: Vec::new(),
            is_special: false,
            is_system: false,
            is_installed: false,
            log_info: None,
            backup_mode: None,
        }
    }

    /// File name of the installed artifact, if a source path is known
    pub fn apk_file_name(&self) -> Option<String> {
        if self.source_dir.is_empty() {
            return None;
        }
        Path::new(&self.source_dir).file_name().map(|n| n.to_string_lossy().into_owned())
    }
}
