use std::{
    error::Error,
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::{Context, Result};
use time::{OffsetDateTime, macros::format_description};
use tracing::{error, warn};

use crate::models::PackageName;

/// Process-wide sink for failures the user should see
pub trait ErrorLog: Send + Sync {
    fn append(&self, package: &PackageName, message: &str);
}

/// Appends timestamped lines to a text file.
///
/// Writes with blocking `std::fs` calls on the caller's thread, including
/// from inside async tasks. Each entry is a single short line.
#[derive(Debug)]
pub struct FileErrorLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileErrorLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn try_append(&self, package: &PackageName, message: &str) -> Result<()> {
        let fmt = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        let timestamp = now.format(&fmt).unwrap_or_else(|_| "0000-00-00 00:00:00".into());

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).context("Failed to create error log directory")?;
        }
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        writeln!(file, "{timestamp} {package}: {message}").context("Failed to write error log")?;
        Ok(())
    }
}

impl ErrorLog for FileErrorLog {
    fn append(&self, package: &PackageName, message: &str) {
        warn!(%package, message, "Recording error");
        if let Err(e) = self.try_append(package, message) {
            error!(error = e.as_ref() as &dyn Error, "Failed to append to error log");
        }
    }
}

/// Keeps error entries in memory
#[derive(Debug, Default)]
pub struct MemoryErrorLog {
    entries: Mutex<Vec<(PackageName, String)>>,
}

impl MemoryErrorLog {
    pub fn entries(&self) -> Vec<(PackageName, String)> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }
}

impl ErrorLog for MemoryErrorLog {
    fn append(&self, package: &PackageName, message: &str) {
        warn!(%package, message, "Recording error");
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((package.clone(), message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;
    use test_log::test;

    use super::*;

    #[test]
    fn test_file_error_log_appends_lines() {
        let dir = tempdir().unwrap();
        let log = FileErrorLog::new(dir.path().join("logs").join("errors.log"));
        let package = PackageName::parse("com.example.app").unwrap();

        log.append(&package, "no apk to install: com.example.app");
        log.append(&package, "second");

        let content = std::fs::read_to_string(log.path()).unwrap();
        let lines = content.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("com.example.app: no apk to install: com.example.app"));
        assert!(lines[1].ends_with("com.example.app: second"));
    }

    #[test]
    fn test_unwritable_path_does_not_panic() {
        let dir = tempdir().unwrap();
        // A directory cannot be opened for appending
        let log = FileErrorLog::new(dir.path());
        log.append(&PackageName::parse("com.example.app").unwrap(), "ignored");
    }

    #[test(tokio::test)]
    async fn test_append_from_async_task() {
        let dir = tempdir().unwrap();
        let log = std::sync::Arc::new(FileErrorLog::new(dir.path().join("errors.log")));
        let package = PackageName::parse("com.example.app").unwrap();

        let task = tokio::spawn({
            let log = log.clone();
            async move { log.append(&package, "from task") }
        });
        task.await.unwrap();

        let content = std::fs::read_to_string(log.path()).unwrap();
        assert!(content.trim_end().ends_with("com.example.app: from task"));
    }

    #[test]
    fn test_memory_error_log() {
        let log = MemoryErrorLog::default();
        let package = PackageName::parse("com.example.app").unwrap();
        log.append(&package, "boom");
        assert_eq!(log.entries(), vec![(package, "boom".to_string())]);
    }
}
