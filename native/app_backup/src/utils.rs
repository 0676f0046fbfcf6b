use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tracing::{Span, debug, instrument};

/// Resolves a binary name or path to an executable path
#[instrument(level = "debug", err)]
pub fn resolve_binary_path(name: &str) -> Result<PathBuf> {
    let path = which::which(name).with_context(|| format!("Failed to find binary '{name}'"))?;
    debug!(path = %path.display(), "Resolved binary path");
    Ok(path)
}

/// Quotes `value` for a POSIX shell
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Current time in milliseconds since Unix epoch
pub fn now_millis() -> u64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as u64
}

/// Removes a file or directory, ignoring a missing target
pub async fn remove_path_if_exists(path: &Path) -> Result<bool> {
    let meta = match fs::symlink_metadata(path).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e).with_context(|| format!("Failed to stat {}", path.display())),
    };
    let result =
        if meta.is_dir() { fs::remove_dir_all(path).await } else { fs::remove_file(path).await };
    result.with_context(|| format!("Failed to remove {}", path.display()))?;
    Ok(true)
}

/// Total size of all files under `dir`
#[instrument(level = "debug", fields(dir = %dir.display(), size), err)]
pub async fn dir_size(dir: &Path) -> Result<u64> {
    if !dir.is_dir() {
        return Ok(0);
    }
    let mut total: u64 = 0;
    let mut stack: Vec<PathBuf> = vec![dir.to_path_buf()];
    while let Some(path) = stack.pop() {
        let mut rd = match fs::read_dir(&path).await {
            Ok(r) => r,
            Err(_) => continue,
        };
        while let Some(entry) = rd.next_entry().await? {
            let meta = match entry.metadata().await {
                Ok(m) => m,
                Err(_) => continue,
            };
            if meta.is_file() {
                total = total.saturating_add(meta.len());
            } else if meta.is_dir() {
                stack.push(entry.path());
            }
        }
    }
    Span::current().record("size", total);
    Ok(total)
}
