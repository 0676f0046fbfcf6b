use std::{
    error::Error,
    path::{Path, PathBuf},
    process::Stdio,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use anyhow::{Context, Result, ensure};
use async_trait::async_trait;
use derive_more::Debug;
use tokio::{fs, io::AsyncWriteExt, process::Command};
use tracing::{debug, error, info, instrument, warn};

use crate::{
    metadata_store::MetadataStore,
    models::{AppRecord, BackupMode, Metadata},
    utils::{remove_path_if_exists, resolve_binary_path},
};

/// Extension of encrypted backup files
pub const ENCRYPTED_EXTENSION: &str = "gpg";

/// Decrypts backups before a restore and removes the plaintext afterwards.
///
/// Failures are not returned; they are recorded and exposed through [`has_error`].
///
/// [`has_error`]: DecryptionService::has_error
#[async_trait]
pub trait DecryptionService: Send + Sync {
    /// Whether a restore of `mode` needs anything decrypted first
    async fn needs_decryption(&self, root: &Path, app: &AppRecord, mode: BackupMode) -> bool;

    async fn decrypt(&self, root: &Path, app: &AppRecord, mode: BackupMode);

    /// Removes decrypted artifacts from the package backup directory `dir`
    async fn cleanup_after_restore(&self, app: &AppRecord, dir: &Path, mode: BackupMode);

    fn has_error(&self) -> bool;
}

/// Lists the encrypted files in `dir` that a restore of `mode` uses.
///
/// `<apk>.gpg` belongs to the artifact, every other `.gpg` file to the data.
pub async fn encrypted_files(dir: &Path, apk: Option<&str>, mode: BackupMode) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    if !dir.is_dir() {
        return Ok(files);
    }
    let encrypted_apk = apk.map(|apk| format!("{apk}.{ENCRYPTED_EXTENSION}"));
    let mut rd =
        fs::read_dir(dir).await.with_context(|| format!("Failed to read {}", dir.display()))?;
    while let Some(entry) = rd.next_entry().await? {
        let path = entry.path();
        if !entry.file_type().await?.is_file()
            || path.extension().and_then(|e| e.to_str()) != Some(ENCRYPTED_EXTENSION)
        {
            continue;
        }
        let is_apk = encrypted_apk.as_deref() == path.file_name().and_then(|n| n.to_str());
        if (is_apk && mode.includes_apk()) || (!is_apk && mode.includes_data()) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn plaintext_path(encrypted: &Path) -> PathBuf {
    encrypted.with_extension("")
}

/// Decryption through an external `gpg` binary
#[derive(Debug)]
pub struct GpgDecryption {
    gpg_path: PathBuf,
    #[debug(skip)]
    passphrase: Option<String>,
    #[debug(skip)]
    metadata: Arc<dyn MetadataStore>,
    error: AtomicBool,
}

impl GpgDecryption {
    /// `metadata` is the store the backups were recorded in; it names the artifact
    pub fn new(
        gpg_path: &str,
        passphrase: Option<String>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Result<Self> {
        let gpg_path = resolve_binary_path(gpg_path).context("gpg binary not found")?;
        Ok(Self { gpg_path, passphrase, metadata, error: AtomicBool::new(false) })
    }

    /// Artifact name recorded for the backup in `dir`, else the one on `app`
    async fn recorded_apk(&self, dir: &Path, app: &AppRecord) -> Option<String> {
        match self.metadata.read(dir, &app.package_name).await {
            Ok(Some(recorded)) => {
                if let Some(apk) = recorded.apk_name() {
                    return Some(apk.to_string());
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = e.as_ref() as &dyn Error, "Failed to read backup metadata"),
        }
        app.log_info.as_ref().and_then(Metadata::apk_name).map(str::to_string)
    }

    async fn files_for(&self, dir: &Path, app: &AppRecord, mode: BackupMode) -> Result<Vec<PathBuf>> {
        let apk = self.recorded_apk(dir, app).await;
        encrypted_files(dir, apk.as_deref(), mode).await
    }

    fn set_error(&self) {
        self.error.store(true, Ordering::SeqCst);
    }

    #[instrument(level = "debug", skip(self), fields(file = %encrypted.display()), err)]
    async fn decrypt_file(&self, encrypted: &Path) -> Result<()> {
        let output_path = plaintext_path(encrypted);
        let mut command = Command::new(&self.gpg_path);
        command.args(["--batch", "--yes", "--quiet"]);
        if self.passphrase.is_some() {
            command.args(["--pinentry-mode", "loopback", "--passphrase-fd", "0"]);
            command.stdin(Stdio::piped());
        } else {
            command.stdin(Stdio::null());
        }
        command
            .arg("--output")
            .arg(&output_path)
            .arg("--decrypt")
            .arg(encrypted)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().context("Failed to spawn gpg")?;
        if let Some(passphrase) = &self.passphrase
            && let Some(mut stdin) = child.stdin.take()
        {
            stdin
                .write_all(format!("{passphrase}\n").as_bytes())
                .await
                .context("Failed to pass passphrase to gpg")?;
        }
        let output = child.wait_with_output().await.context("Failed to wait for gpg")?;
        ensure!(
            output.status.success(),
            "gpg exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
        debug!(output = %output_path.display(), "Decrypted file");
        Ok(())
    }
}

#[async_trait]
impl DecryptionService for GpgDecryption {
    async fn needs_decryption(&self, root: &Path, app: &AppRecord, mode: BackupMode) -> bool {
        let dir = root.join(&app.package_name);
        match self.files_for(&dir, app, mode).await {
            Ok(files) => !files.is_empty(),
            Err(e) => {
                warn!(error = e.as_ref() as &dyn Error, "Failed to look for encrypted files");
                false
            }
        }
    }

    #[instrument(skip(self, root, app), fields(package = %app.package_name))]
    async fn decrypt(&self, root: &Path, app: &AppRecord, mode: BackupMode) {
        let dir = root.join(&app.package_name);
        let files = match self.files_for(&dir, app, mode).await {
            Ok(files) => files,
            Err(e) => {
                error!(error = e.as_ref() as &dyn Error, "Failed to list encrypted files");
                self.set_error();
                return;
            }
        };
        info!(count = files.len(), "Decrypting backup");
        for file in files {
            if let Err(e) = self.decrypt_file(&file).await {
                error!(error = e.as_ref() as &dyn Error, "Decryption failed");
                self.set_error();
            }
        }
    }

    #[instrument(skip(self, app, dir), fields(package = %app.package_name))]
    async fn cleanup_after_restore(&self, app: &AppRecord, dir: &Path, mode: BackupMode) {
        let files = match self.files_for(dir, app, mode).await {
            Ok(files) => files,
            Err(e) => {
                error!(error = e.as_ref() as &dyn Error, "Failed to list encrypted files");
                self.set_error();
                return;
            }
        };
        for file in files {
            let plaintext = plaintext_path(&file);
            match remove_path_if_exists(&plaintext).await {
                Ok(true) => debug!(path = %plaintext.display(), "Removed decrypted file"),
                Ok(false) => {}
                Err(e) => {
                    error!(error = e.as_ref() as &dyn Error, "Failed to remove decrypted file");
                    self.set_error();
                }
            }
        }
    }

    fn has_error(&self) -> bool {
        self.error.load(Ordering::SeqCst)
    }
}
