//! Recording fakes for the orchestrator collaborators.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use anyhow::{Result, bail};
use async_trait::async_trait;

use super::Collaborators;
use crate::{
    crypto::DecryptionService,
    error_log::MemoryErrorLog,
    executor::{PrivilegedExecutor, StatusCode},
    metadata_store::MetadataStore,
    models::{AppRecord, BackupMode, Metadata, PackageName},
    notifier::ResultNotifier,
};

/// Ordered names of every collaborator call, shared between fakes
pub(crate) type Journal = Arc<Mutex<Vec<String>>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    BackupNormal { dir: PathBuf, source_dir: String, mode: BackupMode },
    BackupSpecial { dir: PathBuf, files: Vec<String> },
    RestoreUserArtifact { apk: String, anchor_dir: PathBuf },
    RestoreSystemArtifact { apk: String },
    CopyNativeLibraries { apk_file: PathBuf, package: PackageName },
    RestoreNormalData { recorded_data_dir: String, protected_data_dir: String },
    RestoreSpecial { files: Vec<String> },
    SetPermissions { data_dir: String },
    DeleteBackupFile { path: PathBuf },
    ReportResult { code: StatusCode },
}

impl Call {
    fn name(&self) -> &'static str {
        match self {
            Call::BackupNormal { .. } => "backup_normal",
            Call::BackupSpecial { .. } => "backup_special",
            Call::RestoreUserArtifact { .. } => "restore_user_artifact",
            Call::RestoreSystemArtifact { .. } => "restore_system_artifact",
            Call::CopyNativeLibraries { .. } => "copy_native_libraries",
            Call::RestoreNormalData { .. } => "restore_normal_data",
            Call::RestoreSpecial { .. } => "restore_special",
            Call::SetPermissions { .. } => "set_permissions",
            Call::DeleteBackupFile { .. } => "delete_backup_file",
            Call::ReportResult { .. } => "report_result",
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct RecordingExecutor {
    journal: Journal,
    calls: Mutex<Vec<Call>>,
    codes: Mutex<HashMap<&'static str, StatusCode>>,
}

impl RecordingExecutor {
    /// Makes every call to `operation` return `code`
    pub fn set_code(&self, operation: &'static str, code: StatusCode) {
        self.codes.lock().unwrap().insert(operation, code);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().iter().map(Call::name).collect()
    }

    fn record(&self, call: Call) -> StatusCode {
        let name = call.name();
        self.journal.lock().unwrap().push(name.to_string());
        self.calls.lock().unwrap().push(call);
        self.codes.lock().unwrap().get(name).copied().unwrap_or(0)
    }
}

#[async_trait]
impl PrivilegedExecutor for RecordingExecutor {
    async fn backup_normal(
        &self,
        dir: &Path,
        _label: &str,
        _data_dir: &str,
        _protected_data_dir: &str,
        source_dir: &str,
        mode: BackupMode,
    ) -> StatusCode {
        self.record(Call::BackupNormal {
            dir: dir.to_path_buf(),
            source_dir: source_dir.to_string(),
            mode,
        })
    }

    async fn backup_special(&self, dir: &Path, _label: &str, files: &[String]) -> StatusCode {
        self.record(Call::BackupSpecial { dir: dir.to_path_buf(), files: files.to_vec() })
    }

    async fn restore_user_artifact(
        &self,
        _dir: &Path,
        _label: &str,
        apk: &str,
        anchor_dir: &Path,
    ) -> StatusCode {
        self.record(Call::RestoreUserArtifact {
            apk: apk.to_string(),
            anchor_dir: anchor_dir.to_path_buf(),
        })
    }

    async fn restore_system_artifact(&self, _dir: &Path, _label: &str, apk: &str) -> StatusCode {
        self.record(Call::RestoreSystemArtifact { apk: apk.to_string() })
    }

    async fn copy_native_libraries(
        &self,
        apk_file: &Path,
        _dir: &Path,
        package: &PackageName,
    ) -> StatusCode {
        self.record(Call::CopyNativeLibraries {
            apk_file: apk_file.to_path_buf(),
            package: package.clone(),
        })
    }

    async fn restore_normal_data(
        &self,
        _dir: &Path,
        _label: &str,
        _package: &PackageName,
        recorded_data_dir: &str,
        protected_data_dir: &str,
    ) -> StatusCode {
        self.record(Call::RestoreNormalData {
            recorded_data_dir: recorded_data_dir.to_string(),
            protected_data_dir: protected_data_dir.to_string(),
        })
    }

    async fn restore_special(&self, _dir: &Path, _label: &str, files: &[String]) -> StatusCode {
        self.record(Call::RestoreSpecial { files: files.to_vec() })
    }

    async fn set_permissions(&self, data_dir: &str) -> StatusCode {
        self.record(Call::SetPermissions { data_dir: data_dir.to_string() })
    }

    async fn delete_backup_file(&self, path: &Path) -> StatusCode {
        self.record(Call::DeleteBackupFile { path: path.to_path_buf() })
    }

    fn report_result(&self, code: StatusCode) {
        self.record(Call::ReportResult { code });
    }
}

/// In-memory metadata keyed by package
#[derive(Debug, Default)]
pub(crate) struct FakeMetadataStore {
    records: Mutex<HashMap<PackageName, Metadata>>,
    writes: Mutex<Vec<(PathBuf, PackageName, BackupMode)>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl FakeMetadataStore {
    pub fn insert(&self, metadata: Metadata) {
        self.records.lock().unwrap().insert(metadata.package_name.clone(), metadata);
    }

    pub fn get(&self, package: &PackageName) -> Option<Metadata> {
        self.records.lock().unwrap().get(package).cloned()
    }

    pub fn writes(&self) -> Vec<(PathBuf, PackageName, BackupMode)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn fail_reads(&self) {
        self.fail_reads.store(true, Ordering::SeqCst);
    }

    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl MetadataStore for FakeMetadataStore {
    async fn read(&self, _dir: &Path, package: &PackageName) -> Result<Option<Metadata>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            bail!("metadata unreadable");
        }
        Ok(self.get(package))
    }

    async fn write(&self, dir: &Path, app: &AppRecord, mode: BackupMode) -> Result<()> {
        self.writes.lock().unwrap().push((dir.to_path_buf(), app.package_name.clone(), mode));
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("metadata unwritable");
        }
        self.insert(Metadata::for_backup(app, mode, false, 1));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub(crate) struct CountingNotifier {
    count: AtomicUsize,
}

impl CountingNotifier {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl ResultNotifier for CountingNotifier {
    fn notify_changed(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeDecryption {
    journal: Journal,
    needed: bool,
    fail: bool,
    error: AtomicBool,
    decrypts: AtomicUsize,
    cleanups: AtomicUsize,
}

impl FakeDecryption {
    pub fn new(journal: Journal, needed: bool, fail: bool) -> Self {
        Self { journal, needed, fail, ..Self::default() }
    }

    pub fn decrypts(&self) -> usize {
        self.decrypts.load(Ordering::SeqCst)
    }

    pub fn cleanups(&self) -> usize {
        self.cleanups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DecryptionService for FakeDecryption {
    async fn needs_decryption(&self, _root: &Path, _app: &AppRecord, _mode: BackupMode) -> bool {
        self.needed
    }

    async fn decrypt(&self, _root: &Path, _app: &AppRecord, _mode: BackupMode) {
        self.journal.lock().unwrap().push("decrypt".to_string());
        self.decrypts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            self.error.store(true, Ordering::SeqCst);
        }
    }

    async fn cleanup_after_restore(&self, _app: &AppRecord, _dir: &Path, _mode: BackupMode) {
        self.journal.lock().unwrap().push("cleanup".to_string());
        self.cleanups.fetch_add(1, Ordering::SeqCst);
    }

    fn has_error(&self) -> bool {
        self.error.load(Ordering::SeqCst)
    }
}

/// All fakes wired together
pub(crate) struct Harness {
    pub journal: Journal,
    pub executor: Arc<RecordingExecutor>,
    pub metadata: Arc<FakeMetadataStore>,
    pub notifier: Arc<CountingNotifier>,
    pub error_log: Arc<MemoryErrorLog>,
}

impl Harness {
    pub fn new() -> Self {
        let journal = Journal::default();
        Self {
            executor: Arc::new(RecordingExecutor { journal: journal.clone(), ..Default::default() }),
            journal,
            metadata: Arc::default(),
            notifier: Arc::default(),
            error_log: Arc::default(),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            executor: self.executor.clone(),
            metadata: self.metadata.clone(),
            notifier: self.notifier.clone(),
            error_log: self.error_log.clone(),
        }
    }

    pub fn decryption(&self, needed: bool, fail: bool) -> FakeDecryption {
        FakeDecryption::new(self.journal.clone(), needed, fail)
    }

    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }
}

pub(crate) fn package() -> PackageName {
    PackageName::parse("com.example.app").unwrap()
}

/// An installed user app with artifact and data paths
pub(crate) fn user_app() -> AppRecord {
    let mut app = AppRecord::new(package(), "Example");
    app.source_dir = "/data/app/com.example.app-2/base.apk".to_string();
    app.data_dir = "/data/user/0/com.example.app".to_string();
    app.device_protected_data_dir = "/data/user_de/0/com.example.app".to_string();
    app.is_installed = true;
    app
}

/// Metadata of a previous backup of `user_app`
pub(crate) fn previous_backup(apk: Option<&str>) -> Metadata {
    Metadata {
        package_name: package(),
        label: "Example".to_string(),
        apk: apk.map(str::to_string),
        is_encrypted: false,
        source_dir: "/data/app/com.example.app-1/base.apk".to_string(),
        data_dir: "/data/data/com.example.app".to_string(),
        device_protected_data_dir: "/data/user_de/0/com.example.app".to_string(),
        backup_mode: BackupMode::Both,
        is_system: false,
        is_special: false,
        last_backup_millis: 1,
    }
}
