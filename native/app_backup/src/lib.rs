//! Backup and restore of installed Android applications through a root shell.
//!
//! [`BackupOrchestrator`] and [`RestoreOrchestrator`] sequence the privileged
//! steps for one package. [`BackupManager`] wires them to the concrete
//! collaborators described by [`Settings`].

pub mod batch;
pub mod catalog;
pub mod crypto;
pub mod error_log;
pub mod executor;
pub mod logging;
pub mod manager;
pub mod metadata_store;
pub mod models;
pub mod notifier;
pub mod orchestrator;
pub mod settings;
pub mod utils;

pub use batch::{BatchAction, BatchReport, BatchRunner};
pub use catalog::{BackupCatalog, BackupEntry};
pub use crypto::{DecryptionService, GpgDecryption};
pub use executor::{PrivilegedExecutor, RootShell, StatusCode};
pub use manager::BackupManager;
pub use models::{AppRecord, BackupMode, Metadata, PackageName, Settings};
pub use orchestrator::{BackupOrchestrator, RestoreOrchestrator, RestoreOutcome};
pub use settings::SettingsHandler;
