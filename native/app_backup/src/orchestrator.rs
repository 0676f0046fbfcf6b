//! Sequencing of the privileged steps behind one backup or restore.
//!
//! Both orchestrators run every step of a call in order on the caller's
//! task. They never spawn work, never retry, and report failures only
//! through the returned code. Callers must not run two operations on the
//! same package at the same time: both touch `<root>/<package>` and its
//! metadata.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use derive_more::Debug;

use crate::{
    error_log::ErrorLog, executor::PrivilegedExecutor, metadata_store::MetadataStore,
    models::PackageName, notifier::ResultNotifier,
};

mod backup;
mod restore;

pub use backup::BackupOrchestrator;
pub use restore::{RestoreOrchestrator, RestoreOutcome, RestorePhase};

/// Services the orchestrators delegate to
#[derive(Debug, Clone)]
pub struct Collaborators {
    #[debug(skip)]
    pub executor: Arc<dyn PrivilegedExecutor>,
    #[debug(skip)]
    pub metadata: Arc<dyn MetadataStore>,
    #[debug(skip)]
    pub notifier: Arc<dyn ResultNotifier>,
    #[debug(skip)]
    pub error_log: Arc<dyn ErrorLog>,
}

/// Backup directory of `package` under `root`
pub fn package_dir(root: &Path, package: &PackageName) -> PathBuf {
    root.join(package)
}

#[cfg(test)]
pub(crate) mod testing;
