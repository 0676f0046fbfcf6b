//! Shell scripts run through `su` by [`super::RootShell`].

use std::path::Path;

use anyhow::{Context, Result};

use crate::{
    models::{BackupMode, PackageName},
    utils::shell_quote,
};

/// Subdirectory of a package backup holding the private data
pub(crate) const DATA_DIR_NAME: &str = "data";
/// Subdirectory of a package backup holding the device-protected data
pub(crate) const PROTECTED_DIR_NAME: &str = "device_protected_files";

fn q(path: impl AsRef<Path>) -> String {
    shell_quote(&path.as_ref().to_string_lossy())
}

/// Copies the contents of `source` into `target`, dropping cache directories
fn copy_data_tree(source: &str, target: &Path) -> String {
    format!(
        "rm -rf {t} && mkdir -p {t} && cp -RL {s}/. {t}/ && rm -rf {cache} {code_cache}",
        t = q(target),
        s = shell_quote(source),
        cache = q(target.join("cache")),
        code_cache = q(target.join("code_cache")),
    )
}

pub(crate) fn backup_normal(
    dir: &Path,
    data_dir: &str,
    protected_data_dir: &str,
    source_dir: &str,
    mode: BackupMode,
) -> Option<String> {
    let mut steps = Vec::new();
    if mode.includes_apk() && !source_dir.is_empty() {
        steps.push(format!("cp {} {}/", shell_quote(source_dir), q(dir)));
    }
    if mode.includes_data() {
        if !data_dir.is_empty() {
            steps.push(copy_data_tree(data_dir, &dir.join(DATA_DIR_NAME)));
        }
        if !protected_data_dir.is_empty() {
            steps.push(copy_data_tree(protected_data_dir, &dir.join(PROTECTED_DIR_NAME)));
        }
    }
    if steps.is_empty() {
        return None;
    }
    steps.push(format!("chmod -R a+rX {}", q(dir)));
    Some(steps.join(" && "))
}

pub(crate) fn backup_special(dir: &Path, files: &[String]) -> Option<String> {
    if files.is_empty() {
        return None;
    }
    let steps = files
        .iter()
        .map(|file| format!("cp -RL {} {}/", shell_quote(file), q(dir)))
        .chain(std::iter::once(format!("chmod -R a+rX {}", q(dir))))
        .collect::<Vec<_>>();
    Some(steps.join(" && "))
}

pub(crate) fn restore_user_artifact(dir: &Path, apk: &str, anchor_dir: &Path) -> String {
    let staged = anchor_dir.join(apk);
    format!(
        "cp {src} {staged} && pm install -r {staged}; ret=$?; rm -f {staged}; exit $ret",
        src = q(dir.join(apk)),
        staged = q(&staged),
    )
}

pub(crate) fn restore_system_artifact(dir: &Path, apk: &str, install_name: &str) -> String {
    let target_dir = Path::new("/system/app").join(install_name);
    let target = target_dir.join(format!("{install_name}.apk"));
    format!(
        "mount -o remount,rw /system && mkdir -p {td} && cp {src} {t} && chmod 755 {td} && \
         chmod 644 {t}; ret=$?; mount -o remount,ro /system; exit $ret",
        td = q(&target_dir),
        src = q(dir.join(apk)),
        t = q(&target),
    )
}

pub(crate) fn install_native_libraries(staging: &Path, system_lib_dir: &str) -> String {
    format!(
        "mount -o remount,rw /system && cp {s}/* {l}/ && chmod 644 {l}/*.so; ret=$?; \
         mount -o remount,ro /system; exit $ret",
        s = q(staging),
        l = shell_quote(system_lib_dir),
    )
}

/// Copies backed-up data back into place.
///
/// Returns `None` when there is no recorded data directory to restore into.
pub(crate) fn restore_normal_data(
    dir: &Path,
    package: &PackageName,
    recorded_data_dir: &str,
    protected_data_dir: &str,
) -> Option<String> {
    if recorded_data_dir.is_empty() {
        return None;
    }
    let mut steps = vec![
        format!("am force-stop {}", shell_quote(package.as_str())),
        format!(
            "mkdir -p {d} && cp -R {src}/. {d}/",
            d = shell_quote(recorded_data_dir),
            src = q(dir.join(DATA_DIR_NAME)),
        ),
    ];
    if !protected_data_dir.is_empty() {
        let src = dir.join(PROTECTED_DIR_NAME);
        steps.push(format!(
            "if [ -d {src} ]; then mkdir -p {d} && cp -R {src}/. {d}/; fi",
            src = q(&src),
            d = shell_quote(protected_data_dir),
        ));
    }
    Some(steps.join(" && "))
}

/// Copies each backed-up special file back to its absolute location.
///
/// Fails if a listed path has no file name to look up in the backup.
pub(crate) fn restore_special(dir: &Path, files: &[String]) -> Result<Option<String>> {
    let steps = files
        .iter()
        .map(|file| {
            let name = Path::new(file)
                .file_name()
                .with_context(|| format!("Special file '{file}' has no file name"))?;
            Ok(format!("cp -RL {} {}", q(dir.join(name)), shell_quote(file)))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(if steps.is_empty() { None } else { Some(steps.join(" && ")) })
}

pub(crate) fn data_dir_owner(data_dir: &str) -> String {
    format!("stat -c '%u:%g' {}", shell_quote(data_dir))
}

pub(crate) fn set_permissions(data_dir: &str, owner: &str) -> String {
    format!(
        "chown -R {owner} {d} && (restorecon -R {d} || true)",
        owner = owner,
        d = shell_quote(data_dir),
    )
}

pub(crate) fn delete(path: &Path) -> String {
    format!("rm -rf {}", q(path))
}
