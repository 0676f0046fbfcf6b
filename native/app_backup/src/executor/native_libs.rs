use std::{
    fs::File,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use tracing::{debug, instrument};
use zip::ZipArchive;

/// ABIs in order of preference, with the system library directory they install into
const ABI_PREFERENCE: &[(&str, &str)] = &[
    ("arm64-v8a", "/system/lib64"),
    ("armeabi-v7a", "/system/lib"),
    ("armeabi", "/system/lib"),
    ("x86_64", "/system/lib64"),
    ("x86", "/system/lib"),
];

/// Native libraries extracted from an APK for a single ABI
#[derive(Debug, Clone)]
pub(crate) struct NativeLibraries {
    pub abi: &'static str,
    pub system_lib_dir: &'static str,
    pub files: Vec<PathBuf>,
}

fn is_lib_of(entry_name: &str, abi: &str) -> bool {
    entry_name
        .strip_prefix("lib/")
        .and_then(|rest| rest.strip_prefix(abi))
        .and_then(|rest| rest.strip_prefix('/'))
        .is_some_and(|file| !file.is_empty() && !file.contains('/') && file.ends_with(".so"))
}

/// Extracts the `.so` files of the preferred ABI found in `apk` into `dest`.
///
/// Returns `Ok(None)` if the APK carries no native libraries.
#[instrument(level = "debug", fields(apk = %apk.display(), dest = %dest.display()), err)]
pub(crate) fn extract_native_libraries(apk: &Path, dest: &Path) -> Result<Option<NativeLibraries>> {
    let file = File::open(apk).with_context(|| format!("Failed to open {}", apk.display()))?;
    let mut zip = ZipArchive::new(file).context("Failed to read APK as zip")?;
    let names = zip.file_names().map(str::to_owned).collect::<Vec<_>>();

    let Some(&(abi, system_lib_dir)) =
        ABI_PREFERENCE.iter().find(|(abi, _)| names.iter().any(|n| is_lib_of(n, abi)))
    else {
        debug!("APK has no native libraries");
        return Ok(None);
    };

    let mut files = Vec::new();
    for name in names.iter().filter(|n| is_lib_of(n, abi)) {
        let mut entry =
            zip.by_name(name).with_context(|| format!("Failed to read {name} from APK"))?;
        let file_name = Path::new(name).file_name().context("Library entry has no file name")?;
        let out_path = dest.join(file_name);
        let mut out = File::create(&out_path)
            .with_context(|| format!("Failed to create {}", out_path.display()))?;
        std::io::copy(&mut entry, &mut out)
            .with_context(|| format!("Failed to extract {name}"))?;
        files.push(out_path);
    }
    debug!(abi, count = files.len(), "Extracted native libraries");
    Ok(Some(NativeLibraries { abi, system_lib_dir, files }))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::tempdir;
    use zip::{ZipWriter, write::SimpleFileOptions};

    use super::*;

    fn write_apk(path: &Path, entries: &[&str]) {
        let mut writer = ZipWriter::new(File::create(path).unwrap());
        for entry in entries {
            writer.start_file(*entry, SimpleFileOptions::default()).unwrap();
            writer.write_all(entry.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_is_lib_of() {
        assert!(is_lib_of("lib/arm64-v8a/libfoo.so", "arm64-v8a"));
        assert!(!is_lib_of("lib/arm64-v8a/sub/libfoo.so", "arm64-v8a"));
        assert!(!is_lib_of("lib/arm64-v8a/readme.txt", "arm64-v8a"));
        assert!(!is_lib_of("lib/armeabi-v7a/libfoo.so", "armeabi"));
        assert!(!is_lib_of("assets/lib/x86/libfoo.so", "x86"));
    }

    #[test]
    fn test_extracts_preferred_abi_only() {
        let dir = tempdir().unwrap();
        let apk = dir.path().join("base.apk");
        write_apk(
            &apk,
            &[
                "AndroidManifest.xml",
                "lib/armeabi-v7a/libfoo.so",
                "lib/arm64-v8a/libfoo.so",
                "lib/arm64-v8a/libbar.so",
            ],
        );
        let dest = dir.path().join("out");
        std::fs::create_dir(&dest).unwrap();

        let libs = extract_native_libraries(&apk, &dest).unwrap().unwrap();
        assert_eq!(libs.abi, "arm64-v8a");
        assert_eq!(libs.system_lib_dir, "/system/lib64");
        assert_eq!(libs.files.len(), 2);
        let content = std::fs::read_to_string(dest.join("libbar.so")).unwrap();
        assert_eq!(content, "lib/arm64-v8a/libbar.so");
    }

    #[test]
    fn test_no_native_libraries() {
        let dir = tempdir().unwrap();
        let apk = dir.path().join("base.apk");
        write_apk(&apk, &["AndroidManifest.xml", "classes.dex"]);
        assert!(extract_native_libraries(&apk, dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_missing_apk_fails() {
        let dir = tempdir().unwrap();
        let err = extract_native_libraries(&dir.path().join("missing.apk"), dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to open"));
    }
}
