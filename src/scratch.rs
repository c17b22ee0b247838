//! Scratch artifact naming and selection.
//!
//! Artifacts are keyed by whole-second timestamps. That avoids same-process
//! collisions but is not guaranteed unique under concurrent uploads of a
//! same-named file within one second; the naming scheme is deliberately not
//! strengthened beyond that.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};

const UPLOAD_PREFIX: &str = "upload_";
const RESULTS_PREFIX: &str = "detection_";

pub fn epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Path for a persisted upload: `upload_<epoch>_<sanitized name>`.
/// The name keeps a decodable image extension so the save format is inferred.
pub fn upload_path(scratch_dir: &Path, original_name: &str) -> PathBuf {
    let name = sanitize_file_name(original_name);
    scratch_dir.join(format!("{UPLOAD_PREFIX}{}_{name}", epoch_seconds()))
}

/// Fresh per-request output directory: `detection_<epoch>`.
pub fn results_dir(scratch_dir: &Path) -> PathBuf {
    scratch_dir.join(format!("{RESULTS_PREFIX}{}", epoch_seconds()))
}

/// Strips path components and shell-hostile characters from an upload name,
/// and normalizes the extension to one the image writer understands.
pub fn sanitize_file_name(original: &str) -> String {
    let base = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original);
    let mut cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches(['.', '_']).is_empty() {
        cleaned = "upload".to_string();
    }

    let has_known_ext = Path::new(&cleaned)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            e == "jpg" || e == "jpeg" || e == "png"
        })
        .unwrap_or(false);
    if !has_known_ext {
        cleaned.push_str(".jpg");
    }
    cleaned
}

/// Most-recently-modified regular file in `dir`, or `None` when the
/// directory holds nothing. Modification-time ties resolve arbitrarily at
/// the platform's resolution.
pub fn latest_file(dir: &Path) -> Result<Option<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read scratch directory {}", dir.display()))?;

    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let modified = match entry.metadata().and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(_) => continue,
        };
        let is_newer = newest
            .as_ref()
            .map(|(best, _)| modified >= *best)
            .unwrap_or(true);
        if is_newer {
            newest = Some((modified, path));
        }
    }
    Ok(newest.map(|(_, path)| path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::Duration;

    #[test]
    fn upload_path_keeps_the_sanitized_name() {
        let path = upload_path(Path::new("/tmp"), "site photo.jpg");
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("upload_"));
        assert!(name.ends_with("_site_photo.jpg"));
    }

    #[test]
    fn sanitize_strips_path_components() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd.jpg");
        assert_eq!(sanitize_file_name("c:\\photos\\crew.png"), "crew.png");
        assert_eq!(sanitize_file_name("..."), "upload.jpg");
        assert_eq!(sanitize_file_name("scan.jpeg"), "scan.jpeg");
    }

    #[test]
    fn results_dir_uses_the_detection_prefix() {
        let dir = results_dir(Path::new("/tmp"));
        assert!(dir
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("detection_"));
    }

    #[test]
    fn latest_file_picks_the_newest_and_tolerates_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(latest_file(dir.path()).unwrap().is_none());

        let older = dir.path().join("first.jpg");
        let newer = dir.path().join("second.jpg");
        let old_file = File::create(&older).unwrap();
        let new_file = File::create(&newer).unwrap();

        let base = SystemTime::now();
        old_file.set_modified(base).unwrap();
        new_file.set_modified(base + Duration::from_secs(5)).unwrap();

        assert_eq!(latest_file(dir.path()).unwrap(), Some(newer));
    }
}
