//! Filesystem helpers shared by the store and the snapshot writer.
//!
//! Writes that must survive crashes go through a temp file in the target
//! directory followed by a rename. The hidden attribute used for unlisting
//! is rendered portably as a `.hidden` marker sidecar so the engine behaves
//! the same on every platform and the archive itself stays at its canonical
//! path.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::{Error, Result};

/// Suffix of the marker file that renders the hidden attribute.
const HIDDEN_MARKER_SUFFIX: &str = ".hidden";

/// Suffix used for in-flight temp files.
const TEMP_SUFFIX: &str = ".tmp";

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}

fn marker_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(HIDDEN_MARKER_SUFFIX);
    PathBuf::from(name)
}

/// Write `contents` to `path` atomically: temp file in the same directory,
/// then rename over the destination.
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp = temp_path(path);
    fs::write(&tmp, contents)
        .map_err(|e| Error::Storage(format!("Failed to write {}: {e}", tmp.display())))?;

    #[cfg(target_os = "windows")]
    if path.exists() {
        fs::remove_file(path)
            .map_err(|e| Error::Storage(format!("Failed to replace {}: {e}", path.display())))?;
    }

    fs::rename(&tmp, path)
        .map_err(|e| Error::Storage(format!("Failed to commit {}: {e}", path.display())))?;
    Ok(())
}

/// Copy `source` to `dest` atomically via a temp file next to `dest`.
pub fn atomic_copy(source: &Path, dest: &Path) -> Result<()> {
    let tmp = temp_path(dest);
    fs::copy(source, &tmp)
        .map_err(|e| Error::Storage(format!("Failed to copy to {}: {e}", tmp.display())))?;

    #[cfg(target_os = "windows")]
    if dest.exists() {
        fs::remove_file(dest)
            .map_err(|e| Error::Storage(format!("Failed to replace {}: {e}", dest.display())))?;
    }

    fs::rename(&tmp, dest)
        .map_err(|e| Error::Storage(format!("Failed to commit {}: {e}", dest.display())))?;
    Ok(())
}

/// Set or clear the hidden attribute on a file. Idempotent.
pub fn set_hidden(path: &Path, hidden: bool) -> Result<()> {
    let marker = marker_path(path);
    if hidden {
        if !marker.exists() {
            fs::write(&marker, b"")
                .map_err(|e| Error::Storage(format!("Failed to hide {}: {e}", path.display())))?;
        }
    } else if marker.exists() {
        fs::remove_file(&marker)
            .map_err(|e| Error::Storage(format!("Failed to unhide {}: {e}", path.display())))?;
    }
    Ok(())
}

/// True when the file carries the hidden attribute.
#[must_use]
pub fn is_hidden(path: &Path) -> bool {
    marker_path(path).exists()
}

/// Remove a file if present; missing files are not an error.
pub fn remove_file_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Storage(format!(
            "Failed to remove {}: {e}",
            path.display()
        ))),
    }
}

/// Creation and modification times of a file. Filesystems without a creation
/// time fall back to the modification time.
pub fn file_times(path: &Path) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let metadata = fs::metadata(path)?;
    let modified: DateTime<Utc> = metadata.modified()?.into();
    let created: DateTime<Utc> = metadata.created().map_or(modified, Into::into);
    Ok((created, modified))
}

/// True when the path names a package archive by extension.
#[must_use]
pub fn is_package_file(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("nupkg"))
}

/// Delete any in-flight temp files left behind in `dir` by an interrupted
/// writer. Non-recursive.
pub fn purge_temp_files(dir: &Path) -> Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if path.is_file()
            && path
                .to_string_lossy()
                .ends_with(TEMP_SUFFIX)
        {
            tracing::debug!(path = %path.display(), "Purging stale temp file");
            remove_file_if_exists(&path)?;
        }
    }
    Ok(())
}
