//! Canonical on-disk package store.
//!
//! Each package lives in its own `{id}/{normVersion}/` folder holding the
//! archive and a hash sidecar:
//!
//! ```text
//! <root>/
//!   {id}/{normVersion}/{id}.{normVersion}.nupkg
//!   {id}/{normVersion}/{id}.{normVersion}.nupkg.sha512
//! ```
//!
//! Ids and versions are case-preserved on disk and matched
//! case-insensitively. Unknown files are ignored. Mutating operations are
//! blocking and serialized by the repository gate; enumeration parallelizes
//! hydration across packages on the blocking pool.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::archive::{PackageArchive, hash_file};
use crate::fsutil::{
    atomic_copy, atomic_write, file_times, is_hidden, is_package_file, purge_temp_files,
    remove_file_if_exists, set_hidden,
};
use crate::record::{PackageRecord, StorageFacts};
use crate::{Error, PackageVersion, Result};

/// Extension of the hash sidecar, appended to the archive file name.
const HASH_EXTENSION: &str = ".sha512";

/// The expanded per-id/per-version package store.
#[derive(Debug, Clone)]
pub struct ExpandedStore {
    root: PathBuf,
    enable_delisting: bool,
}

impl ExpandedStore {
    /// Create a store over `root`, creating the directory if needed.
    pub fn new(root: PathBuf, enable_delisting: bool) -> Result<Self> {
        fs::create_dir_all(&root)
            .map_err(|e| Error::Storage(format!("Failed to create store root: {e}")))?;
        Ok(Self {
            root,
            enable_delisting,
        })
    }

    /// The store root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve the on-disk id directory matching `id` case-insensitively.
    fn find_id_dir(&self, id: &str) -> Option<PathBuf> {
        let entries = fs::read_dir(&self.root).ok()?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir()
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| name.eq_ignore_ascii_case(id))
            {
                return Some(path);
            }
        }
        None
    }

    /// Resolve the version directory for an identity, if present on disk.
    fn find_version_dir(&self, id: &str, version: &PackageVersion) -> Option<PathBuf> {
        let id_dir = self.find_id_dir(id)?;
        let normalized = version.normalized();
        let entries = fs::read_dir(&id_dir).ok()?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir()
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| name.eq_ignore_ascii_case(&normalized))
            {
                return Some(path);
            }
        }
        None
    }

    /// Locate the archive inside a version directory.
    fn archive_in(version_dir: &Path) -> Option<PathBuf> {
        let entries = fs::read_dir(version_dir).ok()?;
        entries
            .flatten()
            .map(|entry| entry.path())
            .find(|path| path.is_file() && is_package_file(path))
    }

    /// Canonical archive path for an identity already on disk.
    #[must_use]
    pub fn archive_path(&self, id: &str, version: &PackageVersion) -> Option<PathBuf> {
        self.find_version_dir(id, version)
            .as_deref()
            .and_then(Self::archive_in)
    }

    /// Case-insensitive canonical-path existence check.
    #[must_use]
    pub fn exists(&self, id: &str, version: &PackageVersion) -> bool {
        self.archive_path(id, version).is_some()
    }

    /// Write an archive to its canonical location, produce the hash sidecar,
    /// and return the hydrated record.
    ///
    /// Overwrites any archive already stored for the identity and clears its
    /// hidden attribute, so pushing over an unlisted version re-lists it.
    pub fn add(&self, archive: &PackageArchive) -> Result<PackageRecord> {
        let id = archive.id();
        let normalized = archive.version().normalized();

        let id_dir = self
            .find_id_dir(id)
            .unwrap_or_else(|| self.root.join(id));
        let version_dir = id_dir.join(&normalized);
        fs::create_dir_all(&version_dir)
            .map_err(|e| Error::Storage(format!("Failed to create package folder: {e}")))?;

        let file_name = format!("{id}.{normalized}.nupkg");
        let dest = version_dir.join(&file_name);

        // An overwrite pushed under different id casing must not leave the
        // previously stored archive behind.
        if let Some(existing) = Self::archive_in(&version_dir) {
            if existing != dest {
                set_hidden(&existing, false)?;
                let mut old_sidecar = existing.as_os_str().to_os_string();
                old_sidecar.push(HASH_EXTENSION);
                remove_file_if_exists(&PathBuf::from(old_sidecar))?;
                remove_file_if_exists(&existing)?;
            }
        }

        atomic_copy(archive.path(), &dest)?;
        set_hidden(&dest, false)?;

        let hash = archive.compute_hash()?;
        let sidecar = version_dir.join(format!("{file_name}{HASH_EXTENSION}"));
        atomic_write(&sidecar, hash.as_bytes())?;

        let (created, last_updated) = file_times(&dest)?;
        debug!(id, version = %normalized, path = %dest.display(), "Stored package archive");

        Ok(PackageRecord::from_archive(
            archive,
            StorageFacts {
                package_hash: hash,
                full_path: dest,
                created,
                last_updated,
                listed: true,
            },
        ))
    }

    /// Remove the archive, its sidecar, and its now-empty folders. Idempotent.
    pub fn hard_delete(&self, id: &str, version: &PackageVersion) -> Result<()> {
        let Some(version_dir) = self.find_version_dir(id, version) else {
            return Ok(());
        };
        if let Some(archive) = Self::archive_in(&version_dir) {
            set_hidden(&archive, false)?;
            let mut sidecar = archive.as_os_str().to_os_string();
            sidecar.push(HASH_EXTENSION);
            remove_file_if_exists(&PathBuf::from(sidecar))?;
            remove_file_if_exists(&archive)?;
        }
        // Prune empty folders so enumeration does not revisit dead ids.
        if fs::read_dir(&version_dir).map(|mut e| e.next().is_none()).unwrap_or(false) {
            let _ = fs::remove_dir(&version_dir);
        }
        if let Some(id_dir) = version_dir.parent() {
            if fs::read_dir(id_dir).map(|mut e| e.next().is_none()).unwrap_or(false) {
                let _ = fs::remove_dir(id_dir);
            }
        }
        debug!(id, version = %version.normalized(), "Hard-deleted package");
        Ok(())
    }

    /// Set the archive's hidden attribute, leaving archive and sidecar in
    /// place. Idempotent; a no-op for identities not on disk.
    pub fn soft_delete(&self, id: &str, version: &PackageVersion) -> Result<()> {
        if let Some(archive) = self.archive_path(id, version) {
            set_hidden(&archive, true)?;
            debug!(id, version = %version.normalized(), "Unlisted package");
        }
        Ok(())
    }

    /// Open an identity for download: canonical path plus archive size.
    #[must_use]
    pub fn open(&self, id: &str, version: &PackageVersion) -> Option<(PathBuf, u64)> {
        let path = self.archive_path(id, version)?;
        let size = fs::metadata(&path).ok()?.len();
        Some((path, size))
    }

    /// Hydrate a record from one version directory.
    ///
    /// The sidecar is the source of truth for the hash; a missing sidecar is
    /// rebuilt from the archive so an interrupted write heals on the next
    /// rebuild.
    fn hydrate(&self, version_dir: &Path) -> Result<PackageRecord> {
        purge_temp_files(version_dir)?;
        let archive_file = Self::archive_in(version_dir).ok_or_else(|| {
            Error::Storage(format!("no archive in {}", version_dir.display()))
        })?;
        let archive = PackageArchive::open(&archive_file)?;

        let mut sidecar = archive_file.as_os_str().to_os_string();
        sidecar.push(HASH_EXTENSION);
        let sidecar = PathBuf::from(sidecar);
        let hash = match fs::read_to_string(&sidecar) {
            Ok(contents) => contents.trim().to_string(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let hash = hash_file(&archive_file)?;
                atomic_write(&sidecar, hash.as_bytes())?;
                hash
            },
            Err(e) => return Err(e.into()),
        };

        let (created, last_updated) = file_times(&archive_file)?;
        let listed = if self.enable_delisting {
            !is_hidden(&archive_file)
        } else {
            true
        };

        Ok(PackageRecord::from_archive(
            &archive,
            StorageFacts {
                package_hash: hash,
                full_path: archive_file,
                created,
                last_updated,
                listed,
            },
        ))
    }

    /// Collect every version directory under the root.
    fn version_dirs(&self) -> Result<Vec<PathBuf>> {
        let mut dirs = Vec::new();
        for id_entry in fs::read_dir(&self.root)? {
            let id_path = id_entry?.path();
            if !id_path.is_dir() {
                continue;
            }
            for version_entry in fs::read_dir(&id_path)? {
                let version_path = version_entry?.path();
                if version_path.is_dir() {
                    dirs.push(version_path);
                }
            }
        }
        Ok(dirs)
    }

    /// Enumerate every stored package into records, parsing archives in
    /// parallel. Packages that fail to parse are logged and skipped; an
    /// inaccessible root propagates.
    pub async fn enumerate_all(&self, cancel: &CancellationToken) -> Result<Vec<PackageRecord>> {
        let dirs = self.version_dirs()?;
        let parallelism = std::thread::available_parallelism().map_or(4, |n| n.get());
        let store = Arc::new(self.clone());

        let mut stream = futures::stream::iter(dirs.into_iter().map(|dir| {
            let store = Arc::clone(&store);
            tokio::task::spawn_blocking(move || (store.hydrate(&dir), dir))
        }))
        .buffer_unordered(parallelism);

        let mut records = Vec::new();
        while let Some(joined) = stream.next().await {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            match joined {
                Ok((Ok(record), _)) => records.push(record),
                Ok((Err(e), dir)) => {
                    warn!(dir = %dir.display(), error = %e, "Skipping unreadable package");
                },
                Err(e) => {
                    warn!(error = %e, "Package hydration task failed");
                },
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::archive::tests::write_test_package;
    use tempfile::TempDir;

    fn store_with_package(enable_delisting: bool) -> (ExpandedStore, TempDir, PackageRecord) {
        let scratch = TempDir::new().unwrap();
        let source = write_test_package(
            scratch.path(),
            "upload.nupkg",
            "Pkg-A",
            "1.0.0",
            &["net45"],
        );
        let root = TempDir::new().unwrap();
        let store = ExpandedStore::new(root.path().to_path_buf(), enable_delisting).unwrap();
        let archive = PackageArchive::open(&source).unwrap();
        let record = store.add(&archive).unwrap();
        drop(scratch);
        (store, root, record)
    }

    #[test]
    fn add_writes_canonical_layout() {
        let (store, root, record) = store_with_package(false);
        let expected = root
            .path()
            .join("Pkg-A")
            .join("1.0.0")
            .join("Pkg-A.1.0.0.nupkg");
        assert_eq!(record.full_path, expected);
        assert!(expected.exists());
        let sidecar = root
            .path()
            .join("Pkg-A")
            .join("1.0.0")
            .join("Pkg-A.1.0.0.nupkg.sha512");
        assert!(sidecar.exists());
        assert_eq!(
            fs::read_to_string(sidecar).unwrap().trim(),
            record.package_hash
        );
        assert!(store.exists("pkg-a", &"1.0".parse().unwrap()));
    }

    #[test]
    fn exists_is_case_insensitive() {
        let (store, _root, _record) = store_with_package(false);
        assert!(store.exists("PKG-A", &"1.0.0".parse().unwrap()));
        assert!(!store.exists("pkg-b", &"1.0.0".parse().unwrap()));
    }

    #[test]
    fn hard_delete_removes_archive_and_sidecar() {
        let (store, root, _record) = store_with_package(false);
        let version = "1.0.0".parse().unwrap();
        store.hard_delete("pkg-a", &version).unwrap();
        assert!(!store.exists("pkg-a", &version));
        assert!(!root.path().join("Pkg-A").exists());
        // Idempotent.
        store.hard_delete("pkg-a", &version).unwrap();
    }

    #[test]
    fn soft_delete_hides_but_keeps_files() {
        let (store, _root, record) = store_with_package(true);
        let version = "1.0.0".parse().unwrap();
        store.soft_delete("pkg-a", &version).unwrap();
        assert!(store.exists("pkg-a", &version));
        assert!(record.full_path.exists());
        assert!(is_hidden(&record.full_path));
        // Idempotent.
        store.soft_delete("pkg-a", &version).unwrap();
    }

    #[tokio::test]
    async fn enumerate_hydrates_records() {
        let (store, _root, _record) = store_with_package(false);
        let records = store
            .enumerate_all(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "Pkg-A");
        assert_eq!(records[0].supported_frameworks, "net45");
        assert!(records[0].listed);
        assert!(records[0].package_size > 0);
    }

    #[tokio::test]
    async fn enumerate_reports_unlisted_when_delisting_enabled() {
        let (store, _root, _record) = store_with_package(true);
        store.soft_delete("pkg-a", &"1.0.0".parse().unwrap()).unwrap();
        let records = store
            .enumerate_all(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert!(!records[0].listed);
    }

    #[tokio::test]
    async fn enumerate_skips_corrupt_packages() {
        let (store, root, _record) = store_with_package(false);
        // A second, corrupt package: not a zip at all.
        let bad_dir = root.path().join("Pkg-Bad").join("1.0.0");
        fs::create_dir_all(&bad_dir).unwrap();
        fs::write(bad_dir.join("Pkg-Bad.1.0.0.nupkg"), b"not a zip").unwrap();

        let records = store
            .enumerate_all(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "Pkg-A");
    }

    #[tokio::test]
    async fn enumerate_rebuilds_missing_sidecar() {
        let (store, root, record) = store_with_package(false);
        let sidecar = root
            .path()
            .join("Pkg-A")
            .join("1.0.0")
            .join("Pkg-A.1.0.0.nupkg.sha512");
        fs::remove_file(&sidecar).unwrap();

        let records = store
            .enumerate_all(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(records[0].package_hash, record.package_hash);
        assert!(sidecar.exists());
    }

    #[test]
    fn overwrite_relists_hidden_archive() {
        let (store, _root, record) = store_with_package(true);
        let version: PackageVersion = "1.0.0".parse().unwrap();
        store.soft_delete("pkg-a", &version).unwrap();
        assert!(is_hidden(&record.full_path));

        let scratch = TempDir::new().unwrap();
        let source = write_test_package(scratch.path(), "again.nupkg", "Pkg-A", "1.0.0", &[]);
        let archive = PackageArchive::open(&source).unwrap();
        let record = store.add(&archive).unwrap();
        assert!(!is_hidden(&record.full_path));
        assert!(record.listed);
    }
}
