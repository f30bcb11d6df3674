//! Durable JSON snapshot of the metadata cache.
//!
//! The snapshot is a versioned envelope around the record list. Only schema
//! `3.0.0` is accepted: any other value, a missing `packages` array, or
//! unparseable JSON causes the file to be discarded so the next rebuild
//! re-hydrates from disk. Writes go through a temp file and a rename so a
//! crash never leaves a torn snapshot behind.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::fsutil::{atomic_write, remove_file_if_exists};
use crate::record::PackageRecord;
use crate::{Error, Result};

/// The only accepted snapshot schema version.
pub const SCHEMA_VERSION: &str = "3.0.0";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotEnvelope<'a> {
    schema_version: &'a str,
    packages: &'a [PackageRecord],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSnapshot {
    #[serde(default)]
    schema_version: Option<String>,
    #[serde(default)]
    packages: Option<Vec<PackageRecord>>,
}

/// File name of the snapshot for this host: the lowercased machine name so
/// that several instances sharing a directory do not collide.
#[must_use]
pub fn snapshot_file_name() -> String {
    let host = sysinfo::System::host_name().unwrap_or_else(|| "localhost".to_string());
    format!("{}.cache.bin", host.to_lowercase())
}

/// Load the snapshot at `path`.
///
/// Returns an empty record list when the file does not exist. A corrupt or
/// schema-mismatched file is deleted and also yields an empty list; the
/// cache starts empty and a rebuild restores it from the expanded store.
pub fn load(path: &Path) -> Result<Vec<PackageRecord>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let parsed: std::result::Result<RawSnapshot, _> = serde_json::from_str(&contents);
    match parsed {
        Ok(RawSnapshot {
            schema_version: Some(schema),
            packages: Some(packages),
        }) if schema == SCHEMA_VERSION => {
            debug!(count = packages.len(), "Loaded metadata snapshot");
            Ok(packages)
        },
        Ok(RawSnapshot { schema_version, .. }) => {
            warn!(
                path = %path.display(),
                schema = schema_version.as_deref().unwrap_or("<missing>"),
                "Discarding snapshot with unsupported schema"
            );
            remove_file_if_exists(path)?;
            Ok(Vec::new())
        },
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Discarding unparseable snapshot");
            remove_file_if_exists(path)?;
            Ok(Vec::new())
        },
    }
}

/// Write the snapshot for `records` to `path` atomically.
pub fn save(path: &Path, records: &[PackageRecord]) -> Result<()> {
    let envelope = SnapshotEnvelope {
        schema_version: SCHEMA_VERSION,
        packages: records,
    };
    let json = serde_json::to_string_pretty(&envelope)
        .map_err(|e| Error::Serialization(format!("Failed to serialize snapshot: {e}")))?;
    atomic_write(path, json.as_bytes())?;
    debug!(path = %path.display(), count = records.len(), "Persisted metadata snapshot");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::record::tests::record;
    use tempfile::TempDir;

    #[test]
    fn missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let records = load(&dir.path().join("nope.cache.bin")).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("host.cache.bin");
        let records = vec![record("Pkg-A", "1.0.0"), record("Pkg-B", "2.0.0-beta.1")];
        save(&path, &records).unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, "Pkg-A");
        assert_eq!(loaded[1].version.original(), "2.0.0-beta.1");
    }

    #[test]
    fn unsupported_schema_is_deleted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("host.cache.bin");
        fs::write(&path, r#"{"SchemaVersion":"4.0.0","Packages":[]}"#).unwrap();

        let loaded = load(&path).unwrap();
        assert!(loaded.is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn missing_packages_is_deleted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("host.cache.bin");
        fs::write(&path, r#"{"schemaVersion":"3.0.0"}"#).unwrap();

        let loaded = load(&path).unwrap();
        assert!(loaded.is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn unparseable_json_is_deleted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("host.cache.bin");
        fs::write(&path, "not json at all {{{").unwrap();

        let loaded = load(&path).unwrap();
        assert!(loaded.is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn urls_round_trip_as_written() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("host.cache.bin");
        let mut rec = record("A", "1.0.0");
        rec.project_url = Some("file://server/share/project".to_string());
        save(&path, &[rec]).unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(
            loaded[0].project_url.as_deref(),
            Some("file://server/share/project")
        );
    }

    #[test]
    fn snapshot_name_is_lowercased_host() {
        let name = snapshot_file_name();
        assert!(name.ends_with(".cache.bin"));
        assert_eq!(name, name.to_lowercase());
    }
}
