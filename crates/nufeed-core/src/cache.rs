//! Thread-safe in-memory metadata index with a durable snapshot.
//!
//! The cache keys records by case-insensitive id plus normalized version and
//! guards them with a reader/writer lock: readers take point-in-time copies,
//! writers hold the lock only for the in-memory mutation. The one exception
//! is [`MetadataCache::persist`], which holds the write lock for the
//! duration of the snapshot write so no mutation can race a persist.
//!
//! Derived latest-version flags are recomputed in bulk after every mutation.
//! For each id four buckets are ranked by version: the highest non-SemVer2
//! version (absolute latest at level 1), the highest non-SemVer2 release
//! (latest at level 1), the highest version overall (absolute latest at
//! level 2), and the highest release overall (latest at level 2). Unlisted
//! records are not eligible.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use tokio::sync::RwLock;
use tracing::debug;

use crate::record::{PackageRecord, RecordKey};
use crate::{PackageVersion, Result, snapshot};

#[derive(Debug, Default)]
struct CacheInner {
    records: HashMap<RecordKey, PackageRecord>,
    dirty: bool,
}

/// The in-memory package metadata index.
#[derive(Debug)]
pub struct MetadataCache {
    inner: RwLock<CacheInner>,
    snapshot_path: PathBuf,
}

impl MetadataCache {
    /// Create a cache backed by the snapshot at `snapshot_path`.
    ///
    /// An existing snapshot is loaded; a corrupt or schema-mismatched file
    /// is deleted and the cache starts empty. Derived fields are recomputed
    /// from the loaded records rather than trusted from disk.
    pub fn new(snapshot_path: PathBuf) -> Result<Self> {
        let mut records = HashMap::new();
        for mut record in snapshot::load(&snapshot_path)? {
            record.refresh_semver2();
            records.insert(record.key(), record);
        }
        update_latest_flags(&mut records, None);

        debug!(count = records.len(), "Metadata cache initialized");
        Ok(Self {
            inner: RwLock::new(CacheInner {
                records,
                dirty: false,
            }),
            snapshot_path,
        })
    }

    /// True when the cache holds no records.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.records.is_empty()
    }

    /// True when a record exists for the identity.
    pub async fn exists(&self, id: &str, version: &PackageVersion) -> bool {
        let key = RecordKey::new(id, version);
        self.inner.read().await.records.contains_key(&key)
    }

    /// Point-in-time copy of every record, safe to query outside the lock.
    pub async fn get_all(&self) -> Vec<PackageRecord> {
        self.inner.read().await.records.values().cloned().collect()
    }

    /// Insert a record, replacing any existing record with the same
    /// identity, and recompute latest flags for the record's id.
    pub async fn add(&self, record: PackageRecord) {
        let mut inner = self.inner.write().await;
        let id = record.id.to_ascii_lowercase();
        inner.records.insert(record.key(), record);
        update_latest_flags(&mut inner.records, Some(&id));
        inner.dirty = true;
    }

    /// Bulk insert; latest flags are recomputed across all records.
    pub async fn add_many(&self, records: Vec<PackageRecord>) {
        let mut inner = self.inner.write().await;
        for record in records {
            inner.records.insert(record.key(), record);
        }
        update_latest_flags(&mut inner.records, None);
        inner.dirty = true;
    }

    /// Remove or unlist an identity; returns false when no record matched.
    ///
    /// With `soft_delete` the record stays but is marked `listed = false`;
    /// otherwise it is dropped. Latest flags for the id are recomputed
    /// either way.
    pub async fn remove(&self, id: &str, version: &PackageVersion, soft_delete: bool) -> bool {
        let key = RecordKey::new(id, version);
        let mut inner = self.inner.write().await;
        let found = if soft_delete {
            match inner.records.get_mut(&key) {
                Some(record) => {
                    record.listed = false;
                    true
                },
                None => false,
            }
        } else {
            inner.records.remove(&key).is_some()
        };
        if found {
            update_latest_flags(&mut inner.records, Some(&key.id));
            inner.dirty = true;
        }
        found
    }

    /// Drop every record.
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.records.clear();
        inner.dirty = true;
    }

    /// Write the snapshot unconditionally and clear the dirty flag.
    ///
    /// Holds the write lock for the duration of the write: a persisted
    /// snapshot always reflects the cache's state at the moment of the call.
    pub async fn persist(&self) -> Result<()> {
        let mut inner = self.inner.write().await;
        let records: Vec<PackageRecord> = inner.records.values().cloned().collect();
        snapshot::save(&self.snapshot_path, &records)?;
        inner.dirty = false;
        Ok(())
    }

    /// Persist only when mutations happened since the last persist.
    pub async fn persist_if_dirty(&self) -> Result<()> {
        let mut inner = self.inner.write().await;
        if !inner.dirty {
            return Ok(());
        }
        let records: Vec<PackageRecord> = inner.records.values().cloned().collect();
        snapshot::save(&self.snapshot_path, &records)?;
        inner.dirty = false;
        Ok(())
    }

    /// True when the cache has unpersisted mutations.
    pub async fn is_dirty(&self) -> bool {
        self.inner.read().await.dirty
    }
}

/// Recompute the four derived latest flags, restricted to `only_id`
/// (lowercased) when given, across all ids otherwise.
///
/// Ranking within an id is independent of traversal order: every flag is
/// cleared first, then the single winner of each bucket is marked.
fn update_latest_flags(records: &mut HashMap<RecordKey, PackageRecord>, only_id: Option<&str>) {
    let ids: HashSet<String> = records
        .keys()
        .filter(|key| only_id.is_none_or(|id| key.id == id))
        .map(|key| key.id.clone())
        .collect();

    for id in ids {
        let keys: Vec<RecordKey> = records
            .keys()
            .filter(|key| key.id == id)
            .cloned()
            .collect();

        for key in &keys {
            if let Some(record) = records.get_mut(key) {
                record.clear_latest_flags();
            }
        }

        let mut semver1_absolute: Option<(RecordKey, PackageVersion)> = None;
        let mut semver1_latest: Option<(RecordKey, PackageVersion)> = None;
        let mut semver2_absolute: Option<(RecordKey, PackageVersion)> = None;
        let mut semver2_latest: Option<(RecordKey, PackageVersion)> = None;

        let mut rank = |slot: &mut Option<(RecordKey, PackageVersion)>,
                        key: &RecordKey,
                        version: &PackageVersion| {
            if slot.as_ref().is_none_or(|(_, best)| version > best) {
                *slot = Some((key.clone(), version.clone()));
            }
        };

        for key in &keys {
            let Some(record) = records.get(key) else {
                continue;
            };
            if !record.listed {
                continue;
            }
            let version = &record.version;
            rank(&mut semver2_absolute, key, version);
            if !version.is_prerelease() {
                rank(&mut semver2_latest, key, version);
            }
            if !record.is_semver2 {
                rank(&mut semver1_absolute, key, version);
                if !version.is_prerelease() {
                    rank(&mut semver1_latest, key, version);
                }
            }
        }

        if let Some((key, _)) = semver1_absolute {
            if let Some(record) = records.get_mut(&key) {
                record.semver1_is_absolute_latest = true;
            }
        }
        if let Some((key, _)) = semver1_latest {
            if let Some(record) = records.get_mut(&key) {
                record.semver1_is_latest = true;
            }
        }
        if let Some((key, _)) = semver2_absolute {
            if let Some(record) = records.get_mut(&key) {
                record.semver2_is_absolute_latest = true;
            }
        }
        if let Some((key, _)) = semver2_latest {
            if let Some(record) = records.get_mut(&key) {
                record.semver2_is_latest = true;
            }
        }
    }
}
