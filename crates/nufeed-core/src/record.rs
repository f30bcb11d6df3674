//! Cached package metadata records.
//!
//! A [`PackageRecord`] is the unit the metadata cache holds: manifest-derived
//! fields, storage-derived facts, and the derived latest-version flags. The
//! wire shape (camelCase, nulls omitted, unknown fields ignored) is the
//! stable snapshot format.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::archive::{HASH_ALGORITHM, PackageArchive};
use crate::compat::ClientCompatibility;
use crate::dependency::{dependencies_reference_semver2, flatten_dependencies};
use crate::framework::flatten_frameworks;
use crate::PackageVersion;

/// Cache key: ASCII-lowercased id plus normalized version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    /// Lowercased package id.
    pub id: String,
    /// Normalized version string.
    pub version: String,
}

impl RecordKey {
    /// Build a key from the raw identity parts.
    #[must_use]
    pub fn new(id: &str, version: &PackageVersion) -> Self {
        Self {
            id: id.to_ascii_lowercase(),
            version: version.normalized(),
        }
    }
}

fn default_hash_algorithm() -> String {
    HASH_ALGORITHM.to_string()
}

const fn default_listed() -> bool {
    true
}

/// Storage-side facts used to hydrate a record from an archive.
#[derive(Debug, Clone)]
pub struct StorageFacts {
    /// Canonical hash of the archive, as stored in the sidecar.
    pub package_hash: String,
    /// Canonical on-disk path of the archive.
    pub full_path: PathBuf,
    /// Filesystem creation time.
    pub created: DateTime<Utc>,
    /// Filesystem modification time.
    pub last_updated: DateTime<Utc>,
    /// Listed state, from the archive's hidden attribute.
    pub listed: bool,
}

/// A cached package metadata record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageRecord {
    /// Package id, case-preserved.
    pub id: String,
    /// Package version, original text preserved.
    pub version: PackageVersion,

    /// Human-friendly title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Comma-separated authors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<String>,
    /// Comma-separated owners.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owners: Option<String>,
    /// Absolute icon URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    /// Absolute license URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_url: Option<String>,
    /// Absolute project URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_url: Option<String>,
    /// Absolute report-abuse URL. Feed-assigned: the manifest schema has no
    /// such element, so ingestion always leaves this `None` and the value
    /// only round-trips through the snapshot for feeds that set it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_abuse_url: Option<String>,
    /// Whether installation requires license acceptance.
    #[serde(default)]
    pub require_license_acceptance: bool,
    /// Whether the package is a development-only dependency.
    #[serde(default)]
    pub development_dependency: bool,
    /// Long description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Short summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Release notes for this version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_notes: Option<String>,
    /// Locale of the package content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Space- or comma-separated tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
    /// Copyright statement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copyright: Option<String>,
    /// Minimum client version able to install the package.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_client_version: Option<String>,
    /// Cumulative download count reported by the feed.
    #[serde(default)]
    pub download_count: i64,
    /// Flattened dependency tuples (`id:versionSpec:targetFramework` joined
    /// by `|`).
    #[serde(default)]
    pub dependencies: String,
    /// Flattened supported framework monikers.
    #[serde(default)]
    pub supported_frameworks: String,
    /// Publication timestamp.
    pub published: DateTime<Utc>,
    /// False when the package has been unlisted.
    #[serde(default = "default_listed")]
    pub listed: bool,

    /// Archive size in bytes.
    pub package_size: u64,
    /// Canonical archive hash from the sidecar.
    #[serde(default)]
    pub package_hash: String,
    /// Algorithm of `package_hash`.
    #[serde(default = "default_hash_algorithm")]
    pub package_hash_algorithm: String,
    /// Filesystem modification time of the archive.
    pub last_updated: DateTime<Utc>,
    /// Filesystem creation time of the archive.
    pub created: DateTime<Utc>,
    /// Canonical on-disk path of the archive.
    #[serde(default)]
    pub full_path: PathBuf,

    /// Latest release among non-SemVer2 versions of the id.
    #[serde(default)]
    pub semver1_is_latest: bool,
    /// Highest non-SemVer2 version of the id, pre-release allowed.
    #[serde(default)]
    pub semver1_is_absolute_latest: bool,
    /// Latest release among all versions of the id.
    #[serde(default)]
    pub semver2_is_latest: bool,
    /// Highest version of the id, pre-release allowed.
    #[serde(default)]
    pub semver2_is_absolute_latest: bool,
    /// SemVer 2.0.0 classification of the record.
    #[serde(default)]
    pub is_semver2: bool,
}

impl PackageRecord {
    /// Hydrate a record from an opened archive plus storage facts.
    #[must_use]
    pub fn from_archive(archive: &PackageArchive, facts: StorageFacts) -> Self {
        let manifest = archive.manifest();
        let dependencies = flatten_dependencies(&manifest.dependencies);
        let supported_frameworks = flatten_frameworks(archive.supported_frameworks());
        let version = archive.version().clone();
        let is_semver2 = version.is_semver2() || dependencies_reference_semver2(&dependencies);

        Self {
            id: manifest.id.clone(),
            version,
            title: manifest.title.clone(),
            authors: manifest.authors.clone(),
            owners: manifest.owners.clone(),
            icon_url: manifest.icon_url.clone(),
            license_url: manifest.license_url.clone(),
            project_url: manifest.project_url.clone(),
            report_abuse_url: None,
            require_license_acceptance: manifest.require_license_acceptance,
            development_dependency: manifest.development_dependency,
            description: manifest.description.clone(),
            summary: manifest.summary.clone(),
            release_notes: manifest.release_notes.clone(),
            language: manifest.language.clone(),
            tags: manifest.tags.clone(),
            copyright: manifest.copyright.clone(),
            min_client_version: manifest.min_client_version.clone(),
            download_count: 0,
            dependencies,
            supported_frameworks,
            published: facts.created,
            listed: facts.listed,
            package_size: archive.size(),
            package_hash: facts.package_hash,
            package_hash_algorithm: HASH_ALGORITHM.to_string(),
            last_updated: facts.last_updated,
            created: facts.created,
            full_path: facts.full_path,
            semver1_is_latest: false,
            semver1_is_absolute_latest: false,
            semver2_is_latest: false,
            semver2_is_absolute_latest: false,
            is_semver2,
        }
    }

    /// Cache key for this record.
    #[must_use]
    pub fn key(&self) -> RecordKey {
        RecordKey::new(&self.id, &self.version)
    }

    /// Case-insensitive id match.
    #[must_use]
    pub fn matches_id(&self, id: &str) -> bool {
        self.id.eq_ignore_ascii_case(id)
    }

    /// Clear all four derived latest flags.
    pub fn clear_latest_flags(&mut self) {
        self.semver1_is_latest = false;
        self.semver1_is_absolute_latest = false;
        self.semver2_is_latest = false;
        self.semver2_is_absolute_latest = false;
    }

    /// Recompute the SemVer2 classification from the version and the
    /// flattened dependency ranges. Derived fields are never trusted from
    /// disk.
    pub fn refresh_semver2(&mut self) {
        self.is_semver2 =
            self.version.is_semver2() || dependencies_reference_semver2(&self.dependencies);
    }

    /// Latest-release flag for the client's semver level.
    #[must_use]
    pub fn is_latest(&self, compat: &ClientCompatibility) -> bool {
        if compat.allow_semver2() {
            self.semver2_is_latest
        } else {
            self.semver1_is_latest
        }
    }

    /// Absolute-latest flag for the client's semver level.
    #[must_use]
    pub fn is_absolute_latest(&self, compat: &ClientCompatibility) -> bool {
        if compat.allow_semver2() {
            self.semver2_is_absolute_latest
        } else {
            self.semver1_is_absolute_latest
        }
    }
}
