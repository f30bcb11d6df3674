//! Query helpers over a point-in-time cache snapshot.
//!
//! All helpers operate on the record copies returned by the cache, never on
//! live cache state, so they are free of locking concerns. The client
//! compatibility gate runs first: a level-1 client never sees SemVer 2.0.0
//! records, whatever filter comes after.

use crate::compat::ClientCompatibility;
use crate::dependency::VersionRange;
use crate::framework::{TargetFramework, is_compatible_with_any};
use crate::record::PackageRecord;
use crate::{Error, PackageVersion, Result};

/// Restrict the query domain to what the client's semver level may see.
#[must_use]
pub fn restrict_to_compat(
    mut records: Vec<PackageRecord>,
    compat: &ClientCompatibility,
) -> Vec<PackageRecord> {
    if !compat.allow_semver2() {
        records.retain(|record| !record.is_semver2);
    }
    records
}

/// Case-insensitive id lookup.
#[must_use]
pub fn find_packages_by_id(records: &[PackageRecord], id: &str) -> Vec<PackageRecord> {
    records
        .iter()
        .filter(|record| record.matches_id(id))
        .cloned()
        .collect()
}

/// Exact identity lookup: case-insensitive id, normalized-version equality.
#[must_use]
pub fn find_package(
    records: &[PackageRecord],
    id: &str,
    version: &PackageVersion,
) -> Option<PackageRecord> {
    records
        .iter()
        .find(|record| record.matches_id(id) && record.version == *version)
        .cloned()
}

/// Search options beyond the term itself.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Include pre-release versions in the result.
    pub allow_prerelease: bool,
    /// Drop unlisted records (active when delisting is enabled).
    pub drop_unlisted: bool,
    /// Target frameworks to filter on; empty means no framework filter.
    pub target_frameworks: Vec<String>,
    /// Whether the framework filter is applied at all.
    pub filter_frameworks: bool,
}

/// True when any search token appears in the record's id, tags,
/// description, or authors. An empty term matches everything.
fn matches_term(record: &PackageRecord, tokens: &[String]) -> bool {
    if tokens.is_empty() {
        return true;
    }
    let id = record.id.to_lowercase();
    let tags = record.tags.as_deref().unwrap_or_default().to_lowercase();
    let description = record
        .description
        .as_deref()
        .unwrap_or_default()
        .to_lowercase();
    let authors = record.authors.as_deref().unwrap_or_default().to_lowercase();

    tokens.iter().any(|token| {
        id.contains(token)
            || tags.contains(token)
            || description.contains(token)
            || authors.contains(token)
    })
}

/// Tokenized search over id, tags, description, and authors.
#[must_use]
pub fn search(
    records: &[PackageRecord],
    term: &str,
    options: &SearchOptions,
) -> Vec<PackageRecord> {
    let tokens: Vec<String> = term
        .split_whitespace()
        .map(str::to_lowercase)
        .collect();
    let targets: Vec<TargetFramework> = options
        .target_frameworks
        .iter()
        .filter_map(|moniker| moniker.parse().ok())
        .collect();

    records
        .iter()
        .filter(|record| matches_term(record, &tokens))
        .filter(|record| options.allow_prerelease || !record.version.is_prerelease())
        .filter(|record| !options.drop_unlisted || record.listed)
        .filter(|record| {
            !options.filter_frameworks
                || targets.is_empty()
                || is_compatible_with_any(&record.supported_frameworks, &targets)
        })
        .cloned()
        .collect()
}

/// Per-id highest version wins; grouping is ASCII case-insensitive.
#[must_use]
pub fn collapse_by_id(records: Vec<PackageRecord>) -> Vec<PackageRecord> {
    let mut best: Vec<PackageRecord> = Vec::new();
    for record in records {
        match best
            .iter_mut()
            .find(|kept| kept.matches_id(&record.id))
        {
            Some(kept) => {
                if record.version > kept.version {
                    *kept = record;
                }
            },
            None => best.push(record),
        }
    }
    best
}

/// Candidate selection for an update check.
///
/// `names` pairs each installed package id with its installed version;
/// `version_constraints`, when given, must agree with `names` in length and
/// restricts each id's acceptable upgrades.
pub fn get_updates(
    records: &[PackageRecord],
    names: &[(String, PackageVersion)],
    version_constraints: Option<&[Option<VersionRange>]>,
    include_prerelease: bool,
    include_all_versions: bool,
    target_frameworks: &[String],
) -> Result<Vec<PackageRecord>> {
    if let Some(constraints) = version_constraints {
        if constraints.len() != names.len() {
            return Err(Error::InvalidQuery(format!(
                "{} package ids with {} version constraints",
                names.len(),
                constraints.len()
            )));
        }
    }

    let targets: Vec<TargetFramework> = target_frameworks
        .iter()
        .filter_map(|moniker| moniker.parse().ok())
        .collect();

    let mut updates = Vec::new();
    for (index, (id, installed)) in names.iter().enumerate() {
        let constraint = version_constraints.and_then(|c| c[index].as_ref());
        for record in records {
            if !record.matches_id(id) || !record.listed {
                continue;
            }
            if record.version <= *installed {
                continue;
            }
            if !include_prerelease && record.version.is_prerelease() {
                continue;
            }
            if !targets.is_empty()
                && !is_compatible_with_any(&record.supported_frameworks, &targets)
            {
                continue;
            }
            if let Some(constraint) = constraint {
                if !constraint.satisfies(&record.version) {
                    continue;
                }
            }
            updates.push(record.clone());
        }
    }

    if include_all_versions {
        Ok(updates)
    } else {
        Ok(collapse_by_id(updates))
    }
}
