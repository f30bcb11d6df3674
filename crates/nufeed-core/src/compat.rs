//! Client semver-level compatibility gate.
//!
//! Every query is parameterized by the semver level the client declared.
//! Clients below level 2 never see SemVer 2.0.0 packages, and "latest"
//! selection consults the flag set matching the client's level.

use crate::PackageVersion;

/// The declared semver capability of a querying client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCompatibility {
    semver_level: PackageVersion,
}

impl ClientCompatibility {
    /// Level assumed for clients that did not declare one (`1.0.0`).
    #[must_use]
    pub fn default_level() -> Self {
        Self {
            semver_level: PackageVersion::new(1, 0, 0),
        }
    }

    /// Highest recognized level (`2.0.0`).
    #[must_use]
    pub fn max_level() -> Self {
        Self {
            semver_level: PackageVersion::new(2, 0, 0),
        }
    }

    /// Parse a declared level; unparseable or missing input collapses to the
    /// default level.
    #[must_use]
    pub fn from_level(level: Option<&str>) -> Self {
        level
            .and_then(|s| s.parse().ok())
            .map_or_else(Self::default_level, |semver_level| Self { semver_level })
    }

    /// The declared level.
    #[must_use]
    pub const fn semver_level(&self) -> &PackageVersion {
        &self.semver_level
    }

    /// True when the client may see SemVer 2.0.0 packages.
    #[must_use]
    pub fn allow_semver2(&self) -> bool {
        self.semver_level.major() >= 2
    }
}

impl Default for ClientCompatibility {
    fn default() -> Self {
        Self::default_level()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_level_blocks_semver2() {
        assert!(!ClientCompatibility::default_level().allow_semver2());
        assert!(ClientCompatibility::max_level().allow_semver2());
    }

    #[test]
    fn unparseable_levels_collapse_to_default() {
        assert!(!ClientCompatibility::from_level(None).allow_semver2());
        assert!(!ClientCompatibility::from_level(Some("garbage")).allow_semver2());
        assert!(ClientCompatibility::from_level(Some("2.0.0")).allow_semver2());
        assert!(ClientCompatibility::from_level(Some("3.0")).allow_semver2());
    }
}
