//! Package dependency declarations and version ranges.
//!
//! Dependency sets travel through the cache and the snapshot as a flattened
//! string: `id:versionSpec:targetFramework` tuples joined by `|`. An empty id
//! denotes a framework group with no dependencies, an empty version spec
//! denotes "any version", and parsing tolerates the empty-middle form
//! (`id::framework`). This is the stable on-wire format.

use std::fmt;
use std::str::FromStr;

use crate::{Error, PackageVersion, Result};

/// A dependency version range in bracket notation.
///
/// Supported grammar: a bare version (`1.0`, meaning "at least 1.0"), an
/// exact pin (`[1.0]`), and bounded intervals with inclusive brackets or
/// exclusive parentheses (`[1.0,2.0)`, `(,2.0]`, `(1.0,)`).
#[derive(Debug, Clone)]
pub struct VersionRange {
    min: Option<PackageVersion>,
    min_inclusive: bool,
    max: Option<PackageVersion>,
    max_inclusive: bool,
    original: String,
}

impl VersionRange {
    /// Lower bound, when declared.
    #[must_use]
    pub const fn min(&self) -> Option<&PackageVersion> {
        self.min.as_ref()
    }

    /// Upper bound, when declared.
    #[must_use]
    pub const fn max(&self) -> Option<&PackageVersion> {
        self.max.as_ref()
    }

    /// True when `version` falls inside the range.
    #[must_use]
    pub fn satisfies(&self, version: &PackageVersion) -> bool {
        if let Some(min) = &self.min {
            let ok = if self.min_inclusive {
                version >= min
            } else {
                version > min
            };
            if !ok {
                return false;
            }
        }
        if let Some(max) = &self.max {
            let ok = if self.max_inclusive {
                version <= max
            } else {
                version < max
            };
            if !ok {
                return false;
            }
        }
        true
    }

    /// True when either declared endpoint carries SemVer 2.0.0 traits.
    ///
    /// Only the parsed min/max endpoints are inspected; the classification
    /// deliberately ignores grammar beyond bracket notation.
    #[must_use]
    pub fn references_semver2(&self) -> bool {
        self.min.as_ref().is_some_and(PackageVersion::is_semver2)
            || self.max.as_ref().is_some_and(PackageVersion::is_semver2)
    }
}

fn parse_endpoint(s: &str) -> Result<Option<PackageVersion>> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(None);
    }
    Ok(Some(s.parse()?))
}

impl FromStr for VersionRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let original = s.trim();
        if original.is_empty() {
            return Err(Error::Parse("empty version range".to_string()));
        }

        let first = original.chars().next();
        if !matches!(first, Some('[' | '(')) {
            // Bare version: minimum bound, inclusive.
            let min: PackageVersion = original.parse()?;
            return Ok(Self {
                min: Some(min),
                min_inclusive: true,
                max: None,
                max_inclusive: false,
                original: original.to_string(),
            });
        }

        let min_inclusive = first == Some('[');
        let max_inclusive = match original.chars().last() {
            Some(']') => true,
            Some(')') => false,
            _ => {
                return Err(Error::Parse(format!(
                    "version range is not closed: `{original}`"
                )));
            },
        };

        let inner = &original[1..original.len() - 1];
        let (min, max) = match inner.split_once(',') {
            Some((lo, hi)) => (parse_endpoint(lo)?, parse_endpoint(hi)?),
            None => {
                // Exact pin, only valid with inclusive brackets.
                if !(min_inclusive && max_inclusive) {
                    return Err(Error::Parse(format!(
                        "exact version range must use brackets: `{original}`"
                    )));
                }
                let exact = parse_endpoint(inner)?;
                (exact.clone(), exact)
            },
        };

        if min.is_none() && max.is_none() {
            return Err(Error::Parse(format!(
                "version range has no bounds: `{original}`"
            )));
        }

        Ok(Self {
            min,
            min_inclusive,
            max,
            max_inclusive,
            original: original.to_string(),
        })
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

/// A single declared dependency.
///
/// An empty `id` marks a framework group that declares no dependencies but
/// still records the group's target framework.
#[derive(Debug, Clone)]
pub struct Dependency {
    /// Depended-on package id; empty for a bare framework group.
    pub id: String,
    /// Accepted version range; `None` means any version.
    pub range: Option<VersionRange>,
    /// Target framework moniker of the declaring group, when scoped.
    pub target_framework: Option<String>,
}

/// Flatten dependencies into the pipe-joined wire format.
#[must_use]
pub fn flatten_dependencies(dependencies: &[Dependency]) -> String {
    let mut parts = Vec::with_capacity(dependencies.len());
    for dep in dependencies {
        let range = dep.range.as_ref().map(ToString::to_string).unwrap_or_default();
        match &dep.target_framework {
            Some(framework) => parts.push(format!("{}:{range}:{framework}", dep.id)),
            None => parts.push(format!("{}:{range}", dep.id)),
        }
    }
    parts.join("|")
}

/// Parse the pipe-joined wire format back into dependencies.
///
/// Unparseable version specs degrade to "any version" rather than failing
/// the whole record; the flattened string is feed-internal and a bad spec in
/// one tuple must not hide the others.
#[must_use]
pub fn parse_dependencies(flattened: &str) -> Vec<Dependency> {
    let mut dependencies = Vec::new();
    for tuple in flattened.split('|') {
        if tuple.is_empty() {
            continue;
        }
        let mut fields = tuple.splitn(3, ':');
        let id = fields.next().unwrap_or_default().to_string();
        let range = fields
            .next()
            .filter(|spec| !spec.is_empty())
            .and_then(|spec| spec.parse().ok());
        let target_framework = fields
            .next()
            .filter(|framework| !framework.is_empty())
            .map(ToString::to_string);
        dependencies.push(Dependency {
            id,
            range,
            target_framework,
        });
    }
    dependencies
}

/// True when any declared dependency range references a SemVer 2.0.0 version.
#[must_use]
pub fn dependencies_reference_semver2(flattened: &str) -> bool {
    parse_dependencies(flattened)
        .iter()
        .any(|dep| dep.range.as_ref().is_some_and(VersionRange::references_semver2))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn range(s: &str) -> VersionRange {
        s.parse().unwrap()
    }

    fn ver(s: &str) -> PackageVersion {
        s.parse().unwrap()
    }

    #[test]
    fn bare_version_is_inclusive_minimum() {
        let r = range("1.0");
        assert!(r.satisfies(&ver("1.0.0")));
        assert!(r.satisfies(&ver("9.0.0")));
        assert!(!r.satisfies(&ver("0.9.0")));
    }

    #[test]
    fn exact_pin() {
        let r = range("[1.2.3]");
        assert!(r.satisfies(&ver("1.2.3")));
        assert!(!r.satisfies(&ver("1.2.4")));
        assert!("(1.2.3)".parse::<VersionRange>().is_err());
    }

    #[test]
    fn half_open_interval() {
        let r = range("[1.0,2.0)");
        assert!(r.satisfies(&ver("1.0.0")));
        assert!(r.satisfies(&ver("1.9.9")));
        assert!(!r.satisfies(&ver("2.0.0")));
    }

    #[test]
    fn unbounded_sides() {
        let r = range("(,2.0]");
        assert!(r.satisfies(&ver("0.1.0")));
        assert!(r.satisfies(&ver("2.0.0")));
        assert!(!r.satisfies(&ver("2.0.1")));

        let r = range("(1.0,)");
        assert!(!r.satisfies(&ver("1.0.0")));
        assert!(r.satisfies(&ver("1.0.1")));
    }

    #[test]
    fn semver2_endpoints_classify_ranges() {
        assert!(!range("[1.0,2.0)").references_semver2());
        assert!(range("[1.0.0-beta.1,2.0)").references_semver2());
        assert!(range("1.0.0+meta").references_semver2());
    }

    #[test]
    fn flatten_and_parse_round_trip() {
        let deps = vec![
            Dependency {
                id: "Contoso.Core".to_string(),
                range: Some(range("[1.0,2.0)")),
                target_framework: Some("net45".to_string()),
            },
            Dependency {
                id: "Newtonsoft.Json".to_string(),
                range: None,
                target_framework: None,
            },
            Dependency {
                id: String::new(),
                range: None,
                target_framework: Some("netstandard2.0".to_string()),
            },
        ];
        let flat = flatten_dependencies(&deps);
        assert_eq!(
            flat,
            "Contoso.Core:[1.0,2.0):net45|Newtonsoft.Json:|::netstandard2.0"
        );

        let parsed = parse_dependencies(&flat);
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0].id, "Contoso.Core");
        assert_eq!(parsed[0].target_framework.as_deref(), Some("net45"));
        assert!(parsed[1].range.is_none());
        assert!(parsed[2].id.is_empty());
        assert_eq!(
            parsed[2].target_framework.as_deref(),
            Some("netstandard2.0")
        );
    }

    #[test]
    fn tolerates_empty_middle_field() {
        let parsed = parse_dependencies("SomeId::net6.0");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].id, "SomeId");
        assert!(parsed[0].range.is_none());
        assert_eq!(parsed[0].target_framework.as_deref(), Some("net6.0"));
    }

    #[test]
    fn empty_string_parses_to_no_dependencies() {
        assert!(parse_dependencies("").is_empty());
    }

    #[test]
    fn detects_transitive_semver2() {
        assert!(dependencies_reference_semver2(
            "Contoso.Core:[1.0.0-rc.1,):net45"
        ));
        assert!(!dependencies_reference_semver2("Contoso.Core:[1.0,):net45"));
    }
}
