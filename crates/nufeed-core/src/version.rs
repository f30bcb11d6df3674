//! Package version parsing, normalization, and ordering.
//!
//! Feed versions are semantic versions extended with an optional fourth
//! numeric segment (`major.minor.patch.revision`), an optional pre-release
//! label, and optional build metadata after `+`. Two versions are equal iff
//! their normalized strings are equal; normalization drops build metadata
//! and a trailing zero revision segment.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{Error, Result};

/// A feed package version.
///
/// Parsing preserves the original text so that serialization round-trips the
/// exact string a publisher used, while equality and ordering operate on the
/// normalized form.
#[derive(Debug, Clone)]
pub struct PackageVersion {
    major: u64,
    minor: u64,
    patch: u64,
    revision: u64,
    prerelease: String,
    build: String,
    original: String,
}

fn is_valid_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '-'
}

fn parse_segment(s: &str, name: &str) -> Result<u64> {
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::Parse(format!(
            "version segment `{name}` is not numeric: `{s}`"
        )));
    }
    s.parse()
        .map_err(|_| Error::Parse(format!("version segment `{name}` out of range: `{s}`")))
}

fn validate_label(label: &str, what: &str) -> Result<()> {
    for identifier in label.split('.') {
        if identifier.is_empty() {
            return Err(Error::Parse(format!("version has an empty {what} identifier")));
        }
        if !identifier.chars().all(is_valid_ident_char) {
            return Err(Error::Parse(format!(
                "version has an invalid {what} identifier: `{identifier}`"
            )));
        }
    }
    Ok(())
}

impl PackageVersion {
    /// Construct a plain release version without pre-release or build parts.
    #[must_use]
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        let original = format!("{major}.{minor}.{patch}");
        Self {
            major,
            minor,
            patch,
            revision: 0,
            prerelease: String::new(),
            build: String::new(),
            original,
        }
    }

    /// Major segment.
    #[must_use]
    pub const fn major(&self) -> u64 {
        self.major
    }

    /// Minor segment.
    #[must_use]
    pub const fn minor(&self) -> u64 {
        self.minor
    }

    /// Patch segment.
    #[must_use]
    pub const fn patch(&self) -> u64 {
        self.patch
    }

    /// Fourth numeric segment; zero when absent.
    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// Pre-release label, empty for release versions.
    #[must_use]
    pub fn prerelease(&self) -> &str {
        &self.prerelease
    }

    /// Build metadata, empty when absent. Ignored by equality and ordering.
    #[must_use]
    pub fn build_metadata(&self) -> &str {
        &self.build
    }

    /// True when the version carries a pre-release label.
    #[must_use]
    pub fn is_prerelease(&self) -> bool {
        !self.prerelease.is_empty()
    }

    /// True when the version uses SemVer 2.0.0 traits: a dot-separated
    /// pre-release label or build metadata.
    #[must_use]
    pub fn is_semver2(&self) -> bool {
        self.prerelease.contains('.') || !self.build.is_empty()
    }

    /// The exact text this version was parsed from.
    #[must_use]
    pub fn original(&self) -> &str {
        &self.original
    }

    /// Canonical string form: `major.minor.patch`, the revision only when
    /// non-zero, the pre-release label, and no build metadata.
    #[must_use]
    pub fn normalized(&self) -> String {
        let mut s = format!("{}.{}.{}", self.major, self.minor, self.patch);
        if self.revision != 0 {
            s.push('.');
            s.push_str(&self.revision.to_string());
        }
        if !self.prerelease.is_empty() {
            s.push('-');
            s.push_str(&self.prerelease);
        }
        s
    }

    /// Normalized form plus build metadata, when present.
    #[must_use]
    pub fn full_string(&self) -> String {
        let mut s = self.normalized();
        if !self.build.is_empty() {
            s.push('+');
            s.push_str(&self.build);
        }
        s
    }
}

impl FromStr for PackageVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let original = s.trim();
        if original.is_empty() {
            return Err(Error::Parse("empty version string".to_string()));
        }

        let (rest, build) = match original.split_once('+') {
            Some((rest, build)) => {
                validate_label(build, "build metadata")?;
                (rest, build.to_string())
            },
            None => (original, String::new()),
        };

        let (numeric, prerelease) = match rest.split_once('-') {
            Some((numeric, label)) => {
                validate_label(label, "pre-release")?;
                (numeric, label.to_string())
            },
            None => (rest, String::new()),
        };

        let mut segments = numeric.split('.');
        let major = parse_segment(
            segments.next().unwrap_or_default(),
            "major",
        )?;
        let minor = match segments.next() {
            Some(s) => parse_segment(s, "minor")?,
            None => 0,
        };
        let patch = match segments.next() {
            Some(s) => parse_segment(s, "patch")?,
            None => 0,
        };
        let revision = match segments.next() {
            Some(s) => parse_segment(s, "revision")?,
            None => 0,
        };
        if segments.next().is_some() {
            return Err(Error::Parse(format!(
                "version has more than four numeric segments: `{original}`"
            )));
        }

        Ok(Self {
            major,
            minor,
            patch,
            revision,
            prerelease,
            build,
            original: original.to_string(),
        })
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

/// Compare two pre-release identifiers with SemVer precedence: numeric
/// identifiers compare numerically and rank below alphanumeric ones. Ties
/// between numerically-equal identifiers fall back to the literal text so
/// the order stays total.
fn compare_identifiers(a: &str, b: &str) -> Ordering {
    let a_num: Option<u64> = a.parse().ok();
    let b_num: Option<u64> = b.parse().ok();
    match (a_num, b_num) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

fn compare_prerelease(a: &str, b: &str) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => return Ordering::Equal,
        // A release version ranks above any pre-release of the same numbers.
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        (false, false) => {},
    }

    let mut a_parts = a.split('.');
    let mut b_parts = b.split('.');
    loop {
        match (a_parts.next(), b_parts.next()) {
            (Some(x), Some(y)) => match compare_identifiers(x, y) {
                Ordering::Equal => {},
                other => return other,
            },
            (Some(_), None) => return Ordering::Greater,
            (None, Some(_)) => return Ordering::Less,
            (None, None) => return Ordering::Equal,
        }
    }
}

impl Ord for PackageVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch, self.revision)
            .cmp(&(other.major, other.minor, other.patch, other.revision))
            .then_with(|| compare_prerelease(&self.prerelease, &other.prerelease))
    }
}

impl PartialOrd for PackageVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for PackageVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PackageVersion {}

impl Hash for PackageVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.major.hash(state);
        self.minor.hash(state);
        self.patch.hash(state);
        self.revision.hash(state);
        self.prerelease.hash(state);
    }
}

impl Serialize for PackageVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.original)
    }
}

impl<'de> Deserialize<'de> for PackageVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn v(s: &str) -> PackageVersion {
        s.parse().unwrap()
    }

    #[test]
    fn parses_short_forms() {
        assert_eq!(v("1.0").normalized(), "1.0.0");
        assert_eq!(v("1").normalized(), "1.0.0");
        assert_eq!(v("1.2.3").normalized(), "1.2.3");
    }

    #[test]
    fn normalization_drops_trailing_zero_revision() {
        assert_eq!(v("1.2.3.0").normalized(), "1.2.3");
        assert_eq!(v("1.2.3.4").normalized(), "1.2.3.4");
    }

    #[test]
    fn normalization_drops_build_metadata() {
        assert_eq!(v("2.0.1+taggedOnly").normalized(), "2.0.1");
        assert_eq!(v("2.0.1+taggedOnly").full_string(), "2.0.1+taggedOnly");
        assert_eq!(v("2.0.1+taggedOnly").original(), "2.0.1+taggedOnly");
    }

    #[test]
    fn equality_follows_normalized_strings() {
        assert_eq!(v("1.0"), v("1.0.0"));
        assert_eq!(v("1.0.0"), v("1.0.0.0"));
        assert_eq!(v("1.0.0+foo"), v("1.0.0+bar"));
        assert_ne!(v("1.0.0-beta"), v("1.0.0"));
    }

    #[test]
    fn numeric_segments_order_numerically() {
        assert!(v("1.9") < v("1.11"));
        assert!(v("1.11") < v("2.0.0"));
        assert!(v("1.2.3") < v("1.2.3.1"));
    }

    #[test]
    fn release_outranks_prerelease() {
        assert!(v("2.0.0-alpha") < v("2.0.0"));
        assert!(v("2.0.0") < v("2.0.1+tag"));
    }

    #[test]
    fn prerelease_identifier_precedence() {
        assert!(v("1.0.0-alpha") < v("1.0.0-alpha.1"));
        assert!(v("1.0.0-alpha.1") < v("1.0.0-beta"));
        assert!(v("1.0.0-2") < v("1.0.0-11"));
        assert!(v("1.0.0-11") < v("1.0.0-rc"));
    }

    #[test]
    fn semver2_classification() {
        assert!(!v("1.0.0").is_semver2());
        assert!(!v("1.0.0-beta").is_semver2());
        assert!(v("1.0.0-beta.1").is_semver2());
        assert!(v("1.0.0+build").is_semver2());
        assert!(v("1.0.0-beta.1+foo").is_semver2());
    }

    #[test]
    fn rejects_malformed_input() {
        assert!("".parse::<PackageVersion>().is_err());
        assert!("abc".parse::<PackageVersion>().is_err());
        assert!("1.2.3.4.5".parse::<PackageVersion>().is_err());
        assert!("1.0.0-".parse::<PackageVersion>().is_err());
        assert!("1.0.0-beta..1".parse::<PackageVersion>().is_err());
        assert!("1.0.0+b@d".parse::<PackageVersion>().is_err());
    }

    #[test]
    fn serde_round_trips_original_text() {
        let version = v("1.0.0-Beta.1+Meta");
        let json = serde_json::to_string(&version).unwrap();
        assert_eq!(json, "\"1.0.0-Beta.1+Meta\"");
        let back: PackageVersion = serde_json::from_str(&json).unwrap();
        assert_eq!(back.original(), "1.0.0-Beta.1+Meta");
        assert_eq!(back, version);
    }

    proptest! {
        #[test]
        fn normalized_form_reparses_to_equal_version(
            major in 0u64..1000,
            minor in 0u64..1000,
            patch in 0u64..1000,
            revision in 0u64..10,
        ) {
            let text = format!("{major}.{minor}.{patch}.{revision}");
            let parsed = text.parse::<PackageVersion>().unwrap();
            let reparsed = parsed.normalized().parse::<PackageVersion>().unwrap();
            prop_assert_eq!(&parsed, &reparsed);
            prop_assert_eq!(parsed.normalized(), reparsed.normalized());
        }

        #[test]
        fn ordering_is_antisymmetric(a_minor in 0u64..50, b_minor in 0u64..50) {
            let a = format!("1.{a_minor}.0").parse::<PackageVersion>().unwrap();
            let b = format!("1.{b_minor}.0").parse::<PackageVersion>().unwrap();
            prop_assert_eq!(a.cmp(&b), b.cmp(&a).reverse());
        }
    }
}
