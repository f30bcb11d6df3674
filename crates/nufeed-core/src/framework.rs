//! Target framework monikers and compatibility checks.
//!
//! Search can optionally filter packages down to those whose supported
//! frameworks are usable from at least one of the caller's project
//! frameworks. The moniker grammar here covers the short folder names found
//! in package archives (`net45`, `net6.0`, `netstandard2.0`,
//! `netcoreapp3.1`); anything unrecognized is kept verbatim and only matches
//! itself.

use std::fmt;
use std::str::FromStr;

/// Framework family a moniker belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameworkFamily {
    /// Classic .NET Framework (`net20` .. `net48`).
    NetFramework,
    /// .NET Standard contract surface (`netstandard1.0` .. `netstandard2.1`).
    NetStandard,
    /// .NET Core app frameworks (`netcoreapp1.0` .. `netcoreapp3.1`).
    NetCoreApp,
    /// Modern unified .NET (`net5.0` and later, dotted version).
    Net,
    /// Wildcard folder (`any`) that is usable everywhere.
    Any,
    /// Anything else, matched by literal name only.
    Other(String),
}

/// A parsed target framework moniker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetFramework {
    family: FrameworkFamily,
    version: (u32, u32),
    original: String,
}

/// Parse a version suffix: dotted (`2.0`, `3.1`) or compact digits where
/// each digit is one segment (`45` is 4.5, `472` is 4.7).
fn parse_version_suffix(s: &str) -> (u32, u32) {
    if s.is_empty() {
        return (0, 0);
    }
    if s.contains('.') {
        let mut parts = s.split('.');
        let major = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        let minor = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        return (major, minor);
    }
    let digits: Vec<u32> = s.chars().filter_map(|c| c.to_digit(10)).collect();
    match digits.as_slice() {
        [] => (0, 0),
        [major] => (*major, 0),
        [major, minor, ..] => (*major, *minor),
    }
}

impl TargetFramework {
    /// Framework family.
    #[must_use]
    pub const fn family(&self) -> &FrameworkFamily {
        &self.family
    }

    /// Parsed framework version.
    #[must_use]
    pub const fn version(&self) -> (u32, u32) {
        self.version
    }

    /// True when a project targeting `self` can consume an asset built for
    /// `package`.
    ///
    /// Cross-family edges are limited to the well-known ones: unified .NET
    /// consumes .NET Core and .NET Standard, .NET Core consumes .NET
    /// Standard up to 2.1, and .NET Framework 4.6+ consumes .NET Standard
    /// up to 2.0.
    #[must_use]
    pub fn supports(&self, package: &Self) -> bool {
        use FrameworkFamily as F;

        if matches!(package.family, F::Any) || matches!(self.family, F::Any) {
            return true;
        }
        if self.family == package.family {
            return self.version >= package.version;
        }
        match (&self.family, &package.family) {
            (F::Net, F::NetCoreApp) => true,
            (F::Net, F::NetStandard) => package.version <= (2, 1),
            (F::NetCoreApp, F::NetStandard) => {
                package.version <= (2, 1) && (self.version >= (3, 0) || package.version <= (2, 0))
            },
            (F::NetFramework, F::NetStandard) => {
                self.version >= (4, 6) && package.version <= (2, 0)
            },
            _ => false,
        }
    }
}

impl FromStr for TargetFramework {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let original = s.trim().to_string();
        let lowered = original.to_ascii_lowercase();
        // Profile suffixes (`net40-client`) do not affect compatibility here.
        let bare = lowered.split('-').next().unwrap_or(&lowered);

        let (family, version) = if bare == "any" || bare.is_empty() {
            (FrameworkFamily::Any, (0, 0))
        } else if let Some(rest) = bare.strip_prefix("netstandard") {
            (FrameworkFamily::NetStandard, parse_version_suffix(rest))
        } else if let Some(rest) = bare.strip_prefix("netcoreapp") {
            (FrameworkFamily::NetCoreApp, parse_version_suffix(rest))
        } else if let Some(rest) = bare.strip_prefix("net") {
            let version = parse_version_suffix(rest);
            if rest.contains('.') && version.0 >= 5 {
                (FrameworkFamily::Net, version)
            } else if rest.chars().all(|c| c.is_ascii_digit()) && !rest.is_empty() {
                (FrameworkFamily::NetFramework, version)
            } else {
                (FrameworkFamily::Other(bare.to_string()), version)
            }
        } else {
            let split = bare
                .find(|c: char| !c.is_ascii_alphabetic())
                .unwrap_or(bare.len());
            let (name, rest) = bare.split_at(split);
            (
                FrameworkFamily::Other(name.to_string()),
                parse_version_suffix(rest),
            )
        };

        Ok(Self {
            family,
            version,
            original,
        })
    }
}

impl fmt::Display for TargetFramework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

/// Flatten framework monikers into the pipe-joined wire format.
#[must_use]
pub fn flatten_frameworks(frameworks: &[String]) -> String {
    frameworks.join("|")
}

/// Parse the pipe-joined wire format back into monikers.
#[must_use]
pub fn parse_frameworks(flattened: &str) -> Vec<TargetFramework> {
    flattened
        .split('|')
        .filter(|m| !m.is_empty())
        .filter_map(|m| m.parse().ok())
        .collect()
}

/// True when a package supporting `package_frameworks` (the flattened form)
/// is usable from at least one of `targets`. A package declaring no
/// frameworks is treated as usable everywhere.
#[must_use]
pub fn is_compatible_with_any(package_frameworks: &str, targets: &[TargetFramework]) -> bool {
    let supported = parse_frameworks(package_frameworks);
    if supported.is_empty() {
        return true;
    }
    targets
        .iter()
        .any(|target| supported.iter().any(|package| target.supports(package)))
}
