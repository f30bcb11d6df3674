//! Package manifest (`.nuspec`) parsing.
//!
//! A package archive carries exactly one manifest at its root. The manifest
//! is namespaced XML; parsing matches on local element names so any schema
//! namespace revision is accepted. Unknown elements are skipped.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::debug;
use url::Url;

use crate::dependency::Dependency;
use crate::{Error, PackageVersion, Result};

/// Parsed manifest metadata.
///
/// Field names mirror the manifest schema; URL-valued fields are kept as the
/// original absolute strings.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    /// Package id.
    pub id: String,
    /// Package version, as declared.
    pub version: Option<PackageVersion>,
    /// Human-friendly title.
    pub title: Option<String>,
    /// Comma-separated authors.
    pub authors: Option<String>,
    /// Comma-separated owners.
    pub owners: Option<String>,
    /// Absolute icon URL.
    pub icon_url: Option<String>,
    /// Absolute license URL.
    pub license_url: Option<String>,
    /// Absolute project URL.
    pub project_url: Option<String>,
    /// Whether installation requires license acceptance.
    pub require_license_acceptance: bool,
    /// Whether the package is a development-only dependency.
    pub development_dependency: bool,
    /// Long description.
    pub description: Option<String>,
    /// Short summary.
    pub summary: Option<String>,
    /// Release notes for this version.
    pub release_notes: Option<String>,
    /// Locale of the package content.
    pub language: Option<String>,
    /// Space- or comma-separated tags.
    pub tags: Option<String>,
    /// Copyright statement.
    pub copyright: Option<String>,
    /// Minimum client version able to install the package.
    pub min_client_version: Option<String>,
    /// Declared dependencies, flattened across framework groups.
    pub dependencies: Vec<Dependency>,
    /// Target frameworks named by dependency groups.
    pub group_frameworks: Vec<String>,
}

fn parse_bool(text: &str) -> bool {
    text.trim().eq_ignore_ascii_case("true")
}

/// Keep a URL only when it parses as absolute; a relative or malformed value
/// is dropped with a debug note rather than failing the whole manifest.
fn validate_url(text: &str, field: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    match Url::parse(trimmed) {
        Ok(_) => Some(trimmed.to_string()),
        Err(e) => {
            debug!(field, value = trimmed, error = %e, "Dropping non-absolute manifest URL");
            None
        },
    }
}

fn attribute_value(element: &BytesStart<'_>, name: &str) -> Result<Option<String>> {
    for attribute in element.attributes() {
        let attribute = attribute.map_err(|e| Error::Parse(format!("bad attribute: {e}")))?;
        if attribute.key.local_name().as_ref() == name.as_bytes() {
            let value = attribute
                .unescape_value()
                .map_err(|e| Error::Parse(format!("bad attribute value: {e}")))?;
            return Ok(Some(value.trim().to_string()));
        }
    }
    Ok(None)
}

fn read_dependency(element: &BytesStart<'_>, group: Option<&str>) -> Result<Option<Dependency>> {
    let Some(id) = attribute_value(element, "id")? else {
        return Ok(None);
    };
    let range = match attribute_value(element, "version")? {
        Some(spec) if !spec.is_empty() => Some(spec.parse().map_err(|e| {
            Error::Parse(format!("dependency `{id}` has a bad version range: {e}"))
        })?),
        _ => None,
    };
    Ok(Some(Dependency {
        id,
        range,
        target_framework: group.map(ToString::to_string),
    }))
}

/// Parse manifest XML.
///
/// Fails when the id or version is missing or malformed; every other field
/// is optional.
pub fn parse_manifest(xml: &str) -> Result<Manifest> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut manifest = Manifest::default();
    let mut buf = Vec::new();

    let mut in_metadata = false;
    let mut in_dependencies = false;
    let mut current_group: Option<String> = None;
    let mut group_had_dependencies = false;
    let mut current_element: Option<String> = None;
    let mut version_text: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                match name.as_str() {
                    "metadata" => {
                        in_metadata = true;
                        manifest.min_client_version = attribute_value(&e, "minClientVersion")?;
                    },
                    "dependencies" if in_metadata => in_dependencies = true,
                    "group" if in_dependencies => {
                        current_group = attribute_value(&e, "targetFramework")?;
                        group_had_dependencies = false;
                        if let Some(framework) = &current_group {
                            manifest.group_frameworks.push(framework.clone());
                        }
                    },
                    "dependency" if in_dependencies => {
                        if let Some(dep) = read_dependency(&e, current_group.as_deref())? {
                            group_had_dependencies = true;
                            manifest.dependencies.push(dep);
                        }
                    },
                    _ if in_metadata && !in_dependencies => {
                        current_element = Some(name);
                    },
                    _ => {},
                }
            },
            Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                match name.as_str() {
                    "dependency" if in_dependencies => {
                        if let Some(dep) = read_dependency(&e, current_group.as_deref())? {
                            group_had_dependencies = true;
                            manifest.dependencies.push(dep);
                        }
                    },
                    "group" if in_dependencies => {
                        // A self-closing group declares a framework with no
                        // dependencies; record it as an empty-id tuple.
                        let framework = attribute_value(&e, "targetFramework")?;
                        if let Some(framework) = &framework {
                            manifest.group_frameworks.push(framework.clone());
                        }
                        manifest.dependencies.push(Dependency {
                            id: String::new(),
                            range: None,
                            target_framework: framework,
                        });
                    },
                    _ => {},
                }
            },
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                match name.as_str() {
                    "metadata" => in_metadata = false,
                    "dependencies" => in_dependencies = false,
                    "group" => {
                        if !group_had_dependencies && current_group.is_some() {
                            manifest.dependencies.push(Dependency {
                                id: String::new(),
                                range: None,
                                target_framework: current_group.clone(),
                            });
                        }
                        current_group = None;
                    },
                    _ => current_element = None,
                }
            },
            Ok(Event::Text(e)) => {
                if let Some(element) = &current_element {
                    let text = e
                        .unescape()
                        .map_err(|e| Error::Parse(format!("manifest text: {e}")))?;
                    let text = text.trim();
                    match element.as_str() {
                        "id" => manifest.id = text.to_string(),
                        "version" => version_text = Some(text.to_string()),
                        "title" => manifest.title = Some(text.to_string()),
                        "authors" => manifest.authors = Some(text.to_string()),
                        "owners" => manifest.owners = Some(text.to_string()),
                        "iconUrl" => manifest.icon_url = validate_url(text, "iconUrl"),
                        "licenseUrl" => manifest.license_url = validate_url(text, "licenseUrl"),
                        "projectUrl" => manifest.project_url = validate_url(text, "projectUrl"),
                        "requireLicenseAcceptance" => {
                            manifest.require_license_acceptance = parse_bool(text);
                        },
                        "developmentDependency" => {
                            manifest.development_dependency = parse_bool(text);
                        },
                        "description" => manifest.description = Some(text.to_string()),
                        "summary" => manifest.summary = Some(text.to_string()),
                        "releaseNotes" => manifest.release_notes = Some(text.to_string()),
                        "language" => manifest.language = Some(text.to_string()),
                        "tags" => manifest.tags = Some(text.to_string()),
                        "copyright" => manifest.copyright = Some(text.to_string()),
                        _ => {},
                    }
                }
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Parse(format!("manifest XML parse error: {e}"))),
            _ => {},
        }
        buf.clear();
    }

    if manifest.id.is_empty() {
        return Err(Error::InvalidPackage("manifest has no id".to_string()));
    }
    let version_text = version_text
        .ok_or_else(|| Error::InvalidPackage(format!("manifest for `{}` has no version", manifest.id)))?;
    manifest.version = Some(version_text.parse()?);

    Ok(manifest)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const FULL: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://schemas.microsoft.com/packaging/2013/05/nuspec.xsd">
  <metadata minClientVersion="2.8">
    <id>Contoso.Utils</id>
    <version>1.2.3-beta.1+build5</version>
    <title>Contoso Utilities</title>
    <authors>Contoso, Fabrikam</authors>
    <owners>Contoso</owners>
    <iconUrl>https://contoso.example/icon.png</iconUrl>
    <licenseUrl>https://contoso.example/license</licenseUrl>
    <projectUrl>https://contoso.example</projectUrl>
    <requireLicenseAcceptance>true</requireLicenseAcceptance>
    <developmentDependency>false</developmentDependency>
    <description>Utility helpers.</description>
    <summary>Helpers</summary>
    <releaseNotes>Fixed things.</releaseNotes>
    <language>en-US</language>
    <tags>utils helpers contoso</tags>
    <copyright>Copyright Contoso</copyright>
    <dependencies>
      <group targetFramework="net45">
        <dependency id="Newtonsoft.Json" version="[9.0,13.0)" />
      </group>
      <group targetFramework="netstandard2.0" />
    </dependencies>
  </metadata>
</package>"#;

    #[test]
    fn parses_full_manifest() {
        let manifest = parse_manifest(FULL).unwrap();
        assert_eq!(manifest.id, "Contoso.Utils");
        assert_eq!(
            manifest.version.as_ref().unwrap().original(),
            "1.2.3-beta.1+build5"
        );
        assert_eq!(manifest.title.as_deref(), Some("Contoso Utilities"));
        assert_eq!(manifest.min_client_version.as_deref(), Some("2.8"));
        assert!(manifest.require_license_acceptance);
        assert!(!manifest.development_dependency);
        assert_eq!(manifest.tags.as_deref(), Some("utils helpers contoso"));
    }

    #[test]
    fn captures_dependency_groups() {
        let manifest = parse_manifest(FULL).unwrap();
        assert_eq!(manifest.dependencies.len(), 2);
        assert_eq!(manifest.dependencies[0].id, "Newtonsoft.Json");
        assert_eq!(
            manifest.dependencies[0].target_framework.as_deref(),
            Some("net45")
        );
        // The empty group becomes an empty-id tuple.
        assert!(manifest.dependencies[1].id.is_empty());
        assert_eq!(
            manifest.dependencies[1].target_framework.as_deref(),
            Some("netstandard2.0")
        );
        assert_eq!(manifest.group_frameworks, vec!["net45", "netstandard2.0"]);
    }

    #[test]
    fn parses_flat_dependency_list() {
        let xml = r#"<package><metadata>
            <id>A</id><version>1.0</version>
            <dependencies>
              <dependency id="B" version="2.0" />
              <dependency id="C" />
            </dependencies>
        </metadata></package>"#;
        let manifest = parse_manifest(xml).unwrap();
        assert_eq!(manifest.dependencies.len(), 2);
        assert!(manifest.dependencies[0].range.is_some());
        assert!(manifest.dependencies[1].range.is_none());
        assert!(manifest.dependencies[0].target_framework.is_none());
    }

    #[test]
    fn missing_id_or_version_fails() {
        assert!(parse_manifest("<package><metadata><version>1.0</version></metadata></package>").is_err());
        assert!(parse_manifest("<package><metadata><id>A</id></metadata></package>").is_err());
    }

    #[test]
    fn relative_urls_are_dropped() {
        let xml = r#"<package><metadata>
            <id>A</id><version>1.0</version>
            <projectUrl>not-a-url</projectUrl>
        </metadata></package>"#;
        let manifest = parse_manifest(xml).unwrap();
        assert!(manifest.project_url.is_none());
    }

    #[test]
    fn unc_style_file_urls_stay_absolute() {
        let xml = r#"<package><metadata>
            <id>A</id><version>1.0</version>
            <licenseUrl>file://server/share/license.txt</licenseUrl>
        </metadata></package>"#;
        let manifest = parse_manifest(xml).unwrap();
        assert_eq!(
            manifest.license_url.as_deref(),
            Some("file://server/share/license.txt")
        );
    }

    #[test]
    fn bad_dependency_range_fails() {
        let xml = r#"<package><metadata>
            <id>A</id><version>1.0</version>
            <dependencies><dependency id="B" version="[oops" /></dependencies>
        </metadata></package>"#;
        assert!(parse_manifest(xml).is_err());
    }
}
