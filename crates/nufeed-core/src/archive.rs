//! Package archive (`.nupkg`) reading.
//!
//! An archive is a zip container with exactly one manifest at its root.
//! Opening an archive parses the manifest eagerly and derives the supported
//! framework set from the `lib/` and `ref/` folder layout plus the
//! manifest's dependency groups. All I/O here is blocking; async callers
//! run it on the blocking pool.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha2::{Digest, Sha512};

use crate::manifest::{Manifest, parse_manifest};
use crate::{Error, PackageVersion, Result};

/// Hash algorithm used for archive sidecars.
pub const HASH_ALGORITHM: &str = "SHA512";

/// An opened package archive with its parsed manifest.
#[derive(Debug)]
pub struct PackageArchive {
    path: PathBuf,
    manifest: Manifest,
    version: PackageVersion,
    supported_frameworks: Vec<String>,
    size: u64,
    is_symbols: bool,
}

/// Extract the framework folder from an asset path like `lib/net45/a.dll`.
fn framework_folder(entry: &str) -> Option<&str> {
    let mut parts = entry.split('/');
    let root = parts.next()?;
    if !matches!(root, "lib" | "ref") {
        return None;
    }
    let folder = parts.next()?;
    // A file directly under lib/ has no framework folder.
    parts.next()?;
    (!folder.is_empty()).then_some(folder)
}

impl PackageArchive {
    /// Open an archive and parse its manifest.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        let mut zip = zip::ZipArchive::new(BufReader::new(file))?;

        let mut manifest_name: Option<String> = None;
        let mut frameworks: Vec<String> = Vec::new();
        let mut has_src = false;
        let mut has_pdb = false;

        for index in 0..zip.len() {
            let name = zip
                .name_for_index(index)
                .ok_or_else(|| Error::InvalidPackage("archive entry has no name".to_string()))?
                .replace('\\', "/");

            if !name.contains('/') && name.to_ascii_lowercase().ends_with(".nuspec") {
                if manifest_name.is_some() {
                    return Err(Error::InvalidPackage(format!(
                        "archive {} contains more than one manifest",
                        path.display()
                    )));
                }
                manifest_name = Some(name.clone());
            }
            if let Some(folder) = framework_folder(&name) {
                if !frameworks
                    .iter()
                    .any(|f: &String| f.eq_ignore_ascii_case(folder))
                {
                    frameworks.push(folder.to_string());
                }
            }
            if name.starts_with("src/") {
                has_src = true;
            }
            if name.to_ascii_lowercase().ends_with(".pdb") {
                has_pdb = true;
            }
        }

        let manifest_name = manifest_name.ok_or_else(|| {
            Error::InvalidPackage(format!("archive {} has no manifest", path.display()))
        })?;
        let mut manifest_xml = String::new();
        zip.by_name(&manifest_name)?
            .read_to_string(&mut manifest_xml)
            .map_err(|e| Error::InvalidPackage(format!("unreadable manifest: {e}")))?;
        let manifest = parse_manifest(&manifest_xml)?;

        for framework in &manifest.group_frameworks {
            if !frameworks
                .iter()
                .any(|f: &String| f.eq_ignore_ascii_case(framework))
            {
                frameworks.push(framework.clone());
            }
        }
        frameworks.sort_by_key(|f| f.to_ascii_lowercase());

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        let is_symbols = file_name.ends_with(".symbols.nupkg")
            || file_name.ends_with(".snupkg")
            || (has_src && has_pdb);

        let version = manifest.version.clone().ok_or_else(|| {
            Error::InvalidPackage(format!("manifest for `{}` has no version", manifest.id))
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            manifest,
            version,
            supported_frameworks: frameworks,
            size,
            is_symbols,
        })
    }

    /// Package id from the manifest.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.manifest.id
    }

    /// Package version from the manifest.
    #[must_use]
    pub const fn version(&self) -> &PackageVersion {
        &self.version
    }

    /// The parsed manifest.
    #[must_use]
    pub const fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Archive size in bytes.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Path the archive was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Framework monikers this package carries assets or dependency groups
    /// for, deduplicated case-insensitively.
    #[must_use]
    pub fn supported_frameworks(&self) -> &[String] {
        &self.supported_frameworks
    }

    /// True when this archive is a symbols package.
    #[must_use]
    pub const fn is_symbols_package(&self) -> bool {
        self.is_symbols
    }

    /// Compute the canonical hash of the archive contents, Base64-encoded.
    pub fn compute_hash(&self) -> Result<String> {
        hash_file(&self.path)
    }
}

/// Stream a file through the canonical hash.
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha512::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(BASE64.encode(hasher.finalize()))
}
