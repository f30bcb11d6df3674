//! # nufeed-core
//!
//! The server-side storage engine of a local filesystem package feed.
//!
//! The engine manages a directory of package archives and exposes a
//! queryable in-memory index of their metadata. It is the backing store for
//! a feed service that performs lookups, listings, searches, and
//! update-check queries, and it accepts package pushes, deletions, and
//! unlistings.
//!
//! ## Architecture
//!
//! Three subsystems carry the load:
//!
//! - **[`MetadataCache`]**: a read/write-locked in-memory index with a
//!   durable JSON snapshot and bulk-recomputed "latest version" flags.
//! - **[`ExpandedStore`]**: the canonical on-disk layout, one
//!   `{id}/{version}` folder per package with the archive and a hash
//!   sidecar, from which the cache can always be rebuilt.
//! - **[`Repository`]**: the controller coordinating cold-start rebuild,
//!   drop-folder ingestion, filesystem-watch invalidation, background
//!   persistence, and the gate that serializes writers.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::path::{Path, PathBuf};
//! use nufeed_core::{ClientCompatibility, FeedConfig, Repository, Result};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<()> {
//! let config = FeedConfig::new(PathBuf::from("/srv/feed/packages"));
//! let repo = Repository::new(config)?;
//!
//! let cancel = CancellationToken::new();
//! repo.add_package(Path::new("upload.nupkg"), &cancel).await?;
//!
//! let packages = repo
//!     .get_packages(&ClientCompatibility::max_level(), &cancel)
//!     .await?;
//! println!("feed holds {} packages", packages.len());
//! # Ok(())
//! # }
//! ```

/// Package archive reading and hashing
pub mod archive;
/// Thread-safe metadata index with durable snapshot
pub mod cache;
/// Client semver-level gate
pub mod compat;
/// Feed configuration
pub mod config;
/// Dependency declarations, version ranges, and the flattened wire format
pub mod dependency;
/// Error types and result aliases
pub mod error;
/// Target framework monikers and compatibility
pub mod framework;
/// Filesystem helpers: atomic writes, hidden attribute, timestamps
pub mod fsutil;
/// Package manifest parsing
pub mod manifest;
/// Query helpers over cache snapshots
pub mod query;
/// Cached package metadata records
pub mod record;
/// The repository controller
pub mod repository;
/// Versioned JSON snapshot of the cache
pub mod snapshot;
/// Canonical on-disk package store
pub mod store;
/// Package version parsing and ordering
pub mod version;

// Re-export commonly used types
pub use archive::PackageArchive;
pub use cache::MetadataCache;
pub use compat::ClientCompatibility;
pub use config::FeedConfig;
pub use dependency::{Dependency, VersionRange};
pub use error::{Error, Result};
pub use framework::TargetFramework;
pub use manifest::Manifest;
pub use record::{PackageRecord, RecordKey};
pub use repository::Repository;
pub use store::ExpandedStore;
pub use version::PackageVersion;
