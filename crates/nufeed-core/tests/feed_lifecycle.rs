//! End-to-end lifecycle tests driving the repository the way a feed service
//! would: cold starts, drop-folder ingestion, pushes, unlisting, latest
//! selection, and snapshot corruption recovery.

#![allow(clippy::unwrap_used)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use nufeed_core::{ClientCompatibility, Error, FeedConfig, PackageVersion, Repository};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use zip::write::SimpleFileOptions;

/// Write a real package archive: a zip with a manifest and one library.
fn write_package(dir: &Path, file_name: &str, id: &str, version: &str) -> PathBuf {
    let path = dir.join(file_name);
    let file = File::create(&path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default();

    zip.start_file(format!("{id}.nuspec"), options).unwrap();
    let nuspec = format!(
        r#"<?xml version="1.0"?>
<package xmlns="http://schemas.microsoft.com/packaging/2013/05/nuspec.xsd">
  <metadata>
    <id>{id}</id>
    <version>{version}</version>
    <authors>Lifecycle Tests</authors>
    <description>Lifecycle test package {id} {version}</description>
    <tags>lifecycle</tags>
  </metadata>
</package>"#
    );
    zip.write_all(nuspec.as_bytes()).unwrap();
    zip.start_file(format!("lib/netstandard2.0/{id}.dll"), options)
        .unwrap();
    zip.write_all(version.as_bytes()).unwrap();
    zip.finish().unwrap();
    path
}

fn quiet_config(root: &Path) -> FeedConfig {
    let mut config = FeedConfig::new(root.to_path_buf());
    config.enable_background_tasks = false;
    config.enable_file_system_monitoring = false;
    config
}

fn ver(s: &str) -> PackageVersion {
    s.parse().unwrap()
}

fn cancel() -> CancellationToken {
    CancellationToken::new()
}

#[tokio::test]
async fn drop_then_read() {
    let root = TempDir::new().unwrap();
    write_package(root.path(), "pkg-A-1.0.0.nupkg", "pkg-A", "1.0.0");

    let repo = Repository::new(quiet_config(root.path())).unwrap();
    let packages = repo
        .get_packages(&ClientCompatibility::max_level(), &cancel())
        .await
        .unwrap();

    assert_eq!(packages.len(), 1);
    let record = &packages[0];
    assert_eq!(record.id, "pkg-A");
    assert_eq!(record.version.normalized(), "1.0.0");
    assert!(record.semver1_is_latest);
    assert!(record.semver2_is_latest);
    assert!(!root.path().join("pkg-A-1.0.0.nupkg").exists());
}

#[tokio::test]
async fn unlist_semantics() {
    let root = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let mut config = quiet_config(root.path());
    config.enable_delisting = true;
    let repo = Repository::new(config).unwrap();

    let upload = write_package(scratch.path(), "upload.nupkg", "A", "1.0.0");
    let record = repo.add_package(&upload, &cancel()).await.unwrap();
    repo.remove_package("A", &ver("1.0.0"), &cancel())
        .await
        .unwrap();

    let hits = repo
        .search("A", &[], true, &ClientCompatibility::max_level(), &cancel())
        .await
        .unwrap();
    assert!(hits.is_empty());

    let packages = repo
        .get_packages(&ClientCompatibility::max_level(), &cancel())
        .await
        .unwrap();
    assert_eq!(packages.len(), 1);
    assert!(!packages[0].listed);
    assert!(record.full_path.exists());
}

#[tokio::test]
async fn latest_selection_with_mixed_versions() {
    let root = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let repo = Repository::new(quiet_config(root.path())).unwrap();

    for (index, version) in ["1.9", "1.11", "2.0.0-alpha", "2.0.0", "2.0.1+taggedOnly"]
        .iter()
        .enumerate()
    {
        let upload = write_package(scratch.path(), &format!("up{index}.nupkg"), "A", version);
        repo.add_package(&upload, &cancel()).await.unwrap();
    }
    for version in ["1.11", "2.0.0-alpha", "2.0.1"] {
        repo.remove_package("A", &ver(version), &cancel())
            .await
            .unwrap();
    }
    // Removing a version that was never pushed is a no-op.
    repo.remove_package("A", &ver("2.0.0-0test"), &cancel())
        .await
        .unwrap();

    let packages = repo
        .get_packages(&ClientCompatibility::max_level(), &cancel())
        .await
        .unwrap();
    let mut versions: Vec<String> = packages.iter().map(|r| r.version.normalized()).collect();
    versions.sort();
    assert_eq!(versions, vec!["1.9.0", "2.0.0"]);

    let winner = packages
        .iter()
        .find(|r| r.version.normalized() == "2.0.0")
        .unwrap();
    assert!(winner.semver2_is_latest);
    assert!(winner.semver2_is_absolute_latest);
}

#[tokio::test]
async fn duplicate_on_push_fails_and_first_wins() {
    let root = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let mut config = quiet_config(root.path());
    config.allow_override_existing_package_on_push = false;
    let repo = Repository::new(config).unwrap();

    let first = write_package(scratch.path(), "first.nupkg", "A", "1.0.0-beta.1+foo");
    let second = write_package(scratch.path(), "second.nupkg", "A", "1.0.0-beta.1+bar");

    repo.add_package(&first, &cancel()).await.unwrap();
    let err = repo.add_package(&second, &cancel()).await.unwrap_err();
    assert!(matches!(err, Error::DuplicatePackage { .. }));

    let found = repo
        .find_package("a", &ver("1.0.0-beta.1"), &cancel())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.version.original(), "1.0.0-beta.1+foo");
}

#[tokio::test]
async fn corrupt_snapshot_is_deleted_and_rebuilt() {
    let root = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();

    {
        let repo = Repository::new(quiet_config(root.path())).unwrap();
        let upload = write_package(scratch.path(), "up.nupkg", "A", "1.0.0");
        repo.add_package(&upload, &cancel()).await.unwrap();
        repo.shutdown().await;
    }

    let snapshot: PathBuf = std::fs::read_dir(root.path())
        .unwrap()
        .flatten()
        .map(|e| e.path())
        .find(|p| p.extension().is_some_and(|ext| ext == "bin"))
        .unwrap();
    std::fs::write(&snapshot, r#"{"SchemaVersion":"4.0.0","Packages":[]}"#).unwrap();

    let repo = Repository::new(quiet_config(root.path())).unwrap();
    assert!(!snapshot.exists());

    let packages = repo
        .get_packages(&ClientCompatibility::max_level(), &cancel())
        .await
        .unwrap();
    assert_eq!(packages.len(), 1);
    assert_eq!(packages[0].id, "A");
}

#[tokio::test]
async fn semver2_gating_by_client_level() {
    let root = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let repo = Repository::new(quiet_config(root.path())).unwrap();

    let beta = write_package(scratch.path(), "b1.nupkg", "B", "1.0-beta");
    let beta1 = write_package(scratch.path(), "b2.nupkg", "B", "1.0-beta.1");
    repo.add_package(&beta, &cancel()).await.unwrap();
    repo.add_package(&beta1, &cancel()).await.unwrap();

    let level1 = repo
        .get_packages(&ClientCompatibility::default_level(), &cancel())
        .await
        .unwrap();
    assert_eq!(level1.len(), 1);
    assert_eq!(level1[0].version.original(), "1.0-beta");

    let level2 = repo
        .get_packages(&ClientCompatibility::max_level(), &cancel())
        .await
        .unwrap();
    assert_eq!(level2.len(), 2);
}

#[tokio::test]
async fn write_then_read_ordering() {
    let root = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let repo = Repository::new(quiet_config(root.path())).unwrap();
    let compat = ClientCompatibility::max_level();

    let upload = write_package(scratch.path(), "up.nupkg", "Ordered", "1.0.0");
    repo.add_package(&upload, &cancel()).await.unwrap();
    let after_add = repo.get_packages(&compat, &cancel()).await.unwrap();
    assert!(after_add.iter().any(|r| r.matches_id("ordered")));

    repo.remove_package("Ordered", &ver("1.0.0"), &cancel())
        .await
        .unwrap();
    let after_remove = repo.get_packages(&compat, &cancel()).await.unwrap();
    assert!(!after_remove.iter().any(|r| r.matches_id("ordered")));
}

#[tokio::test]
async fn concurrent_pushes_serialize_through_the_gate() {
    let root = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let repo = Repository::new(quiet_config(root.path())).unwrap();

    let mut handles = Vec::new();
    for index in 0..8 {
        let upload = write_package(
            scratch.path(),
            &format!("up{index}.nupkg"),
            &format!("Pkg-{index}"),
            "1.0.0",
        );
        let repo: Arc<Repository> = Arc::clone(&repo);
        handles.push(tokio::spawn(async move {
            repo.add_package(&upload, &CancellationToken::new()).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let packages = repo
        .get_packages(&ClientCompatibility::max_level(), &cancel())
        .await
        .unwrap();
    assert_eq!(packages.len(), 8);
}

#[tokio::test]
async fn watcher_ingests_drop_file_in_background() {
    let root = TempDir::new().unwrap();
    let mut config = FeedConfig::new(root.path().to_path_buf());
    config.enable_background_tasks = false;
    config.enable_file_system_monitoring = true;
    let repo = Repository::new(config).unwrap();
    let compat = ClientCompatibility::max_level();

    // Seed one package so later queries do not auto-rebuild; only the
    // watcher can ingest the dropped file. The first query binds the
    // watcher.
    let scratch = TempDir::new().unwrap();
    let seed = write_package(scratch.path(), "seed.nupkg", "Seed", "1.0.0");
    repo.add_package(&seed, &cancel()).await.unwrap();
    assert_eq!(repo.get_packages(&compat, &cancel()).await.unwrap().len(), 1);

    // Stage the archive elsewhere, then move it into the root so the
    // watcher sees a complete file.
    let staged = write_package(scratch.path(), "watched.nupkg", "Watched", "1.0.0");
    std::fs::rename(&staged, root.path().join("watched.nupkg")).unwrap();

    let mut seen = false;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let packages = repo.get_packages(&compat, &cancel()).await.unwrap();
        if packages.iter().any(|r| r.matches_id("watched")) {
            seen = true;
            break;
        }
    }
    repo.shutdown().await;
    assert!(seen, "watcher never ingested the dropped package");
}
