//! Rebuild command implementation.

use std::sync::Arc;

use anyhow::Result;
use nufeed_core::{ClientCompatibility, Repository};
use tokio_util::sync::CancellationToken;

/// Rebuild the metadata cache from the package store and the drop folder.
pub async fn execute(repo: &Arc<Repository>, cancel: &CancellationToken) -> Result<()> {
    repo.rebuild(cancel).await?;
    let count = repo
        .get_packages(&ClientCompatibility::max_level(), cancel)
        .await?
        .len();
    println!("Cache rebuilt: {count} packages");
    Ok(())
}
