//! Remove command implementation.

use std::sync::Arc;

use anyhow::{Context, Result};
use nufeed_core::{PackageVersion, Repository};
use tokio_util::sync::CancellationToken;

/// Remove a package, or unlist it when the feed has delisting enabled.
pub async fn execute(
    repo: &Arc<Repository>,
    id: &str,
    version: &str,
    cancel: &CancellationToken,
) -> Result<()> {
    let version: PackageVersion = version
        .parse()
        .with_context(|| format!("invalid version `{version}`"))?;

    repo.remove_package(id, &version, cancel).await?;

    if repo.config().enable_delisting {
        println!("Unlisted {id} {version}");
    } else {
        println!("Removed {id} {version}");
    }
    Ok(())
}
