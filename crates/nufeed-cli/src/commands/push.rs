//! Push command implementation.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use nufeed_core::Repository;
use tokio_util::sync::CancellationToken;

/// Push a package archive into the feed.
pub async fn execute(
    repo: &Arc<Repository>,
    file: &Path,
    json: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let record = repo
        .add_package(file, cancel)
        .await
        .with_context(|| format!("failed to push {}", file.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        println!("Pushed {} {}", record.id, record.version);
    }
    Ok(())
}
