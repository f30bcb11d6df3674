//! Search command implementation.

use std::sync::Arc;

use anyhow::Result;
use nufeed_core::{ClientCompatibility, Repository};
use tokio_util::sync::CancellationToken;

use super::{print_records, print_records_json};

/// Search the feed by term, with optional framework filtering.
pub async fn execute(
    repo: &Arc<Repository>,
    term: &str,
    prerelease: bool,
    frameworks: &[String],
    json: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let records = repo
        .search(
            term,
            frameworks,
            prerelease,
            &ClientCompatibility::max_level(),
            cancel,
        )
        .await?;

    if json {
        print_records_json(&records)?;
    } else if records.is_empty() {
        println!("No matches for '{term}'");
    } else {
        print_records(&records);
    }
    Ok(())
}
