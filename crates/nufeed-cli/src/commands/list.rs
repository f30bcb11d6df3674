//! List command implementation.

use std::sync::Arc;

use anyhow::Result;
use nufeed_core::{ClientCompatibility, Repository};
use tokio_util::sync::CancellationToken;

use super::{print_records, print_records_json};

/// List feed packages, optionally restricted to one id.
pub async fn execute(
    repo: &Arc<Repository>,
    id: Option<&str>,
    semver2: bool,
    json: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let compat = if semver2 {
        ClientCompatibility::max_level()
    } else {
        ClientCompatibility::default_level()
    };

    let records = match id {
        Some(id) => repo.find_packages_by_id(id, &compat, cancel).await?,
        None => repo.get_packages(&compat, cancel).await?,
    };

    if json {
        print_records_json(&records)?;
    } else if records.is_empty() {
        println!("No packages");
    } else {
        print_records(&records);
    }
    Ok(())
}
