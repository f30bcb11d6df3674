//! Command implementations for the nufeed CLI.

pub mod list;
pub mod push;
pub mod rebuild;
pub mod remove;
pub mod search;

use nufeed_core::PackageRecord;

/// One line per package: identity, listing state, latest markers.
pub(crate) fn print_records(records: &[PackageRecord]) {
    let mut sorted: Vec<&PackageRecord> = records.iter().collect();
    sorted.sort_by(|a, b| {
        a.id.to_ascii_lowercase()
            .cmp(&b.id.to_ascii_lowercase())
            .then_with(|| a.version.cmp(&b.version))
    });

    for record in sorted {
        let mut markers = Vec::new();
        if record.semver2_is_latest {
            markers.push("latest");
        }
        if !record.listed {
            markers.push("unlisted");
        }
        let suffix = if markers.is_empty() {
            String::new()
        } else {
            format!("  [{}]", markers.join(", "))
        };
        println!("{} {}{suffix}", record.id, record.version);
    }
}

/// Machine-readable variant of [`print_records`].
pub(crate) fn print_records_json(records: &[PackageRecord]) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(records)?);
    Ok(())
}
