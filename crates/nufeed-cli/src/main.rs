//! Primary entrypoint for the `nufeed` CLI binary.

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    nufeed_cli::run().await
}
