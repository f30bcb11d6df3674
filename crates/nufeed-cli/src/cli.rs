//! CLI structure and argument parsing for `nufeed`.
//!
//! The CLI is a thin administrative surface over the feed engine: push and
//! remove packages, list and search the feed, and force a cache rebuild.
//! The feed root comes from `--root`, a config file via `--config`, or the
//! `NUFEED_ROOT` environment variable.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Main CLI structure for the `nufeed` command.
#[derive(Debug, Parser)]
#[command(name = "nufeed", version, about = "Local filesystem package feed")]
pub struct Cli {
    /// Path to a TOML config file; flags override file values
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Feed root directory
    #[arg(long, env = "NUFEED_ROOT", global = true)]
    pub root: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit machine-readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Feed operations.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Push a package archive into the feed
    Push {
        /// Path to the `.nupkg` file
        file: PathBuf,
    },
    /// Remove (or unlist, when delisting is enabled) a package
    Remove {
        /// Package id
        id: String,
        /// Package version
        version: String,
    },
    /// List packages in the feed
    List {
        /// Restrict to one package id
        #[arg(long)]
        id: Option<String>,
        /// Include SemVer 2.0.0 packages (defaults to the level-2 view)
        #[arg(long, default_value_t = true)]
        semver2: bool,
    },
    /// Search packages by term
    Search {
        /// Search term; matches id, tags, description, and authors
        term: String,
        /// Include pre-release versions
        #[arg(long)]
        prerelease: bool,
        /// Target frameworks to filter on (repeatable)
        #[arg(long = "framework")]
        frameworks: Vec<String>,
    },
    /// Rebuild the metadata cache from the package store
    Rebuild,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_push_with_root() {
        let cli = Cli::parse_from(["nufeed", "--root", "/srv/feed", "push", "pkg.nupkg"]);
        assert_eq!(cli.root.as_deref(), Some(std::path::Path::new("/srv/feed")));
        assert!(matches!(cli.command, Commands::Push { .. }));
    }
}
