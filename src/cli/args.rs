//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::path::PathBuf;

/// Url resolution for content sites
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Config file path (default: urlmap.toml)
    #[arg(short = 'C', long, global = true, default_value = "urlmap.toml", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress log output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Skip the persistent cache even when `[cache]` enables it
    #[arg(long, global = true)]
    pub no_cache: bool,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Show the resource and route serving a url
    #[command(visible_alias = "r")]
    Resolve {
        /// Site-relative url, e.g. /2024/01/02/hello/
        url: String,
    },

    /// Print the url of a resource
    #[command(visible_alias = "u")]
    Url {
        /// Resource id
        id: String,

        /// Include origin and subdirectory
        #[arg(short, long)]
        absolute: bool,
    },

    /// Print the whole url table
    #[command(visible_alias = "d")]
    Dump {
        /// Emit JSON instead of a text table
        #[arg(short, long)]
        json: bool,
    },

    /// Report urls claimed by more than one resource
    #[command(visible_alias = "c")]
    Check {
        /// Treat conflicts as warnings instead of errors
        #[arg(long, short = 'w')]
        warn_only: bool,
    },

    /// List registered routes in precedence order
    Routes,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_subcommands() {
        let cli = Cli::parse_from(["urlmap", "url", "abc", "--absolute"]);
        assert!(matches!(cli.command, Commands::Url { ref id, absolute: true } if id == "abc"));
        assert_eq!(cli.config, PathBuf::from("urlmap.toml"));

        let cli = Cli::parse_from(["urlmap", "-C", "site/urlmap.toml", "--verbose", "dump", "--json"]);
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Dump { json: true }));

        let cli = Cli::parse_from(["urlmap", "r", "/hello/"]);
        assert!(matches!(cli.command, Commands::Resolve { ref url } if url == "/hello/"));
    }
}
