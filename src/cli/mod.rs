//! Command-line interface module.

mod args;
mod boot;
mod commands;

pub use args::{Cli, Commands};
pub use boot::Site;

use anyhow::Result;

use crate::config::UrlmapConfig;

/// Boot the site described by the config and run one command.
pub async fn run(cli: &Cli) -> Result<()> {
    let config = UrlmapConfig::load(&cli.config)?;
    let site = Site::boot(config, !cli.no_cache).await?;

    match &cli.command {
        Commands::Resolve { url } => commands::resolve(&site, url)?,
        Commands::Url { id, absolute } => commands::url(&site, id, *absolute)?,
        Commands::Dump { json } => commands::dump(&site, *json)?,
        Commands::Check { warn_only } => commands::check(&site, *warn_only)?,
        Commands::Routes => commands::routes(&site)?,
    }

    site.shutdown().await
}
