use anyhow::Result;
use clap::{ColorChoice, Parser};
use urlmap::cli::{self, Cli};
use urlmap::logger;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    logger::set_verbose(cli.verbose);
    logger::set_quiet(cli.quiet);

    cli::run(&cli).await
}
