//! pagewise CLI: retrieval-augmented review of scraped page sections.
//!
//! Flags outdated content, suggests trust-enhancing additions, and proposes
//! replacements for broken links.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
