//! ExpoFinder CLI: index art exhibitions from museum and gallery websites.
//!
//! Operates on a local libSQL database of venues, their website sources,
//! the extracted exhibitions and the scraping log.

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
