//! Localvore CLI: seasonal recipe recommendations from your own recipe store.
//!
//! Scrapes recipe sites, loads Recipe1M, and builds menus around the
//! vegetables in season in a U.S. state.

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
