//! Catalog CLI: enrich bare entity references into complete catalog records.
//!
//! Combines factual lookups with one schema-bound generation call and stores
//! finished records in a local libSQL database.

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
