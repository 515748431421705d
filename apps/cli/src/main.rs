//! newsmirror CLI: keep a local mirror of Hacker News rankings in sync.
//!
//! Each run reconciles the stored items of a dataset against the live
//! ranking and writes only the delta.

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
