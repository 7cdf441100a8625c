//! SiteQuery CLI: question-driven crawling and answer assembly.
//!
//! Crawls a bounded neighbourhood of a seed URL, picks the content most
//! relevant to a question, and prints a cited answer.

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
