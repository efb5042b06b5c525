//! PactLens CLI: contract classification, analysis and Q&A from the terminal.
//!
//! Documents are ingested as extracted text, then classified, analyzed and
//! discussed through an OpenAI-compatible inference endpoint.

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
