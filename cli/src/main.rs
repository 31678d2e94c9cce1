//! Entry-point for the `quorum` binary.

use std::process::ExitCode;

use clap::Parser;
use quorum_cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    quorum_cli::run_main(cli).await
}
