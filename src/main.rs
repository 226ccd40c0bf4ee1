//! Freightliner CLI entry point: parses arguments and dispatches to the
//! `replicate`, `serve-metrics`, or `verify` subcommand, exiting with the
//! code the runner reports.

use clap::Parser;
use freightliner::cli::{Args, Runner};

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let code = Runner::run(args).await;
    std::process::exit(code);
}
