use std::process::ExitCode;

use clap::Parser;
use dbvault::cli::{dispatch, Cli};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    dispatch(cli).await
}
