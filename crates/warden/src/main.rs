//! Warden - entry point

use std::process::ExitCode;

use clap::Parser;
use warden::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match warden::run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
