mod api;
mod cli;
mod model;
mod orchestrator;
mod text_summary;

use anyhow::Result;
use clap::Parser;
use tracing::Level;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let is_silent = args.silent;

    let log_level = if args.verbose {
        Level::DEBUG
    } else if is_silent {
        Level::ERROR
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli::run(args).await {
        // Exit explicitly: a stdin reader left blocked in interactive mode would otherwise
        // hold the runtime open.
        Ok(()) => std::process::exit(0),
        Err(e) => {
            if is_silent {
                println!("{}", e);
                std::process::exit(1);
            } else {
                Err(e)
            }
        }
    }
}
