//! explorer-cache - explorer statistics and halving countdown
//!
//! Parses the command line, builds the cache once, and runs a single command.

use std::io;
use std::process;

use clap::Parser;

use explorer_cache::app::App;
use explorer_cache::cli::{AppConfig, Cli};

/// Initializes logging to stderr, overridable with `RUST_LOG`
fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "explorer_cache=warn".into()),
        )
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    setup_tracing();

    let cli = Cli::parse();
    let config = match AppConfig::from_cli(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(2);
        }
    };

    let app = App::new(config);
    let mut stdout = io::stdout().lock();

    if let Err(e) = app.run(&cli.command, &mut stdout).await {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}
