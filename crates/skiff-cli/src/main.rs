//! skiff - no-bundle development server.
//!
//! Entry point: parse arguments, initialize logging, load the optional
//! config file, and run the server until interrupted.

mod config;

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use skiff::logging::LogLevel;
use skiff::Server;

#[derive(Debug, Parser)]
#[command(name = "skiff", version, about = "No-bundle ES module dev server")]
struct Args {
    /// Project root to serve
    #[arg(default_value = ".")]
    root: PathBuf,

    /// Port to bind on localhost (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Path to a config file (default: <root>/skiff.config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level: silent, error, warn, info, debug
    #[arg(long, default_value = "info")]
    log_level: LogLevel,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    skiff::logging::init(args.log_level);

    let mut server_config = match config::load(args.root, args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("{err}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(port) = args.port {
        server_config.port = port;
    }

    match Server::new(server_config).listen().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err}");
            ExitCode::FAILURE
        }
    }
}
