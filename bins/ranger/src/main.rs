//! # Ranger Server Binary
//!
//! Loads the server configuration, brings the component graph up through
//! the loader, and serves until CTRL-C or a fatal failure. Migration and
//! schema-verification failures, and an all-protocols bind failure, exit
//! the process with a non-zero code.
//!
//! ## Usage
//!
//! ```bash
//! # Start with the default layout under ./ranger-data
//! ranger
//!
//! # Explicit data directory and config file
//! ranger --data-dir /srv/ranger --config /etc/ranger/server.yml
//!
//! # Enable debug logging
//! RUST_LOG=debug ranger
//! ```

use clap::Parser;
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ranger_server::{Loader, ServerConfig};

/// Command-line arguments for the Ranger server
#[derive(Parser, Debug)]
#[command(name = "ranger")]
#[command(about = "Ranger lakehouse query service")]
struct Args {
    /// Base data directory (metadata registry and table data live here)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Optional YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Disable the HTTP protocol listener
    #[arg(long)]
    no_http: bool,

    /// Disable the JDBC protocol listener
    #[arg(long)]
    no_jdbc: bool,

    /// Disable the native protocol listener
    #[arg(long)]
    no_native: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => match ServerConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                error!(error = %e, "failed to load configuration");
                std::process::exit(1);
            }
        },
        None => ServerConfig::default(),
    };
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }
    config.http.enabled &= !args.no_http;
    config.jdbc.enabled &= !args.no_jdbc;
    config.native.enabled &= !args.no_native;

    let mut loader = Loader::new(config);
    if let Err(e) = loader.initialize() {
        error!(error = %e, "initialization failed");
        std::process::exit(1);
    }
    if let Err(e) = loader.start().await {
        error!(error = %e, "startup failed");
        let _ = loader.shutdown().await;
        std::process::exit(1);
    }
    info!("ranger server running");

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("received ctrl-c, shutting down");
        }
        _ = loader.cancel_token().cancelled() => {}
    }

    if let Err(e) = loader.shutdown().await {
        error!(error = %e, "shutdown failed");
        std::process::exit(1);
    }
}
