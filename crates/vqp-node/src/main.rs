//! VQP Node: Entry point.
//!
//! Serves verifiable queries over HTTP with configuration from a TOML file
//! or defaults.

mod api;
mod config;
mod node;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use config::VqpConfig;
use node::VqpNode;

/// VQP Node
#[derive(Parser, Debug)]
#[command(name = "vqp-node", version, about = "Verifiable Query Protocol responder")]
struct Args {
    /// Path to the configuration file (TOML).
    #[arg(short, long, default_value = "vqp.toml")]
    config: PathBuf,

    /// Override the API port.
    #[arg(long)]
    port: Option<u16>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    /// Generate a default config file and exit.
    #[arg(long)]
    init: bool,
}

fn init_tracing(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = if args.init {
        VqpConfig::default()
    } else {
        VqpConfig::load(&args.config)?
    };

    // Apply CLI overrides
    if let Some(port) = args.port {
        config.api.port = port;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    init_tracing(&config.logging.level, &config.logging.format);

    // Handle --init flag
    if args.init {
        config.save(&args.config)?;
        tracing::info!(path = %args.config.display(), "wrote default config");
        return Ok(());
    }

    tracing::info!("VQP Node v{}", env!("CARGO_PKG_VERSION"));

    let node = VqpNode::new(config)?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
        tracing::info!("received shutdown signal");
    };

    tokio::select! {
        result = node.run() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP API server error");
                return Err(e);
            }
        }
        _ = shutdown => {
            tracing::info!("initiating graceful shutdown");
        }
    }

    tracing::info!("VQP node exited cleanly");
    Ok(())
}
