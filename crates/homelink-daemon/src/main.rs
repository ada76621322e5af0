//! Homelink Daemon - Main entry point
//!
//! Runs discovery and telemetry and serves the REST and WebSocket API.

mod api;
mod config;
mod server;
mod state;
mod ws;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "homelink")]
#[command(about = "Smart-home discovery, control and telemetry daemon")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "homelink.toml")]
    config: PathBuf,

    /// Bind address for web server
    #[arg(short, long)]
    bind: Option<String>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Hub access token
    #[arg(long, env = "HOMELINK_HUB_TOKEN", hide_env_values = true)]
    hub_token: Option<String>,

    /// Run a single discovery cycle and exit
    #[arg(long)]
    scan_once: bool,

    /// Write a default configuration file to the config path and exit
    #[arg(long)]
    write_default_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();

    info!("Homelink v{}", env!("CARGO_PKG_VERSION"));

    if args.write_default_config {
        config::save_default_config(&args.config)?;
        println!("Wrote default configuration to {}", args.config.display());
        return Ok(());
    }

    // Load configuration
    let mut config = config::load_config(&args.config)?;

    // Command line overrides
    if let Some(bind) = args.bind {
        config.daemon.bind = bind;
    }
    if let Some(token) = args.hub_token {
        config.hub.token = Some(token);
    }

    info!(
        network = config.network.enabled,
        radio = config.radio.enabled,
        hub = config.hub.enabled,
        interval_secs = config.daemon.discovery_interval_secs,
        "Configuration loaded"
    );

    // Create application state
    let state = state::AppState::new(config.clone())?;

    if args.scan_once {
        // Single scan mode
        info!("Running single discovery cycle");
        if let Some(report) = state.orchestrator.run_cycle().await {
            for backend in &report.backends {
                match (&backend.devices, &backend.error) {
                    (Some(count), _) => println!("{}: {} devices ({} ms)", backend.backend, count, backend.elapsed_ms),
                    (None, Some(error)) => println!("{}: failed: {}", backend.backend, error),
                    (None, None) => println!("{}: no result", backend.backend),
                }
            }
        }
        let snapshot = state.list_devices();
        println!("Registry v{} holds {} devices:", snapshot.version, snapshot.len());
        for device in snapshot.devices() {
            println!(
                "  - {} ({}) {:?}{}",
                device.display_name,
                device.id,
                device.kind,
                if device.reachable { "" } else { " [unreachable]" }
            );
            if let Some(vendor) = &device.vendor {
                println!("    Vendor: {}", vendor);
            }
        }
    } else {
        // Daemon mode - run web server, discovery and telemetry
        server::run(state, &config.daemon.bind).await?;
    }

    Ok(())
}
