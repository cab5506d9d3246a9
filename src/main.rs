//! geows - a pluggable host for geospatial web services
//!
//! This is the main entry point for the geows application.

use std::sync::Arc;

use tracing::{error, info};

use geows::{init_tracing, log_error, AppState, Config, TcpConnector};

fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::load().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        e
    })?;

    init_tracing(&config.log_level);

    info!("Starting geows v{}", env!("CARGO_PKG_VERSION"));

    // Validate configuration
    config.validate().map_err(|e| {
        error!("Invalid configuration: {}", e);
        e
    })?;

    let connector = TcpConnector::from_config(&config.backend);

    // Load metadata, create the pool and register services
    let state = AppState::initialize(config, Arc::new(connector)).map_err(|e| {
        log_error(&e, "startup");
        e
    })?;

    info!(
        arrays = state.arrays.len(),
        timelines = state.timelines.len(),
        operations = state.operations.len(),
        "Application state initialized"
    );

    let builders = state.server_builders()?;
    let server = builders
        .build(&state.config.server.implementation)
        .map_err(|e| {
            error!(
                "Unknown server implementation '{}', available: {:?}",
                state.config.server.implementation,
                builders.ids()
            );
            e
        })?;

    // Blocks until stopped or a shutdown signal arrives
    server.start()?;

    info!("Server has been gracefully shut down");
    Ok(())
}
