//! Application state management for geows.
//!
//! [`AppState`] owns every process-wide component: the metadata index, the
//! connection pool and the operation registry. It is built once at startup;
//! any failure while building it aborts startup. Afterwards its components
//! are shared read-only through `Arc`s.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::handlers::{self, HandlerContext};
use crate::http::{axum_server, ServerBuilderRegistry};
use crate::logging::{log_metadata_load_stats, log_operation_end, log_operation_start};
use crate::metadata::{GeoArrayRegistry, TimelineManager};
use crate::pool::{ConnectionPool, Connector};
use crate::registry::OperationRegistry;

/// The process-wide components shared with the HTTP layer and handlers
#[derive(Debug, Clone)]
pub struct AppState {
    /// Configuration
    pub config: Config,
    /// Registered geo-array schemas
    pub arrays: Arc<GeoArrayRegistry>,
    /// Timelines keyed by array name
    pub timelines: Arc<TimelineManager>,
    /// Backend connection pool
    pub pool: Arc<ConnectionPool>,
    /// Operation id to handler index
    pub operations: Arc<OperationRegistry>,
}

impl AppState {
    /// Load metadata, create the pool and register the bundled services
    pub fn initialize(config: Config, connector: Arc<dyn Connector>) -> Result<Self> {
        let (arrays, timelines) = load_metadata(&config)?;
        let pool = ConnectionPool::new(config.backend.clone(), connector);

        Self::with_components(config, arrays, timelines, pool)
    }

    /// Assemble state from already built components
    pub fn with_components(
        config: Config,
        arrays: GeoArrayRegistry,
        timelines: TimelineManager,
        pool: Arc<ConnectionPool>,
    ) -> Result<Self> {
        let context = HandlerContext {
            arrays: Arc::new(arrays),
            timelines: Arc::new(timelines),
            pool,
        };

        let mut operations = OperationRegistry::new();
        handlers::register_services(&mut operations, &context)?;

        for service in operations.services() {
            for operation in &service.operations {
                info!(operation_id = %operation.id, "Operation available");
            }
        }

        Ok(Self {
            config,
            arrays: context.arrays,
            timelines: context.timelines,
            pool: context.pool,
            operations: Arc::new(operations),
        })
    }

    /// Builders for every bundled HTTP server implementation
    pub fn server_builders(&self) -> Result<ServerBuilderRegistry> {
        let mut builders = ServerBuilderRegistry::new();
        axum_server::register(
            &mut builders,
            self.config.server.clone(),
            Arc::clone(&self.operations),
        )?;
        Ok(builders)
    }
}

fn load_metadata(config: &Config) -> Result<(GeoArrayRegistry, TimelineManager)> {
    let start_time = Instant::now();
    let arrays_file = config
        .metadata
        .arrays_file
        .as_ref()
        .map(|p| p.display().to_string());
    log_operation_start("metadata_load", arrays_file.as_deref());

    let loaded = read_metadata(config);
    log_operation_end("metadata_load", start_time, loaded.as_ref().err());
    let (arrays, timelines) = loaded?;

    let mut names = arrays.list_names();
    names.sort_unstable();
    log_metadata_load_stats(
        arrays_file.as_deref().unwrap_or_default(),
        &names,
        timelines.len(),
        timelines.total_time_points(),
    );

    Ok((arrays, timelines))
}

fn read_metadata(config: &Config) -> Result<(GeoArrayRegistry, TimelineManager)> {
    let arrays = match &config.metadata.arrays_file {
        Some(path) => GeoArrayRegistry::load(path)?,
        None => {
            warn!("No array metadata file configured; serving an empty index");
            GeoArrayRegistry::new()
        }
    };

    let timelines = match &config.metadata.timelines_file {
        Some(path) => TimelineManager::load(path, &arrays)?,
        None => {
            warn!("No timeline manifest configured; no timelines loaded");
            TimelineManager::new()
        }
    };

    Ok((arrays, timelines))
}
