//! Server lifecycle contract and the builder registry.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{GeowsError, Result};

/// A runnable HTTP server implementation.
///
/// `start` blocks the calling thread until the server stops and must not be
/// called twice concurrently. `stop` may be called from any thread, any number
/// of times, including before or while `start` runs.
pub trait HttpServer: Send + Sync {
    fn start(&self) -> Result<()>;

    fn stop(&self);

    /// Address the server is listening on, once bound
    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }
}

/// Zero-argument factory producing a fresh server instance.
pub trait ServerBuilder: Send + Sync {
    fn build(&self) -> Box<dyn HttpServer>;
}

impl<F> ServerBuilder for F
where
    F: Fn() -> Box<dyn HttpServer> + Send + Sync,
{
    fn build(&self) -> Box<dyn HttpServer> {
        self()
    }
}

/// Index from implementation id (e.g. `"axum"`) to its builder.
#[derive(Default)]
pub struct ServerBuilderRegistry {
    builders: HashMap<String, Arc<dyn ServerBuilder>>,
}

impl ServerBuilderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, builder: impl ServerBuilder + 'static) -> Result<()> {
        let id = id.into();
        if self.builders.contains_key(&id) {
            return Err(GeowsError::DuplicateBuilder { id });
        }
        debug!(builder = %id, "Registering HTTP server builder");
        self.builders.insert(id, Arc::new(builder));
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Result<()> {
        self.builders
            .remove(id)
            .map(|_| debug!(builder = %id, "Removed HTTP server builder"))
            .ok_or_else(|| GeowsError::not_found(format!("HTTP server builder '{}'", id)))
    }

    /// Create a new server from the builder registered under `id`
    pub fn build(&self, id: &str) -> Result<Box<dyn HttpServer>> {
        let builder = self.builders.get(id).ok_or_else(|| GeowsError::BuildFailed {
            id: id.to_string(),
        })?;
        info!(builder = %id, "Building HTTP server");
        Ok(builder.build())
    }

    /// Registered ids, sorted
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<_> = self.builders.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

impl fmt::Debug for ServerBuilderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerBuilderRegistry")
            .field("builders", &self.ids())
            .finish()
    }
}
