//! # geows
//!
//! A pluggable host for geospatial web services over a multidimensional
//! array database.
//!
//! Services register named operations at startup; an HTTP server built
//! through the builder registry routes every request path `/service/op` to
//! the matching handler.
//!
//! ## Architecture
//!
//! - **Registry**: maps operation ids to handlers, rejecting duplicates atomically
//! - **HTTP Layer**: transport-neutral request/response traits, a single
//!   dispatch boundary and pluggable server implementations (axum by default)
//! - **Connection Pool**: reusable sessions with the array database coordinator
//! - **Metadata Index**: geo-array schemas and the timelines of their temporal dimension
//! - **Handlers**: the bundled `wtss` and `tws` services

pub mod config;
pub mod error;
pub mod handlers;
pub mod http;
pub mod logging;
pub mod metadata;
pub mod pool;
pub mod registry;
pub mod state;

pub use config::Config;
pub use error::{ErrorKind, GeowsError, Result};
pub use handlers::HandlerContext;
pub use http::{HttpRequest, HttpResponse, HttpServer, ServerBuilder, ServerBuilderRegistry};
pub use logging::{
    create_http_trace_layer, generate_request_id, init_tracing, log_error,
    log_metadata_load_stats, log_operation_end, log_operation_start, log_request_error,
};
pub use metadata::{GeoArray, GeoArrayRegistry, Timeline, TimelineManager};
pub use pool::{Connection, ConnectionPool, Connector, PoolStats, PooledConnection, Session, TcpConnector};
pub use registry::{Operation, OperationHandler, OperationRegistry, Service};
pub use state::AppState;
