//! Logging for geows.
//!
//! Startup steps (metadata loading, service registration) log a start and an
//! end event carrying the step name and its duration. Requests are traced by
//! the tower-http layer; failed dispatches additionally log the operation id,
//! the request id and the status they were answered with.

use std::time::Instant;
use tracing::{error, info, warn, Level};

use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tower_http::LatencyUnit;
use uuid::Uuid;

use crate::error::GeowsError;

/// Tracing layer for the axum router
pub fn create_http_trace_layer() -> TraceLayer<
    tower_http::classify::SharedClassifier<tower_http::classify::ServerErrorsAsFailures>,
    DefaultMakeSpan,
    DefaultOnRequest,
    DefaultOnResponse,
> {
    TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(
            DefaultOnResponse::new()
                .level(Level::DEBUG)
                .latency_unit(LatencyUnit::Micros),
        )
}

/// Install the global subscriber. `RUST_LOG` wins over `log_level`; later
/// calls leave the first subscriber in place.
pub fn init_tracing(log_level: &str) {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.to_string());

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .try_init();
}

/// Start of a startup step, optionally naming the file it reads
pub fn log_operation_start(operation: &str, source: Option<&str>) {
    match source {
        Some(source) => info!(operation = operation, source = source, "Starting operation"),
        None => info!(operation = operation, "Starting operation"),
    }
}

/// End of a startup step, with the error that ended it if any
pub fn log_operation_end(operation: &str, start_time: Instant, failure: Option<&GeowsError>) {
    let duration_ms = start_time.elapsed().as_secs_f64() * 1000.0;

    match failure {
        None => info!(
            operation = operation,
            duration_ms = duration_ms,
            "Operation completed successfully"
        ),
        Some(error) => warn!(
            operation = operation,
            duration_ms = duration_ms,
            error = %error,
            error_kind = ?error.kind(),
            "Operation failed"
        ),
    }
}

/// Log what the metadata index holds after startup
pub fn log_metadata_load_stats(
    arrays_file: &str,
    array_names: &[&str],
    timeline_count: usize,
    total_time_points: usize,
) {
    info!(
        operation = "metadata_load",
        arrays_file = arrays_file,
        array_count = array_names.len(),
        arrays = %array_names.join(", "),
        timeline_count = timeline_count,
        time_points = total_time_points,
        "Metadata loaded successfully"
    );
}

/// Log a fatal error together with the phase it ended
pub fn log_error(error: &GeowsError, context: &str) {
    error!(
        error = %error,
        error_kind = ?error.kind(),
        context = context,
        "Error occurred"
    );
}

/// Log a dispatch that did not succeed. Client errors (4xx) log at warn,
/// server-side failures at error.
pub fn log_request_error(
    error: &GeowsError,
    status: u16,
    operation_id: &str,
    request_id: &str,
    query: Option<&str>,
) {
    if status < 500 {
        warn!(
            error = %error,
            error_kind = ?error.kind(),
            status = status,
            operation_id = operation_id,
            request_id = request_id,
            query = query.unwrap_or(""),
            "Request rejected"
        );
    } else {
        error!(
            error = %error,
            error_kind = ?error.kind(),
            status = status,
            operation_id = operation_id,
            request_id = request_id,
            query = query.unwrap_or(""),
            "Request failed"
        );
    }
}

/// Fresh id echoed back in the `x-request-id` header
pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}
