//! HTTP server implementation on top of axum.
//!
//! Every method on every path goes to a single fallback route that buffers the
//! request and hands it to the [`Dispatcher`]. Routing by operation id happens
//! in the operation registry, not in axum.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use parking_lot::Mutex;
use tokio::signal;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::error::{GeowsError, Result};
use crate::http::dispatch::Dispatcher;
use crate::http::request::OwnedRequest;
use crate::http::response::BufferedResponse;
use crate::http::server::{HttpServer, ServerBuilderRegistry};
use crate::logging::create_http_trace_layer;
use crate::registry::OperationRegistry;

/// Builder id this implementation registers under
pub const AXUM_BUILDER_ID: &str = "axum";

/// Largest request body accepted
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// How long in-flight handlers get once the server stops
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Register the axum builder. Each build creates an independent server bound
/// to the given operation registry.
pub fn register(
    builders: &mut ServerBuilderRegistry,
    config: ServerConfig,
    registry: Arc<OperationRegistry>,
) -> Result<()> {
    builders.insert(AXUM_BUILDER_ID, move || {
        let dispatcher = Dispatcher::new(
            Arc::clone(&registry),
            config.worker_count(),
            Duration::from_secs(config.request_timeout_secs),
        );
        Box::new(AxumServer::new(config.clone(), dispatcher)) as Box<dyn HttpServer>
    })
}

/// Build the router serving every path through `dispatcher`
pub fn router(dispatcher: Dispatcher) -> Router {
    Router::new()
        .fallback(handle_request)
        .layer(create_http_trace_layer())
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(dispatcher))
}

async fn handle_request(
    State(dispatcher): State<Arc<Dispatcher>>,
    request: Request,
) -> Response {
    let (parts, body) = request.into_parts();

    let content = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(content) => content,
        Err(e) => {
            let message = format!("could not read request body: {}", e);
            return into_axum_response(BufferedResponse::error(400, &message));
        }
    };

    let request = OwnedRequest::new(parts.method.as_str(), parts.uri.path())
        .with_version(format!("{:?}", parts.version))
        .with_query(parts.uri.query())
        .with_content(content);

    into_axum_response(dispatcher.handle(request).await)
}

fn into_axum_response(response: BufferedResponse) -> Response {
    let (status, headers, body) = response.into_parts();
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut builder = Response::builder().status(status);
    for (key, value) in headers {
        match (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            (Ok(name), Ok(value)) => builder = builder.header(name, value),
            _ => warn!(header = %key, "Dropping invalid response header"),
        }
    }

    builder
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// axum-backed [`HttpServer`].
pub struct AxumServer {
    config: ServerConfig,
    dispatcher: Dispatcher,
    shutdown: watch::Sender<bool>,
    running: AtomicBool,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl AxumServer {
    pub fn new(config: ServerConfig, dispatcher: Dispatcher) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            dispatcher,
            shutdown,
            running: AtomicBool::new(false),
            local_addr: Mutex::new(None),
        }
    }

    async fn serve(&self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind((self.config.host.as_str(), self.config.port))
            .await
            .map_err(|e| GeowsError::Server {
                message: format!(
                    "Failed to bind to {}:{}: {}",
                    self.config.host, self.config.port, e
                ),
            })?;

        let addr = listener.local_addr().map_err(|e| GeowsError::Server {
            message: format!("Failed to read listener address: {}", e),
        })?;
        *self.local_addr.lock() = Some(addr);

        info!("Server listening on http://{}", addr);

        let stop_requested = self.shutdown.subscribe();
        let shutdown = async move {
            tokio::select! {
                _ = wait_for_stop(stop_requested) => {
                    info!("Stop requested, starting graceful shutdown");
                },
                _ = shutdown_signal() => {},
            }
        };

        axum::serve(listener, router(self.dispatcher.clone()))
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| GeowsError::Server {
                message: format!("Server error: {}", e),
            })
    }
}

impl HttpServer for AxumServer {
    /// Runs the server on a dedicated tokio runtime. Must not be called from
    /// inside another runtime.
    fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(GeowsError::Server {
                message: "Server is already running".to_string(),
            });
        }

        let result = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("geows-http")
            .build()
            .map_err(|e| GeowsError::Server {
                message: format!("Failed to create runtime: {}", e),
            })
            .and_then(|runtime| {
                let result = runtime.block_on(self.serve());
                runtime.shutdown_timeout(SHUTDOWN_GRACE);
                result
            });

        *self.local_addr.lock() = None;
        self.running.store(false, Ordering::SeqCst);
        result
    }

    fn stop(&self) {
        let already_stopped = self.shutdown.send_replace(true);
        if !already_stopped {
            info!("HTTP server stop requested");
        }
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }
}

/// Resolve once `stop` has been called
async fn wait_for_stop(mut stop_requested: watch::Receiver<bool>) {
    loop {
        let stopped = *stop_requested.borrow_and_update();
        if stopped || stop_requested.changed().await.is_err() {
            return;
        }
    }
}

/// Wait for a shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::HttpRequest;
    use crate::http::response::HttpResponse;
    use crate::registry::{Operation, OperationHandler, Service};
    use tower::ServiceExt;

    struct Hello;

    impl OperationHandler for Hello {
        fn handle(&self, request: &dyn HttpRequest, response: &mut dyn HttpResponse) -> Result<()> {
            response.add_header("Content-Type", "text/plain")?;
            response.add_header("X-Method", request.method())?;
            response.set_content(b"hello")
        }
    }

    fn dispatcher() -> Dispatcher {
        let mut registry = OperationRegistry::new();
        registry
            .insert(Service::new("greet").with_operation(Operation::new("hello", "", Hello)))
            .unwrap();
        Dispatcher::new(Arc::new(registry), 2, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_router_dispatches_any_method() {
        let app = router(dispatcher());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/greet/hello?x=1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-method"], "POST");
        assert!(response.headers().contains_key("x-request-id"));
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"hello");
    }

    #[tokio::test]
    async fn test_router_unknown_path() {
        let app = router(dispatcher());

        let response = app
            .oneshot(Request::builder().uri("/greet/bye").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert!(String::from_utf8_lossy(&body).starts_with("Error:"));
    }

    #[test]
    fn test_stop_before_start_returns_promptly() {
        let config = ServerConfig {
            port: 0,
            ..ServerConfig::default()
        };
        let server = AxumServer::new(config, dispatcher());
        server.stop();
        server.stop();

        assert!(server.start().is_ok());
        assert!(server.local_addr().is_none());
    }
}
