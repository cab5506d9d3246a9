//! The single dispatch boundary between transports and handlers.
//!
//! Whatever a handler does (returning an error, panicking, never writing a
//! body) ends here as an HTTP response. Nothing propagates to the transport.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::error::GeowsError;
use crate::http::request::{HttpRequest, OwnedRequest};
use crate::http::response::BufferedResponse;
use crate::logging::{generate_request_id, log_request_error};
use crate::registry::OperationRegistry;

/// Status used for request-scoped errors
pub const REQUEST_ERROR_STATUS: u16 = 400;

/// Resolve the request path to an operation and run its handler.
pub fn dispatch(
    registry: &OperationRegistry,
    request: &dyn HttpRequest,
    request_id: &str,
) -> BufferedResponse {
    let operation_id = request.base_uri();

    let handler = match registry.get(operation_id) {
        Ok(handler) => handler,
        Err(error) => {
            log_request_error(
                &error,
                REQUEST_ERROR_STATUS,
                operation_id,
                request_id,
                request.query_string(),
            );
            return BufferedResponse::error(REQUEST_ERROR_STATUS, &error.to_string());
        }
    };

    let mut response = BufferedResponse::new();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        handler.handle(request, &mut response)
    }));

    match outcome {
        Ok(Ok(())) if response.is_complete() => response,
        Ok(Ok(())) => {
            let error = GeowsError::Server {
                message: format!("operation '{}' produced no content", operation_id),
            };
            log_request_error(
                &error,
                500,
                operation_id,
                request_id,
                request.query_string(),
            );
            BufferedResponse::error(500, &error.to_string())
        }
        Ok(Err(error)) => {
            log_request_error(
                &error,
                REQUEST_ERROR_STATUS,
                operation_id,
                request_id,
                request.query_string(),
            );
            BufferedResponse::error(REQUEST_ERROR_STATUS, &error.to_string())
        }
        Err(_) => {
            let error = GeowsError::Server {
                message: format!("operation '{}' panicked", operation_id),
            };
            log_request_error(
                &error,
                500,
                operation_id,
                request_id,
                request.query_string(),
            );
            BufferedResponse::error(500, &error.to_string())
        }
    }
}

/// Runs [`dispatch`] on tokio's blocking pool with a bounded number of
/// concurrent handlers and a per-request deadline.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<OperationRegistry>,
    workers: Arc<Semaphore>,
    request_timeout: Duration,
}

impl Dispatcher {
    pub fn new(registry: Arc<OperationRegistry>, workers: usize, request_timeout: Duration) -> Self {
        Self {
            registry,
            workers: Arc::new(Semaphore::new(workers.max(1))),
            request_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<OperationRegistry> {
        &self.registry
    }

    /// Serve one request. A timed-out handler keeps its worker permit until
    /// it actually returns, so the bound on running handlers always holds.
    pub async fn handle(&self, request: OwnedRequest) -> BufferedResponse {
        let request_id = generate_request_id();
        let start_time = Instant::now();
        let operation_id = request.base_uri().to_string();

        debug!(
            endpoint = %operation_id,
            request_id = %request_id,
            method = request.method(),
            query = request.query_string().unwrap_or(""),
            "Dispatching request"
        );

        let registry = Arc::clone(&self.registry);
        let workers = Arc::clone(&self.workers);
        let task_request_id = request_id.clone();
        let work = async move {
            let permit = workers.acquire_owned().await.map_err(|_| GeowsError::Server {
                message: "worker pool is closed".to_string(),
            })?;
            tokio::task::spawn_blocking(move || {
                let _permit = permit;
                dispatch(&registry, &request, &task_request_id)
            })
            .await
            .map_err(|e| GeowsError::Server {
                message: format!("handler task failed: {}", e),
            })
        };

        let mut response = match tokio::time::timeout(self.request_timeout, work).await {
            Ok(Ok(response)) => response,
            Ok(Err(error)) => {
                log_request_error(&error, 500, &operation_id, &request_id, None);
                BufferedResponse::error(500, &error.to_string())
            }
            Err(_) => {
                let error = GeowsError::Server {
                    message: format!(
                        "request deadline of {}s exceeded",
                        self.request_timeout.as_secs_f64()
                    ),
                };
                warn!(
                    endpoint = %operation_id,
                    request_id = %request_id,
                    "Request timed out"
                );
                BufferedResponse::error(503, &error.to_string())
            }
        };

        response.push_header("x-request-id", &request_id);

        info!(
            endpoint = %operation_id,
            request_id = %request_id,
            status = response.status(),
            duration_us = start_time.elapsed().as_micros() as u64,
            "Request completed"
        );

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::http::response::HttpResponse;
    use crate::registry::{Operation, OperationHandler, Service};

    struct Echo;

    impl OperationHandler for Echo {
        fn handle(&self, request: &dyn HttpRequest, response: &mut dyn HttpResponse) -> Result<()> {
            response.add_header("Content-Type", "text/plain")?;
            response.set_content(request.query_string().unwrap_or("").as_bytes())
        }
    }

    struct Failing;

    impl OperationHandler for Failing {
        fn handle(&self, _request: &dyn HttpRequest, _response: &mut dyn HttpResponse) -> Result<()> {
            Err(GeowsError::request("missing parameter 'name'"))
        }
    }

    struct Panicking;

    impl OperationHandler for Panicking {
        fn handle(&self, _request: &dyn HttpRequest, _response: &mut dyn HttpResponse) -> Result<()> {
            panic!("boom")
        }
    }

    struct Silent;

    impl OperationHandler for Silent {
        fn handle(&self, _request: &dyn HttpRequest, _response: &mut dyn HttpResponse) -> Result<()> {
            Ok(())
        }
    }

    struct Slow;

    impl OperationHandler for Slow {
        fn handle(&self, _request: &dyn HttpRequest, response: &mut dyn HttpResponse) -> Result<()> {
            std::thread::sleep(Duration::from_millis(300));
            response.set_content(b"late")
        }
    }

    fn registry() -> OperationRegistry {
        let mut registry = OperationRegistry::new();
        registry
            .insert(
                Service::new("test")
                    .with_operation(Operation::new("echo", "", Echo))
                    .with_operation(Operation::new("fail", "", Failing))
                    .with_operation(Operation::new("panic", "", Panicking))
                    .with_operation(Operation::new("silent", "", Silent))
                    .with_operation(Operation::new("slow", "", Slow)),
            )
            .unwrap();
        registry
    }

    fn body(response: &BufferedResponse) -> String {
        String::from_utf8_lossy(response.content().unwrap()).to_string()
    }

    #[test]
    fn test_dispatch_success() {
        let registry = registry();
        let request = OwnedRequest::new("GET", "/test/echo").with_query(Some("a=1"));
        let response = dispatch(&registry, &request, "req");

        assert_eq!(response.status(), 200);
        assert_eq!(response.header("content-type"), Some("text/plain"));
        assert_eq!(body(&response), "a=1");
    }

    #[test]
    fn test_dispatch_unknown_operation() {
        let registry = registry();
        let response = dispatch(&registry, &OwnedRequest::new("GET", "/test/unknown"), "req");

        assert_eq!(response.status(), 400);
        assert!(body(&response).starts_with("Error:"));
        assert!(body(&response).contains("/test/unknown"));
    }

    #[test]
    fn test_dispatch_handler_error() {
        let registry = registry();
        let response = dispatch(&registry, &OwnedRequest::new("GET", "/test/fail"), "req");

        assert_eq!(response.status(), 400);
        assert_eq!(body(&response), "Error: missing parameter 'name'");
    }

    #[test]
    fn test_dispatch_contains_panics() {
        let registry = registry();
        let response = dispatch(&registry, &OwnedRequest::new("GET", "/test/panic"), "req");
        assert_eq!(response.status(), 500);
        assert!(body(&response).starts_with("Error:"));

        // the registry is still usable afterwards
        let response = dispatch(&registry, &OwnedRequest::new("GET", "/test/echo"), "req");
        assert_eq!(response.status(), 200);
    }

    #[test]
    fn test_dispatch_missing_body() {
        let registry = registry();
        let response = dispatch(&registry, &OwnedRequest::new("GET", "/test/silent"), "req");
        assert_eq!(response.status(), 500);
    }

    #[tokio::test]
    async fn test_dispatcher_adds_request_id() {
        let dispatcher = Dispatcher::new(Arc::new(registry()), 2, Duration::from_secs(5));
        let response = dispatcher.handle(OwnedRequest::new("GET", "/test/echo")).await;

        assert_eq!(response.status(), 200);
        assert!(response.header("x-request-id").is_some());
    }

    #[tokio::test]
    async fn test_dispatcher_deadline() {
        let dispatcher = Dispatcher::new(Arc::new(registry()), 1, Duration::from_millis(50));
        let response = dispatcher.handle(OwnedRequest::new("GET", "/test/slow")).await;

        assert_eq!(response.status(), 503);
        assert!(body(&response).contains("deadline"));
    }
}
