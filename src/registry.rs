//! Service and operation registry.
//!
//! Services contribute named operations; each operation is addressed by the
//! composed id `/{service}/{operation}`, which is exactly the request path the
//! HTTP layer dispatches on. The registry is filled during startup through
//! `&mut self` and shared read-only behind an `Arc` afterwards.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::error::{GeowsError, Result};
use crate::http::{HttpRequest, HttpResponse};

/// A request handler bound to one operation id.
pub trait OperationHandler: Send + Sync {
    /// Serve one request. The handler writes zero or more headers and then
    /// exactly one body through `response`.
    fn handle(&self, request: &dyn HttpRequest, response: &mut dyn HttpResponse) -> Result<()>;
}

impl<F> OperationHandler for F
where
    F: Fn(&dyn HttpRequest, &mut dyn HttpResponse) -> Result<()> + Send + Sync,
{
    fn handle(&self, request: &dyn HttpRequest, response: &mut dyn HttpResponse) -> Result<()> {
        self(request, response)
    }
}

/// A named handler inside a service
#[derive(Clone)]
pub struct Operation {
    /// Operation name, unique inside its service
    pub name: String,
    /// Human readable description
    pub description: String,
    /// The handler serving this operation
    pub handler: Arc<dyn OperationHandler>,
}

impl Operation {
    /// Create an operation from any handler
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: impl OperationHandler + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            handler: Arc::new(handler),
        }
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// A named, ordered group of operations
#[derive(Debug, Clone)]
pub struct Service {
    pub name: String,
    pub operations: Vec<Operation>,
}

impl Service {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            operations: Vec::new(),
        }
    }

    /// Append an operation, builder style
    pub fn with_operation(mut self, operation: Operation) -> Self {
        self.operations.push(operation);
        self
    }
}

/// Registered service as reported to introspection callers
#[derive(Debug, Clone, Serialize)]
pub struct ServiceDescriptor {
    pub name: String,
    pub operations: Vec<OperationDescriptor>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OperationDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
}

/// Build the dispatch id of an operation
pub fn operation_id(service: &str, operation: &str) -> String {
    format!("/{}/{}", service, operation)
}

/// Index from operation id to handler.
#[derive(Default)]
pub struct OperationRegistry {
    services: HashMap<String, ServiceDescriptor>,
    operations: HashMap<String, Arc<dyn OperationHandler>>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every operation of `service`, or none of them.
    pub fn insert(&mut self, service: Service) -> Result<()> {
        if self.services.contains_key(&service.name) {
            return Err(GeowsError::DuplicateService { name: service.name });
        }

        let mut candidates: Vec<(String, &Operation)> = Vec::with_capacity(service.operations.len());
        for op in &service.operations {
            let id = operation_id(&service.name, &op.name);
            if self.operations.contains_key(&id) || candidates.iter().any(|(c, _)| *c == id) {
                return Err(GeowsError::DuplicateOperation { id });
            }
            candidates.push((id, op));
        }

        let descriptor = ServiceDescriptor {
            name: service.name.clone(),
            operations: candidates
                .iter()
                .map(|(id, op)| OperationDescriptor {
                    id: id.clone(),
                    name: op.name.clone(),
                    description: op.description.clone(),
                })
                .collect(),
        };

        for (id, op) in candidates {
            debug!(operation_id = %id, "Registering operation");
            self.operations.insert(id, Arc::clone(&op.handler));
        }
        self.services.insert(service.name, descriptor);

        Ok(())
    }

    /// Exact lookup of an operation id such as `/wtss/list_coverages`
    pub fn get(&self, operation_id: &str) -> Result<Arc<dyn OperationHandler>> {
        self.operations
            .get(operation_id)
            .cloned()
            .ok_or_else(|| GeowsError::not_found(format!("operation '{}'", operation_id)))
    }

    /// Registered services, sorted by name
    pub fn services(&self) -> Vec<&ServiceDescriptor> {
        let mut services: Vec<_> = self.services.values().collect();
        services.sort_by(|a, b| a.name.cmp(&b.name));
        services
    }

    /// Number of registered operations
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

impl fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.operations.keys().collect();
        ids.sort();
        f.debug_struct("OperationRegistry")
            .field("operations", &ids)
            .finish()
    }
}
