//! Bundled services and their operation handlers.
//!
//! Each service module exposes a `service(&HandlerContext)` constructor; the
//! handlers capture the shared components they need from the context.

pub mod heartbeat;
pub mod wtss;

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::error::{GeowsError, Result};
use crate::http::{expand_query_string, HttpRequest, HttpResponse};
use crate::metadata::{GeoArrayRegistry, TimelineManager};
use crate::pool::ConnectionPool;
use crate::registry::OperationRegistry;

/// Shared components handed to handlers at registration time
#[derive(Debug, Clone)]
pub struct HandlerContext {
    pub arrays: Arc<GeoArrayRegistry>,
    pub timelines: Arc<TimelineManager>,
    pub pool: Arc<ConnectionPool>,
}

/// Register every bundled service
pub fn register_services(registry: &mut OperationRegistry, context: &HandlerContext) -> Result<()> {
    registry.insert(wtss::service(context))?;
    registry.insert(heartbeat::service(context))?;
    Ok(())
}

/// Serialize `value` as the JSON body of the response
pub(crate) fn write_json<T: Serialize>(response: &mut dyn HttpResponse, value: &T) -> Result<()> {
    let body = serde_json::to_vec(value)?;
    response.add_header("Content-Type", "application/json")?;
    response.set_content(&body)
}

/// Request variables, from the query string first and a form-encoded body
/// second. A malformed query string is an error; a body that is not a form
/// is ignored.
pub(crate) fn query_vars(request: &dyn HttpRequest) -> Result<HashMap<String, String>> {
    let mut vars = expand_query_string(request.query_string().unwrap_or(""))?;

    let form = std::str::from_utf8(request.content())
        .ok()
        .and_then(|body| expand_query_string(body.trim_end()).ok());
    for (key, value) in form.into_iter().flatten() {
        vars.entry(key).or_insert(value);
    }

    Ok(vars)
}

/// A parameter that must be present and non-empty
pub(crate) fn required<'a>(vars: &'a HashMap<String, String>, name: &str) -> Result<&'a str> {
    match vars.get(name).map(String::as_str) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(GeowsError::request(format!(
            "missing required parameter '{}'",
            name
        ))),
    }
}

/// A present, non-empty parameter parsed as a number
pub(crate) fn required_f64(vars: &HashMap<String, String>, name: &str) -> Result<f64> {
    let value = required(vars, name)?;
    value.parse::<f64>().map_err(|_| {
        GeowsError::request(format!(
            "parameter '{}' must be a number, got '{}'",
            name, value
        ))
    })
}
