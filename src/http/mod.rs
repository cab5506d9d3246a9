//! HTTP server abstraction.
//!
//! Handlers never see the transport. They operate on the [`HttpRequest`] and
//! [`HttpResponse`] contracts, and a concrete [`HttpServer`] implementation
//! adapts its native connection objects to those contracts before calling
//! [`dispatch`]. Implementations are selected at startup by name through the
//! [`ServerBuilderRegistry`].

pub mod axum_server;
pub mod dispatch;
pub mod request;
pub mod response;
pub mod server;

pub use axum_server::AxumServer;
pub use dispatch::{dispatch, Dispatcher};
pub use request::{expand_query_string, HttpRequest, OwnedRequest};
pub use response::{BufferedResponse, HttpResponse};
pub use server::{HttpServer, ServerBuilder, ServerBuilderRegistry};
