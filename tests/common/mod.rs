//! Common test utilities for geows.
//!
//! This module provides shared utilities for testing the geows server.

pub mod http_client;
pub mod test_data;
