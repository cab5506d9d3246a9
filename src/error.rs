//! Error types for the geows application.
//!
//! Every failure in the host maps onto one [`GeowsError`] variant. Callers that
//! need to branch on the failure class use [`GeowsError::kind`] instead of
//! matching on message text.

use thiserror::Error;

/// The main error type for geows operations.
#[derive(Error, Debug)]
pub enum GeowsError {
    /// A service with the same name is already registered
    #[error("Duplicate service: {name}")]
    DuplicateService { name: String },

    /// An operation id is already registered
    #[error("Duplicate operation: {id}")]
    DuplicateOperation { id: String },

    /// An HTTP server builder id is already registered
    #[error("Duplicate HTTP server builder: {id}")]
    DuplicateBuilder { id: String },

    /// A geo-array with the same name is already registered
    #[error("Duplicate array: {name}")]
    DuplicateArray { name: String },

    /// A timeline for the array is already registered
    #[error("Duplicate timeline for array: {name}")]
    DuplicateTimeline { name: String },

    /// Registry or index miss
    #[error("Not found: {message}")]
    NotFound { message: String },

    /// Timeline position or label miss
    #[error("Out of bounds: {message}")]
    OutOfBounds { message: String },

    /// Malformed configuration document or query string
    #[error("Parse error: {message}")]
    Parse { message: String },

    /// Configuration source does not exist
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    /// Configuration source exists but cannot be read
    #[error("Could not open file {path}: {message}")]
    FileOpen { path: String, message: String },

    /// Opening a backend connection failed
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// A query sent through a borrowed connection failed
    #[error("Query execution error: {message}")]
    QueryExecution { message: String },

    /// Handler-level error surfaced to the HTTP client
    #[error("{message}")]
    Request { message: String },

    /// No builder is registered under the requested id
    #[error("Could not build HTTP server: {id}")]
    BuildFailed { id: String },

    /// The response body was already written
    #[error("Response content already set")]
    ContentAlreadySet,

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Server errors
    #[error("Server error: {message}")]
    Server { message: String },

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Machine-readable classification of a [`GeowsError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    DuplicateService,
    DuplicateOperation,
    DuplicateBuilder,
    DuplicateArray,
    DuplicateTimeline,
    NotFound,
    OutOfBounds,
    ParseError,
    FileNotFound,
    FileOpenError,
    ConnectionError,
    QueryExecutionError,
    RequestError,
    BuildFailed,
    ContentAlreadySet,
    Config,
    Server,
}

impl GeowsError {
    /// Returns the error classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GeowsError::DuplicateService { .. } => ErrorKind::DuplicateService,
            GeowsError::DuplicateOperation { .. } => ErrorKind::DuplicateOperation,
            GeowsError::DuplicateBuilder { .. } => ErrorKind::DuplicateBuilder,
            GeowsError::DuplicateArray { .. } => ErrorKind::DuplicateArray,
            GeowsError::DuplicateTimeline { .. } => ErrorKind::DuplicateTimeline,
            GeowsError::NotFound { .. } => ErrorKind::NotFound,
            GeowsError::OutOfBounds { .. } => ErrorKind::OutOfBounds,
            GeowsError::Parse { .. } | GeowsError::Json(_) => ErrorKind::ParseError,
            GeowsError::FileNotFound { .. } => ErrorKind::FileNotFound,
            GeowsError::FileOpen { .. } => ErrorKind::FileOpenError,
            GeowsError::Connection { .. } => ErrorKind::ConnectionError,
            GeowsError::QueryExecution { .. } => ErrorKind::QueryExecutionError,
            GeowsError::Request { .. } => ErrorKind::RequestError,
            GeowsError::BuildFailed { .. } => ErrorKind::BuildFailed,
            GeowsError::ContentAlreadySet => ErrorKind::ContentAlreadySet,
            GeowsError::Config { .. } => ErrorKind::Config,
            GeowsError::Server { .. } => ErrorKind::Server,
        }
    }

    /// Shorthand for a handler-level request error.
    pub fn request(message: impl Into<String>) -> Self {
        GeowsError::Request {
            message: message.into(),
        }
    }

    /// Shorthand for a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        GeowsError::Parse {
            message: message.into(),
        }
    }

    /// Shorthand for a registry miss.
    pub fn not_found(message: impl Into<String>) -> Self {
        GeowsError::NotFound {
            message: message.into(),
        }
    }

    /// Shorthand for a position/label miss.
    pub fn out_of_bounds(message: impl Into<String>) -> Self {
        GeowsError::OutOfBounds {
            message: message.into(),
        }
    }
}

/// Convenience type alias for Results with GeowsError
pub type Result<T> = std::result::Result<T, GeowsError>;
