//! Error types for tabular-cdk
//!
//! This module defines the error hierarchy for the whole kit.
//! All public APIs return `Result<T, Error>` where Error is defined here.
//! Every error also classifies itself into a [`FailureKind`], which is what
//! retry policies filter on.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification of a failure, used to decide whether it is retryable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Malformed or incomplete configuration
    Config,
    /// Could not reach or open the datastore
    Connection,
    /// The datastore did not answer in time
    Timeout,
    /// The datastore rejected or failed the query
    Query,
    /// The datastore answered with something we could not decode
    Decode,
    /// Transport-level HTTP failure or a retryable HTTP status
    Http,
    /// A referenced database, collection or table does not exist
    NotFound,
    /// Local I/O failure
    Io,
    /// Anything else
    Other,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureKind::Config => "config",
            FailureKind::Connection => "connection",
            FailureKind::Timeout => "timeout",
            FailureKind::Query => "query",
            FailureKind::Decode => "decode",
            FailureKind::Http => "http",
            FailureKind::NotFound => "not_found",
            FailureKind::Io => "io",
            FailureKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// Anything that can tell which [`FailureKind`] it belongs to
pub trait Classify {
    /// The failure kind of this error
    fn failure_kind(&self) -> FailureKind;
}

/// The main error type for tabular-cdk
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Missing required config field: {field}")]
    MissingConfigField { field: String },

    #[error("Invalid config value for '{field}': {message}")]
    InvalidConfigValue { field: String, message: String },

    #[error("Invalid {model}: {message}")]
    Validation { model: String, message: String },

    #[error("{connector} has no '{attribute}' declaration")]
    MissingDeclaration {
        connector: String,
        attribute: String,
    },

    #[error("Unknown connector type '{connector_type}'")]
    UnknownConnectorType { connector_type: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // Retrieval Errors
    // ============================================================================
    #[error("Connection to '{target}' failed: {message}")]
    Connection { target: String, message: String },

    #[error("Request to '{target}' timed out after {timeout_ms}ms")]
    Timeout { target: String, timeout_ms: u64 },

    #[error("Query on '{target}' failed: {message}")]
    Query { target: String, message: String },

    #[error("Failed to decode response: {message}")]
    Decode { message: String },

    #[error("{kind} {name:?} doesn't exist")]
    NotFound { kind: String, name: String },

    // ============================================================================
    // HTTP Errors
    // ============================================================================
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ============================================================================
    // Datastore client Errors
    // ============================================================================
    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    // ============================================================================
    // Expression & Template Errors
    // ============================================================================
    #[error("Invalid filter expression {expression:?}: {message}")]
    Filter { expression: String, message: String },

    #[error("Undefined variable in template: {variable}")]
    UndefinedVariable { variable: String },

    // ============================================================================
    // Arrow/Parquet Errors
    // ============================================================================
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Output error: {message}")]
    Output { message: String },

    // ============================================================================
    // I/O Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a missing field error
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingConfigField {
            field: field.into(),
        }
    }

    /// Create a validation error for the given model
    pub fn validation(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            model: model.into(),
            message: message.into(),
        }
    }

    /// Create a connection error
    pub fn connection(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Create a query error
    pub fn query(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Query {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(target: impl Into<String>, timeout: std::time::Duration) -> Self {
        Self::Timeout {
            target: target.into(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    /// Create a decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create an unknown-target error (e.g. `not_found("Collection", "users")`)
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create an HTTP status error
    pub fn http_status(status: u16, body: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            body: body.into(),
        }
    }

    /// Create a filter expression error
    pub fn filter(expression: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Filter {
            expression: expression.into(),
            message: message.into(),
        }
    }

    /// Create an undefined variable error
    pub fn undefined_var(variable: impl Into<String>) -> Self {
        Self::UndefinedVariable {
            variable: variable.into(),
        }
    }

    /// Create an output error
    pub fn output(message: impl Into<String>) -> Self {
        Self::Output {
            message: message.into(),
        }
    }

    /// Classify this error
    pub fn kind(&self) -> FailureKind {
        match self {
            Error::Config { .. }
            | Error::MissingConfigField { .. }
            | Error::InvalidConfigValue { .. }
            | Error::Validation { .. }
            | Error::MissingDeclaration { .. }
            | Error::UnknownConnectorType { .. }
            | Error::YamlParse(_)
            | Error::InvalidUrl(_)
            | Error::Filter { .. }
            | Error::UndefinedVariable { .. } => FailureKind::Config,
            Error::Connection { .. } => FailureKind::Connection,
            Error::Timeout { .. } => FailureKind::Timeout,
            Error::Query { .. } | Error::DuckDb(_) => FailureKind::Query,
            Error::Decode { .. } | Error::JsonParse(_) => FailureKind::Decode,
            Error::NotFound { .. } | Error::FileNotFound { .. } => FailureKind::NotFound,
            Error::Http(e) => {
                if e.is_timeout() {
                    FailureKind::Timeout
                } else if e.is_connect() {
                    FailureKind::Connection
                } else {
                    FailureKind::Http
                }
            }
            Error::HttpStatus { status, .. } => {
                if is_retryable_status(*status) {
                    FailureKind::Http
                } else {
                    FailureKind::Query
                }
            }
            Error::Mongo(e) => mongo_failure_kind(e),
            Error::Io(_) => FailureKind::Io,
            Error::Arrow(_) | Error::Parquet(_) | Error::Output { .. } => FailureKind::Other,
            Error::Other(_) => FailureKind::Other,
        }
    }
}

impl Classify for Error {
    fn failure_kind(&self) -> FailureKind {
        self.kind()
    }
}

/// Map MongoDB driver errors onto our failure kinds
fn mongo_failure_kind(error: &mongodb::error::Error) -> FailureKind {
    use mongodb::error::ErrorKind;

    match error.kind.as_ref() {
        ErrorKind::ServerSelection { .. } | ErrorKind::Io(_) => FailureKind::Connection,
        ErrorKind::InvalidArgument { .. } => FailureKind::Config,
        _ => FailureKind::Query,
    }
}

/// Check if an HTTP status code is retryable
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// Result type alias for tabular-cdk
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", message.into(), inner))
        })
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", f(), inner))
        })
    }
}
