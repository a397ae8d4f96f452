//! Error types and result types for persistence operations.
//!
//! Every fallible operation in the workspace returns [`PersistenceResult<T>`].
//! Errors are grouped by category rather than by origin: configuration problems,
//! connection problems, invalid component state, document conversion problems,
//! and failures passed through from the underlying driver.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Boxed error used to carry driver causes without tying the core crate to a driver.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Represents all possible errors that can occur in persistence components.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Required configuration is missing or malformed.
    ///
    /// Codes used by this workspace: `NO_CONNECTION`, `NO_HOST`, `NO_PORT`,
    /// `NO_DATABASE`, `NO_COLLECTION`, `CANNOT_RESOLVE`, `BAD_DESCRIPTOR`.
    #[error("Configuration error [{code}]: {message}")]
    Config {
        code: String,
        message: String,
        correlation_id: Option<String>,
    },
    /// Establishing, using or tearing down a connection failed.
    ///
    /// Codes used by this workspace: `CONNECT_FAILED`, `DISCONNECT_FAILED`,
    /// `CREATE_IDX_FAILED`, `CLEAR_FAILED`.
    #[error("Connection error [{code}]: {message}")]
    Connection {
        code: String,
        message: String,
        correlation_id: Option<String>,
        #[source]
        cause: Option<BoxError>,
    },
    /// The component is not in a state that allows the requested operation.
    #[error("Invalid state [{code}]: {message}")]
    InvalidState {
        code: String,
        message: String,
        correlation_id: Option<String>,
    },
    /// Serialization/deserialization error when converting between document formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// The document has an invalid structure for the requested operation.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// Any other failure reported by the underlying driver, passed through as-is.
    #[error("Driver error: {0}")]
    Driver(#[source] BoxError),
}

/// A specialized `Result` type for persistence operations.
pub type PersistenceResult<T> = Result<T, PersistenceError>;

impl PersistenceError {
    /// Creates a configuration error.
    pub fn config(correlation_id: Option<&str>, code: &str, message: impl Into<String>) -> Self {
        PersistenceError::Config {
            code: code.to_string(),
            message: message.into(),
            correlation_id: correlation_id.map(str::to_string),
        }
    }

    /// Creates a connection error without a cause. Attach one with [`with_cause`](Self::with_cause).
    pub fn connection(correlation_id: Option<&str>, code: &str, message: impl Into<String>) -> Self {
        PersistenceError::Connection {
            code: code.to_string(),
            message: message.into(),
            correlation_id: correlation_id.map(str::to_string),
            cause: None,
        }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(correlation_id: Option<&str>, code: &str, message: impl Into<String>) -> Self {
        PersistenceError::InvalidState {
            code: code.to_string(),
            message: message.into(),
            correlation_id: correlation_id.map(str::to_string),
        }
    }

    /// Wraps a driver error so it reaches the caller unchanged.
    pub fn driver(err: impl Into<BoxError>) -> Self {
        PersistenceError::Driver(err.into())
    }

    /// Attaches an underlying cause. Only connection errors carry a cause;
    /// other variants are returned unchanged.
    pub fn with_cause(self, err: impl Into<BoxError>) -> Self {
        match self {
            PersistenceError::Connection { code, message, correlation_id, .. } => {
                PersistenceError::Connection {
                    code,
                    message,
                    correlation_id,
                    cause: Some(err.into()),
                }
            }
            other => other,
        }
    }

    /// Returns the error code for categorized errors.
    pub fn code(&self) -> Option<&str> {
        match self {
            PersistenceError::Config { code, .. }
            | PersistenceError::Connection { code, .. }
            | PersistenceError::InvalidState { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Returns the correlation id the error was raised under, if any.
    pub fn correlation_id(&self) -> Option<&str> {
        match self {
            PersistenceError::Config { correlation_id, .. }
            | PersistenceError::Connection { correlation_id, .. }
            | PersistenceError::InvalidState { correlation_id, .. } => correlation_id.as_deref(),
            _ => None,
        }
    }
}

impl From<BsonError> for PersistenceError {
    fn from(err: BsonError) -> Self {
        PersistenceError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for PersistenceError {
    fn from(err: SerdeJsonError) -> Self {
        PersistenceError::Serialization(err.to_string())
    }
}
