//! Error types for the sauna dashboard

use std::time::Duration;

use crate::snapshot::{Field, FieldValue};

/// Failures of a single round trip to the controller.
///
/// Produced only at the [`RemoteStateClient`](crate::client::RemoteStateClient)
/// boundary; nothing below it is allowed to panic or leak a raw
/// `reqwest::Error`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Controller rejected command: {0}")]
    Rejected(String),
}

/// A user intent that failed local checks and was never transmitted.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} = {value} is out of range [{min}, {max}]")]
    OutOfRange {
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("{field} expects a {expected} value")]
    WrongType {
        field: String,
        expected: &'static str,
    },

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Field is read-only: {0}")]
    ReadOnly(String),

    #[error("Nothing to update")]
    Empty,

    #[error("Inconsistent settings: {0}")]
    Inconsistent(String),
}

/// A pending edit that the server never confirmed within the edit timeout.
///
/// Not fatal: the view simply reverts to the latest snapshot value.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Edit of {field} to {value} unconfirmed after {age:?}")]
pub struct ReconciliationTimeout {
    pub field: Field,
    pub value: FieldValue,
    pub age: Duration,
}

/// Errors that can occur in the sauna dashboard
#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for dashboard operations
pub type Result<T> = std::result::Result<T, DashboardError>;
