//! Error taxonomy for the batch engine
//!
//! Every per-item failure resolves into a Sub-Response through [`Error::status_code`] and
//! [`Error::response_body`]. Only the fatal variants (`InvalidBatch`, `Transaction`, `Timeout`)
//! escape [`crate::BatchExecutor::run`].

use std::time::Duration;

use serde_json::json;
use thiserror::Error;

use crate::handler::DomainError;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Resource with method {method} and relativeUrl {relative_url} doesn't exist")]
    RouteNotImplemented { method: String, relative_url: String },

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("The referenced JSON path is invalid: {0}")]
    InvalidReference(String),

    #[error("Parent request with id {parent_id} was erroneous!")]
    DependencyFailed { parent_id: i64 },

    #[error("Handler error ({}): {}", .0.status, .0.body)]
    Handler(DomainError),

    #[error("Transaction aborted at request {request_id}")]
    TransactionAborted { request_id: i64 },

    #[error("Invalid batch: {0}")]
    InvalidBatch(String),

    #[error("Ambiguous routes: {0}")]
    AmbiguousRoutes(String),

    #[error("Invalid route: {0}")]
    InvalidRoute(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Batch did not complete within {0:?}")]
    Timeout(Duration),
}

impl Error {
    /// HTTP status carried by the Sub-Response (or the outer call for fatal errors).
    pub fn status_code(&self) -> u16 {
        match self {
            Error::RouteNotImplemented { .. } => 501,
            Error::MalformedRequest(_) | Error::InvalidReference(_) | Error::InvalidBatch(_) => 400,
            Error::DependencyFailed { .. } => 409,
            Error::Handler(e) => e.status,
            Error::Timeout(_) => 504,
            Error::TransactionAborted { .. }
            | Error::AmbiguousRoutes(_)
            | Error::InvalidRoute(_)
            | Error::Transaction(_) => 500,
        }
    }

    /// Body carried by the Sub-Response for this error.
    ///
    /// Handler errors are forwarded verbatim and a missing route yields the fixed diagnostic
    /// string. Everything else is wrapped in the JSON error envelope.
    pub fn response_body(&self) -> String {
        match self {
            Error::Handler(e) => e.body.clone(),
            Error::RouteNotImplemented { .. } => self.to_string(),
            other => error_body(other.status_code(), &other.to_string()),
        }
    }

    /// True for errors that abort the whole call instead of a single item.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::InvalidBatch(_) | Error::Transaction(_) | Error::Timeout(_)
        )
    }
}

/// Build the JSON error envelope used for engine-generated error bodies.
pub fn error_body(status: u16, message: &str) -> String {
    json!({
        "httpStatusCode": status.to_string(),
        "developerMessage": message,
        "defaultUserMessage": message,
        "errors": []
    })
    .to_string()
}
