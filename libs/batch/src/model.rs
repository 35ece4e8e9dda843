//! Batch data model: Sub-Requests, Sub-Responses and batch-level results

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

/// A single header entry. Headers keep submission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// One item of a batch call.
///
/// `request_id` is the correlation key and is opaque to routing. `reference` optionally names
/// an earlier Sub-Request whose response feeds `$.` tokens in this one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubRequest {
    pub request_id: i64,
    pub method: String,
    pub relative_url: String,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<i64>,
}

impl SubRequest {
    pub fn new(request_id: i64, method: impl Into<String>, relative_url: impl Into<String>) -> Self {
        Self {
            request_id,
            method: method.into(),
            relative_url: relative_url.into(),
            headers: Vec::new(),
            body: String::new(),
            reference: None,
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(Header::new(name, value));
        self
    }

    pub fn with_reference(mut self, reference: i64) -> Self {
        self.reference = Some(reference);
        self
    }
}

/// One item of a batch result; `request_id` always echoes the originating Sub-Request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubResponse {
    pub request_id: i64,
    pub status_code: u16,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub body: String,
}

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

impl SubResponse {
    pub fn ok(request_id: i64, body: String) -> Self {
        Self {
            request_id,
            status_code: 200,
            headers: vec![Header::new("Content-Type", JSON_CONTENT_TYPE)],
            body,
        }
    }

    pub fn from_error(request_id: i64, error: &Error) -> Self {
        let content_type = match error {
            Error::RouteNotImplemented { .. } => "text/plain; charset=utf-8",
            _ => JSON_CONTENT_TYPE,
        };
        Self {
            request_id,
            status_code: error.status_code(),
            headers: vec![Header::new("Content-Type", content_type)],
            body: error.response_body(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }
}

/// HTTP methods a Sub-Request may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
}

impl Method {
    pub const ALL: [Method; 6] = [
        Method::Get,
        Method::Post,
        Method::Put,
        Method::Delete,
        Method::Patch,
        Method::Head,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Head => "HEAD",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "PATCH" => Ok(Method::Patch),
            "HEAD" => Ok(Method::Head),
            _ => Err(()),
        }
    }
}

/// Failure model chosen once per batch call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Each item runs on its own; failures never stop later items.
    #[default]
    Independent,
    /// All items share one transaction; the first failure rolls everything back.
    EnclosingTransaction,
}

impl ExecutionMode {
    pub fn from_flag(enclosing_transaction: bool) -> Self {
        if enclosing_transaction {
            ExecutionMode::EnclosingTransaction
        } else {
            ExecutionMode::Independent
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Independent => "independent",
            ExecutionMode::EnclosingTransaction => "transaction",
        }
    }
}

/// What happened to the enclosing transaction, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionOutcome {
    NotRequested,
    Committed,
    RolledBack { failed_request_id: i64 },
}

impl TransactionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionOutcome::NotRequested => "none",
            TransactionOutcome::Committed => "committed",
            TransactionOutcome::RolledBack { .. } => "rolled-back",
        }
    }
}

/// Ordered Sub-Responses of one batch call.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult {
    pub responses: Vec<SubResponse>,
    pub transaction: TransactionOutcome,
}

impl BatchResult {
    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }

    pub fn into_responses(self) -> Vec<SubResponse> {
        self.responses
    }
}

/// Correlation token for one batch call, handed to the transaction boundary and to every
/// handler invocation of the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BatchContext {
    pub batch_id: Uuid,
}

impl BatchContext {
    pub fn new() -> Self {
        Self {
            batch_id: Uuid::new_v4(),
        }
    }
}

impl Default for BatchContext {
    fn default() -> Self {
        Self::new()
    }
}
