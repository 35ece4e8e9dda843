//! Resource Handler contract
//!
//! Resource Handlers are the capability units the engine dispatches to. They are identified by
//! `(Method, ResourceFamily)`, receive typed path captures plus the untouched query, headers and
//! body, and answer with a body string or a [`DomainError`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::catalog::Operation;
use crate::error::error_body;
use crate::model::{BatchContext, Header, Method};
use crate::url::QueryParams;

/// Resource family a route belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceFamily {
    Clients,
    Loans,
    LoanCharges,
    LoanTransactions,
    LoanReschedules,
    SavingsAccounts,
    Datatables,
}

impl ResourceFamily {
    pub const ALL: [ResourceFamily; 7] = [
        ResourceFamily::Clients,
        ResourceFamily::Loans,
        ResourceFamily::LoanCharges,
        ResourceFamily::LoanTransactions,
        ResourceFamily::LoanReschedules,
        ResourceFamily::SavingsAccounts,
        ResourceFamily::Datatables,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceFamily::Clients => "clients",
            ResourceFamily::Loans => "loans",
            ResourceFamily::LoanCharges => "loan-charges",
            ResourceFamily::LoanTransactions => "loan-transactions",
            ResourceFamily::LoanReschedules => "loan-reschedules",
            ResourceFamily::SavingsAccounts => "savings-accounts",
            ResourceFamily::Datatables => "datatables",
        }
    }
}

impl fmt::Display for ResourceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error raised by a Resource Handler. Status and body reach the Sub-Response unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainError {
    pub status: u16,
    pub body: String,
}

impl DomainError {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Domain error carrying the standard JSON error envelope.
    pub fn with_message(status: u16, message: impl AsRef<str>) -> Self {
        Self::new(status, error_body(status, message.as_ref()))
    }

    pub fn bad_request(message: impl AsRef<str>) -> Self {
        Self::with_message(400, message)
    }

    pub fn forbidden(message: impl AsRef<str>) -> Self {
        Self::with_message(403, message)
    }

    pub fn not_found(message: impl AsRef<str>) -> Self {
        Self::with_message(404, message)
    }

    pub fn conflict(message: impl AsRef<str>) -> Self {
        Self::with_message(409, message)
    }

    pub fn internal(message: impl AsRef<str>) -> Self {
        Self::with_message(500, message)
    }
}

impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status, self.body)
    }
}

impl std::error::Error for DomainError {}

/// Typed path capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathValue {
    Id(i64),
    ExternalId(String),
    Token(String),
    Rest(Vec<String>),
}

/// Typed path captures, in pattern order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathArgs {
    values: Vec<(&'static str, PathValue)>,
}

impl PathArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: &'static str, value: PathValue) {
        self.values.push((name, value));
    }

    pub fn get(&self, name: &str) -> Option<&PathValue> {
        self.values
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
    }

    pub fn id(&self, name: &str) -> Option<i64> {
        match self.get(name) {
            Some(PathValue::Id(id)) => Some(*id),
            _ => None,
        }
    }

    pub fn external_id(&self, name: &str) -> Option<&str> {
        match self.get(name) {
            Some(PathValue::ExternalId(v)) => Some(v),
            _ => None,
        }
    }

    pub fn token(&self, name: &str) -> Option<&str> {
        match self.get(name) {
            Some(PathValue::Token(v)) => Some(v),
            _ => None,
        }
    }

    pub fn rest(&self, name: &str) -> Option<&[String]> {
        match self.get(name) {
            Some(PathValue::Rest(v)) => Some(v),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &PathValue)> {
        self.values.iter().map(|(n, v)| (*n, v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Everything a handler receives for one Sub-Request.
#[derive(Debug, Clone)]
pub struct HandlerInvocation {
    pub batch: BatchContext,
    pub request_id: i64,
    pub operation: Operation,
    pub method: Method,
    pub path: PathArgs,
    pub query: QueryParams,
    pub command: Option<String>,
    pub headers: Vec<Header>,
    pub body: String,
}

impl HandlerInvocation {
    /// Parse the body as JSON. An empty body reads as an empty object.
    pub fn json_body(&self) -> Result<serde_json::Value, DomainError> {
        if self.body.trim().is_empty() {
            return Ok(serde_json::Value::Object(Default::default()));
        }
        serde_json::from_str(&self.body)
            .map_err(|e| DomainError::bad_request(format!("Invalid JSON body: {e}")))
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}

#[async_trait]
pub trait ResourceHandler: Send + Sync {
    async fn handle(&self, invocation: HandlerInvocation) -> Result<String, DomainError>;
}

/// Handlers keyed by `(Method, ResourceFamily)`.
#[derive(Clone, Default)]
pub struct HandlerSet {
    handlers: HashMap<(Method, ResourceFamily), Arc<dyn ResourceHandler>>,
}

impl HandlerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        method: Method,
        family: ResourceFamily,
        handler: Arc<dyn ResourceHandler>,
    ) -> &mut Self {
        self.handlers.insert((method, family), handler);
        self
    }

    /// Bind one handler to every method of a family.
    pub fn insert_family(
        &mut self,
        family: ResourceFamily,
        handler: Arc<dyn ResourceHandler>,
    ) -> &mut Self {
        for method in Method::ALL {
            self.handlers.insert((method, family), handler.clone());
        }
        self
    }

    pub fn get(&self, method: Method, family: ResourceFamily) -> Option<Arc<dyn ResourceHandler>> {
        self.handlers.get(&(method, family)).cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for HandlerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.handlers.keys().collect();
        keys.sort();
        f.debug_struct("HandlerSet").field("bound", &keys).finish()
    }
}
