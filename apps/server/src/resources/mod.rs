//! Reference Resource Handlers over the in-memory store
//!
//! Just enough lending bookkeeping to exercise every route of the catalog end to end: documents
//! are created, read and moved through their lifecycle states, and responses carry the usual
//! command-result shape (`resourceId`, `clientId`, `loanId`, `subResourceId`, `changes`).

pub mod clients;
pub mod datatables;
pub mod loan_charges;
pub mod loan_transactions;
pub mod loans;
pub mod reschedules;
pub mod savings;

use std::fmt::Display;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use portico_batch::{DomainError, HandlerInvocation, HandlerSet, ResourceFamily};

use crate::store::MemoryStore;

pub(crate) const CLIENTS: &str = "clients";
pub(crate) const LOANS: &str = "loans";
pub(crate) const LOAN_CHARGES: &str = "loan_charges";
pub(crate) const LOAN_TRANSACTIONS: &str = "loan_transactions";
pub(crate) const RESCHEDULES: &str = "loan_reschedules";
pub(crate) const SAVINGS: &str = "savings_accounts";
pub(crate) const SAVINGS_TRANSACTIONS: &str = "savings_transactions";

/// Bind one handler per resource family, all sharing `store`.
pub fn handler_set(store: &MemoryStore) -> HandlerSet {
    let mut handlers = HandlerSet::new();
    handlers
        .insert_family(
            ResourceFamily::Clients,
            Arc::new(clients::ClientsHandler::new(store.clone())),
        )
        .insert_family(
            ResourceFamily::Loans,
            Arc::new(loans::LoansHandler::new(store.clone())),
        )
        .insert_family(
            ResourceFamily::LoanCharges,
            Arc::new(loan_charges::LoanChargesHandler::new(store.clone())),
        )
        .insert_family(
            ResourceFamily::LoanTransactions,
            Arc::new(loan_transactions::LoanTransactionsHandler::new(store.clone())),
        )
        .insert_family(
            ResourceFamily::LoanReschedules,
            Arc::new(reschedules::ReschedulesHandler::new(store.clone())),
        )
        .insert_family(
            ResourceFamily::SavingsAccounts,
            Arc::new(savings::SavingsHandler::new(store.clone())),
        )
        .insert_family(
            ResourceFamily::Datatables,
            Arc::new(datatables::DatatablesHandler::new(store.clone())),
        );
    handlers
}

/// Body of a successful write command.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CommandResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    resource_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    resource_external_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    loan_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    savings_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sub_resource_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sub_resource_external_id: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    changes: Map<String, JsonValue>,
}

impl CommandResult {
    pub(crate) fn resource(id: i64) -> Self {
        Self {
            resource_id: Some(id),
            ..Self::default()
        }
    }

    pub(crate) fn external_id(mut self, external_id: Option<String>) -> Self {
        self.resource_external_id = external_id;
        self
    }

    pub(crate) fn client(mut self, client_id: Option<i64>) -> Self {
        self.client_id = client_id;
        self
    }

    pub(crate) fn loan(mut self, loan_id: i64) -> Self {
        self.loan_id = Some(loan_id);
        self
    }

    pub(crate) fn savings(mut self, savings_id: i64) -> Self {
        self.savings_id = Some(savings_id);
        self
    }

    pub(crate) fn sub_resource(mut self, id: i64, external_id: Option<String>) -> Self {
        self.sub_resource_id = Some(id);
        self.sub_resource_external_id = external_id;
        self
    }

    pub(crate) fn change(mut self, key: &str, value: impl Into<JsonValue>) -> Self {
        self.changes.insert(key.to_string(), value.into());
        self
    }

    pub(crate) fn changes(mut self, changes: Map<String, JsonValue>) -> Self {
        self.changes.extend(changes);
        self
    }

    pub(crate) fn into_body(self) -> Result<String, DomainError> {
        serde_json::to_string(&self).map_err(|e| DomainError::internal(e.to_string()))
    }
}

/// Request body as a JSON object; an empty body reads as `{}`.
pub(crate) fn body_object(invocation: &HandlerInvocation) -> Result<Map<String, JsonValue>, DomainError> {
    match invocation.json_body()? {
        JsonValue::Object(map) => Ok(map),
        _ => Err(DomainError::bad_request("Request body must be a JSON object")),
    }
}

pub(crate) fn render(document: &JsonValue) -> String {
    document.to_string()
}

pub(crate) fn not_found(entity: &str, id: impl Display) -> DomainError {
    DomainError::not_found(format!("{entity} with identifier {id} does not exist"))
}

/// A lifecycle command that the document's current status does not allow.
pub(crate) fn invalid_state(entity: &str, id: i64, action: &str, status: &str) -> DomainError {
    DomainError::forbidden(format!(
        "Cannot {action} {entity} {id} while it is {status}"
    ))
}

/// `(command, allowed current statuses, next status)`
pub(crate) type Transition = (&'static str, &'static [&'static str], &'static str);

/// Move a document through the lifecycle step named by `command`. Returns the new status.
pub(crate) fn apply_transition(
    document: &mut JsonValue,
    entity: &str,
    id: i64,
    command: Option<&str>,
    transitions: &[Transition],
) -> Result<&'static str, DomainError> {
    let command = command.unwrap_or_default();
    let (_, from, to) = transitions
        .iter()
        .find(|(name, _, _)| *name == command)
        .ok_or_else(|| {
            DomainError::bad_request(format!("Unrecognized {entity} command '{command}'"))
        })?;

    let current = status_of(document).to_string();
    if !from.contains(&current.as_str()) {
        return Err(invalid_state(entity, id, command, &current));
    }
    set_field(document, "status", *to);
    Ok(*to)
}

pub(crate) fn today() -> String {
    chrono::Utc::now().date_naive().to_string()
}

pub(crate) fn status_of(document: &JsonValue) -> &str {
    document
        .get("status")
        .and_then(JsonValue::as_str)
        .unwrap_or("unknown")
}

pub(crate) fn set_field(document: &mut JsonValue, key: &str, value: impl Into<JsonValue>) {
    if let Some(object) = document.as_object_mut() {
        object.insert(key.to_string(), value.into());
    }
}

pub(crate) fn i64_field(document: &JsonValue, key: &str) -> Option<i64> {
    match document.get(key)? {
        JsonValue::Number(n) => n.as_i64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn f64_field(document: &JsonValue, key: &str) -> Option<f64> {
    match document.get(key)? {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn str_field(document: &JsonValue, key: &str) -> Option<String> {
    document
        .get(key)
        .and_then(JsonValue::as_str)
        .map(str::to_string)
}

pub(crate) fn required_i64(body: &Map<String, JsonValue>, key: &str) -> Result<i64, DomainError> {
    let value = JsonValue::Object(body.clone());
    i64_field(&value, key)
        .ok_or_else(|| DomainError::bad_request(format!("The parameter `{key}` is mandatory")))
}

/// A positive amount, given as a number or numeric string.
pub(crate) fn required_amount(body: &Map<String, JsonValue>, key: &str) -> Result<f64, DomainError> {
    let value = JsonValue::Object(body.clone());
    match f64_field(&value, key) {
        Some(amount) if amount > 0.0 => Ok(amount),
        Some(_) => Err(DomainError::bad_request(format!(
            "The parameter `{key}` must be greater than zero"
        ))),
        None => Err(DomainError::bad_request(format!(
            "The parameter `{key}` is mandatory"
        ))),
    }
}

/// Copy body fields onto a document, skipping `protected` keys. Returns what was written.
pub(crate) fn apply_changes(
    document: &mut JsonValue,
    body: &Map<String, JsonValue>,
    protected: &[&str],
) -> Map<String, JsonValue> {
    let mut changes = Map::new();
    if let Some(object) = document.as_object_mut() {
        for (key, value) in body {
            if protected.contains(&key.as_str()) || object.get(key) == Some(value) {
                continue;
            }
            object.insert(key.clone(), value.clone());
            changes.insert(key.clone(), value.clone());
        }
    }
    changes
}

pub(crate) fn path_id(invocation: &HandlerInvocation, name: &str) -> Result<i64, DomainError> {
    invocation
        .path
        .id(name)
        .ok_or_else(|| DomainError::internal(format!("missing path parameter {name}")))
}

pub(crate) fn path_external_id<'a>(
    invocation: &'a HandlerInvocation,
    name: &str,
) -> Result<&'a str, DomainError> {
    invocation
        .path
        .external_id(name)
        .ok_or_else(|| DomainError::internal(format!("missing path parameter {name}")))
}

pub(crate) fn unsupported(invocation: &HandlerInvocation) -> DomainError {
    DomainError::internal(format!(
        "{} is not served by this handler",
        invocation.operation
    ))
}
