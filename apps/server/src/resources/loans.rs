use async_trait::async_trait;
use serde_json::Value as JsonValue;

use portico_batch::{DomainError, HandlerInvocation, Operation, ResourceHandler};

use super::{
    apply_changes, apply_transition, body_object, f64_field, i64_field, invalid_state,
    not_found, path_external_id, render, required_amount, required_i64, set_field, status_of,
    str_field, today, unsupported, CommandResult, Transition, CLIENTS, LOANS,
};
use crate::store::{MemoryStore, Tables};

const TRANSITIONS: &[Transition] = &[
    ("approve", &["submitted"], "approved"),
    ("reject", &["submitted"], "rejected"),
    ("withdrawnByApplicant", &["submitted"], "withdrawn"),
    ("undoapproval", &["approved"], "submitted"),
    ("disburse", &["approved"], "active"),
    ("disburseToSavings", &["approved"], "active"),
    ("undodisbursal", &["active"], "approved"),
];

const PROTECTED: &[&str] = &["id", "status", "clientId", "externalId", "principalOutstanding"];

pub struct LoansHandler {
    store: MemoryStore,
}

impl LoansHandler {
    pub fn new(store: MemoryStore) -> Self {
        Self { store }
    }

    async fn apply(&self, invocation: &HandlerInvocation) -> Result<String, DomainError> {
        let body = body_object(invocation)?;
        let client_id = required_i64(&body, "clientId")?;
        required_amount(&body, "principal")?;
        let external_id = body
            .get("externalId")
            .and_then(JsonValue::as_str)
            .map(str::to_string);

        self.store
            .write(&invocation.batch, |tables| {
                if tables.get(CLIENTS, client_id).is_none() {
                    return Err(not_found("Client", client_id));
                }
                if let Some(ext) = &external_id {
                    if tables.find_by(LOANS, "externalId", ext).is_some() {
                        return Err(DomainError::forbidden(format!(
                            "Loan with externalId {ext} already exists"
                        )));
                    }
                }

                let mut document = JsonValue::Object(body);
                set_field(&mut document, "status", "submitted");
                set_field(&mut document, "submittedOnDate", today());
                let id = tables.insert(LOANS, document);

                CommandResult::resource(id)
                    .external_id(external_id)
                    .client(Some(client_id))
                    .loan(id)
                    .into_body()
            })
            .await
    }

    async fn modify(&self, invocation: &HandlerInvocation) -> Result<String, DomainError> {
        let body = body_object(invocation)?;

        self.store
            .write(&invocation.batch, |tables| {
                let id = loan_by_path(tables, invocation)?;
                let loan = tables.get_mut(LOANS, id).ok_or_else(|| not_found("Loan", id))?;
                let result = CommandResult::resource(id)
                    .external_id(str_field(loan, "externalId"))
                    .client(i64_field(loan, "clientId"))
                    .loan(id);

                // Fraud marking applies in any state; other modifications need a fresh application.
                if invocation.command.as_deref() == Some("markAsFraud") {
                    let fraud = fraud_flag(&body)?;
                    set_field(loan, "fraud", fraud);
                    return result.change("fraud", fraud).into_body();
                }

                let status = status_of(loan).to_string();
                if status != "submitted" {
                    return Err(invalid_state("loan", id, "modify", &status));
                }
                let changes = apply_changes(loan, &body, PROTECTED);
                result.changes(changes).into_body()
            })
            .await
    }

    async fn transition(&self, invocation: &HandlerInvocation) -> Result<String, DomainError> {
        let body = body_object(invocation)?;
        let command = invocation.command.as_deref().unwrap_or_default();

        self.store
            .write(&invocation.batch, |tables| {
                let id = loan_by_path(tables, invocation)?;
                let loan = tables.get_mut(LOANS, id).ok_or_else(|| not_found("Loan", id))?;
                let mut result = CommandResult::resource(id)
                    .external_id(str_field(loan, "externalId"))
                    .client(i64_field(loan, "clientId"))
                    .loan(id);

                match command {
                    "assignloanofficer" => {
                        let officer = required_i64(&body, "toLoanOfficerId")?;
                        set_field(loan, "loanOfficerId", officer);
                        result = result.change("loanOfficerId", officer);
                    }
                    "unassignloanofficer" => {
                        if let Some(object) = loan.as_object_mut() {
                            object.remove("loanOfficerId");
                        }
                        result = result.change("loanOfficerId", JsonValue::Null);
                    }
                    "recoverGuarantees" => {
                        let status = status_of(loan);
                        if status != "active" {
                            return Err(invalid_state("loan", id, command, status));
                        }
                        set_field(loan, "guaranteesRecoveredOnDate", today());
                        result = result.change("guaranteesRecoveredOnDate", today());
                    }
                    _ => {
                        let status = apply_transition(loan, "loan", id, Some(command), TRANSITIONS)?;
                        match status {
                            "active" => {
                                let principal = f64_field(loan, "principal").unwrap_or_default();
                                set_field(loan, "principalOutstanding", principal);
                                set_field(loan, "disbursedOnDate", today());
                            }
                            "approved" => {
                                if let Some(object) = loan.as_object_mut() {
                                    object.remove("principalOutstanding");
                                    object.remove("disbursedOnDate");
                                }
                            }
                            _ => {}
                        }
                        result = result.change("status", status);
                    }
                }
                result.into_body()
            })
            .await
    }
}

/// `fraud` accepts a JSON bool or its string spelling and defaults to true.
fn fraud_flag(body: &serde_json::Map<String, JsonValue>) -> Result<bool, DomainError> {
    match body.get("fraud") {
        None => Ok(true),
        Some(JsonValue::Bool(flag)) => Ok(*flag),
        Some(JsonValue::String(raw)) => match raw.trim() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(DomainError::bad_request(format!("fraud must be true or false, got '{other}'"))),
        },
        Some(other) => Err(DomainError::bad_request(format!("fraud must be true or false, got {other}"))),
    }
}

/// Loan id for either path form: numeric `loanId` or `loanExternalId`.
pub(crate) fn loan_by_path(
    tables: &Tables,
    invocation: &HandlerInvocation,
) -> Result<i64, DomainError> {
    if let Some(id) = invocation.path.id("loanId") {
        return tables
            .get(LOANS, id)
            .map(|_| id)
            .ok_or_else(|| not_found("Loan", id));
    }
    let ext = path_external_id(invocation, "loanExternalId")?;
    tables
        .find_by(LOANS, "externalId", ext)
        .map(|(id, _)| id)
        .ok_or_else(|| not_found("Loan", ext))
}

/// Require the loan to be disbursed and not yet closed.
pub(crate) fn require_active(tables: &Tables, loan_id: i64, action: &str) -> Result<(), DomainError> {
    let loan = tables
        .get(LOANS, loan_id)
        .ok_or_else(|| not_found("Loan", loan_id))?;
    match status_of(loan) {
        "active" => Ok(()),
        status => Err(invalid_state("loan", loan_id, action, status)),
    }
}

pub(crate) fn loan_client(tables: &Tables, loan_id: i64) -> Option<i64> {
    tables
        .get(LOANS, loan_id)
        .and_then(|loan| i64_field(loan, "clientId"))
}

#[async_trait]
impl ResourceHandler for LoansHandler {
    async fn handle(&self, invocation: HandlerInvocation) -> Result<String, DomainError> {
        match invocation.operation {
            Operation::ApplyLoan => self.apply(&invocation).await,
            Operation::GetLoanById | Operation::GetLoanByExternalId => {
                self.store
                    .read(&invocation.batch, |tables| {
                        let id = loan_by_path(tables, &invocation)?;
                        tables
                            .get(LOANS, id)
                            .map(render)
                            .ok_or_else(|| not_found("Loan", id))
                    })
                    .await
            }
            Operation::ModifyLoanApplication | Operation::ModifyLoanApplicationByExternalId => {
                self.modify(&invocation).await
            }
            Operation::LoanStateTransition | Operation::LoanStateTransitionByExternalId => {
                self.transition(&invocation).await
            }
            _ => Err(unsupported(&invocation)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portico_batch::{BatchContext, Method, PathArgs, PathValue, QueryParams};
    use serde_json::json;

    fn invocation(operation: Operation, path: PathArgs, command: Option<&str>, body: JsonValue) -> HandlerInvocation {
        HandlerInvocation {
            batch: BatchContext::new(),
            request_id: 1,
            operation,
            method: Method::Post,
            path,
            query: QueryParams::new(),
            command: command.map(str::to_string),
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    fn loan_path(id: i64) -> PathArgs {
        let mut path = PathArgs::new();
        path.push("loanId", PathValue::Id(id));
        path
    }

    async fn seeded() -> (MemoryStore, LoansHandler) {
        let store = MemoryStore::new();
        store
            .write(&BatchContext::new(), |t| t.insert(CLIENTS, json!({"status": "active"})))
            .await;
        let handler = LoansHandler::new(store.clone());
        handler
            .handle(invocation(
                Operation::ApplyLoan,
                PathArgs::new(),
                None,
                json!({"clientId": 1, "principal": 1000, "externalId": "L-1"}),
            ))
            .await
            .unwrap();
        (store, handler)
    }

    #[tokio::test]
    async fn disburse_requires_approval() {
        let (_, handler) = seeded().await;

        let err = handler
            .handle(invocation(Operation::LoanStateTransition, loan_path(1), Some("disburse"), json!({})))
            .await
            .unwrap_err();
        assert_eq!(err.status, 403);

        for command in ["approve", "disburse"] {
            handler
                .handle(invocation(Operation::LoanStateTransition, loan_path(1), Some(command), json!({})))
                .await
                .unwrap();
        }
        let loan: JsonValue = serde_json::from_str(
            &handler
                .handle(invocation(Operation::GetLoanById, loan_path(1), None, json!({})))
                .await
                .unwrap(),
        )
        .unwrap();
        assert_eq!(loan["status"], "active");
        assert_eq!(loan["principalOutstanding"], 1000.0);
    }

    #[tokio::test]
    async fn external_id_paths_find_the_loan() {
        let (_, handler) = seeded().await;
        let mut path = PathArgs::new();
        path.push("loanExternalId", PathValue::ExternalId("L-1".to_string()));

        let body = handler
            .handle(invocation(Operation::GetLoanByExternalId, path, None, json!({})))
            .await
            .unwrap();
        assert!(body.contains("\"externalId\":\"L-1\""));
    }

    #[tokio::test]
    async fn mark_as_fraud_applies_to_disbursed_loans() {
        let (_, handler) = seeded().await;
        for command in ["approve", "disburse"] {
            handler
                .handle(invocation(Operation::LoanStateTransition, loan_path(1), Some(command), json!({})))
                .await
                .unwrap();
        }

        let err = handler
            .handle(invocation(Operation::ModifyLoanApplication, loan_path(1), None, json!({"principal": 5})))
            .await
            .unwrap_err();
        assert_eq!(err.status, 403);

        let body: JsonValue = serde_json::from_str(
            &handler
                .handle(invocation(
                    Operation::ModifyLoanApplication,
                    loan_path(1),
                    Some("markAsFraud"),
                    json!({"fraud": "true"}),
                ))
                .await
                .unwrap(),
        )
        .unwrap();
        assert_eq!(body["changes"]["fraud"], json!(true));

        let loan = handler
            .handle(invocation(Operation::GetLoanById, loan_path(1), None, json!({})))
            .await
            .unwrap();
        assert!(loan.contains("\"fraud\":true"));
        assert!(loan.contains("\"status\":\"active\""));
    }

    #[tokio::test]
    async fn recover_guarantees_needs_an_active_loan() {
        let (_, handler) = seeded().await;
        let err = handler
            .handle(invocation(Operation::LoanStateTransition, loan_path(1), Some("recoverGuarantees"), json!({})))
            .await
            .unwrap_err();
        assert_eq!(err.status, 403);

        for command in ["approve", "disburse"] {
            handler
                .handle(invocation(Operation::LoanStateTransition, loan_path(1), Some(command), json!({})))
                .await
                .unwrap();
        }
        let body = handler
            .handle(invocation(Operation::LoanStateTransition, loan_path(1), Some("recoverGuarantees"), json!({})))
            .await
            .unwrap();
        assert!(body.contains("guaranteesRecoveredOnDate"));
    }

    #[tokio::test]
    async fn apply_requires_existing_client() {
        let handler = LoansHandler::new(MemoryStore::new());
        let err = handler
            .handle(invocation(
                Operation::ApplyLoan,
                PathArgs::new(),
                None,
                json!({"clientId": 5, "principal": 10}),
            ))
            .await
            .unwrap_err();
        assert_eq!(err.status, 404);
    }
}
