use async_trait::async_trait;
use serde_json::Value as JsonValue;

use portico_batch::{DomainError, HandlerInvocation, Operation, ResourceHandler};

use super::loans::{loan_client, require_active};
use super::{
    apply_transition, body_object, i64_field, not_found, path_id, required_i64, set_field,
    today, unsupported, CommandResult, Transition, RESCHEDULES,
};
use crate::store::MemoryStore;

const TRANSITIONS: &[Transition] = &[
    ("approve", &["pending"], "approved"),
    ("reject", &["pending"], "rejected"),
];

pub struct ReschedulesHandler {
    store: MemoryStore,
}

impl ReschedulesHandler {
    pub fn new(store: MemoryStore) -> Self {
        Self { store }
    }

    async fn create(&self, invocation: &HandlerInvocation) -> Result<String, DomainError> {
        let body = body_object(invocation)?;
        let loan_id = required_i64(&body, "loanId")?;

        self.store
            .write(&invocation.batch, |tables| {
                require_active(tables, loan_id, "reschedule")?;
                let pending = tables.iter(RESCHEDULES).any(|(_, doc)| {
                    i64_field(doc, "loanId") == Some(loan_id)
                        && doc.get("status").and_then(JsonValue::as_str) == Some("pending")
                });
                if pending {
                    return Err(DomainError::forbidden(format!(
                        "Loan {loan_id} already has a pending reschedule request"
                    )));
                }

                let mut document = JsonValue::Object(body);
                set_field(&mut document, "status", "pending");
                set_field(&mut document, "submittedOnDate", today());
                let id = tables.insert(RESCHEDULES, document);

                CommandResult::resource(id)
                    .client(loan_client(tables, loan_id))
                    .loan(loan_id)
                    .into_body()
            })
            .await
    }

    async fn decide(&self, invocation: &HandlerInvocation) -> Result<String, DomainError> {
        let id = path_id(invocation, "scheduleId")?;
        let command = invocation.command.as_deref();

        self.store
            .write(&invocation.batch, |tables| {
                let request = tables
                    .get_mut(RESCHEDULES, id)
                    .ok_or_else(|| not_found("Loan reschedule request", id))?;
                let status =
                    apply_transition(request, "reschedule request", id, command, TRANSITIONS)?;
                let loan_id = i64_field(request, "loanId").unwrap_or_default();

                CommandResult::resource(id)
                    .client(loan_client(tables, loan_id))
                    .loan(loan_id)
                    .change("status", status)
                    .into_body()
            })
            .await
    }
}

#[async_trait]
impl ResourceHandler for ReschedulesHandler {
    async fn handle(&self, invocation: HandlerInvocation) -> Result<String, DomainError> {
        match invocation.operation {
            Operation::CreateLoanRescheduleRequest => self.create(&invocation).await,
            Operation::LoanRescheduleDecision => self.decide(&invocation).await,
            _ => Err(unsupported(&invocation)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::LOANS;
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

    #[tokio::test]
    async fn reschedule_is_decided_once() {
        let store = MemoryStore::new();
        store
            .write(&BatchContext::new(), |t| t.insert(LOANS, json!({"status": "active"})))
            .await;
        let handler = ReschedulesHandler::new(store);

        handler
            .handle(invocation(
                Operation::CreateLoanRescheduleRequest,
                PathArgs::new(),
                None,
                json!({"loanId": 1, "rescheduleFromDate": "2024-01-01"}),
            ))
            .await
            .unwrap();

        let mut path = PathArgs::new();
        path.push("scheduleId", PathValue::Id(1));
        handler
            .handle(invocation(Operation::LoanRescheduleDecision, path.clone(), Some("approve"), json!({})))
            .await
            .unwrap();
        let err = handler
            .handle(invocation(Operation::LoanRescheduleDecision, path, Some("reject"), json!({})))
            .await
            .unwrap_err();
        assert_eq!(err.status, 403);
    }

    #[tokio::test]
    async fn reschedule_requires_active_loan() {
        let handler = ReschedulesHandler::new(MemoryStore::new());
        let err = handler
            .handle(invocation(
                Operation::CreateLoanRescheduleRequest,
                PathArgs::new(),
                None,
                json!({"loanId": 3}),
            ))
            .await
            .unwrap_err();
        assert_eq!(err.status, 404);
    }
}
