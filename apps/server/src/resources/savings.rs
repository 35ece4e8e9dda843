use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};

use portico_batch::{DomainError, HandlerInvocation, Operation, ResourceHandler};

use super::{
    apply_changes, apply_transition, body_object, f64_field, i64_field, invalid_state,
    not_found, path_id, render, required_amount, required_i64, set_field, status_of, str_field,
    today, unsupported, CommandResult, Transition, CLIENTS, SAVINGS, SAVINGS_TRANSACTIONS,
};
use crate::store::MemoryStore;

const TRANSITIONS: &[Transition] = &[
    ("approve", &["submitted"], "approved"),
    ("reject", &["submitted"], "rejected"),
    ("withdrawnByApplicant", &["submitted"], "withdrawn"),
    ("activate", &["approved"], "active"),
    ("close", &["active"], "closed"),
];

const PROTECTED: &[&str] = &["id", "status", "clientId", "accountBalance", ON_HOLD];

const ON_HOLD: &str = "savingsAmountOnHold";

pub struct SavingsHandler {
    store: MemoryStore,
}

impl SavingsHandler {
    pub fn new(store: MemoryStore) -> Self {
        Self { store }
    }

    async fn apply(&self, invocation: &HandlerInvocation) -> Result<String, DomainError> {
        let body = body_object(invocation)?;
        let client_id = required_i64(&body, "clientId")?;

        self.store
            .write(&invocation.batch, |tables| {
                if tables.get(CLIENTS, client_id).is_none() {
                    return Err(not_found("Client", client_id));
                }
                let external_id = str_field(&JsonValue::Object(body.clone()), "externalId");

                let mut document = JsonValue::Object(body);
                set_field(&mut document, "status", "submitted");
                set_field(&mut document, "accountBalance", 0.0);
                set_field(&mut document, ON_HOLD, 0.0);
                set_field(&mut document, "submittedOnDate", today());
                let id = tables.insert(SAVINGS, document);

                CommandResult::resource(id)
                    .external_id(external_id)
                    .client(Some(client_id))
                    .savings(id)
                    .into_body()
            })
            .await
    }

    async fn modify(&self, invocation: &HandlerInvocation) -> Result<String, DomainError> {
        let id = path_id(invocation, "savingsId")?;
        let body = body_object(invocation)?;

        self.store
            .write(&invocation.batch, |tables| {
                let account = tables
                    .get_mut(SAVINGS, id)
                    .ok_or_else(|| not_found("Savings account", id))?;
                let status = status_of(account).to_string();
                if status != "submitted" {
                    return Err(invalid_state("savings account", id, "modify", &status));
                }
                let changes = apply_changes(account, &body, PROTECTED);
                CommandResult::resource(id)
                    .client(i64_field(account, "clientId"))
                    .savings(id)
                    .changes(changes)
                    .into_body()
            })
            .await
    }

    async fn transition(&self, invocation: &HandlerInvocation) -> Result<String, DomainError> {
        let id = path_id(invocation, "savingsId")?;
        let command = invocation.command.as_deref();

        self.store
            .write(&invocation.batch, |tables| {
                let account = tables
                    .get_mut(SAVINGS, id)
                    .ok_or_else(|| not_found("Savings account", id))?;
                if command == Some("close") {
                    let balance = f64_field(account, "accountBalance").unwrap_or_default();
                    if balance != 0.0 {
                        return Err(DomainError::forbidden(format!(
                            "Savings account {id} cannot be closed with balance {balance}"
                        )));
                    }
                }
                let status = apply_transition(account, "savings account", id, command, TRANSITIONS)?;
                CommandResult::resource(id)
                    .client(i64_field(account, "clientId"))
                    .savings(id)
                    .change("status", status)
                    .into_body()
            })
            .await
    }

    async fn transact(&self, invocation: &HandlerInvocation) -> Result<String, DomainError> {
        let id = path_id(invocation, "savingsId")?;
        let body = body_object(invocation)?;
        let amount = required_amount(&body, "transactionAmount")?;
        let command = invocation.command.clone().unwrap_or_default();

        self.store
            .write(&invocation.batch, |tables| {
                let account = tables
                    .get_mut(SAVINGS, id)
                    .ok_or_else(|| not_found("Savings account", id))?;
                let status = status_of(account).to_string();
                if status != "active" {
                    return Err(invalid_state("savings account", id, &command, &status));
                }

                let mut balance = f64_field(account, "accountBalance").unwrap_or_default();
                let mut on_hold = f64_field(account, ON_HOLD).unwrap_or_default();
                let available = balance - on_hold;
                match command.as_str() {
                    "deposit" => balance += amount,
                    "withdrawal" | "holdAmount" if amount > available => {
                        return Err(DomainError::forbidden(format!(
                            "Insufficient account balance: {command} of {amount} exceeds available {available}"
                        )));
                    }
                    "withdrawal" => balance -= amount,
                    "holdAmount" => on_hold += amount,
                    other => {
                        return Err(DomainError::bad_request(format!(
                            "Unrecognized savings transaction command '{other}'"
                        )));
                    }
                }
                set_field(account, "accountBalance", balance);
                set_field(account, ON_HOLD, on_hold);
                let client_id = i64_field(account, "clientId");

                let mut record = json!({
                    "savingsId": id,
                    "type": command,
                    "amount": amount,
                    "date": body.get("transactionDate").cloned().unwrap_or_else(|| today().into()),
                    "runningBalance": balance - on_hold,
                });
                if command == "holdAmount" {
                    set_field(&mut record, "released", false);
                    if let Some(reason) = body.get("reasonForBlock") {
                        set_field(&mut record, "reasonForBlock", reason.clone());
                    }
                }
                let transaction_id = tables.insert(SAVINGS_TRANSACTIONS, record);

                CommandResult::resource(transaction_id)
                    .client(client_id)
                    .savings(id)
                    .change("accountBalance", balance)
                    .change(ON_HOLD, on_hold)
                    .into_body()
            })
            .await
    }

    /// Free the amount blocked by a hold transaction.
    async fn release(&self, invocation: &HandlerInvocation) -> Result<String, DomainError> {
        let id = path_id(invocation, "savingsId")?;
        let hold_id = path_id(invocation, "transactionId")?;

        self.store
            .write(&invocation.batch, |tables| {
                let hold = tables
                    .get(SAVINGS_TRANSACTIONS, hold_id)
                    .filter(|t| i64_field(t, "savingsId") == Some(id))
                    .filter(|t| str_field(t, "type").as_deref() == Some("holdAmount"))
                    .ok_or_else(|| not_found("Hold transaction", hold_id))?;
                if hold.get("released").and_then(JsonValue::as_bool) == Some(true) {
                    return Err(DomainError::forbidden(format!(
                        "Hold transaction {hold_id} is already released"
                    )));
                }
                let amount = f64_field(hold, "amount").unwrap_or_default();

                let account = tables
                    .get_mut(SAVINGS, id)
                    .ok_or_else(|| not_found("Savings account", id))?;
                let balance = f64_field(account, "accountBalance").unwrap_or_default();
                let on_hold = (f64_field(account, ON_HOLD).unwrap_or_default() - amount).max(0.0);
                set_field(account, ON_HOLD, on_hold);
                let client_id = i64_field(account, "clientId");

                if let Some(hold) = tables.get_mut(SAVINGS_TRANSACTIONS, hold_id) {
                    set_field(hold, "released", true);
                }
                let release_id = tables.insert(
                    SAVINGS_TRANSACTIONS,
                    json!({
                        "savingsId": id,
                        "type": "releaseAmount",
                        "amount": amount,
                        "releasedTransactionId": hold_id,
                        "date": today(),
                        "runningBalance": balance - on_hold,
                    }),
                );

                CommandResult::resource(release_id)
                    .client(client_id)
                    .savings(id)
                    .change(ON_HOLD, on_hold)
                    .into_body()
            })
            .await
    }
}

#[async_trait]
impl ResourceHandler for SavingsHandler {
    async fn handle(&self, invocation: HandlerInvocation) -> Result<String, DomainError> {
        match invocation.operation {
            Operation::ApplySavingsAccount => self.apply(&invocation).await,
            Operation::GetSavingsAccountById => {
                let id = path_id(&invocation, "savingsId")?;
                self.store
                    .read(&invocation.batch, |tables| {
                        tables
                            .get(SAVINGS, id)
                            .map(render)
                            .ok_or_else(|| not_found("Savings account", id))
                    })
                    .await
            }
            Operation::ModifySavingsAccount => self.modify(&invocation).await,
            Operation::SavingsStateTransition => self.transition(&invocation).await,
            Operation::CreateSavingsTransaction => self.transact(&invocation).await,
            Operation::ReleaseSavingsAmount => self.release(&invocation).await,
            _ => Err(unsupported(&invocation)),
        }
    }
}
