use async_trait::async_trait;
use serde_json::{json, Map, Value as JsonValue};

use portico_batch::{DomainError, HandlerInvocation, Operation, ResourceHandler};

use super::loans::{loan_by_path, loan_client, require_active};
use super::{
    body_object, f64_field, i64_field, not_found, render, required_amount, set_field, str_field,
    today, unsupported, CommandResult, LOANS, LOAN_TRANSACTIONS,
};
use crate::store::{MemoryStore, Tables};

/// Commands that pay down the outstanding principal.
const REDUCING: &[&str] = &[
    "repayment",
    "merchantIssuedRefund",
    "payoutRefund",
    "goodwillCredit",
    "chargeRefund",
    "waiveInterest",
    "downPayment",
    "interestPaymentWaiver",
];

/// Commands that are recorded without touching the outstanding principal.
const NEUTRAL: &[&str] = &["creditBalanceRefund", "recoverypayment"];

/// Commands that close the loan, with the status they leave it in.
const CLOSING: &[(&str, &str)] = &[
    ("writeoff", "writtenOff"),
    ("foreclosure", "closed"),
    ("chargeOff", "chargedOff"),
];

pub struct LoanTransactionsHandler {
    store: MemoryStore,
}

impl LoanTransactionsHandler {
    pub fn new(store: MemoryStore) -> Self {
        Self { store }
    }

    async fn create(&self, invocation: &HandlerInvocation) -> Result<String, DomainError> {
        let body = body_object(invocation)?;
        let command = invocation.command.clone().unwrap_or_default();

        self.store
            .write(&invocation.batch, |tables| {
                let loan_id = loan_by_path(tables, invocation)?;
                require_active(tables, loan_id, &command)?;
                check_external_id(tables, &body)?;

                let mut changes = Map::new();
                let amount = if let Some((_, closed)) =
                    CLOSING.iter().find(|(name, _)| *name == command)
                {
                    let outstanding = outstanding(tables, loan_id);
                    update_loan(tables, loan_id, |loan| {
                        set_field(loan, "principalOutstanding", 0.0);
                        set_field(loan, "status", *closed);
                    });
                    changes.insert("status".to_string(), json!(closed));
                    outstanding
                } else if REDUCING.contains(&command.as_str()) {
                    let amount = required_amount(&body, "transactionAmount")?;
                    let outstanding = outstanding(tables, loan_id);
                    if amount > outstanding {
                        return Err(DomainError::forbidden(format!(
                            "Transaction amount {amount} exceeds outstanding balance {outstanding}"
                        )));
                    }
                    let remaining = outstanding - amount;
                    update_loan(tables, loan_id, |loan| {
                        set_field(loan, "principalOutstanding", remaining);
                        if remaining == 0.0 {
                            set_field(loan, "status", "closedObligationsMet");
                        }
                    });
                    changes.insert("principalOutstanding".to_string(), json!(remaining));
                    amount
                } else if NEUTRAL.contains(&command.as_str()) {
                    required_amount(&body, "transactionAmount")?
                } else {
                    return Err(DomainError::bad_request(format!(
                        "Unrecognized loan transaction command '{command}'"
                    )));
                };

                let external_id = str_field(&JsonValue::Object(body.clone()), "externalId");
                let id = record(tables, loan_id, &command, amount, &body);
                CommandResult::resource(id)
                    .external_id(external_id)
                    .client(loan_client(tables, loan_id))
                    .loan(loan_id)
                    .changes(changes)
                    .into_body()
            })
            .await
    }

    /// Reverse a transaction; a non-zero `transactionAmount` books a replacement.
    async fn adjust(&self, invocation: &HandlerInvocation) -> Result<String, DomainError> {
        let body = body_object(invocation)?;
        let value = JsonValue::Object(body.clone());
        let amount = f64_field(&value, "transactionAmount").ok_or_else(|| {
            DomainError::bad_request("The parameter `transactionAmount` is mandatory")
        })?;
        if amount < 0.0 {
            return Err(DomainError::bad_request(
                "The parameter `transactionAmount` must not be negative",
            ));
        }

        self.store
            .write(&invocation.batch, |tables| {
                let loan_id = loan_by_path(tables, invocation)?;
                let (id, original) = live_transaction(tables, invocation, loan_id)?;
                let kind = str_field(&original, "type").unwrap_or_default();
                if !REDUCING.contains(&kind.as_str()) {
                    return Err(DomainError::forbidden(format!(
                        "Loan transaction {id} of type {kind} cannot be adjusted"
                    )));
                }

                let previous = f64_field(&original, "amount").unwrap_or_default();
                let restored = outstanding(tables, loan_id) + previous;
                if amount > restored {
                    return Err(DomainError::forbidden(format!(
                        "Transaction amount {amount} exceeds outstanding balance {restored}"
                    )));
                }
                if let Some(doc) = tables.get_mut(LOAN_TRANSACTIONS, id) {
                    set_field(doc, "reversed", true);
                }
                update_loan(tables, loan_id, |loan| {
                    set_field(loan, "principalOutstanding", restored - amount);
                    set_field(loan, "status", if restored - amount == 0.0 {
                        "closedObligationsMet"
                    } else {
                        "active"
                    });
                });

                let mut result = CommandResult::resource(id)
                    .client(loan_client(tables, loan_id))
                    .loan(loan_id)
                    .change("reversed", true);
                if amount > 0.0 {
                    let replacement = record(tables, loan_id, &kind, amount, &body);
                    result = result.sub_resource(replacement, str_field(&value, "externalId"));
                }
                result.into_body()
            })
            .await
    }

    async fn chargeback(&self, invocation: &HandlerInvocation) -> Result<String, DomainError> {
        let body = body_object(invocation)?;
        let amount = required_amount(&body, "transactionAmount")?;

        self.store
            .write(&invocation.batch, |tables| {
                let loan_id = loan_by_path(tables, invocation)?;
                let (id, original) = live_transaction(tables, invocation, loan_id)?;
                if str_field(&original, "type").as_deref() != Some("repayment") {
                    return Err(DomainError::forbidden(format!(
                        "Only repayments can be charged back, transaction {id} is not one"
                    )));
                }
                if amount > f64_field(&original, "amount").unwrap_or_default() {
                    return Err(DomainError::forbidden(format!(
                        "Chargeback amount {amount} exceeds the repayment"
                    )));
                }

                let remaining = outstanding(tables, loan_id) + amount;
                update_loan(tables, loan_id, |loan| {
                    set_field(loan, "principalOutstanding", remaining);
                    set_field(loan, "status", "active");
                });
                let chargeback = record(tables, loan_id, "chargeback", amount, &body);

                CommandResult::resource(id)
                    .client(loan_client(tables, loan_id))
                    .loan(loan_id)
                    .sub_resource(chargeback, str_field(&JsonValue::Object(body), "externalId"))
                    .change("principalOutstanding", remaining)
                    .into_body()
            })
            .await
    }
}

fn outstanding(tables: &Tables, loan_id: i64) -> f64 {
    tables
        .get(LOANS, loan_id)
        .and_then(|loan| f64_field(loan, "principalOutstanding"))
        .unwrap_or_default()
}

fn update_loan(tables: &mut Tables, loan_id: i64, f: impl FnOnce(&mut JsonValue)) {
    if let Some(loan) = tables.get_mut(LOANS, loan_id) {
        f(loan);
    }
}

fn check_external_id(tables: &Tables, body: &Map<String, JsonValue>) -> Result<(), DomainError> {
    match body.get("externalId").and_then(JsonValue::as_str) {
        Some(ext) if tables.find_by(LOAN_TRANSACTIONS, "externalId", ext).is_some() => {
            Err(DomainError::forbidden(format!(
                "Loan transaction with externalId {ext} already exists"
            )))
        }
        _ => Ok(()),
    }
}

fn record(
    tables: &mut Tables,
    loan_id: i64,
    kind: &str,
    amount: f64,
    body: &Map<String, JsonValue>,
) -> i64 {
    tables.insert(
        LOAN_TRANSACTIONS,
        json!({
            "loanId": loan_id,
            "type": kind,
            "amount": amount,
            "date": body.get("transactionDate").cloned().unwrap_or_else(|| today().into()),
            "externalId": body.get("externalId").cloned(),
            "note": body.get("note").cloned(),
            "reversed": false,
        }),
    )
}

/// Transaction for either path form, belonging to `loan_id`.
fn transaction_by_path(
    tables: &Tables,
    invocation: &HandlerInvocation,
    loan_id: i64,
) -> Result<i64, DomainError> {
    let belongs = |doc: &JsonValue| i64_field(doc, "loanId") == Some(loan_id);

    if let Some(id) = invocation.path.id("transactionId") {
        return tables
            .get(LOAN_TRANSACTIONS, id)
            .filter(|doc| belongs(doc))
            .map(|_| id)
            .ok_or_else(|| not_found("Loan transaction", id));
    }
    let ext = invocation
        .path
        .external_id("transactionExternalId")
        .ok_or_else(|| DomainError::internal("missing path parameter transactionExternalId"))?;
    tables
        .iter(LOAN_TRANSACTIONS)
        .find(|(_, doc)| belongs(doc) && str_field(doc, "externalId").as_deref() == Some(ext))
        .map(|(id, _)| id)
        .ok_or_else(|| not_found("Loan transaction", ext))
}

/// A transaction that has not been reversed yet, with a copy of its document.
fn live_transaction(
    tables: &Tables,
    invocation: &HandlerInvocation,
    loan_id: i64,
) -> Result<(i64, JsonValue), DomainError> {
    let id = transaction_by_path(tables, invocation, loan_id)?;
    let document = tables
        .get(LOAN_TRANSACTIONS, id)
        .cloned()
        .ok_or_else(|| not_found("Loan transaction", id))?;
    if document.get("reversed").and_then(JsonValue::as_bool) == Some(true) {
        return Err(DomainError::forbidden(format!(
            "Loan transaction {id} is already reversed"
        )));
    }
    Ok((id, document))
}

#[async_trait]
impl ResourceHandler for LoanTransactionsHandler {
    async fn handle(&self, invocation: HandlerInvocation) -> Result<String, DomainError> {
        match invocation.operation {
            Operation::CreateLoanTransaction | Operation::CreateLoanTransactionByLoanExternalId => {
                self.create(&invocation).await
            }
            Operation::GetLoanTransactionById | Operation::GetLoanTransactionByExternalId => {
                self.store
                    .read(&invocation.batch, |tables| {
                        let loan_id = loan_by_path(tables, &invocation)?;
                        let id = transaction_by_path(tables, &invocation, loan_id)?;
                        tables
                            .get(LOAN_TRANSACTIONS, id)
                            .map(render)
                            .ok_or_else(|| not_found("Loan transaction", id))
                    })
                    .await
            }
            Operation::AdjustLoanTransaction | Operation::AdjustLoanTransactionByExternalId => {
                self.adjust(&invocation).await
            }
            Operation::ChargebackLoanTransaction
            | Operation::ChargebackLoanTransactionByExternalId => {
                self.chargeback(&invocation).await
            }
            _ => Err(unsupported(&invocation)),
        }
    }
}
