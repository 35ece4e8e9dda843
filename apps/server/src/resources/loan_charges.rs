use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};

use portico_batch::{DomainError, HandlerInvocation, Operation, ResourceHandler};

use super::loans::{loan_by_path, loan_client};
use super::{
    body_object, f64_field, i64_field, not_found, required_amount, required_i64, set_field,
    str_field, today, unsupported, CommandResult, LOAN_CHARGES, LOAN_TRANSACTIONS,
};
use crate::store::{MemoryStore, Tables};

pub struct LoanChargesHandler {
    store: MemoryStore,
}

impl LoanChargesHandler {
    pub fn new(store: MemoryStore) -> Self {
        Self { store }
    }

    async fn create(&self, invocation: &HandlerInvocation) -> Result<String, DomainError> {
        let body = body_object(invocation)?;
        let charge_definition = required_i64(&body, "chargeId")?;
        let amount = required_amount(&body, "amount")?;
        let external_id = body
            .get("externalId")
            .and_then(JsonValue::as_str)
            .map(str::to_string);

        self.store
            .write(&invocation.batch, |tables| {
                let loan_id = loan_by_path(tables, invocation)?;
                if let Some(ext) = &external_id {
                    if tables.find_by(LOAN_CHARGES, "externalId", ext).is_some() {
                        return Err(DomainError::forbidden(format!(
                            "Loan charge with externalId {ext} already exists"
                        )));
                    }
                }

                let id = tables.insert(
                    LOAN_CHARGES,
                    json!({
                        "loanId": loan_id,
                        "chargeId": charge_definition,
                        "amount": amount,
                        "amountOutstanding": amount,
                        "externalId": external_id,
                        "dueDate": body.get("dueDate").cloned().unwrap_or_else(|| today().into()),
                    }),
                );

                CommandResult::resource(id)
                    .external_id(external_id)
                    .client(loan_client(tables, loan_id))
                    .loan(loan_id)
                    .into_body()
            })
            .await
    }

    async fn adjust(&self, invocation: &HandlerInvocation) -> Result<String, DomainError> {
        let body = body_object(invocation)?;
        let amount = required_amount(&body, "amount")?;

        self.store
            .write(&invocation.batch, |tables| {
                let loan_id = loan_by_path(tables, invocation)?;
                let charge_id = charge_by_path(tables, invocation, loan_id)?;
                let charge = tables
                    .get_mut(LOAN_CHARGES, charge_id)
                    .ok_or_else(|| not_found("Loan charge", charge_id))?;

                let outstanding = f64_field(charge, "amountOutstanding").unwrap_or_default();
                if amount > outstanding {
                    return Err(DomainError::forbidden(format!(
                        "Adjustment amount {amount} exceeds outstanding charge amount {outstanding}"
                    )));
                }
                set_field(charge, "amountOutstanding", outstanding - amount);
                let charge_external_id = str_field(charge, "externalId");

                let transaction_id = tables.insert(
                    LOAN_TRANSACTIONS,
                    json!({
                        "loanId": loan_id,
                        "type": "chargeAdjustment",
                        "loanChargeId": charge_id,
                        "amount": amount,
                        "date": today(),
                        "externalId": body.get("externalId").cloned(),
                        "reversed": false,
                    }),
                );

                CommandResult::resource(charge_id)
                    .external_id(charge_external_id)
                    .client(loan_client(tables, loan_id))
                    .loan(loan_id)
                    .sub_resource(transaction_id, str_field(&JsonValue::Object(body), "externalId"))
                    .into_body()
            })
            .await
    }
}

/// Charge id for either path form, which must belong to `loan_id`.
fn charge_by_path(
    tables: &Tables,
    invocation: &HandlerInvocation,
    loan_id: i64,
) -> Result<i64, DomainError> {
    let belongs = |doc: &JsonValue| i64_field(doc, "loanId") == Some(loan_id);

    if let Some(id) = invocation.path.id("chargeId") {
        return tables
            .get(LOAN_CHARGES, id)
            .filter(|doc| belongs(doc))
            .map(|_| id)
            .ok_or_else(|| not_found("Loan charge", id));
    }
    let ext = invocation
        .path
        .external_id("chargeExternalId")
        .ok_or_else(|| DomainError::internal("missing path parameter chargeExternalId"))?;
    tables
        .iter(LOAN_CHARGES)
        .find(|(_, doc)| belongs(doc) && str_field(doc, "externalId").as_deref() == Some(ext))
        .map(|(id, _)| id)
        .ok_or_else(|| not_found("Loan charge", ext))
}

#[async_trait]
impl ResourceHandler for LoanChargesHandler {
    async fn handle(&self, invocation: HandlerInvocation) -> Result<String, DomainError> {
        match invocation.operation {
            Operation::CreateLoanCharge | Operation::CreateLoanChargeByLoanExternalId => {
                self.create(&invocation).await
            }
            Operation::CollectLoanCharges | Operation::CollectLoanChargesByLoanExternalId => {
                self.store
                    .read(&invocation.batch, |tables| {
                        let loan_id = loan_by_path(tables, &invocation)?;
                        let charges: Vec<&JsonValue> = tables
                            .iter(LOAN_CHARGES)
                            .filter(|(_, doc)| i64_field(doc, "loanId") == Some(loan_id))
                            .map(|(_, doc)| doc)
                            .collect();
                        Ok(json!(charges).to_string())
                    })
                    .await
            }
            Operation::GetLoanChargeById | Operation::GetLoanChargeByExternalId => {
                self.store
                    .read(&invocation.batch, |tables| {
                        let loan_id = loan_by_path(tables, &invocation)?;
                        let id = charge_by_path(tables, &invocation, loan_id)?;
                        tables
                            .get(LOAN_CHARGES, id)
                            .map(super::render)
                            .ok_or_else(|| not_found("Loan charge", id))
                    })
                    .await
            }
            Operation::AdjustLoanCharge | Operation::AdjustLoanChargeByExternalId => {
                self.adjust(&invocation).await
            }
            _ => Err(unsupported(&invocation)),
        }
    }
}
