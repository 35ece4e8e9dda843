use async_trait::async_trait;
use serde_json::Value as JsonValue;

use portico_batch::{DomainError, HandlerInvocation, Operation, ResourceHandler};

use super::{
    apply_changes, apply_transition, body_object, not_found, path_external_id, path_id, render,
    str_field, today, unsupported, CommandResult, Transition, CLIENTS,
};
use crate::store::{MemoryStore, Tables};

const TRANSITIONS: &[Transition] = &[
    ("activate", &["pending"], "active"),
    ("close", &["active"], "closed"),
    ("reject", &["pending"], "rejected"),
    ("withdraw", &["pending"], "withdrawn"),
    ("reactivate", &["closed"], "active"),
];

const PROTECTED: &[&str] = &["id", "status", "externalId"];

pub struct ClientsHandler {
    store: MemoryStore,
}

impl ClientsHandler {
    pub fn new(store: MemoryStore) -> Self {
        Self { store }
    }

    async fn create(&self, invocation: &HandlerInvocation) -> Result<String, DomainError> {
        let body = body_object(invocation)?;
        let external_id = body
            .get("externalId")
            .and_then(JsonValue::as_str)
            .map(str::to_string);
        let active = body.get("active").and_then(JsonValue::as_bool) == Some(true);

        self.store
            .write(&invocation.batch, |tables| {
                if let Some(ext) = &external_id {
                    if tables.find_by(CLIENTS, "externalId", ext).is_some() {
                        return Err(DomainError::forbidden(format!(
                            "Client with externalId {ext} already exists"
                        )));
                    }
                }

                let mut document = JsonValue::Object(body);
                super::set_field(&mut document, "status", if active { "active" } else { "pending" });
                super::set_field(&mut document, "submittedOnDate", today());
                let id = tables.insert(CLIENTS, document);

                CommandResult::resource(id)
                    .external_id(external_id)
                    .client(Some(id))
                    .into_body()
            })
            .await
    }

    async fn update(&self, invocation: &HandlerInvocation) -> Result<String, DomainError> {
        let id = path_id(invocation, "clientId")?;
        let body = body_object(invocation)?;

        self.store
            .write(&invocation.batch, |tables| {
                let client = tables
                    .get_mut(CLIENTS, id)
                    .ok_or_else(|| not_found("Client", id))?;
                let changes = apply_changes(client, &body, PROTECTED);
                CommandResult::resource(id)
                    .client(Some(id))
                    .changes(changes)
                    .into_body()
            })
            .await
    }

    async fn transition(&self, invocation: &HandlerInvocation) -> Result<String, DomainError> {
        let id = path_id(invocation, "clientId")?;
        let command = invocation.command.as_deref();

        self.store
            .write(&invocation.batch, |tables| {
                let client = tables
                    .get_mut(CLIENTS, id)
                    .ok_or_else(|| not_found("Client", id))?;
                let status = apply_transition(client, "client", id, command, TRANSITIONS)?;
                CommandResult::resource(id)
                    .external_id(str_field(client, "externalId"))
                    .client(Some(id))
                    .change("status", status)
                    .into_body()
            })
            .await
    }
}

/// Client id for either path form: numeric `clientId` or `clientExternalId`.
pub(crate) fn client_by_path(
    tables: &Tables,
    invocation: &HandlerInvocation,
) -> Result<i64, DomainError> {
    if let Some(id) = invocation.path.id("clientId") {
        return tables
            .get(CLIENTS, id)
            .map(|_| id)
            .ok_or_else(|| not_found("Client", id));
    }
    let ext = path_external_id(invocation, "clientExternalId")?;
    tables
        .find_by(CLIENTS, "externalId", ext)
        .map(|(id, _)| id)
        .ok_or_else(|| not_found("Client", ext))
}

#[async_trait]
impl ResourceHandler for ClientsHandler {
    async fn handle(&self, invocation: HandlerInvocation) -> Result<String, DomainError> {
        match invocation.operation {
            Operation::CreateClient => self.create(&invocation).await,
            Operation::GetClientById | Operation::GetClientByExternalId => {
                self.store
                    .read(&invocation.batch, |tables| {
                        let id = client_by_path(tables, &invocation)?;
                        tables
                            .get(CLIENTS, id)
                            .map(render)
                            .ok_or_else(|| not_found("Client", id))
                    })
                    .await
            }
            Operation::UpdateClient => self.update(&invocation).await,
            Operation::ClientStateTransition => self.transition(&invocation).await,
            _ => Err(unsupported(&invocation)),
        }
    }
}
