//! Datatables: free-form rows attached to an application entity (`appTableId`).
//!
//! Each datatable lives in its own collection. A row's `id` is its datatable entry id.

use async_trait::async_trait;
use serde_json::{json, Map, Value as JsonValue};

use portico_batch::{DomainError, HandlerInvocation, Operation, ResourceHandler};

use super::{apply_changes, body_object, not_found, path_id, unsupported, CommandResult};
use crate::store::{field_matches, MemoryStore, Tables};

const APP_TABLE_ID: &str = "appTableId";
const PROTECTED: &[&str] = &["id", APP_TABLE_ID];

pub struct DatatablesHandler {
    store: MemoryStore,
}

fn collection(invocation: &HandlerInvocation) -> Result<String, DomainError> {
    invocation
        .path
        .token("datatable")
        .map(|name| format!("datatable:{name}"))
        .ok_or_else(|| DomainError::internal("missing path parameter datatable"))
}

fn rows_of(tables: &Tables, collection: &str, app_table_id: i64) -> Vec<i64> {
    tables
        .iter(collection)
        .filter(|(_, row)| row.get(APP_TABLE_ID) == Some(&json!(app_table_id)))
        .map(|(id, _)| id)
        .collect()
}

/// Keep only `columns` (all of them when empty).
fn project(row: &JsonValue, columns: &[&str]) -> JsonValue {
    if columns.is_empty() {
        return row.clone();
    }
    let projected: Map<String, JsonValue> = columns
        .iter()
        .filter_map(|c| row.get(*c).map(|v| (c.to_string(), v.clone())))
        .collect();
    JsonValue::Object(projected)
}

impl DatatablesHandler {
    pub fn new(store: MemoryStore) -> Self {
        Self { store }
    }

    /// `?columnFilter=<column>&valueFilter=<value>&resultColumns=<a,b>`
    async fn query(&self, invocation: &HandlerInvocation) -> Result<String, DomainError> {
        let collection = collection(invocation)?;
        let column = invocation
            .query
            .first("columnFilter")
            .ok_or_else(|| DomainError::bad_request("The parameter `columnFilter` is mandatory"))?;
        let value = invocation
            .query
            .first("valueFilter")
            .ok_or_else(|| DomainError::bad_request("The parameter `valueFilter` is mandatory"))?;
        let columns: Vec<&str> = invocation
            .query
            .first("resultColumns")
            .map(|c| c.split(',').map(str::trim).filter(|c| !c.is_empty()).collect())
            .unwrap_or_default();

        self.store
            .read(&invocation.batch, |tables| {
                let rows: Vec<JsonValue> = tables
                    .iter(&collection)
                    .filter(|(_, row)| row.get(column).is_some_and(|v| field_matches(v, value)))
                    .map(|(_, row)| project(row, &columns))
                    .collect();
                Ok(JsonValue::Array(rows).to_string())
            })
            .await
    }

    async fn entries(&self, invocation: &HandlerInvocation) -> Result<String, DomainError> {
        let collection = collection(invocation)?;
        let app_table_id = path_id(invocation, APP_TABLE_ID)?;
        let entry_id = invocation.path.id("datatableId");

        self.store
            .read(&invocation.batch, |tables| {
                let ids = rows_of(tables, &collection, app_table_id);
                match entry_id {
                    Some(entry_id) if ids.contains(&entry_id) => tables
                        .get(&collection, entry_id)
                        .map(JsonValue::to_string)
                        .ok_or_else(|| not_found("Datatable entry", entry_id)),
                    Some(entry_id) => Err(not_found("Datatable entry", entry_id)),
                    None => {
                        let rows: Vec<&JsonValue> =
                            ids.iter().filter_map(|id| tables.get(&collection, *id)).collect();
                        Ok(json!(rows).to_string())
                    }
                }
            })
            .await
    }

    /// Catch-all read below a datatable: `<appTableId>[/<entryId>]` compared as text.
    async fn read_path(&self, invocation: &HandlerInvocation) -> Result<String, DomainError> {
        let collection = collection(invocation)?;
        let path = invocation.path.rest("path").unwrap_or_default().to_vec();

        self.store
            .read(&invocation.batch, |tables| {
                let rows: Vec<&JsonValue> = tables
                    .iter(&collection)
                    .filter(|(id, row)| {
                        let owner = path.first().is_some_and(|p| {
                            row.get(APP_TABLE_ID).is_some_and(|v| field_matches(v, p))
                        });
                        let entry = path.get(1).map_or(true, |p| id.to_string() == *p);
                        owner && entry && path.len() <= 2
                    })
                    .map(|(_, row)| row)
                    .collect();
                if rows.is_empty() {
                    return Err(not_found("Datatable path", path.join("/")));
                }
                Ok(json!(rows).to_string())
            })
            .await
    }

    async fn create(&self, invocation: &HandlerInvocation) -> Result<String, DomainError> {
        let collection = collection(invocation)?;
        let app_table_id = path_id(invocation, APP_TABLE_ID)?;
        let mut row = body_object(invocation)?;
        row.insert(APP_TABLE_ID.to_string(), json!(app_table_id));

        self.store
            .write(&invocation.batch, |tables| {
                let entry_id = tables.insert(&collection, JsonValue::Object(row));
                CommandResult::resource(app_table_id)
                    .sub_resource(entry_id, None)
                    .into_body()
            })
            .await
    }

    async fn update(&self, invocation: &HandlerInvocation) -> Result<String, DomainError> {
        let collection = collection(invocation)?;
        let app_table_id = path_id(invocation, APP_TABLE_ID)?;
        let entry_id = invocation.path.id("datatableId");
        let body = body_object(invocation)?;

        self.store
            .write(&invocation.batch, |tables| {
                let ids = rows_of(tables, &collection, app_table_id);
                let target = match entry_id {
                    Some(entry_id) if ids.contains(&entry_id) => entry_id,
                    Some(entry_id) => return Err(not_found("Datatable entry", entry_id)),
                    None => match ids.as_slice() {
                        [only] => *only,
                        [] => return Err(not_found("Datatable entry for", app_table_id)),
                        _ => {
                            return Err(DomainError::bad_request(format!(
                                "Datatable has several entries for {app_table_id}; name the entry to update"
                            )))
                        }
                    },
                };
                let row = tables
                    .get_mut(&collection, target)
                    .ok_or_else(|| not_found("Datatable entry", target))?;
                let changes = apply_changes(row, &body, PROTECTED);
                let mut result = CommandResult::resource(app_table_id).changes(changes);
                if entry_id.is_some() {
                    result = result.sub_resource(target, None);
                }
                result.into_body()
            })
            .await
    }

    async fn delete(&self, invocation: &HandlerInvocation) -> Result<String, DomainError> {
        let collection = collection(invocation)?;
        let app_table_id = path_id(invocation, APP_TABLE_ID)?;
        let entry_id = invocation.path.id("datatableId");

        self.store
            .write(&invocation.batch, |tables| {
                let ids = rows_of(tables, &collection, app_table_id);
                let doomed = match entry_id {
                    Some(entry_id) if ids.contains(&entry_id) => vec![entry_id],
                    Some(entry_id) => return Err(not_found("Datatable entry", entry_id)),
                    None => ids,
                };
                for id in &doomed {
                    tables.remove(&collection, *id);
                }
                CommandResult::resource(app_table_id)
                    .change("deletedRows", doomed.len())
                    .into_body()
            })
            .await
    }
}

#[async_trait]
impl ResourceHandler for DatatablesHandler {
    async fn handle(&self, invocation: HandlerInvocation) -> Result<String, DomainError> {
        match invocation.operation {
            Operation::QueryDatatable => self.query(&invocation).await,
            Operation::GetDatatableEntries | Operation::GetDatatableEntryById => {
                self.entries(&invocation).await
            }
            Operation::ReadDatatablePath => self.read_path(&invocation).await,
            Operation::CreateDatatableEntry => self.create(&invocation).await,
            Operation::UpdateDatatableEntryOneToOne | Operation::UpdateDatatableEntryOneToMany => {
                self.update(&invocation).await
            }
            Operation::DeleteDatatableEntries | Operation::DeleteDatatableEntry => {
                self.delete(&invocation).await
            }
            _ => Err(unsupported(&invocation)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portico_batch::{BatchContext, Method, PathArgs, PathValue, QueryParams};

    fn invocation(
        operation: Operation,
        entry: Option<i64>,
        query: &str,
        body: JsonValue,
    ) -> HandlerInvocation {
        let mut path = PathArgs::new();
        path.push("datatable", PathValue::Token("dt_loan_extra".into()));
        path.push("appTableId", PathValue::Id(7));
        if let Some(entry) = entry {
            path.push("datatableId", PathValue::Id(entry));
        }
        HandlerInvocation {
            batch: BatchContext::new(),
            request_id: 1,
            operation,
            method: Method::Get,
            path,
            query: QueryParams::parse(query),
            command: None,
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    async fn with_rows() -> DatatablesHandler {
        let handler = DatatablesHandler::new(MemoryStore::new());
        for purpose in ["car", "house"] {
            handler
                .handle(invocation(
                    Operation::CreateDatatableEntry,
                    None,
                    "",
                    json!({"purpose": purpose, "score": 3}),
                ))
                .await
                .unwrap();
        }
        handler
    }

    #[tokio::test]
    async fn query_filters_and_projects() {
        let handler = with_rows().await;
        let body = handler
            .handle(invocation(
                Operation::QueryDatatable,
                None,
                "columnFilter=purpose&valueFilter=house&resultColumns=id,purpose",
                json!({}),
            ))
            .await
            .unwrap();
        let rows: JsonValue = serde_json::from_str(&body).unwrap();
        assert_eq!(rows, json!([{"id": 2, "purpose": "house"}]));
    }

    #[tokio::test]
    async fn query_needs_a_filter() {
        let handler = with_rows().await;
        let err = handler
            .handle(invocation(Operation::QueryDatatable, None, "valueFilter=x", json!({})))
            .await
            .unwrap_err();
        assert_eq!(err.status, 400);
    }

    #[tokio::test]
    async fn one_to_one_update_refuses_multiple_rows() {
        let handler = with_rows().await;
        let err = handler
            .handle(invocation(
                Operation::UpdateDatatableEntryOneToOne,
                None,
                "",
                json!({"score": 4}),
            ))
            .await
            .unwrap_err();
        assert_eq!(err.status, 400);

        let body = handler
            .handle(invocation(
                Operation::UpdateDatatableEntryOneToMany,
                Some(1),
                "",
                json!({"score": 4}),
            ))
            .await
            .unwrap();
        assert!(body.contains("\"score\":4"));
    }

    #[tokio::test]
    async fn delete_removes_entries() {
        let handler = with_rows().await;
        handler
            .handle(invocation(Operation::DeleteDatatableEntry, Some(1), "", json!({})))
            .await
            .unwrap();
        let rows: JsonValue = serde_json::from_str(
            &handler
                .handle(invocation(Operation::GetDatatableEntries, None, "", json!({})))
                .await
                .unwrap(),
        )
        .unwrap();
        assert_eq!(rows.as_array().unwrap().len(), 1);

        let err = handler
            .handle(invocation(Operation::GetDatatableEntryById, Some(1), "", json!({})))
            .await
            .unwrap_err();
        assert_eq!(err.status, 404);
    }
}
