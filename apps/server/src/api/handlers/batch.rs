//! Batch endpoint handlers

use std::collections::HashMap;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Serialize;

use portico_batch::{ExecutionMode, SubRequest, TransactionOutcome};

use crate::{error::Error, metrics, request_context::RequestContext, state::AppState, Result};

pub const ENCLOSING_TRANSACTION_PARAM: &str = "enclosingTransaction";
pub const TRANSACTION_OUTCOME_HEADER: &str = "x-transaction-outcome";

fn parse_flag(params: &HashMap<String, String>, default: bool) -> Result<bool> {
    match params.get(ENCLOSING_TRANSACTION_PARAM).map(String::as_str) {
        None | Some("") => Ok(default),
        Some(value) if value.eq_ignore_ascii_case("true") => Ok(true),
        Some(value) if value.eq_ignore_ascii_case("false") => Ok(false),
        Some(value) => Err(Error::InvalidParameter(format!(
            "{ENCLOSING_TRANSACTION_PARAM} must be true or false, got '{value}'"
        ))),
    }
}

/// Execute a batch (`POST /api/v1/batches?enclosingTransaction=<bool>`)
///
/// Answers 200 with the Sub-Responses in submission order, including the truncated list of a
/// rolled-back transaction. Only call-level failures produce another status.
pub async fn execute_batch(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    context: Option<Extension<RequestContext>>,
    body: Bytes,
) -> Result<Response> {
    let enclosing = parse_flag(&params, state.config.batch.default_enclosing_transaction)?;
    let mode = ExecutionMode::from_flag(enclosing);

    let requests: Vec<SubRequest> = serde_json::from_slice(&body)
        .map_err(|e| Error::InvalidBody(format!("expected a JSON array of requests: {e}")))?;
    let size = requests.len();

    tracing::info!(
        request_id = context.as_ref().map(|Extension(c)| c.request_id.as_str()),
        mode = mode.as_str(),
        size,
        "Received batch"
    );

    let start = Instant::now();
    let result = state.executor.run(requests, mode).await;
    metrics::record_batch(mode, size, start.elapsed(), metrics::batch_outcome(&result));
    let result = result?;

    let transaction = result.transaction;
    let mut response = (StatusCode::OK, Json(result.into_responses())).into_response();
    if transaction != TransactionOutcome::NotRequested {
        response.headers_mut().insert(
            TRANSACTION_OUTCOME_HEADER,
            HeaderValue::from_static(transaction.as_str()),
        );
    }
    Ok(response)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteInfo {
    pub method: &'static str,
    pub pattern: &'static str,
    #[serde(skip_serializing_if = "no_commands")]
    pub commands: &'static [&'static str],
    pub operation: &'static str,
    pub family: &'static str,
}

fn no_commands(commands: &&'static [&'static str]) -> bool {
    commands.is_empty()
}

/// The registered route table (`GET /api/v1/batches/routes`)
pub async fn list_routes(State(state): State<AppState>) -> Json<Vec<RouteInfo>> {
    let routes = state
        .executor
        .registry()
        .descriptors()
        .map(|d| RouteInfo {
            method: d.method.as_str(),
            pattern: d.pattern,
            commands: d.command.values(),
            operation: d.operation.as_str(),
            family: d.operation.family().as_str(),
        })
        .collect();
    Json(routes)
}
