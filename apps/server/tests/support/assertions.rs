use anyhow::Context as _;
use axum::http::StatusCode;
use serde_json::Value;

pub fn assert_status(actual: StatusCode, expected: StatusCode, what: &str) {
    assert_eq!(actual, expected, "unexpected status for {what}");
}

/// The Sub-Responses of a batch call body.
pub fn responses(body: &Value) -> anyhow::Result<&Vec<Value>> {
    body.as_array().context("batch response is a JSON array")
}

pub fn status_codes(body: &Value) -> anyhow::Result<Vec<u64>> {
    responses(body)?
        .iter()
        .map(|r| r.get("statusCode").and_then(Value::as_u64).context("statusCode"))
        .collect()
}

pub fn request_ids(body: &Value) -> anyhow::Result<Vec<i64>> {
    responses(body)?
        .iter()
        .map(|r| r.get("requestId").and_then(Value::as_i64).context("requestId"))
        .collect()
}

/// Parse the JSON text carried in a Sub-Response body.
pub fn sub_body(response: &Value) -> anyhow::Result<Value> {
    let raw = response
        .get("body")
        .and_then(Value::as_str)
        .context("Sub-Response body is a string")?;
    serde_json::from_str(raw).with_context(|| format!("Sub-Response body is JSON: {raw}"))
}

pub fn developer_message(response: &Value) -> anyhow::Result<String> {
    let body = sub_body(response)?;
    body.get("developerMessage")
        .and_then(Value::as_str)
        .map(str::to_string)
        .context("developerMessage")
}
