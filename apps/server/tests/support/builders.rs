use serde_json::{json, Value};

/// A Sub-Request as it appears on the wire.
pub fn sub_request(request_id: i64, method: &str, relative_url: &str, body: Option<Value>) -> Value {
    let mut request = json!({
        "requestId": request_id,
        "method": method,
        "relativeUrl": relative_url,
        "headers": [{ "name": "Content-Type", "value": "application/json" }]
    });
    if let Some(body) = body {
        request["body"] = Value::String(body.to_string());
    }
    request
}

pub fn get(request_id: i64, relative_url: &str) -> Value {
    sub_request(request_id, "GET", relative_url, None)
}

pub fn post(request_id: i64, relative_url: &str, body: Value) -> Value {
    sub_request(request_id, "POST", relative_url, Some(body))
}

pub fn put(request_id: i64, relative_url: &str, body: Value) -> Value {
    sub_request(request_id, "PUT", relative_url, Some(body))
}

/// Attach a parent reference to a Sub-Request.
pub fn referencing(mut request: Value, parent_id: i64) -> Value {
    request["reference"] = json!(parent_id);
    request
}

pub fn new_client(external_id: &str) -> Value {
    json!({
        "firstname": "Ada",
        "lastname": "Lovelace",
        "officeId": 1,
        "externalId": external_id,
        "active": true
    })
}

pub fn new_loan(client_id: Value, principal: f64) -> Value {
    json!({
        "clientId": client_id,
        "productId": 1,
        "principal": principal,
        "loanType": "individual"
    })
}
