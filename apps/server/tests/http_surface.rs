#[allow(unused)]
mod support;

use axum::{
    body::Bytes,
    http::{Method, StatusCode},
};
use serde_json::{json, Value};
use support::*;

#[tokio::test]
async fn health_and_root() -> anyhow::Result<()> {
    let app = TestApp::new()?;

    let (status, _headers, body) = app.request(Method::GET, "/health", None).await?;
    assert_status(status, StatusCode::OK, "health");
    let health: Value = serde_json::from_slice(&body)?;
    assert_eq!(health["status"], json!("ok"));

    let (status, _headers, body) = app.request(Method::GET, "/", None).await?;
    assert_status(status, StatusCode::OK, "root");
    let root: Value = serde_json::from_slice(&body)?;
    assert!(root["routes"].as_u64().is_some_and(|n| n > 0));
    Ok(())
}

#[tokio::test]
async fn route_table_lists_commands() -> anyhow::Result<()> {
    let app = TestApp::new()?;
    let (status, _headers, body) = app
        .request(Method::GET, "/api/v1/batches/routes", None)
        .await?;
    assert_status(status, StatusCode::OK, "routes");

    let routes: Vec<Value> = serde_json::from_slice(&body)?;
    let transition = routes
        .iter()
        .find(|r| r["method"] == json!("POST") && r["pattern"] == json!("clients/{clientId#}"))
        .expect("client transition route");
    assert_eq!(transition["family"], json!("clients"));
    assert!(transition["commands"]
        .as_array()
        .is_some_and(|c| c.contains(&json!("activate"))));

    let create = routes
        .iter()
        .find(|r| r["method"] == json!("POST") && r["pattern"] == json!("clients"))
        .expect("client create route");
    assert!(create.get("commands").is_none());
    Ok(())
}

#[tokio::test]
async fn request_id_is_echoed() -> anyhow::Result<()> {
    let app = TestApp::new()?;
    let (_status, headers, _body) = app.request(Method::GET, "/health", None).await?;
    assert!(headers.get("x-request-id").is_some());
    Ok(())
}

#[tokio::test]
async fn metrics_are_exposed_after_a_batch() -> anyhow::Result<()> {
    let app = TestApp::new()?;
    app.batch(&json!([get(1, "clients/1")]), Some(false)).await?;

    let (status, _headers, body) = app.request(Method::GET, "/metrics", None).await?;
    assert_status(status, StatusCode::OK, "metrics");
    let text = String::from_utf8(body.to_vec())?;
    assert!(text.contains("portico_batch_calls_total"));
    assert!(text.contains("portico_sub_responses_total"));
    Ok(())
}

#[tokio::test]
async fn malformed_body_is_rejected() -> anyhow::Result<()> {
    let app = TestApp::new()?;
    let (status, _headers, body) = app
        .request(
            Method::POST,
            "/api/v1/batches",
            Some(Bytes::from_static(b"{\"requestId\": 1}")),
        )
        .await?;

    assert_status(status, StatusCode::BAD_REQUEST, "object instead of array");
    let error: Value = serde_json::from_slice(&body)?;
    assert_eq!(error["httpStatusCode"], json!("400"));
    Ok(())
}

#[tokio::test]
async fn invalid_flag_is_rejected() -> anyhow::Result<()> {
    let app = TestApp::new()?;
    let (status, _headers, _body) = app
        .request(
            Method::POST,
            "/api/v1/batches?enclosingTransaction=maybe",
            Some(to_json_body(&json!([]))?),
        )
        .await?;
    assert_status(status, StatusCode::BAD_REQUEST, "bad flag");

    let (status, _headers, _body) = app
        .request(
            Method::POST,
            "/api/v1/batches?enclosingTransaction=TRUE",
            Some(to_json_body(&json!([]))?),
        )
        .await?;
    assert_status(status, StatusCode::OK, "uppercase flag");
    Ok(())
}

#[tokio::test]
async fn oversized_batch_is_rejected_whole() -> anyhow::Result<()> {
    let app = TestApp::new_with_config(|config| config.batch.max_requests = Some(2))?;
    let batch = json!([
        post(1, "clients", new_client("c-1")),
        post(2, "clients", new_client("c-2")),
        post(3, "clients", new_client("c-3")),
    ]);

    let (status, _headers, _body) = app
        .request(Method::POST, "/api/v1/batches", Some(to_json_body(&batch)?))
        .await?;
    assert_status(status, StatusCode::BAD_REQUEST, "too many requests");

    // Nothing ran.
    assert_eq!(app.get("clients/1").await?["statusCode"], json!(404));
    Ok(())
}

#[tokio::test]
async fn duplicate_request_ids_are_rejected() -> anyhow::Result<()> {
    let app = TestApp::new()?;
    let batch = json!([get(1, "clients/1"), get(1, "clients/2")]);

    let (status, _headers, _body) = app
        .request(Method::POST, "/api/v1/batches", Some(to_json_body(&batch)?))
        .await?;
    assert_status(status, StatusCode::BAD_REQUEST, "duplicate requestId");
    Ok(())
}
