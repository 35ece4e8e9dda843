#[allow(unused)]
mod support;

use axum::http::StatusCode;
use serde_json::{json, Value};
use support::*;

#[tokio::test]
async fn every_item_gets_a_response_in_submission_order() -> anyhow::Result<()> {
    let app = TestApp::new()?;
    let batch = json!([
        post(7, "clients", new_client("c-1")),
        get(3, "clients/1"),
        post(5, "clients", new_client("c-2")),
    ]);

    let (status, headers, body) = app.batch(&batch, Some(false)).await?;

    assert_status(status, StatusCode::OK, "batch");
    assert!(headers.get("x-transaction-outcome").is_none());
    assert_eq!(request_ids(&body)?, vec![7, 3, 5]);
    assert_eq!(status_codes(&body)?, vec![200, 200, 200]);

    let created = sub_body(&responses(&body)?[2])?;
    assert_eq!(created["resourceId"], json!(2));
    assert_eq!(created["clientId"], json!(2));
    Ok(())
}

#[tokio::test]
async fn failures_do_not_stop_later_items() -> anyhow::Result<()> {
    let app = TestApp::new()?;
    let batch = json!([
        get(1, "clients/42"),
        get(2, "unknown/resource"),
        post(3, "clients", new_client("c-1")),
    ]);

    let (status, _headers, body) = app.batch(&batch, None).await?;

    assert_status(status, StatusCode::OK, "batch");
    assert_eq!(status_codes(&body)?, vec![404, 501, 200]);

    let items = responses(&body)?;
    assert_eq!(
        developer_message(&items[0])?,
        "Client with identifier 42 does not exist"
    );
    assert_eq!(
        items[1]["body"],
        json!("Resource with method GET and relativeUrl unknown/resource doesn't exist")
    );

    // The successful item is visible to later batches.
    let lookup = app.get("clients/1").await?;
    assert_eq!(lookup["statusCode"], json!(200));
    assert_eq!(sub_body(&lookup)?["externalId"], json!("c-1"));
    Ok(())
}

#[tokio::test]
async fn earlier_writes_are_visible_to_later_items() -> anyhow::Result<()> {
    let app = TestApp::new()?;
    let batch = json!([
        post(1, "clients", new_client("c-1")),
        post(2, "loans", new_loan(json!(1), 1000.0)),
        post(3, "loans/1?command=approve", json!({ "approvedOnDate": "2026-01-10" })),
        post(4, "loans/1?command=disburse", json!({ "actualDisbursementDate": "2026-01-11" })),
        post(5, "loans/1/transactions?command=repayment", json!({ "transactionAmount": 250 })),
        get(6, "loans/1"),
    ]);

    let (_status, _headers, body) = app.batch(&batch, Some(false)).await?;

    assert_eq!(status_codes(&body)?, vec![200; 6]);
    let loan = sub_body(&responses(&body)?[5])?;
    assert_eq!(loan["status"], json!("active"));
    assert_eq!(loan["principalOutstanding"].as_f64(), Some(750.0));
    Ok(())
}

#[tokio::test]
async fn commands_are_routed_by_query_parameter() -> anyhow::Result<()> {
    let app = TestApp::new()?;
    let batch = json!([
        post(1, "clients", json!({ "firstname": "Grace", "officeId": 1 })),
        post(2, "clients/1?command=activate", json!({ "activationDate": "2026-02-01" })),
        post(3, "clients/1?command=activate", json!({ "activationDate": "2026-02-01" })),
        post(4, "clients/1?command=hibernate", json!({})),
    ]);

    let (_status, _headers, body) = app.batch(&batch, Some(false)).await?;

    // Activating twice is a state error; an unknown command has no route.
    assert_eq!(status_codes(&body)?, vec![200, 200, 403, 501]);
    let client = app.get("clients/1").await?;
    assert_eq!(sub_body(&client)?["status"], json!("active"));
    Ok(())
}

#[tokio::test]
async fn sub_responses_carry_content_type() -> anyhow::Result<()> {
    let app = TestApp::new()?;
    let (_status, _headers, body) = app
        .batch(&json!([post(1, "clients", new_client("c-1"))]), None)
        .await?;

    let headers = responses(&body)?[0]["headers"]
        .as_array()
        .cloned()
        .unwrap_or_default();
    assert!(headers.iter().any(|h| {
        h["name"] == json!("Content-Type")
            && h["value"].as_str().is_some_and(|v| v.starts_with("application/json"))
    }));
    Ok(())
}

#[tokio::test]
async fn empty_batch_returns_empty_list() -> anyhow::Result<()> {
    let app = TestApp::new()?;
    let (status, _headers, body) = app.batch(&json!([]), Some(true)).await?;

    assert_status(status, StatusCode::OK, "empty batch");
    assert_eq!(body, Value::Array(Vec::new()));
    Ok(())
}

#[tokio::test]
async fn disbursed_loan_can_be_marked_as_fraud() -> anyhow::Result<()> {
    let app = TestApp::new()?;
    let batch = json!([
        post(1, "clients", new_client("c-1")),
        referencing(post(2, "loans", new_loan(json!("$.clientId"), 1000.0)), 1),
        referencing(post(3, "loans/$.loanId?command=approve", json!({})), 2),
        referencing(post(4, "loans/$.loanId?command=disburse", json!({})), 3),
        referencing(put(5, "loans/$.loanId?command=markAsFraud", json!({ "fraud": "true" })), 4),
    ]);

    let (status, _headers, body) = app.batch(&batch, Some(false)).await?;

    assert_status(status, StatusCode::OK, "batch");
    assert_eq!(status_codes(&body)?, vec![200; 5]);
    let update = sub_body(&responses(&body)?[4])?;
    assert_eq!(update["changes"]["fraud"], json!(true));

    let loan = sub_body(&app.get("loans/1").await?)?;
    assert_eq!(loan["fraud"], json!(true));
    assert_eq!(loan["status"], json!("active"));
    Ok(())
}
