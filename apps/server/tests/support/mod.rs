pub mod assertions;
pub mod builders;

use anyhow::Context as _;
use axum::{
    body::{Body, Bytes},
    http::{HeaderMap, Method, Request, StatusCode},
    Router,
};
use portico::{api::create_router, AppState, Config};
use serde_json::Value;
use tower::ServiceExt as _;

pub use assertions::*;
pub use builders::*;

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

impl TestApp {
    pub fn new() -> anyhow::Result<Self> {
        Self::new_with_config(|_| {})
    }

    pub fn new_with_config(configure: impl FnOnce(&mut Config)) -> anyhow::Result<Self> {
        let mut config = Config::default();
        configure(&mut config);

        let state = AppState::new(config).context("initialize AppState")?;
        let router = create_router(state.clone());

        Ok(Self { router, state })
    }

    pub async fn request(
        &self,
        method: Method,
        path_and_query: &str,
        body: Option<Bytes>,
    ) -> anyhow::Result<(StatusCode, HeaderMap, Bytes)> {
        let request = Request::builder()
            .method(method)
            .uri(path_and_query)
            .header("host", "example.org")
            .header("accept", "application/json")
            .header("content-type", "application/json")
            .body(match body {
                Some(bytes) => Body::from(bytes),
                None => Body::empty(),
            })
            .context("build request")?;

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .context("dispatch request")?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .context("read response body")?;

        Ok((status, headers, body))
    }

    /// POST a batch; `enclosing` becomes the `enclosingTransaction` query parameter when set.
    pub async fn batch(
        &self,
        requests: &Value,
        enclosing: Option<bool>,
    ) -> anyhow::Result<(StatusCode, HeaderMap, Value)> {
        let uri = match enclosing {
            Some(flag) => format!("/api/v1/batches?enclosingTransaction={flag}"),
            None => "/api/v1/batches".to_string(),
        };
        let (status, headers, body) = self
            .request(Method::POST, &uri, Some(to_json_body(requests)?))
            .await?;
        let json = serde_json::from_slice(&body)
            .with_context(|| format!("parse batch response: {}", String::from_utf8_lossy(&body)))?;
        Ok((status, headers, json))
    }

    /// Run a single GET through a fresh independent batch and return its Sub-Response.
    pub async fn get(&self, relative_url: &str) -> anyhow::Result<Value> {
        let (status, _headers, body) = self
            .batch(&Value::Array(vec![get(1, relative_url)]), Some(false))
            .await?;
        assert_status(status, StatusCode::OK, "lookup batch");
        let responses = responses(&body)?;
        responses
            .first()
            .cloned()
            .context("lookup batch returned no response")
    }
}

pub fn to_json_body(value: &Value) -> anyhow::Result<Bytes> {
    Ok(Bytes::from(serde_json::to_vec(value)?))
}
