//! Per-request context injected by middleware.

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    /// `X-Request-Id` sent by the client, when present.
    pub client_request_id: Option<String>,
}
