//! Shared fakes for engine tests
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use portico_batch::{
    BatchContext, BatchExecutor, DomainError, ExecutorOptions, HandlerInvocation, HandlerSet,
    ResourceFamily, ResourceHandler, RouteRegistry, RouterBuilder, Transaction,
    TransactionBoundary,
};

/// Handler that records every invocation and echoes what it received.
///
/// A JSON body with `"fail": <status>` makes it answer with that status; `"sleepMs": <n>`
/// delays the answer.
#[derive(Default)]
pub struct RecordingHandler {
    calls: Mutex<Vec<HandlerInvocation>>,
}

impl RecordingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<HandlerInvocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn request_ids(&self) -> Vec<i64> {
        self.calls().iter().map(|c| c.request_id).collect()
    }
}

#[async_trait]
impl ResourceHandler for RecordingHandler {
    async fn handle(&self, invocation: HandlerInvocation) -> Result<String, DomainError> {
        self.calls.lock().unwrap().push(invocation.clone());

        let body: Value = serde_json::from_str(&invocation.body).unwrap_or(Value::Null);
        if let Some(ms) = body.get("sleepMs").and_then(Value::as_u64) {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        if let Some(status) = body.get("fail").and_then(Value::as_u64) {
            return Err(DomainError::new(
                status as u16,
                json!({"failedRequest": invocation.request_id}).to_string(),
            ));
        }

        let path: serde_json::Map<String, Value> = invocation
            .path
            .iter()
            .map(|(name, value)| (name.to_string(), Value::String(format!("{value:?}"))))
            .collect();

        Ok(json!({
            "requestId": invocation.request_id,
            "operation": invocation.operation.as_str(),
            "resourceId": invocation.request_id * 100,
            "command": invocation.command,
            "path": path,
        })
        .to_string())
    }
}

pub fn all_families(handler: Arc<RecordingHandler>) -> HandlerSet {
    let mut handlers = HandlerSet::new();
    for family in ResourceFamily::ALL {
        handlers.insert_family(family, handler.clone());
    }
    handlers
}

pub fn catalog_registry(handler: Arc<RecordingHandler>) -> RouteRegistry {
    RouterBuilder::catalog()
        .handlers(all_families(handler))
        .build()
        .expect("catalog builds without ambiguity")
}

/// Boundary that records begin, commit, rollback and drop-without-finish.
#[derive(Clone, Default)]
pub struct RecordingBoundary {
    events: Arc<Mutex<Vec<String>>>,
    fail_commit: bool,
}

impl RecordingBoundary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_commit() -> Self {
        Self {
            fail_commit: true,
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransactionBoundary for RecordingBoundary {
    async fn begin(&self, batch: &BatchContext) -> portico_batch::Result<Box<dyn Transaction>> {
        self.events.lock().unwrap().push("begin".into());
        Ok(Box::new(RecordingTransaction {
            events: self.events.clone(),
            batch: *batch,
            fail_commit: self.fail_commit,
            finished: false,
        }))
    }
}

struct RecordingTransaction {
    events: Arc<Mutex<Vec<String>>>,
    batch: BatchContext,
    fail_commit: bool,
    finished: bool,
}

#[async_trait]
impl Transaction for RecordingTransaction {
    async fn commit(mut self: Box<Self>) -> portico_batch::Result<()> {
        self.finished = true;
        if self.fail_commit {
            self.events.lock().unwrap().push("commit-failed".into());
            return Err(portico_batch::Error::Transaction("commit refused".into()));
        }
        self.events.lock().unwrap().push("commit".into());
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> portico_batch::Result<()> {
        self.finished = true;
        self.events.lock().unwrap().push("rollback".into());
        Ok(())
    }
}

impl Drop for RecordingTransaction {
    fn drop(&mut self) {
        if !self.finished {
            self.events
                .lock()
                .unwrap()
                .push(format!("dropped:{}", self.batch.batch_id));
        }
    }
}

pub fn executor(
    handler: Arc<RecordingHandler>,
    boundary: RecordingBoundary,
    options: ExecutorOptions,
) -> BatchExecutor {
    BatchExecutor::new(
        Arc::new(catalog_registry(handler)),
        Arc::new(boundary),
        options,
    )
}
