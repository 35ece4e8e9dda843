//! Batch Executor
//!
//! Runs a batch in submission order and correlates every Sub-Response with its Sub-Request.
//! Independent mode executes every item whatever happens to its neighbours. Enclosing mode
//! wraps the batch in one transaction and stops at the first failed item.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::catalog::Operation;
use crate::error::{Error, Result};
use crate::model::{
    BatchContext, BatchResult, ExecutionMode, Method, SubRequest, SubResponse, TransactionOutcome,
};
use crate::reference;
use crate::routing::{Resolution, RouteRegistry};
use crate::strategy::StrategyCall;
use crate::transaction::{Transaction, TransactionBoundary};

/// Limits applied to every call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutorOptions {
    /// Largest accepted batch; `None` means unbounded.
    pub max_requests: Option<usize>,
    /// Deadline for an enclosing transaction.
    pub transaction_timeout: Option<Duration>,
}

/// Observer notified after each Sub-Response is produced.
pub trait ExecutionHook: Send + Sync {
    /// `operation` is `None` when the item never reached a strategy.
    fn on_response(&self, mode: ExecutionMode, operation: Option<Operation>, response: &SubResponse);
}

pub struct BatchExecutor {
    registry: Arc<RouteRegistry>,
    boundary: Arc<dyn TransactionBoundary>,
    options: ExecutorOptions,
    hooks: Vec<Arc<dyn ExecutionHook>>,
}

impl BatchExecutor {
    pub fn new(
        registry: Arc<RouteRegistry>,
        boundary: Arc<dyn TransactionBoundary>,
        options: ExecutorOptions,
    ) -> Self {
        Self {
            registry,
            boundary,
            options,
            hooks: Vec::new(),
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn ExecutionHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn registry(&self) -> &RouteRegistry {
        &self.registry
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    /// Execute a batch.
    ///
    /// Returns one Sub-Response per executed item, in submission order. Only call-level
    /// failures (invalid batch, transaction boundary errors, timeout) are returned as `Err`.
    pub async fn run(&self, requests: Vec<SubRequest>, mode: ExecutionMode) -> Result<BatchResult> {
        self.validate(&requests)?;

        if requests.is_empty() {
            return Ok(BatchResult {
                responses: Vec::new(),
                transaction: TransactionOutcome::NotRequested,
            });
        }

        let batch = BatchContext::new();
        let started = Instant::now();

        let result = match mode {
            ExecutionMode::Independent => Ok(BatchResult {
                responses: self.run_independent(&batch, &requests).await,
                transaction: TransactionOutcome::NotRequested,
            }),
            ExecutionMode::EnclosingTransaction => self.run_enclosing(&batch, &requests).await,
        };

        match &result {
            Ok(outcome) => {
                let failed = outcome.responses.iter().filter(|r| !r.is_success()).count();
                tracing::info!(
                    batch_id = %batch.batch_id,
                    mode = mode.as_str(),
                    requests = requests.len(),
                    responses = outcome.len(),
                    failed,
                    transaction = outcome.transaction.as_str(),
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Batch completed"
                );
            }
            Err(e) => {
                tracing::warn!(
                    batch_id = %batch.batch_id,
                    mode = mode.as_str(),
                    requests = requests.len(),
                    error = %e,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Batch failed"
                );
            }
        }

        result
    }

    fn validate(&self, requests: &[SubRequest]) -> Result<()> {
        if let Some(max) = self.options.max_requests {
            if requests.len() > max {
                return Err(Error::InvalidBatch(format!(
                    "Batch contains {} requests; at most {max} are allowed",
                    requests.len()
                )));
            }
        }

        let mut seen = HashSet::with_capacity(requests.len());
        for request in requests {
            if !seen.insert(request.request_id) {
                return Err(Error::InvalidBatch(format!(
                    "Duplicate requestId {} in batch",
                    request.request_id
                )));
            }
        }
        Ok(())
    }

    async fn run_independent(
        &self,
        batch: &BatchContext,
        requests: &[SubRequest],
    ) -> Vec<SubResponse> {
        let mut responses = Vec::with_capacity(requests.len());
        for request in requests {
            let response = self
                .execute_in_mode(batch, request, &responses, ExecutionMode::Independent)
                .await;
            responses.push(response);
        }
        responses
    }

    async fn run_enclosing(
        &self,
        batch: &BatchContext,
        requests: &[SubRequest],
    ) -> Result<BatchResult> {
        let transaction = self
            .boundary
            .begin(batch)
            .await
            .map_err(into_transaction_error)?;

        let mut responses = Vec::with_capacity(requests.len());
        let iteration = self.run_until_failure(batch, requests, &mut responses);

        let completed = match self.options.transaction_timeout {
            Some(limit) => tokio::time::timeout(limit, iteration)
                .await
                .map_err(|_| Error::Timeout(limit)),
            None => Ok(iteration.await),
        };

        let outcome = match completed {
            Ok(Ok(())) => {
                transaction.commit().await.map_err(into_transaction_error)?;
                TransactionOutcome::Committed
            }
            Ok(Err(Error::TransactionAborted { request_id })) => {
                transaction.rollback().await.map_err(into_transaction_error)?;
                TransactionOutcome::RolledBack {
                    failed_request_id: request_id,
                }
            }
            Ok(Err(other)) | Err(other) => {
                abandon(transaction, batch).await;
                return Err(other);
            }
        };

        Ok(BatchResult {
            responses,
            transaction: outcome,
        })
    }

    /// Execute items until one fails; the failed item's response is kept as the last entry.
    async fn run_until_failure(
        &self,
        batch: &BatchContext,
        requests: &[SubRequest],
        responses: &mut Vec<SubResponse>,
    ) -> Result<()> {
        for request in requests {
            let response = self
                .execute_in_mode(batch, request, responses, ExecutionMode::EnclosingTransaction)
                .await;
            let success = response.is_success();
            responses.push(response);
            if !success {
                return Err(Error::TransactionAborted {
                    request_id: request.request_id,
                });
            }
        }
        Ok(())
    }

    /// Execute a single Sub-Request. Never fails: every error becomes a Sub-Response.
    ///
    /// `earlier` holds the Sub-Responses already produced in the same batch, used to resolve
    /// references.
    pub async fn execute_one(
        &self,
        batch: &BatchContext,
        request: &SubRequest,
        earlier: &[SubResponse],
    ) -> SubResponse {
        self.execute_in_mode(batch, request, earlier, ExecutionMode::Independent)
            .await
    }

    async fn execute_in_mode(
        &self,
        batch: &BatchContext,
        request: &SubRequest,
        earlier: &[SubResponse],
        mode: ExecutionMode,
    ) -> SubResponse {
        let (operation, result) = self.dispatch(batch, request, earlier).await;

        let response = match result {
            Ok(body) => SubResponse::ok(request.request_id, body),
            Err(e) => SubResponse::from_error(request.request_id, &e),
        };

        tracing::debug!(
            batch_id = %batch.batch_id,
            request_id = request.request_id,
            method = %request.method,
            relative_url = %request.relative_url,
            operation = operation.map(|o| o.as_str()).unwrap_or("-"),
            status = response.status_code,
            "Sub-request executed"
        );

        for hook in &self.hooks {
            hook.on_response(mode, operation, &response);
        }

        response
    }

    async fn dispatch(
        &self,
        batch: &BatchContext,
        request: &SubRequest,
        earlier: &[SubResponse],
    ) -> (Option<Operation>, Result<String>) {
        let request = match reference::resolve(request, earlier) {
            Ok(resolved) => resolved,
            Err(e) => return (None, Err(e)),
        };

        let not_implemented = || Error::RouteNotImplemented {
            method: request.method.clone(),
            relative_url: request.relative_url.clone(),
        };

        let Ok(method) = request.method.parse::<Method>() else {
            return (None, Err(not_implemented()));
        };

        let route = match self.registry.resolve(method, &request.relative_url) {
            Resolution::Matched(route) => route,
            Resolution::Unmatched => return (None, Err(not_implemented())),
        };

        let operation = route.descriptor.operation;
        let call = StrategyCall {
            batch: *batch,
            request_id: request.request_id,
            method,
            params: route.params,
            query: route.query,
            command: route.command,
            headers: request.headers.clone(),
            body: request.body.clone(),
        };

        (Some(operation), route.strategy.execute(call).await)
    }
}

fn into_transaction_error(error: Error) -> Error {
    match error {
        Error::Transaction(_) => error,
        other => Error::Transaction(other.to_string()),
    }
}

/// Roll back after a fatal error, keeping the original error as the call's result.
async fn abandon(transaction: Box<dyn Transaction>, batch: &BatchContext) {
    if let Err(e) = transaction.rollback().await {
        tracing::warn!(
            batch_id = %batch.batch_id,
            error = %e,
            "Rollback after abandoned batch failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::NoTransactions;

    fn executor(max_requests: Option<usize>) -> BatchExecutor {
        let registry = RouteRegistry::new(Vec::new()).unwrap();
        BatchExecutor::new(
            Arc::new(registry),
            Arc::new(NoTransactions),
            ExecutorOptions {
                max_requests,
                transaction_timeout: None,
            },
        )
    }

    #[tokio::test]
    async fn duplicate_request_ids_are_rejected() {
        let requests = vec![
            SubRequest::new(1, "GET", "loans/1"),
            SubRequest::new(1, "GET", "loans/2"),
        ];
        let err = executor(None)
            .run(requests, ExecutionMode::Independent)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidBatch(_)));
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn oversized_batch_is_rejected() {
        let requests = (1..=3).map(|i| SubRequest::new(i, "GET", "loans/1")).collect();
        let err = executor(Some(2))
            .run(requests, ExecutionMode::Independent)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidBatch(_)));
    }

    #[tokio::test]
    async fn empty_batch_never_opens_a_transaction() {
        let result = executor(None)
            .run(Vec::new(), ExecutionMode::EnclosingTransaction)
            .await
            .unwrap();
        assert!(result.is_empty());
        assert_eq!(result.transaction, TransactionOutcome::NotRequested);
    }

    #[tokio::test]
    async fn unknown_method_is_not_implemented() {
        let response = executor(None)
            .execute_one(&BatchContext::new(), &SubRequest::new(4, "FETCH", "loans/1"), &[])
            .await;
        assert_eq!(response.request_id, 4);
        assert_eq!(response.status_code, 501);
        assert_eq!(
            response.body,
            "Resource with method FETCH and relativeUrl loans/1 doesn't exist"
        );
    }

    #[tokio::test]
    async fn begin_failure_is_fatal() {
        let err = executor(None)
            .run(
                vec![SubRequest::new(1, "GET", "loans/1")],
                ExecutionMode::EnclosingTransaction,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transaction(_)));
        assert_eq!(err.status_code(), 500);
    }
}
