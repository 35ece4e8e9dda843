//! Command strategies
//!
//! A strategy is bound to one route. It turns raw captures into typed arguments, invokes its
//! Resource Handler and reports either a body or an error.

use std::sync::Arc;

use async_trait::async_trait;

use crate::catalog::{self, Operation};
use crate::error::{Error, Result};
use crate::handler::{HandlerInvocation, HandlerSet, PathArgs, PathValue, ResourceHandler};
use crate::model::{BatchContext, Header, Method};
use crate::routing::pattern::is_decimal;
use crate::routing::{Captured, MatchedParams, RouteDescriptor, RouteRegistry};
use crate::url::{strip_query_suffix, QueryParams};

/// Input of a strategy execution.
#[derive(Debug, Clone)]
pub struct StrategyCall {
    pub batch: BatchContext,
    pub request_id: i64,
    pub method: Method,
    pub params: MatchedParams,
    pub query: QueryParams,
    pub command: Option<String>,
    pub headers: Vec<Header>,
    pub body: String,
}

#[async_trait]
pub trait CommandStrategy: Send + Sync {
    fn operation(&self) -> Operation;

    /// Run the operation, returning the Sub-Response body on success.
    async fn execute(&self, call: StrategyCall) -> Result<String>;
}

/// Strategy that forwards to a [`ResourceHandler`].
pub struct HandlerStrategy {
    operation: Operation,
    handler: Arc<dyn ResourceHandler>,
}

impl HandlerStrategy {
    pub fn new(operation: Operation, handler: Arc<dyn ResourceHandler>) -> Self {
        Self { operation, handler }
    }
}

#[async_trait]
impl CommandStrategy for HandlerStrategy {
    fn operation(&self) -> Operation {
        self.operation
    }

    async fn execute(&self, call: StrategyCall) -> Result<String> {
        let path = typed_path_args(&call.params)?;
        let invocation = HandlerInvocation {
            batch: call.batch,
            request_id: call.request_id,
            operation: self.operation,
            method: call.method,
            path,
            query: call.query,
            command: call.command,
            headers: call.headers,
            body: call.body,
        };
        self.handler.handle(invocation).await.map_err(Error::Handler)
    }
}

/// Convert raw captures into typed path arguments.
///
/// Numeric identifiers must be decimal `i64` values once any glued query suffix is removed;
/// external identifiers and tokens are kept as given.
pub fn typed_path_args(params: &MatchedParams) -> Result<PathArgs> {
    let mut args = PathArgs::new();
    for (name, captured) in params.iter() {
        let value = match captured {
            Captured::Numeric(raw) => {
                let digits = strip_query_suffix(raw);
                let id = is_decimal(digits)
                    .then(|| digits.parse::<i64>().ok())
                    .flatten()
                    .ok_or_else(|| {
                        Error::MalformedRequest(format!(
                            "{name} '{raw}' is not a valid numeric identifier"
                        ))
                    })?;
                PathValue::Id(id)
            }
            Captured::ExternalId(raw) => PathValue::ExternalId(strip_query_suffix(raw).to_string()),
            Captured::Token(raw) => PathValue::Token(strip_query_suffix(raw).to_string()),
            Captured::Rest(raw) => PathValue::Rest(raw.clone()),
        };
        args.push(name, value);
    }
    Ok(args)
}

/// Builds a [`RouteRegistry`] from route descriptors and the handlers bound to their families.
#[derive(Default)]
pub struct RouterBuilder {
    descriptors: Vec<RouteDescriptor>,
    handlers: HandlerSet,
    custom: Vec<(RouteDescriptor, Arc<dyn CommandStrategy>)>,
}

impl RouterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from the default route catalog.
    pub fn catalog() -> Self {
        Self {
            descriptors: catalog::routes().to_vec(),
            ..Self::default()
        }
    }

    pub fn handlers(mut self, handlers: HandlerSet) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn route(mut self, descriptor: RouteDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Register a route with its own strategy instead of a family handler.
    pub fn with_route(
        mut self,
        descriptor: RouteDescriptor,
        strategy: Arc<dyn CommandStrategy>,
    ) -> Self {
        self.custom.push((descriptor, strategy));
        self
    }

    /// Bind descriptors to handlers and validate the resulting table.
    ///
    /// Descriptors without a handler for their `(method, family)` are left out, so requests
    /// for them answer as not implemented.
    pub fn build(self) -> Result<RouteRegistry> {
        let mut entries: Vec<(RouteDescriptor, Arc<dyn CommandStrategy>)> =
            Vec::with_capacity(self.descriptors.len() + self.custom.len());

        for descriptor in self.descriptors {
            let family = descriptor.operation.family();
            match self.handlers.get(descriptor.method, family) {
                Some(handler) => {
                    let strategy: Arc<dyn CommandStrategy> =
                        Arc::new(HandlerStrategy::new(descriptor.operation, handler));
                    entries.push((descriptor, strategy));
                }
                None => {
                    tracing::warn!(
                        route = %descriptor,
                        family = %family,
                        "No handler bound; route will answer as not implemented"
                    );
                }
            }
        }

        entries.extend(self.custom);
        RouteRegistry::new(entries)
    }
}
