//! Portico batch engine
//!
//! Executes an ordered list of Sub-Requests submitted in one call:
//!
//! - [`url`] decomposes relative URLs into path segments and query parameters
//! - [`routing`] resolves `(method, relative URL)` to exactly one route, rejecting ambiguous
//!   route tables when they are built
//! - [`catalog`] is the default route table
//! - [`strategy`] binds routes to [`handler::ResourceHandler`]s
//! - [`reference`] feeds earlier responses into later requests
//! - [`executor`] runs the batch independently or inside one [`transaction::Transaction`]
//!
//! ```no_run
//! use std::sync::Arc;
//! use portico_batch::{
//!     BatchExecutor, ExecutionMode, ExecutorOptions, HandlerSet, NoTransactions, RouterBuilder,
//!     SubRequest,
//! };
//!
//! # async fn run(handlers: HandlerSet) -> portico_batch::Result<()> {
//! let registry = RouterBuilder::catalog().handlers(handlers).build()?;
//! let executor = BatchExecutor::new(
//!     Arc::new(registry),
//!     Arc::new(NoTransactions),
//!     ExecutorOptions::default(),
//! );
//! let result = executor
//!     .run(vec![SubRequest::new(1, "GET", "loans/1")], ExecutionMode::Independent)
//!     .await?;
//! assert_eq!(result.responses[0].request_id, 1);
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod error;
pub mod executor;
pub mod handler;
pub mod model;
pub mod reference;
pub mod routing;
pub mod strategy;
pub mod transaction;
pub mod url;

pub use catalog::Operation;
pub use error::{error_body, Error, Result};
pub use executor::{BatchExecutor, ExecutionHook, ExecutorOptions};
pub use handler::{
    DomainError, HandlerInvocation, HandlerSet, PathArgs, PathValue, ResourceFamily,
    ResourceHandler,
};
pub use model::{
    BatchContext, BatchResult, ExecutionMode, Header, Method, SubRequest, SubResponse,
    TransactionOutcome,
};
pub use routing::{CommandRule, Resolution, RouteDescriptor, RouteMatch, RouteRegistry};
pub use strategy::{CommandStrategy, HandlerStrategy, RouterBuilder, StrategyCall};
pub use transaction::{NoTransactions, Transaction, TransactionBoundary};
pub use url::QueryParams;
