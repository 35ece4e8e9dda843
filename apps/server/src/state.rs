//! Shared application state

use std::sync::Arc;

use portico_batch::{BatchExecutor, RouterBuilder};

use crate::config::Config;
use crate::metrics::BatchMetricsHook;
use crate::resources::handler_set;
use crate::store::{MemoryStore, MemoryTransactionBoundary};
use crate::Result;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub executor: Arc<BatchExecutor>,
    pub store: MemoryStore,
}

impl AppState {
    /// Wire the catalog routes to the in-memory handlers.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_store(config, MemoryStore::new())
    }

    pub fn with_store(config: Config, store: MemoryStore) -> Result<Self> {
        let registry = RouterBuilder::catalog()
            .handlers(handler_set(&store))
            .build()?;

        tracing::info!(routes = registry.len(), "Route registry built");

        let executor = BatchExecutor::new(
            Arc::new(registry),
            Arc::new(MemoryTransactionBoundary::new(store.clone())),
            config.batch.executor_options(),
        )
        .with_hook(Arc::new(BatchMetricsHook));

        Ok(Self {
            config: Arc::new(config),
            executor: Arc::new(executor),
            store,
        })
    }
}
