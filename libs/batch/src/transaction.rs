//! Transaction boundary contract
//!
//! The executor only needs to begin, commit and roll back. How writes participate in the
//! transaction is up to the host: the [`BatchContext`] handed to `begin` is also present on
//! every handler invocation of the same batch.

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::model::BatchContext;

#[async_trait]
pub trait TransactionBoundary: Send + Sync {
    /// Open the enclosing transaction of a batch.
    async fn begin(&self, batch: &BatchContext) -> Result<Box<dyn Transaction>>;
}

/// An open transaction.
///
/// Implementations roll back when dropped without `commit` or `rollback`, which is what
/// happens when the host cancels a batch mid-flight.
#[async_trait]
pub trait Transaction: Send {
    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Boundary for hosts without transaction support; enclosing mode always fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTransactions;

#[async_trait]
impl TransactionBoundary for NoTransactions {
    async fn begin(&self, _batch: &BatchContext) -> Result<Box<dyn Transaction>> {
        Err(Error::Transaction(
            "enclosing transactions are not supported by this host".to_string(),
        ))
    }
}
