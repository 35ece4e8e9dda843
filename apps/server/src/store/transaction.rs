//! Transaction boundary over the in-memory store

use async_trait::async_trait;
use uuid::Uuid;

use portico_batch::{BatchContext, Error as BatchError, Transaction, TransactionBoundary};

use super::MemoryStore;

/// Opens enclosing transactions on a [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct MemoryTransactionBoundary {
    store: MemoryStore,
}

impl MemoryTransactionBoundary {
    pub fn new(store: MemoryStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TransactionBoundary for MemoryTransactionBoundary {
    async fn begin(&self, batch: &BatchContext) -> portico_batch::Result<Box<dyn Transaction>> {
        self.store
            .begin(batch)
            .await
            .map_err(BatchError::Transaction)?;

        tracing::debug!(batch_id = %batch.batch_id, "Transaction opened");
        Ok(Box::new(MemoryTransaction {
            store: Some(self.store.clone()),
            batch_id: batch.batch_id,
        }))
    }
}

/// An open transaction. Dropping it unfinished rolls back.
#[derive(Debug)]
pub struct MemoryTransaction {
    store: Option<MemoryStore>,
    batch_id: Uuid,
}

impl MemoryTransaction {
    fn finish(&mut self, commit: bool) -> portico_batch::Result<()> {
        let store = self
            .store
            .take()
            .ok_or_else(|| BatchError::Transaction("transaction already finished".to_string()))?;
        store
            .finish(self.batch_id, commit)
            .map_err(BatchError::Transaction)?;

        let outcome = if commit { "commit" } else { "rollback" };
        tracing::debug!(batch_id = %self.batch_id, outcome, "Transaction closed");
        Ok(())
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn commit(mut self: Box<Self>) -> portico_batch::Result<()> {
        self.finish(true)
    }

    async fn rollback(mut self: Box<Self>) -> portico_batch::Result<()> {
        self.finish(false)
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if self.store.is_some() {
            tracing::warn!(batch_id = %self.batch_id, "Transaction dropped while open; rolling back");
            if let Err(e) = self.finish(false) {
                tracing::error!(batch_id = %self.batch_id, error = %e, "Rollback on drop failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let store = MemoryStore::new();
        let boundary = MemoryTransactionBoundary::new(store.clone());
        let batch = BatchContext::new();

        let tx = boundary.begin(&batch).await.unwrap();
        store
            .write(&batch, |t| t.insert("loans", json!({})))
            .await;
        drop(tx);

        assert!(!store.in_transaction());
        assert_eq!(store.read(&BatchContext::new(), |t| t.len("loans")).await, 0);
    }

    #[tokio::test]
    async fn commit_keeps_writes() {
        let store = MemoryStore::new();
        let boundary = MemoryTransactionBoundary::new(store.clone());
        let batch = BatchContext::new();

        let tx = boundary.begin(&batch).await.unwrap();
        store
            .write(&batch, |t| t.insert("loans", json!({})))
            .await;
        tx.commit().await.unwrap();

        assert_eq!(store.read(&BatchContext::new(), |t| t.len("loans")).await, 1);
    }

    #[tokio::test]
    async fn a_batch_cannot_open_two_transactions() {
        let store = MemoryStore::new();
        let boundary = MemoryTransactionBoundary::new(store);
        let batch = BatchContext::new();

        let _tx = boundary.begin(&batch).await.unwrap();
        assert!(matches!(
            boundary.begin(&batch).await,
            Err(BatchError::Transaction(_))
        ));
    }
}
