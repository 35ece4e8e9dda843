//! In-memory document store
//!
//! JSON documents grouped in collections, each with sequential numeric ids. At most one
//! transaction is open at a time; it belongs to one batch, and every other batch waits for it
//! to close before reading or writing.

pub mod transaction;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value as JsonValue;
use tokio::sync::Notify;
use uuid::Uuid;

use portico_batch::BatchContext;

pub use transaction::{MemoryTransaction, MemoryTransactionBoundary};

/// One collection of documents keyed by id.
#[derive(Debug, Clone, Default)]
struct Collection {
    last_id: i64,
    documents: BTreeMap<i64, JsonValue>,
}

/// All collections; the unit that is snapshotted when a transaction begins.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    collections: HashMap<String, Collection>,
}

impl Tables {
    /// Store a document, assigning the next id of the collection. Objects get an `id` field.
    pub fn insert(&mut self, collection: &str, mut document: JsonValue) -> i64 {
        let entry = self.collections.entry(collection.to_string()).or_default();
        entry.last_id += 1;
        let id = entry.last_id;
        if let Some(object) = document.as_object_mut() {
            object.insert("id".to_string(), JsonValue::from(id));
        }
        entry.documents.insert(id, document);
        id
    }

    pub fn get(&self, collection: &str, id: i64) -> Option<&JsonValue> {
        self.collections.get(collection)?.documents.get(&id)
    }

    pub fn get_mut(&mut self, collection: &str, id: i64) -> Option<&mut JsonValue> {
        self.collections.get_mut(collection)?.documents.get_mut(&id)
    }

    pub fn remove(&mut self, collection: &str, id: i64) -> Option<JsonValue> {
        self.collections.get_mut(collection)?.documents.remove(&id)
    }

    /// Documents in id order.
    pub fn iter(&self, collection: &str) -> impl Iterator<Item = (i64, &JsonValue)> {
        self.collections
            .get(collection)
            .into_iter()
            .flat_map(|c| c.documents.iter().map(|(id, doc)| (*id, doc)))
    }

    /// First document whose `field` renders as `value`.
    pub fn find_by(&self, collection: &str, field: &str, value: &str) -> Option<(i64, &JsonValue)> {
        self.iter(collection)
            .find(|(_, doc)| doc.get(field).is_some_and(|v| field_matches(v, value)))
    }

    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .get(collection)
            .map_or(0, |c| c.documents.len())
    }
}

/// Compare a JSON scalar with its text form.
pub fn field_matches(value: &JsonValue, text: &str) -> bool {
    match value {
        JsonValue::String(s) => s == text,
        JsonValue::Number(n) => n.to_string() == text,
        JsonValue::Bool(b) => b.to_string() == text,
        _ => false,
    }
}

#[derive(Debug, Default)]
struct StoreState {
    tables: Tables,
    owner: Option<Uuid>,
    snapshot: Option<Tables>,
}

impl StoreState {
    fn accessible_by(&self, batch_id: Uuid) -> bool {
        self.owner.map_or(true, |owner| owner == batch_id)
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: Mutex<StoreState>,
    released: Notify,
}

/// Shared handle to the store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Read the tables on behalf of a batch, waiting while another batch holds a transaction.
    pub async fn read<R>(&self, batch: &BatchContext, f: impl FnOnce(&Tables) -> R) -> R {
        self.write(batch, |tables| f(tables)).await
    }

    /// Modify the tables on behalf of a batch, waiting while another batch holds a transaction.
    pub async fn write<R>(&self, batch: &BatchContext, f: impl FnOnce(&mut Tables) -> R) -> R {
        let mut f = Some(f);
        loop {
            let released = self.inner.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            {
                let mut state = self.lock();
                if state.accessible_by(batch.batch_id) {
                    if let Some(f) = f.take() {
                        return f(&mut state.tables);
                    }
                }
            }

            tracing::trace!(batch_id = %batch.batch_id, "Waiting for open transaction to close");
            released.await;
        }
    }

    /// Open a transaction owned by `batch`, waiting for any other open transaction to close.
    pub(crate) async fn begin(&self, batch: &BatchContext) -> Result<(), String> {
        loop {
            let released = self.inner.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            {
                let mut state = self.lock();
                match state.owner {
                    None => {
                        state.snapshot = Some(state.tables.clone());
                        state.owner = Some(batch.batch_id);
                        return Ok(());
                    }
                    Some(owner) if owner == batch.batch_id => {
                        return Err(format!(
                            "batch {} already holds an open transaction",
                            batch.batch_id
                        ));
                    }
                    Some(_) => {}
                }
            }

            released.await;
        }
    }

    /// Close the transaction owned by `batch_id`, restoring the snapshot unless committing.
    pub(crate) fn finish(&self, batch_id: Uuid, commit: bool) -> Result<(), String> {
        {
            let mut state = self.lock();
            if state.owner != Some(batch_id) {
                return Err(format!("batch {batch_id} does not own the open transaction"));
            }
            let snapshot = state.snapshot.take();
            if !commit {
                if let Some(snapshot) = snapshot {
                    state.tables = snapshot;
                }
            }
            state.owner = None;
        }
        self.inner.released.notify_waiters();
        Ok(())
    }

    /// True while some batch holds an open transaction.
    pub fn in_transaction(&self) -> bool {
        self.lock().owner.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn insert_assigns_sequential_ids() {
        let mut tables = Tables::default();
        assert_eq!(tables.insert("clients", json!({"name": "a"})), 1);
        assert_eq!(tables.insert("clients", json!({"name": "b"})), 2);
        assert_eq!(tables.insert("loans", json!({})), 1);
        assert_eq!(tables.get("clients", 2).unwrap()["id"], 2);
    }

    #[test]
    fn find_by_compares_text_forms() {
        let mut tables = Tables::default();
        tables.insert("clients", json!({"externalId": "ext-1", "officeId": 4}));
        assert!(tables.find_by("clients", "externalId", "ext-1").is_some());
        assert!(tables.find_by("clients", "officeId", "4").is_some());
        assert!(tables.find_by("clients", "externalId", "ext-2").is_none());
    }

    #[tokio::test]
    async fn rollback_restores_snapshot() {
        let store = MemoryStore::new();
        let batch = BatchContext::new();

        store.begin(&batch).await.unwrap();
        store
            .write(&batch, |t| t.insert("clients", json!({})))
            .await;
        store.finish(batch.batch_id, false).unwrap();

        let other = BatchContext::new();
        assert_eq!(store.read(&other, |t| t.len("clients")).await, 0);
    }

    #[tokio::test]
    async fn other_batches_wait_for_open_transaction() {
        let store = MemoryStore::new();
        let owner = BatchContext::new();
        store.begin(&owner).await.unwrap();

        let reader = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .read(&BatchContext::new(), |t| t.len("clients"))
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!reader.is_finished());

        store
            .write(&owner, |t| t.insert("clients", json!({})))
            .await;
        store.finish(owner.batch_id, true).unwrap();

        assert_eq!(reader.await.unwrap(), 1);
    }
}
