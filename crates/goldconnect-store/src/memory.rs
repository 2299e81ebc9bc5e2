//! In-process [`DocumentStore`].
//!
//! Behaves like the hosted store the client is written against: server
//! timestamps come from a monotonic clock shared by the whole store, a batch
//! is applied atomically, and every commit pushes the full current result
//! set to each live subscription on a touched collection. Used for embedded
//! deployments and as the test double.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::document::{
    is_server_timestamp, Document, DocumentStore, Fields, Query, Subscription, Write, WriteBatch,
};
use crate::error::{Result, StoreError};

struct Subscriber {
    query: Query,
    tx: watch::Sender<Arc<Vec<Document>>>,
}

#[derive(Default)]
struct Inner {
    /// Documents per collection, in insertion order.
    collections: HashMap<String, Vec<Document>>,
    subscribers: Vec<Subscriber>,
    last_millis: i64,
    rejected: HashSet<String>,
    closed: bool,
}

impl Inner {
    fn tick(&mut self) -> i64 {
        let now = Utc::now().timestamp_millis().max(self.last_millis);
        self.last_millis = now;
        now
    }

    fn snapshot(&self, query: &Query) -> Vec<Document> {
        self.collections
            .get(&query.collection)
            .map(|docs| query.apply(docs))
            .unwrap_or_default()
    }

    fn notify(&mut self, touched: &HashSet<String>) {
        self.subscribers.retain(|s| !s.tx.is_closed());
        for sub in &self.subscribers {
            if touched.contains(&sub.query.collection) {
                let docs = self
                    .collections
                    .get(&sub.query.collection)
                    .map(|docs| sub.query.apply(docs))
                    .unwrap_or_default();
                sub.tx.send_replace(Arc::new(docs));
            }
        }
    }
}

fn resolve_timestamps(mut fields: Fields, now: i64) -> Fields {
    for value in fields.values_mut() {
        if is_server_timestamp(value) {
            *value = now.into();
        }
    }
    fields
}

#[derive(Clone, Default)]
pub struct MemoryDocumentStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        let guard = self
            .inner
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("Lock poisoned: {e}")))?;
        if guard.closed {
            return Err(StoreError::Unavailable("store closed".into()));
        }
        Ok(guard)
    }

    /// Reject every write touching `collection`, as a rules engine would.
    pub fn reject_writes_to(&self, collection: &str) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.rejected.insert(collection.to_string());
        }
    }

    pub fn allow_writes_to(&self, collection: &str) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.rejected.remove(collection);
        }
    }

    /// Shut the store down. Live subscriptions end and later calls fail.
    pub fn close(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.closed = true;
            guard.subscribers.clear();
        }
    }

    pub fn len(&self, collection: &str) -> usize {
        self.inner
            .lock()
            .ok()
            .and_then(|g| g.collections.get(collection).map(Vec::len))
            .unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .lock()
            .map(|mut g| {
                g.subscribers.retain(|s| !s.tx.is_closed());
                g.subscribers.len()
            })
            .unwrap_or(0)
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn subscribe(&self, query: Query) -> Result<Subscription> {
        let mut guard = self.lock()?;
        let (tx, rx) = watch::channel(Arc::new(guard.snapshot(&query)));
        debug!(collection = %query.collection, "subscription opened");
        guard.subscribers.push(Subscriber { query, tx });
        Ok(Subscription::new(rx))
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let guard = self.lock()?;
        Ok(guard
            .collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| d.id == id))
            .cloned())
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>> {
        Ok(self.lock()?.snapshot(query))
    }

    async fn add(&self, collection: &str, fields: Fields) -> Result<String> {
        let id = Uuid::new_v4().simple().to_string();
        let mut batch = WriteBatch::new();
        batch.set(collection, &id, fields);
        self.commit(batch).await?;
        Ok(id)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        let mut guard = self.lock()?;

        for write in batch.writes() {
            let collection = match write {
                Write::Set { collection, .. }
                | Write::Update { collection, .. }
                | Write::Delete { collection, .. } => collection,
            };
            if guard.rejected.contains(collection) {
                warn!(collection = %collection, "write rejected by store rules");
                return Err(StoreError::PermissionDenied(format!(
                    "writes to {collection} are not allowed"
                )));
            }
        }

        let now = guard.tick();
        let mut staged: HashMap<String, Vec<Document>> = HashMap::new();

        for write in batch.writes() {
            match write {
                Write::Set {
                    collection,
                    id,
                    fields,
                } => {
                    let docs = stage(&mut staged, &guard, collection);
                    let fields = resolve_timestamps(fields.clone(), now);
                    match docs.iter_mut().find(|d| &d.id == id) {
                        Some(existing) => existing.fields = fields,
                        None => docs.push(Document::new(id.clone(), fields)),
                    }
                }
                Write::Update {
                    collection,
                    id,
                    fields,
                } => {
                    let docs = stage(&mut staged, &guard, collection);
                    let existing = docs
                        .iter_mut()
                        .find(|d| &d.id == id)
                        .ok_or_else(|| StoreError::NotFound(format!("{collection}/{id}")))?;
                    for (key, value) in resolve_timestamps(fields.clone(), now) {
                        existing.fields.insert(key, value);
                    }
                }
                Write::Delete { collection, id } => {
                    let docs = stage(&mut staged, &guard, collection);
                    docs.retain(|d| &d.id != id);
                }
            }
        }

        let touched: HashSet<String> = staged.keys().cloned().collect();
        for (collection, docs) in staged {
            guard.collections.insert(collection, docs);
        }
        guard.notify(&touched);

        debug!(writes = batch.len(), "batch committed");
        Ok(())
    }
}

fn stage<'a>(
    staged: &'a mut HashMap<String, Vec<Document>>,
    inner: &Inner,
    collection: &str,
) -> &'a mut Vec<Document> {
    staged
        .entry(collection.to_string())
        .or_insert_with(|| inner.collections.get(collection).cloned().unwrap_or_default())
}
