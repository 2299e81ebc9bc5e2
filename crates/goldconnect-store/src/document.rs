//! The document store contract.
//!
//! A document store holds named collections of JSON documents, offers point
//! reads and writes, atomic write batches, and live subscriptions. A
//! subscription pushes the *complete* current result set of its query after
//! every change; there are no deltas.

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio::sync::watch;

use crate::error::Result;

/// Field map of a single document.
pub type Fields = serde_json::Map<String, Value>;

const SERVER_TIMESTAMP_KEY: &str = "$serverTimestamp";

/// Placeholder replaced by the store's clock (unix millis) when the write
/// is committed.
pub fn server_timestamp() -> Value {
    json!({ SERVER_TIMESTAMP_KEY: true })
}

pub fn is_server_timestamp(value: &Value) -> bool {
    value
        .as_object()
        .map(|o| o.len() == 1 && o.get(SERVER_TIMESTAMP_KEY) == Some(&Value::Bool(true)))
        .unwrap_or(false)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// First non-empty string among `keys`, for records written under
    /// several historical field names.
    pub fn first_str(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .filter_map(|k| self.str_field(k))
            .find(|s| !s.is_empty())
    }

    pub fn bool_field(&self, key: &str) -> Option<bool> {
        self.fields.get(key).and_then(Value::as_bool)
    }

    pub fn u64_field(&self, key: &str) -> Option<u64> {
        let value = self.fields.get(key)?;
        value
            .as_u64()
            .or_else(|| value.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
    }

    /// Timestamp stored either as unix millis or as an RFC 3339 string.
    pub fn timestamp(&self, key: &str) -> Option<DateTime<Utc>> {
        match self.fields.get(key)? {
            Value::Number(n) => n.as_i64().and_then(DateTime::<Utc>::from_timestamp_millis),
            Value::String(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Equality filters plus an optional single-field ordering.
///
/// As in the hosted store this models, ordering by a field excludes
/// documents that lack it. Documents with equal sort keys keep insertion
/// order.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<(String, Value)>,
    pub order_by: Option<(String, Direction)>,
}

impl Query {
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            filters: Vec::new(),
            order_by: None,
        }
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        let filtered = self
            .filters
            .iter()
            .all(|(field, expected)| doc.fields.get(field) == Some(expected));
        let ordered = match &self.order_by {
            Some((field, _)) => doc.fields.contains_key(field),
            None => true,
        };
        filtered && ordered
    }

    /// Filter and order `docs`, which must already be in insertion order.
    pub fn apply<'a, I>(&self, docs: I) -> Vec<Document>
    where
        I: IntoIterator<Item = &'a Document>,
    {
        let mut out: Vec<Document> = docs
            .into_iter()
            .filter(|d| self.matches(d))
            .cloned()
            .collect();
        if let Some((field, direction)) = &self.order_by {
            // stable sort: ties stay in insertion order
            out.sort_by(|a, b| {
                let ord = compare_values(a.fields.get(field), b.fields.get(field));
                match direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            });
        }
        out
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (a, b) {
            (Value::Number(x), Value::Number(y)) => {
                match (x.as_i64(), y.as_i64()) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    _ => x
                        .as_f64()
                        .partial_cmp(&y.as_f64())
                        .unwrap_or(Ordering::Equal),
                }
            }
            (Value::String(x), Value::String(y)) => x.cmp(y),
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            _ => type_rank(a).cmp(&type_rank(b)),
        },
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    /// Create or fully replace a document.
    Set {
        collection: String,
        id: String,
        fields: Fields,
    },
    /// Merge fields into an existing document; fails if it is missing.
    Update {
        collection: String,
        id: String,
        fields: Fields,
    },
    Delete {
        collection: String,
        id: String,
    },
}

/// Writes applied atomically: all of them or none.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    writes: Vec<Write>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, collection: &str, id: &str, fields: Fields) -> &mut Self {
        self.writes.push(Write::Set {
            collection: collection.to_string(),
            id: id.to_string(),
            fields,
        });
        self
    }

    pub fn update(&mut self, collection: &str, id: &str, fields: Fields) -> &mut Self {
        self.writes.push(Write::Update {
            collection: collection.to_string(),
            id: id.to_string(),
            fields,
        });
        self
    }

    pub fn delete(&mut self, collection: &str, id: &str) -> &mut Self {
        self.writes.push(Write::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn writes(&self) -> &[Write] {
        &self.writes
    }
}

/// Receiving side of a live query.
///
/// The first call to [`Subscription::next`] yields the result set current at
/// subscription time; each later call waits for the next change. Pushes
/// that arrive while the consumer is busy are coalesced into the latest
/// state, which is harmless because every push is the full result set.
pub struct Subscription {
    rx: watch::Receiver<Arc<Vec<Document>>>,
    primed: bool,
}

impl Subscription {
    pub fn new(rx: watch::Receiver<Arc<Vec<Document>>>) -> Self {
        Self { rx, primed: false }
    }

    /// Next full result set, or `None` once the store closed the stream.
    pub async fn next(&mut self) -> Option<Arc<Vec<Document>>> {
        if !self.primed {
            self.primed = true;
            return Some(self.rx.borrow_and_update().clone());
        }
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn subscribe(&self, query: Query) -> Result<Subscription>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    async fn query(&self, query: &Query) -> Result<Vec<Document>>;

    /// Insert under a store-generated id and return it.
    async fn add(&self, collection: &str, fields: Fields) -> Result<String>;

    async fn commit(&self, batch: WriteBatch) -> Result<()>;

    async fn set(&self, collection: &str, id: &str, fields: Fields) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.set(collection, id, fields);
        self.commit(batch).await
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.update(collection, id, fields);
        self.commit(batch).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.delete(collection, id);
        self.commit(batch).await
    }
}
