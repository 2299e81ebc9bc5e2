//! Verification records: plain CRUD on `verifyData`.

use std::sync::{Arc, Mutex};

use goldconnect_shared::constants::VERIFY_COLLECTION;
use goldconnect_shared::{NewVerifyRecord, ValidationError, VerifyRecord};
use goldconnect_store::{server_timestamp, Direction, DocumentStore, Fields, Query};
use tracing::{info, warn};

use crate::error::Result;
use crate::records::decode_verify;
use crate::subscription::{spawn_feed, SubscriptionHandle};

fn newest_first() -> Query {
    Query::collection(VERIFY_COLLECTION).order_by("createdAt", Direction::Descending)
}

fn record_fields(record: &NewVerifyRecord) -> Fields {
    let mut fields = Fields::new();
    fields.insert("name".into(), record.name.as_str().into());
    fields.insert("country".into(), record.country.as_str().into());
    fields.insert("phoneNumber".into(), record.phone_number.as_str().into());
    fields
}

fn require_id(id: &str) -> Result<&str> {
    let id = id.trim();
    if id.is_empty() {
        return Err(ValidationError::MissingField("id").into());
    }
    Ok(id)
}

#[derive(Clone)]
pub struct VerifyBook {
    store: Arc<dyn DocumentStore>,
}

impl VerifyBook {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn add(&self, record: &NewVerifyRecord) -> Result<String> {
        let record = record.normalized()?;
        let mut fields = record_fields(&record);
        fields.insert("createdAt".into(), server_timestamp());
        fields.insert("updatedAt".into(), server_timestamp());
        let id = self.store.add(VERIFY_COLLECTION, fields).await?;
        info!(id = %id, "verification record added");
        Ok(id)
    }

    /// Every record, newest first.
    pub async fn list(&self) -> Result<Vec<VerifyRecord>> {
        let docs = self.store.query(&newest_first()).await?;
        Ok(docs.iter().map(decode_verify).collect())
    }

    pub async fn update(&self, id: &str, record: &NewVerifyRecord) -> Result<()> {
        let id = require_id(id)?;
        let record = record.normalized()?;
        let mut fields = record_fields(&record);
        fields.insert("updatedAt".into(), server_timestamp());
        self.store.update(VERIFY_COLLECTION, id, fields).await?;
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let id = require_id(id)?;
        self.store.delete(VERIFY_COLLECTION, id).await?;
        info!(id = %id, "verification record deleted");
        Ok(())
    }

    /// Live list, newest first. If the feed cannot be opened the callback
    /// receives one empty list and the returned handle stays inert.
    pub async fn subscribe<F>(&self, on_update: F) -> SubscriptionHandle
    where
        F: FnMut(Vec<VerifyRecord>) + Send + 'static,
    {
        let callback = Arc::new(Mutex::new(on_update));
        let feed_callback = callback.clone();
        let opened = spawn_feed(
            self.store.as_ref(),
            "verify",
            newest_first(),
            |docs| docs.iter().map(decode_verify).collect::<Vec<_>>(),
            move |records| {
                if let Ok(mut cb) = feed_callback.lock() {
                    (*cb)(records);
                }
            },
        )
        .await;

        match opened {
            Ok(handle) => handle,
            Err(e) => {
                warn!(error = %e, "verification feed unavailable");
                if let Ok(mut cb) = callback.lock() {
                    (*cb)(Vec::new());
                }
                SubscriptionHandle::inert("verify")
            }
        }
    }
}
