//! Group and private conversations.
//!
//! Both collections are subscribed whole and ordered by `createdAt`
//! ascending. Private conversations are cut out of the full private stream
//! locally on every push, as are unread counters.

use std::collections::HashMap;
use std::sync::Arc;

use goldconnect_shared::constants::{GROUP_MESSAGES_COLLECTION, PRIVATE_MESSAGES_COLLECTION};
use goldconnect_shared::user::normalize_name;
use goldconnect_shared::{Audience, Message, MessageBody, ValidationError};
use goldconnect_store::{Direction, Document, DocumentStore, Fields, Query, WriteBatch};
use tracing::{debug, info};

use crate::error::Result;
use crate::records::{decode_group, decode_private, encode_message, validate_body};
use crate::subscription::{spawn_feed, SubscriptionHandle};

/// Unread private messages per sender.
pub type UnreadCounts = HashMap<String, usize>;

/// Count messages addressed to `self_name` that are still unread, keyed by
/// sender.
pub fn count_unread(messages: &[Message], self_name: &str) -> UnreadCounts {
    let mut counts = UnreadCounts::new();
    for msg in messages.iter().filter(|m| m.is_unread_for(self_name)) {
        *counts.entry(msg.from.clone()).or_default() += 1;
    }
    counts
}

fn ordered(collection: &str) -> Query {
    Query::collection(collection).order_by("createdAt", Direction::Ascending)
}

/// Keep the messages of one private conversation, or every message to or
/// from `self_name` when no counterpart is given.
fn private_view(docs: &[Document], self_name: &str, counterpart: Option<&str>) -> Vec<Message> {
    docs.iter()
        .filter_map(decode_private)
        .filter(|m| match counterpart {
            Some(other) => m.is_between(self_name, other),
            None => m.involves(self_name),
        })
        .collect()
}

#[derive(Clone)]
pub struct ConversationSync {
    store: Arc<dyn DocumentStore>,
}

impl ConversationSync {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn subscribe_group<F>(&self, on_update: F) -> Result<SubscriptionHandle>
    where
        F: FnMut(Vec<Message>) + Send + 'static,
    {
        spawn_feed(
            self.store.as_ref(),
            "group",
            ordered(GROUP_MESSAGES_COLLECTION),
            |docs| docs.iter().filter_map(decode_group).collect::<Vec<_>>(),
            on_update,
        )
        .await
    }

    pub async fn subscribe_private<F>(
        &self,
        self_name: &str,
        counterpart: Option<&str>,
        on_update: F,
    ) -> Result<SubscriptionHandle>
    where
        F: FnMut(Vec<Message>) + Send + 'static,
    {
        let self_name = normalize_name(self_name)?;
        let counterpart = counterpart.map(normalize_name).transpose()?;
        spawn_feed(
            self.store.as_ref(),
            "private",
            ordered(PRIVATE_MESSAGES_COLLECTION),
            move |docs| private_view(docs, &self_name, counterpart.as_deref()),
            on_update,
        )
        .await
    }

    /// Live unread counters for `self_name`, recomputed on every push.
    pub async fn subscribe_unread<F>(&self, self_name: &str, on_update: F) -> Result<SubscriptionHandle>
    where
        F: FnMut(UnreadCounts) + Send + 'static,
    {
        let self_name = normalize_name(self_name)?;
        spawn_feed(
            self.store.as_ref(),
            "unread",
            ordered(PRIVATE_MESSAGES_COLLECTION),
            move |docs| count_unread(&private_view(docs, &self_name, None), &self_name),
            on_update,
        )
        .await
    }

    /// Flip every unread message from `counterpart` to `self_name` to read,
    /// in one batch. Returns how many were flipped.
    pub async fn mark_read(&self, self_name: &str, counterpart: &str) -> Result<usize> {
        let self_name = normalize_name(self_name)?;
        let counterpart = normalize_name(counterpart)?;
        let query = Query::collection(PRIVATE_MESSAGES_COLLECTION)
            .where_eq("from", counterpart.as_str())
            .where_eq("to", self_name.as_str())
            .where_eq("read", false);
        let unread = self.store.query(&query).await?;
        if unread.is_empty() {
            return Ok(0);
        }

        let mut read = Fields::new();
        read.insert("read".into(), true.into());
        let mut batch = WriteBatch::new();
        for doc in &unread {
            batch.update(PRIVATE_MESSAGES_COLLECTION, &doc.id, read.clone());
        }
        self.store.commit(batch).await?;

        debug!(reader = %self_name, from = %counterpart, count = unread.len(), "marked read");
        Ok(unread.len())
    }

    pub async fn send_group(&self, sender: &str, body: MessageBody, country: &str) -> Result<String> {
        let sender = normalize_name(sender)?;
        validate_body(&body)?;
        let audience = Audience::Group {
            country: country.trim().to_string(),
        };
        let fields = encode_message(&sender, &audience, &body);
        let id = self.store.add(GROUP_MESSAGES_COLLECTION, fields).await?;
        info!(from = %sender, kind = %body.kind(), id = %id, "group message sent");
        Ok(id)
    }

    pub async fn send_private(
        &self,
        sender: &str,
        recipient: &str,
        body: MessageBody,
    ) -> Result<String> {
        let sender = normalize_name(sender)?;
        let recipient =
            normalize_name(recipient).map_err(|_| ValidationError::MissingField("to"))?;
        validate_body(&body)?;
        let audience = Audience::Private {
            to: recipient.clone(),
            read: false,
        };
        let fields = encode_message(&sender, &audience, &body);
        let id = self.store.add(PRIVATE_MESSAGES_COLLECTION, fields).await?;
        info!(from = %sender, to = %recipient, kind = %body.kind(), id = %id, "private message sent");
        Ok(id)
    }
}
