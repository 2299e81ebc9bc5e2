//! Moderation: explicit message deletion and message statistics.

use std::collections::BTreeMap;
use std::sync::Arc;

use goldconnect_shared::constants::{GROUP_MESSAGES_COLLECTION, PRIVATE_MESSAGES_COLLECTION};
use goldconnect_shared::{MessageKind, ValidationError};
use goldconnect_store::{DocumentStore, Query};
use tracing::info;

use crate::error::Result;
use crate::records::{decode_group, decode_private};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Group,
    Private,
}

impl Channel {
    pub fn collection(&self) -> &'static str {
        match self {
            Self::Group => GROUP_MESSAGES_COLLECTION,
            Self::Private => PRIVATE_MESSAGES_COLLECTION,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageStats {
    pub total_messages: usize,
    pub group_messages: usize,
    pub private_messages: usize,
    pub by_kind: BTreeMap<&'static str, usize>,
}

impl MessageStats {
    pub fn count(&self, kind: MessageKind) -> usize {
        self.by_kind.get(kind.as_str()).copied().unwrap_or(0)
    }
}

#[derive(Clone)]
pub struct Admin {
    store: Arc<dyn DocumentStore>,
}

impl Admin {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn delete_message(&self, channel: Channel, id: &str) -> Result<()> {
        let id = id.trim();
        if id.is_empty() {
            return Err(ValidationError::MissingField("id").into());
        }
        self.store.delete(channel.collection(), id).await?;
        info!(collection = channel.collection(), id = %id, "message deleted by admin");
        Ok(())
    }

    /// Totals over both message collections. Unreadable records are not
    /// counted.
    pub async fn message_stats(&self) -> Result<MessageStats> {
        let group = self
            .store
            .query(&Query::collection(GROUP_MESSAGES_COLLECTION))
            .await?;
        let private = self
            .store
            .query(&Query::collection(PRIVATE_MESSAGES_COLLECTION))
            .await?;

        let group: Vec<_> = group.iter().filter_map(decode_group).collect();
        let private: Vec<_> = private.iter().filter_map(decode_private).collect();

        let mut stats = MessageStats {
            group_messages: group.len(),
            private_messages: private.len(),
            ..MessageStats::default()
        };
        for msg in group.iter().chain(&private) {
            *stats.by_kind.entry(msg.kind().as_str()).or_default() += 1;
        }
        stats.total_messages = stats.group_messages + stats.private_messages;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::ConversationSync;
    use crate::error::ClientError;
    use goldconnect_shared::{MediaDescriptor, MediaKind, MessageBody};
    use goldconnect_store::MemoryDocumentStore;

    fn clip() -> MediaDescriptor {
        MediaDescriptor {
            url: "https://cdn/a.webm".into(),
            public_id: "a".into(),
            resource_type: "video".into(),
            format: "webm".into(),
            file_name: "audio_1.webm".into(),
            file_size: 9,
            uploaded_by: None,
            uploaded_at: None,
        }
    }

    #[tokio::test]
    async fn stats_and_delete() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
        let chat = ConversationSync::new(store.clone());
        let admin = Admin::new(store);

        let hello = chat
            .send_group("alice", MessageBody::text("hello").unwrap(), "")
            .await
            .unwrap();
        chat.send_group("bob", MessageBody::audio(clip(), 3), "")
            .await
            .unwrap();
        chat.send_private("bob", "alice", MessageBody::media(MediaKind::Audio, clip()))
            .await
            .unwrap();

        let stats = admin.message_stats().await.unwrap();
        assert_eq!(stats.total_messages, 3);
        assert_eq!(stats.group_messages, 2);
        assert_eq!(stats.private_messages, 1);
        assert_eq!(stats.count(MessageKind::Audio), 2);
        assert_eq!(stats.count(MessageKind::Text), 1);
        assert_eq!(stats.count(MessageKind::Image), 0);

        admin.delete_message(Channel::Group, &hello).await.unwrap();
        let stats = admin.message_stats().await.unwrap();
        assert_eq!(stats.group_messages, 1);
        assert_eq!(stats.count(MessageKind::Text), 0);
    }

    #[tokio::test]
    async fn delete_requires_id() {
        let admin = Admin::new(Arc::new(MemoryDocumentStore::new()));
        assert!(matches!(
            admin.delete_message(Channel::Private, "").await,
            Err(ClientError::Validation(_))
        ));
    }
}
