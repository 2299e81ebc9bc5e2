//! The user roster.
//!
//! There is no heartbeat or TTL: anyone with a user record counts as online
//! until the next purge.

use std::sync::Arc;

use goldconnect_shared::constants::USERS_COLLECTION;
use goldconnect_shared::User;
use goldconnect_store::{DocumentStore, Query};

use crate::error::Result;
use crate::records::decode_user;
use crate::subscription::{spawn_feed, SubscriptionHandle};

#[derive(Clone)]
pub struct PresenceSync {
    store: Arc<dyn DocumentStore>,
}

impl PresenceSync {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Push the complete roster, self included.
    pub async fn subscribe_users<F>(&self, on_update: F) -> Result<SubscriptionHandle>
    where
        F: FnMut(Vec<User>) + Send + 'static,
    {
        spawn_feed(
            self.store.as_ref(),
            "users",
            Query::collection(USERS_COLLECTION),
            |docs| docs.iter().map(decode_user).collect::<Vec<_>>(),
            on_update,
        )
        .await
    }
}

/// Roster as shown to `self_name`.
pub fn online_except(users: &[User], self_name: &str) -> Vec<User> {
    users
        .iter()
        .filter(|u| u.pseudo != self_name)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use goldconnect_shared::GeoInfo;
    use goldconnect_store::MemoryDocumentStore;
    use tokio::sync::mpsc;

    use crate::records::encode_new_user;

    #[tokio::test]
    async fn roster_includes_everyone() {
        let store = MemoryDocumentStore::new();
        let presence = PresenceSync::new(Arc::new(store.clone()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _handle = presence
            .subscribe_users(move |users| {
                let _ = tx.send(users);
            })
            .await
            .unwrap();
        assert!(rx.recv().await.unwrap().is_empty());

        store
            .set(USERS_COLLECTION, "alice", encode_new_user("alice", &GeoInfo::unknown()))
            .await
            .unwrap();
        store
            .set(USERS_COLLECTION, "bob", encode_new_user("bob", &GeoInfo::unknown()))
            .await
            .unwrap();

        let mut users = rx.recv().await.unwrap();
        while users.len() < 2 {
            users = rx.recv().await.unwrap();
        }
        assert_eq!(users.len(), 2);
        assert!(users.iter().all(|u| u.created_at.is_some()));

        let visible = online_except(&users, "alice");
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].pseudo, "bob");
    }
}
