//! Direct messages between two users, grouped under a canonical
//! conversation id so both participants resolve to the same thread.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;

use crate::models::{Message, User};
use crate::realtime::{Listener, Subscription, SubscriptionHub};
use crate::store::{Store, StoreError, StoreResult};

/// Subscribers see at most this many of the latest messages.
pub const MESSAGE_WINDOW: i64 = 50;

/// Canonical id for the unordered pair: both ids sorted, joined with `_`.
pub fn conversation_id(a: &str, b: &str) -> String {
    let mut pair = [a, b];
    pair.sort();
    pair.join("_")
}

fn conversation_topic(cid: &str) -> String {
    format!("conversation:{}", cid)
}

pub struct MessagingService {
    store: Arc<Store>,
    hub: Arc<SubscriptionHub>,
}

impl MessagingService {
    pub fn new(store: Arc<Store>, hub: Arc<SubscriptionHub>) -> Self {
        Self { store, hub }
    }

    /// Append-only send. `seen` starts false; nothing flips it yet.
    pub fn send(&self, from: &User, to: &User, text: &str) -> StoreResult<Message> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(StoreError::InvalidInput(
                "Message text cannot be empty".to_string(),
            ));
        }

        let cid = conversation_id(&from.id, &to.id);
        let mut message = Message {
            id: String::new(),
            conversation_id: cid.clone(),
            from: from.id.clone(),
            from_username: from.username.clone(),
            to: to.id.clone(),
            to_username: to.username.clone(),
            text: trimmed.to_string(),
            created_at: Utc::now(),
            seen: false,
        };
        self.store.insert_message(&mut message)?;
        self.publish(&cid);
        Ok(message)
    }

    /// The most recent window of a conversation, ascending by time.
    pub fn history(&self, a: &str, b: &str) -> StoreResult<Vec<Message>> {
        self.store
            .list_messages(&conversation_id(a, b), MESSAGE_WINDOW)
    }

    pub fn last_message(&self, a: &str, b: &str) -> StoreResult<Option<Message>> {
        self.store.last_message(&conversation_id(a, b))
    }

    /// Chat list: the latest message of every conversation the user is in,
    /// newest conversation first.
    pub fn conversations_for(&self, user_id: &str) -> StoreResult<Vec<Message>> {
        self.store.list_conversations_for(user_id)
    }

    /// Live message window for a conversation. Fires immediately with the
    /// current window and again after every send.
    pub fn subscribe(&self, a: &str, b: &str, listener: Listener) -> StoreResult<Subscription> {
        let cid = conversation_id(a, b);
        let window = self.store.list_messages(&cid, MESSAGE_WINDOW)?;
        let subscription = self
            .hub
            .clone()
            .subscribe(&conversation_topic(&cid), listener.clone());
        listener(json!(window));
        Ok(subscription)
    }

    fn publish(&self, cid: &str) {
        match self.store.list_messages(cid, MESSAGE_WINDOW) {
            Ok(window) => self.hub.publish(&conversation_topic(cid), json!(window)),
            Err(e) => log::warn!("Skipping publish for conversation {}: {}", cid, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn seed_user(store: &Arc<Store>, username: &str) -> User {
        let mut user = User {
            id: String::new(),
            username: username.to_string(),
            email: format!("{}@example.com", username),
            password_hash: "hash".to_string(),
            followers: Vec::new(),
            following: Vec::new(),
            collections_order: Vec::new(),
            profile_pic_url: String::new(),
            bio: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.create_user(&mut user).unwrap();
        user
    }

    fn setup() -> (Arc<Store>, MessagingService) {
        let store = Arc::new(Store::in_memory().unwrap());
        let service = MessagingService::new(store.clone(), SubscriptionHub::new());
        (store, service)
    }

    #[test]
    fn test_conversation_id_commutative() {
        assert_eq!(conversation_id("alice", "bob"), conversation_id("bob", "alice"));
        assert_eq!(conversation_id("alice", "bob"), "alice_bob");
        assert_ne!(conversation_id("a", "b"), conversation_id("a", "c"));
    }

    #[test]
    fn test_send_and_history() {
        let (store, service) = setup();
        let alice = seed_user(&store, "alice");
        let bob = seed_user(&store, "bob");

        service.send(&alice, &bob, "hello").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        service.send(&bob, &alice, "hi back").unwrap();

        // Same history regardless of argument order
        let history = service.history(&bob.id, &alice.id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].text, "hello");
        assert_eq!(history[1].text, "hi back");
        assert!(!history[0].seen);

        let last = service.last_message(&alice.id, &bob.id).unwrap().unwrap();
        assert_eq!(last.text, "hi back");
    }

    #[test]
    fn test_blank_message_rejected() {
        let (store, service) = setup();
        let alice = seed_user(&store, "alice");
        let bob = seed_user(&store, "bob");

        assert!(matches!(
            service.send(&alice, &bob, "   "),
            Err(StoreError::InvalidInput(_))
        ));
        assert!(service.history(&alice.id, &bob.id).unwrap().is_empty());
    }

    #[test]
    fn test_subscription_sees_sends() {
        let (store, service) = setup();
        let alice = seed_user(&store, "alice");
        let bob = seed_user(&store, "bob");

        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = hits.clone();
        let _sub = service
            .subscribe(
                &alice.id,
                &bob.id,
                Arc::new(move |_| {
                    hits2.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1); // initial window

        service.send(&alice, &bob, "ping").unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_chat_list_latest_per_peer() {
        let (store, service) = setup();
        let alice = seed_user(&store, "alice");
        let bob = seed_user(&store, "bob");
        let carol = seed_user(&store, "carol");

        service.send(&alice, &bob, "to bob").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        service.send(&carol, &alice, "from carol").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        service.send(&alice, &bob, "to bob again").unwrap();

        let chats = service.conversations_for(&alice.id).unwrap();
        assert_eq!(chats.len(), 2);
        assert_eq!(chats[0].text, "to bob again");
        assert_eq!(chats[1].text, "from carol");
    }
}
