//! In-process change notification.
//!
//! Mutating services publish a fresh snapshot of the affected document to a
//! topic; screens subscribe with a callback and hold the returned guard for
//! as long as they care. Dropping the guard unregisters the callback, so a
//! listener cannot outlive its owner.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub type Listener = Arc<dyn Fn(Value) + Send + Sync>;

/// Topic-keyed registry of listeners.
pub struct SubscriptionHub {
    inner: Mutex<HubState>,
}

struct HubState {
    next_id: u64,
    topics: HashMap<String, Vec<(u64, Listener)>>,
}

impl SubscriptionHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(HubState {
                next_id: 0,
                topics: HashMap::new(),
            }),
        })
    }

    /// Register a listener on a topic. The returned guard unsubscribes on Drop.
    pub fn subscribe(self: Arc<Self>, topic: &str, listener: Listener) -> Subscription {
        let id = {
            let mut state = self.inner.lock().unwrap();
            let id = state.next_id;
            state.next_id += 1;
            state
                .topics
                .entry(topic.to_string())
                .or_default()
                .push((id, listener));
            id
        };

        Subscription {
            hub: self,
            topic: topic.to_string(),
            id,
        }
    }

    /// Deliver a snapshot to every listener on the topic. Listeners are
    /// invoked outside the registry lock so a callback may itself subscribe.
    pub fn publish(&self, topic: &str, payload: Value) {
        let listeners: Vec<Listener> = {
            let state = self.inner.lock().unwrap();
            match state.topics.get(topic) {
                Some(entries) => entries.iter().map(|(_, l)| Arc::clone(l)).collect(),
                None => return,
            }
        };
        for listener in listeners {
            listener(payload.clone());
        }
    }

    fn unsubscribe(&self, topic: &str, id: u64) {
        let mut state = self.inner.lock().unwrap();
        if let Some(entries) = state.topics.get_mut(topic) {
            entries.retain(|(entry_id, _)| *entry_id != id);
            if entries.is_empty() {
                state.topics.remove(topic);
            }
        }
    }

    #[cfg(test)]
    fn listener_count(&self, topic: &str) -> usize {
        let state = self.inner.lock().unwrap();
        state.topics.get(topic).map(|e| e.len()).unwrap_or(0)
    }
}

/// Scoped subscription: alive while held, released on Drop.
pub struct Subscription {
    hub: Arc<SubscriptionHub>,
    topic: String,
    id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unsubscribe(&self.topic, self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_publish_reaches_subscribers() {
        let hub = SubscriptionHub::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let hits2 = hits.clone();
        let _sub = hub.clone().subscribe(
            "collection:1",
            Arc::new(move |_| {
                hits2.fetch_add(1, Ordering::SeqCst);
            }),
        );

        hub.publish("collection:1", json!({"like_count": 1}));
        hub.publish("collection:2", json!({"like_count": 9}));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let hub = SubscriptionHub::new();
        let hits = Arc::new(AtomicUsize::new(0));

        {
            let hits2 = hits.clone();
            let _sub = hub.clone().subscribe(
                "post:2024-01-01",
                Arc::new(move |_| {
                    hits2.fetch_add(1, Ordering::SeqCst);
                }),
            );
            assert_eq!(hub.listener_count("post:2024-01-01"), 1);
        }

        assert_eq!(hub.listener_count("post:2024-01-01"), 0);
        hub.publish("post:2024-01-01", json!({}));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_multiple_listeners_same_topic() {
        let hub = SubscriptionHub::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let a = hits.clone();
        let _s1 = hub
            .clone()
            .subscribe("t", Arc::new(move |_| { a.fetch_add(1, Ordering::SeqCst); }));
        let b = hits.clone();
        let _s2 = hub
            .clone()
            .subscribe("t", Arc::new(move |_| { b.fetch_add(1, Ordering::SeqCst); }));

        hub.publish("t", json!(null));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
