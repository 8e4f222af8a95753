//! Like/comment aggregation for collections and posts.
//!
//! Interaction documents are created lazily on first touch. Every mutation
//! republishes the full document to subscribers, and collection counters are
//! recomputed onto the collection row so popularity reads stay indexed.

use serde_json::json;
use std::sync::Arc;

use crate::models::{
    Collection, CollectionComment, CollectionInteraction, PostComment, PostInteraction,
};
use crate::realtime::{Listener, Subscription, SubscriptionHub};
use crate::store::{Store, StoreError, StoreResult};

fn collection_topic(collection_id: &str) -> String {
    format!("collection:{}", collection_id)
}

fn post_topic(post_id: &str) -> String {
    format!("post:{}", post_id)
}

pub struct InteractionService {
    store: Arc<Store>,
    hub: Arc<SubscriptionHub>,
}

impl InteractionService {
    pub fn new(store: Arc<Store>, hub: Arc<SubscriptionHub>) -> Self {
        Self { store, hub }
    }

    // ==================== Collection interactions ====================

    /// Current interaction document, or the empty default when the lazy row
    /// does not exist yet.
    pub fn collection_interaction(&self, collection_id: &str) -> StoreResult<CollectionInteraction> {
        Ok(self
            .store
            .get_collection_interaction(collection_id)?
            .unwrap_or_else(|| CollectionInteraction::empty(collection_id)))
    }

    pub fn toggle_collection_like(
        &self,
        collection_id: &str,
        user_id: &str,
    ) -> StoreResult<bool> {
        let now_liked = self.store.toggle_collection_like(collection_id, user_id)?;
        self.store.sync_collection_counts(collection_id)?;
        self.publish_collection(collection_id);
        Ok(now_liked)
    }

    pub fn add_collection_comment(
        &self,
        collection_id: &str,
        user_id: &str,
        username: &str,
        text: &str,
    ) -> StoreResult<CollectionComment> {
        let comment = self
            .store
            .add_collection_comment(collection_id, user_id, username, text)?;
        self.store.sync_collection_counts(collection_id)?;
        self.publish_collection(collection_id);
        Ok(comment)
    }

    pub fn toggle_comment_like(
        &self,
        collection_id: &str,
        comment_id: &str,
        user_id: &str,
    ) -> StoreResult<bool> {
        let now_liked =
            self.store
                .toggle_collection_comment_like(collection_id, comment_id, user_id)?;
        self.publish_collection(collection_id);
        Ok(now_liked)
    }

    /// Live feed of a collection's interaction document. The listener is
    /// fired immediately with the current state (empty defaults when the
    /// document does not exist yet) and again on every mutation.
    pub fn subscribe_collection(
        &self,
        collection_id: &str,
        listener: Listener,
    ) -> StoreResult<Subscription> {
        let current = self.collection_interaction(collection_id)?;
        let subscription = self
            .hub
            .clone()
            .subscribe(&collection_topic(collection_id), listener.clone());
        listener(json!(current));
        Ok(subscription)
    }

    fn publish_collection(&self, collection_id: &str) {
        match self.collection_interaction(collection_id) {
            Ok(interaction) => self
                .hub
                .publish(&collection_topic(collection_id), json!(interaction)),
            Err(e) => log::warn!("Skipping publish for {}: {}", collection_id, e),
        }
    }

    // ==================== Post interactions ====================

    pub fn post_interaction(&self, post_id: &str) -> StoreResult<PostInteraction> {
        Ok(self
            .store
            .get_post_interaction(post_id)?
            .unwrap_or_else(|| PostInteraction::empty(post_id)))
    }

    /// Like toggle with lazy document creation; the triggering call's
    /// metadata becomes the snapshot when the document is first created.
    pub fn toggle_post_like(
        &self,
        post_id: &str,
        user_id: &str,
        title: Option<&str>,
        url: Option<&str>,
        media_type: Option<&str>,
    ) -> StoreResult<bool> {
        self.store
            .get_or_create_post_interaction(post_id, title, url, media_type)?;
        let now_liked = self.store.toggle_post_like(post_id, user_id)?;
        self.publish_post(post_id);
        Ok(now_liked)
    }

    pub fn add_post_comment(
        &self,
        post_id: &str,
        user_id: &str,
        username: &str,
        text: &str,
        title: Option<&str>,
        url: Option<&str>,
        media_type: Option<&str>,
    ) -> StoreResult<PostComment> {
        // Validate before the lazy create so a rejected comment leaves no row.
        if text.trim().is_empty() {
            return Err(StoreError::InvalidInput(
                "Comment text cannot be empty".to_string(),
            ));
        }
        self.store
            .get_or_create_post_interaction(post_id, title, url, media_type)?;
        let comment = self
            .store
            .add_post_comment(post_id, user_id, username, text)?;
        self.publish_post(post_id);
        Ok(comment)
    }

    pub fn subscribe_post(&self, post_id: &str, listener: Listener) -> StoreResult<Subscription> {
        let current = self.post_interaction(post_id)?;
        let subscription = self
            .hub
            .clone()
            .subscribe(&post_topic(post_id), listener.clone());
        listener(json!(current));
        Ok(subscription)
    }

    fn publish_post(&self, post_id: &str) {
        match self.post_interaction(post_id) {
            Ok(interaction) => self.hub.publish(&post_topic(post_id), json!(interaction)),
            Err(e) => log::warn!("Skipping publish for {}: {}", post_id, e),
        }
    }

    // ==================== Popularity ====================

    /// Top collections by (likes desc, comments desc). Interaction rows
    /// whose collection has been deleted are dropped silently.
    pub fn popular_collections(&self, count: i64) -> StoreResult<Vec<Collection>> {
        let top = self.store.top_interactions(count)?;
        let mut collections = Vec::new();
        for interaction in top {
            match self.store.get_collection(&interaction.collection_id) {
                Ok(mut collection) => {
                    collection.like_count = interaction.like_count;
                    collection.comment_count = interaction.comment_count;
                    collections.push(collection);
                }
                Err(StoreError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(collections)
    }
}
