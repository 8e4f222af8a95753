//! Collection store operations: create/update/delete, the item toggle with
//! cover-image recomputation, and the saved-in mirror on post interactions.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use crate::access::can_view_collection;
use crate::apod::MediaLookup;
use crate::models::{Collection, CollectionItem, Privacy, SavedRef};
use crate::store::{Store, StoreError, StoreResult};

/// What a toggle did to the collection's membership for that post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToggleOutcome {
    Added,
    Removed,
}

pub struct CollectionService {
    store: Arc<Store>,
    media: Arc<dyn MediaLookup>,
}

impl CollectionService {
    pub fn new(store: Arc<Store>, media: Arc<dyn MediaLookup>) -> Self {
        Self { store, media }
    }

    pub fn create(
        &self,
        owner_id: &str,
        name: &str,
        privacy: Privacy,
    ) -> StoreResult<Collection> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(StoreError::InvalidInput(
                "Collection name cannot be empty".to_string(),
            ));
        }

        let mut collection = Collection {
            id: String::new(),
            owner_id: owner_id.to_string(),
            name: trimmed.to_string(),
            privacy,
            items: Vec::new(),
            cover_image: None,
            like_count: 0,
            comment_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        self.store.create_collection(&mut collection)?;
        Ok(collection)
    }

    /// Name/privacy updates, owner only. Foreign collections read as absent.
    pub fn update_details(
        &self,
        caller: &str,
        collection_id: &str,
        name: Option<&str>,
        privacy: Option<Privacy>,
    ) -> StoreResult<Collection> {
        let collection = self.store.get_collection(collection_id)?;
        if collection.owner_id != caller {
            return Err(StoreError::NotFound(format!("Collection {}", collection_id)));
        }
        if let Some(n) = name {
            if n.trim().is_empty() {
                return Err(StoreError::InvalidInput(
                    "Collection name cannot be empty".to_string(),
                ));
            }
        }
        self.store
            .update_collection_details(collection_id, name.map(str::trim), privacy)?;
        self.store.get_collection(collection_id)
    }

    /// Toggle a post in/out of the collection, recompute the cover image,
    /// and mirror the membership into the post's saved-in list.
    pub async fn toggle_item(
        &self,
        caller: &str,
        collection_id: &str,
        post_id: &str,
        title: Option<&str>,
        media_type: Option<&str>,
        url: Option<&str>,
    ) -> StoreResult<ToggleOutcome> {
        if post_id.trim().is_empty() {
            return Err(StoreError::InvalidInput("Post id is required".to_string()));
        }

        let collection = self.store.get_collection(collection_id)?;
        if collection.owner_id != caller {
            return Err(StoreError::NotFound(format!("Collection {}", collection_id)));
        }

        let mut items = collection.items.clone();
        let outcome = if collection.contains_post(post_id) {
            items.retain(|item| item.post_id != post_id);
            ToggleOutcome::Removed
        } else {
            items.insert(
                0,
                CollectionItem {
                    post_id: post_id.to_string(),
                    item_type: "apod".to_string(),
                    added_at: Utc::now(),
                },
            );
            ToggleOutcome::Added
        };

        let cover_image = self.derive_cover(&items).await;
        self.store
            .replace_items(collection_id, &items, cover_image.as_deref())?;

        // Ensure the post's interaction document exists (snapshotting the
        // caller's metadata on first touch), then mirror the membership.
        self.store
            .get_or_create_post_interaction(post_id, title, url, media_type)?;
        match outcome {
            ToggleOutcome::Added => {
                let saved = SavedRef {
                    user_id: caller.to_string(),
                    collection_id: collection_id.to_string(),
                    collection_name: collection.name.clone(),
                };
                self.store.set_saved_ref(post_id, &saved)?;
            }
            ToggleOutcome::Removed => {
                self.store
                    .remove_saved_ref(post_id, caller, collection_id)?;
            }
        }

        Ok(outcome)
    }

    /// Cover is the most recently added item's media URL when that media is
    /// an image, else None. Lookup failures degrade to None.
    async fn derive_cover(&self, items: &[CollectionItem]) -> Option<String> {
        let latest = items.iter().max_by_key(|item| item.added_at)?;
        match self.media.media_for_date(&latest.post_id).await {
            Ok(Some(apod)) if apod.is_image() => Some(apod.url),
            Ok(_) => None,
            Err(e) => {
                log::warn!("Cover lookup for {} failed: {}", latest.post_id, e);
                None
            }
        }
    }

    /// Delete, owner only. Interaction rows keyed by the id are left behind.
    pub fn delete(&self, caller: &str, collection_id: &str) -> StoreResult<()> {
        let collection = self.store.get_collection(collection_id)?;
        if collection.owner_id != caller {
            return Err(StoreError::NotFound(format!("Collection {}", collection_id)));
        }
        self.store.delete_collection(collection_id)
    }

    /// Fetch with the visibility rule applied; invisible reads as absent.
    pub fn get_with_access(
        &self,
        viewer: Option<&str>,
        collection_id: &str,
    ) -> StoreResult<Collection> {
        let collection = self.store.get_collection(collection_id)?;
        let owner = self.store.get_user(&collection.owner_id)?;
        if !can_view_collection(viewer, &collection, &owner.followers) {
            return Err(StoreError::NotFound(format!("Collection {}", collection_id)));
        }
        Ok(collection)
    }

    /// Persist the owner's preferred profile ordering. Ids that are not the
    /// caller's own collections are dropped.
    pub fn reorder(&self, caller: &str, order: &[String]) -> StoreResult<Vec<String>> {
        let owned = self.store.list_collections_by_owner(caller)?;
        let kept: Vec<String> = order
            .iter()
            .filter(|id| owned.iter().any(|c| &c.id == *id))
            .cloned()
            .collect();
        self.store.set_collections_order(caller, &kept)?;
        Ok(kept)
    }
}
