//! Feed assembly: fan-out reads over the viewer's following set, plus the
//! public/recent listings behind the explore screen.

use std::collections::HashMap;
use std::sync::Arc;

use crate::access::can_view_collection;
use crate::models::{Collection, Privacy};
use crate::store::{Store, StoreResult};

/// Owners per bulk containment query.
const FOLLOWING_BATCH: usize = 10;

pub struct FeedService {
    store: Arc<Store>,
}

impl FeedService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Collections from everyone the user follows, newest first.
    ///
    /// The bulk query returns public and followers-only collections; the
    /// followers-only ones are re-checked per owner since the query cannot
    /// express the conditional membership test. A failed batch is dropped
    /// rather than failing the whole feed.
    pub fn following_collections(&self, user_id: &str) -> StoreResult<Vec<Collection>> {
        let user = self.store.get_user(user_id)?;
        if user.following.is_empty() {
            return Ok(Vec::new());
        }

        let mut gathered = Vec::new();
        for batch in user.following.chunks(FOLLOWING_BATCH) {
            match self.store.list_collections_by_owners_batch(batch) {
                Ok(collections) => gathered.extend(collections),
                Err(e) => {
                    log::warn!("Dropping feed batch of {} owners: {}", batch.len(), e);
                }
            }
        }

        let mut followers_cache: HashMap<String, Vec<String>> = HashMap::new();
        let mut visible = Vec::new();
        for collection in gathered {
            if collection.privacy == Privacy::Followers {
                if !followers_cache.contains_key(&collection.owner_id) {
                    let fetched = match self.store.get_user(&collection.owner_id) {
                        Ok(owner) => owner.followers,
                        Err(e) => {
                            log::warn!(
                                "Skipping collections of unresolvable owner {}: {}",
                                collection.owner_id,
                                e
                            );
                            continue;
                        }
                    };
                    followers_cache.insert(collection.owner_id.clone(), fetched);
                }
                let followers = &followers_cache[&collection.owner_id];
                if !can_view_collection(Some(user_id), &collection, followers) {
                    continue;
                }
            }
            visible.push(collection);
        }

        visible.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(visible)
    }

    /// Most recent public collections for the explore screen.
    pub fn recent_public(&self, count: i64) -> StoreResult<Vec<Collection>> {
        self.store.list_public_collections_recent(count)
    }

    /// One user's collections as another user (or an anonymous visitor)
    /// may see them. The owner sees everything, in their saved profile
    /// order when one exists.
    pub fn profile_collections(
        &self,
        owner_id: &str,
        viewer: Option<&str>,
    ) -> StoreResult<Vec<Collection>> {
        let owner = self.store.get_user(owner_id)?;
        let mut collections = self.store.list_collections_by_owner(owner_id)?;

        let is_owner = viewer == Some(owner_id);
        if !is_owner {
            collections.retain(|c| can_view_collection(viewer, c, &owner.followers));
        } else if !owner.collections_order.is_empty() {
            let rank: HashMap<&str, usize> = owner
                .collections_order
                .iter()
                .enumerate()
                .map(|(i, id)| (id.as_str(), i))
                .collect();
            collections.sort_by_key(|c| *rank.get(c.id.as_str()).unwrap_or(&usize::MAX));
        }

        Ok(collections)
    }
}
