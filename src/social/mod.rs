//! Social graph operations: follow/unfollow, mutuals, and username search.

use std::sync::Arc;

use crate::models::User;
use crate::store::{Store, StoreError, StoreResult};

const SEARCH_LIMIT: i64 = 20;

pub struct SocialService {
    store: Arc<Store>,
}

impl SocialService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn follow(&self, follower_id: &str, followee_id: &str) -> StoreResult<()> {
        if follower_id == followee_id {
            return Err(StoreError::InvalidInput(
                "Cannot follow yourself".to_string(),
            ));
        }
        self.store.set_follow_edge(follower_id, followee_id)
    }

    pub fn unfollow(&self, follower_id: &str, followee_id: &str) -> StoreResult<()> {
        if follower_id == followee_id {
            return Err(StoreError::InvalidInput(
                "Cannot unfollow yourself".to_string(),
            ));
        }
        self.store.remove_follow_edge(follower_id, followee_id)
    }

    /// Users who both follow and are followed by `user_id`.
    pub fn mutuals(&self, user_id: &str) -> StoreResult<Vec<User>> {
        let user = self.store.get_user(user_id)?;
        let ids: Vec<&String> = user
            .followers
            .iter()
            .filter(|id| user.following.contains(id))
            .collect();
        Ok(self.resolve(&ids))
    }

    /// Username prefix search. Empty queries return nothing instead of
    /// listing the whole directory.
    pub fn search(&self, prefix: &str) -> StoreResult<Vec<User>> {
        let trimmed = prefix.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }
        self.store.search_users_by_prefix(trimmed, SEARCH_LIMIT)
    }

    pub fn followers_of(&self, user_id: &str) -> StoreResult<Vec<User>> {
        let user = self.store.get_user(user_id)?;
        Ok(self.resolve(&user.followers.iter().collect::<Vec<_>>()))
    }

    pub fn following_of(&self, user_id: &str) -> StoreResult<Vec<User>> {
        let user = self.store.get_user(user_id)?;
        Ok(self.resolve(&user.following.iter().collect::<Vec<_>>()))
    }

    /// Resolve ids to profiles, silently skipping any that no longer exist.
    fn resolve(&self, ids: &[&String]) -> Vec<User> {
        let mut users = Vec::new();
        for id in ids {
            match self.store.get_user(id) {
                Ok(user) => users.push(user),
                Err(e) => log::warn!("Skipping unresolvable user {}: {}", id, e),
            }
        }
        users
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

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

    #[test]
    fn test_self_follow_rejected() {
        let store = Arc::new(Store::in_memory().unwrap());
        let social = SocialService::new(store.clone());
        let alice = seed_user(&store, "alice");

        assert!(matches!(
            social.follow(&alice.id, &alice.id),
            Err(StoreError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_mutuals_is_intersection() {
        let store = Arc::new(Store::in_memory().unwrap());
        let social = SocialService::new(store.clone());
        let alice = seed_user(&store, "alice");
        let bob = seed_user(&store, "bob");
        let carol = seed_user(&store, "carol");

        // alice <-> bob mutual; alice -> carol one-way
        social.follow(&alice.id, &bob.id).unwrap();
        social.follow(&bob.id, &alice.id).unwrap();
        social.follow(&alice.id, &carol.id).unwrap();

        let mutuals = social.mutuals(&alice.id).unwrap();
        assert_eq!(mutuals.len(), 1);
        assert_eq!(mutuals[0].username, "bob");
    }

    #[test]
    fn test_prefix_search() {
        let store = Arc::new(Store::in_memory().unwrap());
        let social = SocialService::new(store.clone());
        seed_user(&store, "astra");
        seed_user(&store, "astrid");
        seed_user(&store, "bob");

        let hits = social.search("ast").unwrap();
        let names: Vec<&str> = hits.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["astra", "astrid"]);

        assert!(social.search("   ").unwrap().is_empty());
    }

    #[test]
    fn test_follower_lists_resolve_profiles() {
        let store = Arc::new(Store::in_memory().unwrap());
        let social = SocialService::new(store.clone());
        let alice = seed_user(&store, "alice");
        let bob = seed_user(&store, "bob");

        social.follow(&bob.id, &alice.id).unwrap();

        let followers = social.followers_of(&alice.id).unwrap();
        assert_eq!(followers.len(), 1);
        assert_eq!(followers[0].username, "bob");

        let following = social.following_of(&bob.id).unwrap();
        assert_eq!(following.len(), 1);
        assert_eq!(following[0].username, "alice");
    }
}
