//! Collection visibility.
//!
//! One canonical rule, applied everywhere a collection crosses a user
//! boundary: profile listings, detail fetches, and feed assembly. The
//! follower check is direct uid membership in the owner's `followers` array.

use crate::models::{Collection, Privacy};

/// May `viewer` see `collection`? `owner_followers` is the collection
/// owner's followers array; `viewer` is None for anonymous requests.
pub fn can_view_collection(
    viewer: Option<&str>,
    collection: &Collection,
    owner_followers: &[String],
) -> bool {
    if let Some(viewer_id) = viewer {
        if viewer_id == collection.owner_id {
            return true;
        }
    }
    match collection.privacy {
        Privacy::Public => true,
        Privacy::Private => false,
        Privacy::Followers => match viewer {
            Some(viewer_id) => owner_followers.iter().any(|id| id == viewer_id),
            None => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn collection(owner: &str, privacy: Privacy) -> Collection {
        Collection {
            id: "col-1".to_string(),
            owner_id: owner.to_string(),
            name: "Nebulae".to_string(),
            privacy,
            items: Vec::new(),
            cover_image: None,
            like_count: 0,
            comment_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_owner_always_sees() {
        let c = collection("owner", Privacy::Private);
        assert!(can_view_collection(Some("owner"), &c, &[]));
    }

    #[test]
    fn test_public_visible_to_all() {
        let c = collection("owner", Privacy::Public);
        assert!(can_view_collection(Some("stranger"), &c, &[]));
        assert!(can_view_collection(None, &c, &[]));
    }

    #[test]
    fn test_private_denied_to_others() {
        let c = collection("owner", Privacy::Private);
        assert!(!can_view_collection(Some("stranger"), &c, &[]));
        assert!(!can_view_collection(None, &c, &[]));
    }

    #[test]
    fn test_followers_matrix() {
        let c = collection("owner", Privacy::Followers);
        let followers = vec!["follower-a".to_string()];

        assert!(can_view_collection(Some("owner"), &c, &followers));
        assert!(can_view_collection(Some("follower-a"), &c, &followers));
        assert!(!can_view_collection(Some("stranger"), &c, &followers));
        assert!(!can_view_collection(None, &c, &followers));
    }
}
