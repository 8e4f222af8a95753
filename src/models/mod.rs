use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User profile plus the two relationship arrays that drive the social graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub followers: Vec<String>,
    pub following: Vec<String>,
    /// Display order of the user's own collections on their profile.
    pub collections_order: Vec<String>,
    pub profile_pic_url: String,
    pub bio: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Who may view a collection besides its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    Public,
    Followers,
    Private,
}

impl Privacy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Privacy::Public => "public",
            Privacy::Followers => "followers",
            Privacy::Private => "private",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "public" => Some(Privacy::Public),
            "followers" => Some(Privacy::Followers),
            "private" => Some(Privacy::Private),
            _ => None,
        }
    }
}

/// A named, privacy-scoped grouping of APOD posts, owned by one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub privacy: Privacy,
    pub items: Vec<CollectionItem>,
    pub cover_image: Option<String>,
    pub like_count: i64,
    pub comment_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Collection {
    pub fn contains_post(&self, post_id: &str) -> bool {
        self.items.iter().any(|i| i.post_id == post_id)
    }
}

/// One saved post inside a collection. At most one entry per post_id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionItem {
    pub post_id: String,
    #[serde(rename = "type")]
    pub item_type: String,
    pub added_at: DateTime<Utc>,
}

/// Per-collection interaction document, kept alongside the collection itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionInteraction {
    pub collection_id: String,
    pub likes: Vec<String>,
    pub comments: Vec<CollectionComment>,
    pub like_count: i64,
    pub comment_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CollectionInteraction {
    /// Default document handed to subscribers before the lazy row exists.
    pub fn empty(collection_id: &str) -> Self {
        let now = Utc::now();
        Self {
            collection_id: collection_id.to_string(),
            likes: Vec::new(),
            comments: Vec::new(),
            like_count: 0,
            comment_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionComment {
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub likes: Vec<String>,
    pub like_count: i64,
}

/// Per-post interaction document, keyed by the APOD date string.
/// title/url/media_type are snapshotted from the first interacting call and
/// never re-synced with the upstream source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostInteraction {
    pub post_id: String,
    pub title: Option<String>,
    pub url: Option<String>,
    pub media_type: Option<String>,
    pub likes: Vec<String>,
    pub comments: Vec<PostComment>,
    pub saved_in_collections: Vec<SavedRef>,
    pub first_interaction_at: DateTime<Utc>,
}

impl PostInteraction {
    pub fn empty(post_id: &str) -> Self {
        Self {
            post_id: post_id.to_string(),
            title: None,
            url: None,
            media_type: None,
            likes: Vec::new(),
            comments: Vec::new(),
            saved_in_collections: Vec::new(),
            first_interaction_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostComment {
    pub user_id: String,
    pub username: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Which collection (and whose) a post is saved in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedRef {
    pub user_id: String,
    pub collection_id: String,
    pub collection_name: String,
}

/// Direct message. `seen` is persisted but nothing updates it yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub from: String,
    pub from_username: String,
    pub to: String,
    pub to_username: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub seen: bool,
}

// Request/Response types for API

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Deserialize)]
pub struct CreateCollectionRequest {
    pub name: String,
    #[serde(default = "default_privacy")]
    pub privacy: Privacy,
}

fn default_privacy() -> Privacy {
    Privacy::Public
}

#[derive(Debug, Deserialize)]
pub struct UpdateCollectionRequest {
    pub name: Option<String>,
    pub privacy: Option<Privacy>,
}

#[derive(Debug, Deserialize)]
pub struct ToggleItemRequest {
    pub post_id: String,
    pub title: Option<String>,
    pub media_type: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub order: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub profile_pic_url: Option<String>,
    pub bio: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct PostLikeRequest {
    pub title: Option<String>,
    pub url: Option<String>,
    pub media_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PostCommentRequest {
    pub text: String,
    pub title: Option<String>,
    pub url: Option<String>,
    pub media_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}
