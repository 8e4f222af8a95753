use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use uuid::Uuid;

use crate::models::*;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Thread-safe SQLite store. Nested arrays (items, likes, comments,
/// saved-in refs) are persisted as JSON text columns; scalar counters are
/// integer columns mutated SQL-side so concurrent togglers cannot skew them.
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Create a new store with the given database path
    pub fn new(db_path: &str) -> StoreResult<Self> {
        let conn = Connection::open(db_path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store for testing
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT UNIQUE NOT NULL,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                followers TEXT DEFAULT '[]',
                following TEXT DEFAULT '[]',
                collections_order TEXT DEFAULT '[]',
                profile_pic_url TEXT DEFAULT '',
                bio TEXT DEFAULT '',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS collections (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                name TEXT NOT NULL,
                privacy TEXT NOT NULL DEFAULT 'public',
                items TEXT DEFAULT '[]',
                cover_image TEXT,
                like_count INTEGER DEFAULT 0,
                comment_count INTEGER DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (owner_id) REFERENCES users(id)
            );

            CREATE TABLE IF NOT EXISTS collection_interactions (
                collection_id TEXT PRIMARY KEY,
                likes TEXT DEFAULT '[]',
                comments TEXT DEFAULT '[]',
                like_count INTEGER DEFAULT 0,
                comment_count INTEGER DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS apod_posts_interactions (
                post_id TEXT PRIMARY KEY,
                title TEXT,
                url TEXT,
                media_type TEXT,
                likes TEXT DEFAULT '[]',
                comments TEXT DEFAULT '[]',
                saved_in_collections TEXT DEFAULT '[]',
                first_interaction_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL,
                from_id TEXT NOT NULL,
                from_username TEXT DEFAULT '',
                to_id TEXT NOT NULL,
                to_username TEXT DEFAULT '',
                text TEXT NOT NULL,
                created_at TEXT NOT NULL,
                seen INTEGER DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_collections_owner_id ON collections(owner_id);
            CREATE INDEX IF NOT EXISTS idx_collections_privacy_created ON collections(privacy, created_at);
            CREATE INDEX IF NOT EXISTS idx_interactions_popularity
                ON collection_interactions(like_count DESC, comment_count DESC);
            CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, created_at);
            "#,
        )?;
        Ok(())
    }

    // ==================== User Operations ====================

    pub fn create_user(&self, user: &mut User) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        user.id = Uuid::new_v4().to_string();
        let now = Utc::now();
        user.created_at = now;
        user.updated_at = now;

        conn.execute(
            r#"INSERT INTO users (id, username, email, password_hash, followers, following,
                collections_order, profile_pic_url, bio, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"#,
            params![
                &user.id,
                &user.username,
                &user.email,
                &user.password_hash,
                serde_json::to_string(&user.followers)?,
                serde_json::to_string(&user.following)?,
                serde_json::to_string(&user.collections_order)?,
                &user.profile_pic_url,
                &user.bio,
                user.created_at.to_rfc3339(),
                user.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_user(&self, id: &str) -> StoreResult<User> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT * FROM users WHERE id = ?1", params![id], |row| {
            row_to_user(row)
        })
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(format!("User {}", id)),
            _ => StoreError::Database(e),
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> StoreResult<User> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM users WHERE username = ?1",
            params![username],
            |row| row_to_user(row),
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                StoreError::NotFound(format!("User {}", username))
            }
            _ => StoreError::Database(e),
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> StoreResult<User> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM users WHERE email = ?1",
            params![email],
            |row| row_to_user(row),
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                StoreError::NotFound(format!("User {}", email))
            }
            _ => StoreError::Database(e),
        })
    }

    pub fn update_profile(
        &self,
        user_id: &str,
        profile_pic_url: Option<&str>,
        bio: Option<&str>,
    ) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let mut user = conn
            .query_row("SELECT * FROM users WHERE id = ?1", params![user_id], |r| {
                row_to_user(r)
            })
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    StoreError::NotFound(format!("User {}", user_id))
                }
                _ => StoreError::Database(e),
            })?;

        if let Some(url) = profile_pic_url {
            user.profile_pic_url = url.to_string();
        }
        if let Some(b) = bio {
            user.bio = b.to_string();
        }

        conn.execute(
            "UPDATE users SET profile_pic_url = ?1, bio = ?2, updated_at = ?3 WHERE id = ?4",
            params![
                &user.profile_pic_url,
                &user.bio,
                Utc::now().to_rfc3339(),
                user_id
            ],
        )?;
        Ok(())
    }

    /// Username prefix search, ordered by username.
    pub fn search_users_by_prefix(&self, prefix: &str, limit: i64) -> StoreResult<Vec<User>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM users WHERE username LIKE ?1 || '%' ORDER BY username ASC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![prefix, limit], |row| row_to_user(row))?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    /// Add the follow edge on both sides in one transaction:
    /// followee joins follower.following, follower joins followee.followers.
    pub fn set_follow_edge(&self, follower_id: &str, followee_id: &str) -> StoreResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let mut follower = tx
            .query_row(
                "SELECT * FROM users WHERE id = ?1",
                params![follower_id],
                |r| row_to_user(r),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    StoreError::NotFound(format!("User {}", follower_id))
                }
                _ => StoreError::Database(e),
            })?;
        let mut followee = tx
            .query_row(
                "SELECT * FROM users WHERE id = ?1",
                params![followee_id],
                |r| row_to_user(r),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    StoreError::NotFound(format!("User {}", followee_id))
                }
                _ => StoreError::Database(e),
            })?;

        if !follower.following.iter().any(|id| id == followee_id) {
            follower.following.push(followee_id.to_string());
        }
        if !followee.followers.iter().any(|id| id == follower_id) {
            followee.followers.push(follower_id.to_string());
        }

        let now = Utc::now().to_rfc3339();
        tx.execute(
            "UPDATE users SET following = ?1, updated_at = ?2 WHERE id = ?3",
            params![serde_json::to_string(&follower.following)?, &now, follower_id],
        )?;
        tx.execute(
            "UPDATE users SET followers = ?1, updated_at = ?2 WHERE id = ?3",
            params![serde_json::to_string(&followee.followers)?, &now, followee_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Remove the follow edge on both sides in one transaction.
    pub fn remove_follow_edge(&self, follower_id: &str, followee_id: &str) -> StoreResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let mut follower = tx
            .query_row(
                "SELECT * FROM users WHERE id = ?1",
                params![follower_id],
                |r| row_to_user(r),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    StoreError::NotFound(format!("User {}", follower_id))
                }
                _ => StoreError::Database(e),
            })?;
        let mut followee = tx
            .query_row(
                "SELECT * FROM users WHERE id = ?1",
                params![followee_id],
                |r| row_to_user(r),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    StoreError::NotFound(format!("User {}", followee_id))
                }
                _ => StoreError::Database(e),
            })?;

        follower.following.retain(|id| id != followee_id);
        followee.followers.retain(|id| id != follower_id);

        let now = Utc::now().to_rfc3339();
        tx.execute(
            "UPDATE users SET following = ?1, updated_at = ?2 WHERE id = ?3",
            params![serde_json::to_string(&follower.following)?, &now, follower_id],
        )?;
        tx.execute(
            "UPDATE users SET followers = ?1, updated_at = ?2 WHERE id = ?3",
            params![serde_json::to_string(&followee.followers)?, &now, followee_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn set_collections_order(&self, user_id: &str, order: &[String]) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE users SET collections_order = ?1, updated_at = ?2 WHERE id = ?3",
            params![
                serde_json::to_string(order)?,
                Utc::now().to_rfc3339(),
                user_id
            ],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("User {}", user_id)));
        }
        Ok(())
    }

    pub fn count_users(&self) -> StoreResult<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count)
    }

    // ==================== Collection Operations ====================

    pub fn create_collection(&self, collection: &mut Collection) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        collection.id = Uuid::new_v4().to_string();
        let now = Utc::now();
        collection.created_at = now;
        collection.updated_at = now;

        conn.execute(
            r#"INSERT INTO collections (id, owner_id, name, privacy, items, cover_image,
                like_count, comment_count, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"#,
            params![
                &collection.id,
                &collection.owner_id,
                &collection.name,
                collection.privacy.as_str(),
                serde_json::to_string(&collection.items)?,
                &collection.cover_image,
                collection.like_count,
                collection.comment_count,
                collection.created_at.to_rfc3339(),
                collection.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_collection(&self, id: &str) -> StoreResult<Collection> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM collections WHERE id = ?1",
            params![id],
            |row| row_to_collection(row),
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                StoreError::NotFound(format!("Collection {}", id))
            }
            _ => StoreError::Database(e),
        })
    }

    pub fn update_collection_details(
        &self,
        id: &str,
        name: Option<&str>,
        privacy: Option<Privacy>,
    ) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let mut collection = conn
            .query_row(
                "SELECT * FROM collections WHERE id = ?1",
                params![id],
                |row| row_to_collection(row),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    StoreError::NotFound(format!("Collection {}", id))
                }
                _ => StoreError::Database(e),
            })?;

        if let Some(n) = name {
            collection.name = n.to_string();
        }
        if let Some(p) = privacy {
            collection.privacy = p;
        }

        conn.execute(
            "UPDATE collections SET name = ?1, privacy = ?2, updated_at = ?3 WHERE id = ?4",
            params![
                &collection.name,
                collection.privacy.as_str(),
                Utc::now().to_rfc3339(),
                id
            ],
        )?;
        Ok(())
    }

    /// Deletes the collection row only. Interaction rows keyed by its id are
    /// left behind and become unreachable.
    pub fn delete_collection(&self, id: &str) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute("DELETE FROM collections WHERE id = ?1", params![id])?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("Collection {}", id)));
        }
        Ok(())
    }

    pub fn list_collections_by_owner(&self, owner_id: &str) -> StoreResult<Vec<Collection>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM collections WHERE owner_id = ?1 ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map(params![owner_id], |row| row_to_collection(row))?;

        let mut collections = Vec::new();
        for row in rows {
            collections.push(row?);
        }
        Ok(collections)
    }

    /// Bulk query for feed assembly: collections owned by any of `owners`
    /// whose privacy is public or followers. Callers batch owners in tens.
    pub fn list_collections_by_owners_batch(
        &self,
        owners: &[String],
    ) -> StoreResult<Vec<Collection>> {
        if owners.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock().unwrap();
        let placeholders = owners
            .iter()
            .enumerate()
            .map(|(i, _)| format!("?{}", i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT * FROM collections WHERE owner_id IN ({}) AND privacy IN ('public', 'followers')",
            placeholders
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(owners.iter()),
            |row| row_to_collection(row),
        )?;

        let mut collections = Vec::new();
        for row in rows {
            collections.push(row?);
        }
        Ok(collections)
    }

    pub fn list_public_collections_recent(&self, limit: i64) -> StoreResult<Vec<Collection>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM collections WHERE privacy = 'public' ORDER BY created_at DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |row| row_to_collection(row))?;

        let mut collections = Vec::new();
        for row in rows {
            collections.push(row?);
        }
        Ok(collections)
    }

    /// Persist a recomputed item set and its derived cover image.
    pub fn replace_items(
        &self,
        collection_id: &str,
        items: &[CollectionItem],
        cover_image: Option<&str>,
    ) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE collections SET items = ?1, cover_image = ?2, updated_at = ?3 WHERE id = ?4",
            params![
                serde_json::to_string(items)?,
                cover_image,
                Utc::now().to_rfc3339(),
                collection_id
            ],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("Collection {}", collection_id)));
        }
        Ok(())
    }

    /// Copy the interaction document's counters onto the collection row.
    /// Missing interaction rows reset the counters to zero.
    pub fn sync_collection_counts(&self, collection_id: &str) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"UPDATE collections SET
                 like_count = COALESCE((SELECT like_count FROM collection_interactions
                                        WHERE collection_id = ?1), 0),
                 comment_count = COALESCE((SELECT comment_count FROM collection_interactions
                                           WHERE collection_id = ?1), 0)
               WHERE id = ?1"#,
            params![collection_id],
        )?;
        Ok(())
    }

    /// Maintenance pass: re-derive every collection's counters from its
    /// interaction document.
    pub fn refresh_all_collection_counts(&self) -> StoreResult<usize> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            r#"UPDATE collections SET
                 like_count = COALESCE((SELECT i.like_count FROM collection_interactions i
                                        WHERE i.collection_id = collections.id), 0),
                 comment_count = COALESCE((SELECT i.comment_count FROM collection_interactions i
                                           WHERE i.collection_id = collections.id), 0)"#,
            [],
        )?;
        Ok(rows)
    }

    // ==================== Collection Interaction Operations ====================

    pub fn get_collection_interaction(
        &self,
        collection_id: &str,
    ) -> StoreResult<Option<CollectionInteraction>> {
        let conn = self.conn.lock().unwrap();
        match conn.query_row(
            "SELECT * FROM collection_interactions WHERE collection_id = ?1",
            params![collection_id],
            |row| row_to_collection_interaction(row),
        ) {
            Ok(interaction) => Ok(Some(interaction)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    /// Explicit read-then-conditional-create. Runs inside a transaction so
    /// two first-time interactors resolve to a single row.
    pub fn get_or_create_collection_interaction(
        &self,
        collection_id: &str,
    ) -> StoreResult<CollectionInteraction> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let existing = match tx.query_row(
            "SELECT * FROM collection_interactions WHERE collection_id = ?1",
            params![collection_id],
            |row| row_to_collection_interaction(row),
        ) {
            Ok(interaction) => Some(interaction),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => return Err(StoreError::Database(e)),
        };

        let interaction = match existing {
            Some(i) => i,
            None => {
                let fresh = CollectionInteraction::empty(collection_id);
                tx.execute(
                    r#"INSERT INTO collection_interactions
                        (collection_id, likes, comments, like_count, comment_count, created_at, updated_at)
                       VALUES (?1, '[]', '[]', 0, 0, ?2, ?3)"#,
                    params![
                        collection_id,
                        fresh.created_at.to_rfc3339(),
                        fresh.updated_at.to_rfc3339()
                    ],
                )?;
                fresh
            }
        };
        tx.commit()?;
        Ok(interaction)
    }

    /// Flip `user_id`'s membership in the likes array. The array rewrite and
    /// the SQL-side counter increment happen in one transaction, so the
    /// `like_count == likes.len()` invariant holds under concurrency.
    pub fn toggle_collection_like(
        &self,
        collection_id: &str,
        user_id: &str,
    ) -> StoreResult<bool> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        ensure_collection_interaction(&tx, collection_id)?;
        let mut likes: Vec<String> = tx.query_row(
            "SELECT likes FROM collection_interactions WHERE collection_id = ?1",
            params![collection_id],
            |row| row.get::<_, String>(0),
        )
        .map(|s| serde_json::from_str(&s).unwrap_or_default())?;

        let now_liked = if likes.iter().any(|id| id == user_id) {
            likes.retain(|id| id != user_id);
            false
        } else {
            likes.push(user_id.to_string());
            true
        };
        let delta: i64 = if now_liked { 1 } else { -1 };

        tx.execute(
            r#"UPDATE collection_interactions
               SET likes = ?1, like_count = like_count + ?2, updated_at = ?3
               WHERE collection_id = ?4"#,
            params![
                serde_json::to_string(&likes)?,
                delta,
                Utc::now().to_rfc3339(),
                collection_id
            ],
        )?;
        tx.commit()?;
        Ok(now_liked)
    }

    pub fn add_collection_comment(
        &self,
        collection_id: &str,
        user_id: &str,
        username: &str,
        text: &str,
    ) -> StoreResult<CollectionComment> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(StoreError::InvalidInput("Comment text cannot be empty".to_string()));
        }

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        ensure_collection_interaction(&tx, collection_id)?;
        let mut comments: Vec<CollectionComment> = tx.query_row(
            "SELECT comments FROM collection_interactions WHERE collection_id = ?1",
            params![collection_id],
            |row| row.get::<_, String>(0),
        )
        .map(|s| serde_json::from_str(&s).unwrap_or_default())?;

        let comment = CollectionComment {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            username: username.to_string(),
            text: trimmed.to_string(),
            created_at: Utc::now(),
            likes: Vec::new(),
            like_count: 0,
        };
        comments.push(comment.clone());

        tx.execute(
            r#"UPDATE collection_interactions
               SET comments = ?1, comment_count = comment_count + 1, updated_at = ?2
               WHERE collection_id = ?3"#,
            params![
                serde_json::to_string(&comments)?,
                Utc::now().to_rfc3339(),
                collection_id
            ],
        )?;
        tx.commit()?;
        Ok(comment)
    }

    /// Flip `user_id` in one comment's likes; the whole comments array is
    /// rewritten since there is no per-comment row granularity.
    pub fn toggle_collection_comment_like(
        &self,
        collection_id: &str,
        comment_id: &str,
        user_id: &str,
    ) -> StoreResult<bool> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let mut comments: Vec<CollectionComment> = tx
            .query_row(
                "SELECT comments FROM collection_interactions WHERE collection_id = ?1",
                params![collection_id],
                |row| row.get::<_, String>(0),
            )
            .map(|s| serde_json::from_str(&s).unwrap_or_default())
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    StoreError::NotFound(format!("Interaction {}", collection_id))
                }
                _ => StoreError::Database(e),
            })?;

        let comment = comments
            .iter_mut()
            .find(|c| c.id == comment_id)
            .ok_or_else(|| StoreError::NotFound(format!("Comment {}", comment_id)))?;

        let now_liked = if comment.likes.iter().any(|id| id == user_id) {
            comment.likes.retain(|id| id != user_id);
            comment.like_count -= 1;
            false
        } else {
            comment.likes.push(user_id.to_string());
            comment.like_count += 1;
            true
        };

        tx.execute(
            "UPDATE collection_interactions SET comments = ?1, updated_at = ?2 WHERE collection_id = ?3",
            params![
                serde_json::to_string(&comments)?,
                Utc::now().to_rfc3339(),
                collection_id
            ],
        )?;
        tx.commit()?;
        Ok(now_liked)
    }

    /// Top interaction documents by likes, comments breaking ties. The
    /// counter columns are maintained on every mutation, so this is an
    /// indexed scan rather than a full-table client-side sort.
    pub fn top_interactions(&self, limit: i64) -> StoreResult<Vec<CollectionInteraction>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"SELECT * FROM collection_interactions
               ORDER BY like_count DESC, comment_count DESC LIMIT ?1"#,
        )?;
        let rows = stmt.query_map(params![limit], |row| row_to_collection_interaction(row))?;

        let mut interactions = Vec::new();
        for row in rows {
            interactions.push(row?);
        }
        Ok(interactions)
    }

    // ==================== Post Interaction Operations ====================

    pub fn get_post_interaction(&self, post_id: &str) -> StoreResult<Option<PostInteraction>> {
        let conn = self.conn.lock().unwrap();
        match conn.query_row(
            "SELECT * FROM apod_posts_interactions WHERE post_id = ?1",
            params![post_id],
            |row| row_to_post_interaction(row),
        ) {
            Ok(interaction) => Ok(Some(interaction)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    /// Lazy creation with a metadata snapshot from the triggering call.
    /// The snapshot is written once and never re-synced afterward.
    pub fn get_or_create_post_interaction(
        &self,
        post_id: &str,
        title: Option<&str>,
        url: Option<&str>,
        media_type: Option<&str>,
    ) -> StoreResult<PostInteraction> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let existing = match tx.query_row(
            "SELECT * FROM apod_posts_interactions WHERE post_id = ?1",
            params![post_id],
            |row| row_to_post_interaction(row),
        ) {
            Ok(interaction) => Some(interaction),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => return Err(StoreError::Database(e)),
        };

        let interaction = match existing {
            Some(i) => i,
            None => {
                let mut fresh = PostInteraction::empty(post_id);
                fresh.title = title.map(|s| s.to_string());
                fresh.url = url.map(|s| s.to_string());
                fresh.media_type = media_type.map(|s| s.to_string());
                tx.execute(
                    r#"INSERT INTO apod_posts_interactions
                        (post_id, title, url, media_type, likes, comments, saved_in_collections, first_interaction_at)
                       VALUES (?1, ?2, ?3, ?4, '[]', '[]', '[]', ?5)"#,
                    params![
                        post_id,
                        &fresh.title,
                        &fresh.url,
                        &fresh.media_type,
                        fresh.first_interaction_at.to_rfc3339()
                    ],
                )?;
                fresh
            }
        };
        tx.commit()?;
        Ok(interaction)
    }

    pub fn toggle_post_like(&self, post_id: &str, user_id: &str) -> StoreResult<bool> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let mut likes: Vec<String> = tx
            .query_row(
                "SELECT likes FROM apod_posts_interactions WHERE post_id = ?1",
                params![post_id],
                |row| row.get::<_, String>(0),
            )
            .map(|s| serde_json::from_str(&s).unwrap_or_default())
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    StoreError::NotFound(format!("Post interaction {}", post_id))
                }
                _ => StoreError::Database(e),
            })?;

        let now_liked = if likes.iter().any(|id| id == user_id) {
            likes.retain(|id| id != user_id);
            false
        } else {
            likes.push(user_id.to_string());
            true
        };

        tx.execute(
            "UPDATE apod_posts_interactions SET likes = ?1 WHERE post_id = ?2",
            params![serde_json::to_string(&likes)?, post_id],
        )?;
        tx.commit()?;
        Ok(now_liked)
    }

    pub fn add_post_comment(
        &self,
        post_id: &str,
        user_id: &str,
        username: &str,
        text: &str,
    ) -> StoreResult<PostComment> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(StoreError::InvalidInput("Comment text cannot be empty".to_string()));
        }

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let mut comments: Vec<PostComment> = tx
            .query_row(
                "SELECT comments FROM apod_posts_interactions WHERE post_id = ?1",
                params![post_id],
                |row| row.get::<_, String>(0),
            )
            .map(|s| serde_json::from_str(&s).unwrap_or_default())
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    StoreError::NotFound(format!("Post interaction {}", post_id))
                }
                _ => StoreError::Database(e),
            })?;

        let comment = PostComment {
            user_id: user_id.to_string(),
            username: username.to_string(),
            text: trimmed.to_string(),
            created_at: Utc::now(),
        };
        comments.push(comment.clone());

        tx.execute(
            "UPDATE apod_posts_interactions SET comments = ?1 WHERE post_id = ?2",
            params![serde_json::to_string(&comments)?, post_id],
        )?;
        tx.commit()?;
        Ok(comment)
    }

    /// Mirror a collection membership into the post's saved-in list.
    pub fn set_saved_ref(&self, post_id: &str, saved: &SavedRef) -> StoreResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let mut refs: Vec<SavedRef> = tx
            .query_row(
                "SELECT saved_in_collections FROM apod_posts_interactions WHERE post_id = ?1",
                params![post_id],
                |row| row.get::<_, String>(0),
            )
            .map(|s| serde_json::from_str(&s).unwrap_or_default())
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    StoreError::NotFound(format!("Post interaction {}", post_id))
                }
                _ => StoreError::Database(e),
            })?;

        if !refs.contains(saved) {
            refs.push(saved.clone());
        }

        tx.execute(
            "UPDATE apod_posts_interactions SET saved_in_collections = ?1 WHERE post_id = ?2",
            params![serde_json::to_string(&refs)?, post_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn remove_saved_ref(
        &self,
        post_id: &str,
        user_id: &str,
        collection_id: &str,
    ) -> StoreResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let mut refs: Vec<SavedRef> = tx
            .query_row(
                "SELECT saved_in_collections FROM apod_posts_interactions WHERE post_id = ?1",
                params![post_id],
                |row| row.get::<_, String>(0),
            )
            .map(|s| serde_json::from_str(&s).unwrap_or_default())
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    StoreError::NotFound(format!("Post interaction {}", post_id))
                }
                _ => StoreError::Database(e),
            })?;

        refs.retain(|r| !(r.user_id == user_id && r.collection_id == collection_id));

        tx.execute(
            "UPDATE apod_posts_interactions SET saved_in_collections = ?1 WHERE post_id = ?2",
            params![serde_json::to_string(&refs)?, post_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    // ==================== Message Operations ====================

    pub fn insert_message(&self, message: &mut Message) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        message.id = Uuid::new_v4().to_string();
        message.created_at = Utc::now();

        conn.execute(
            r#"INSERT INTO messages
                (id, conversation_id, from_id, from_username, to_id, to_username, text, created_at, seen)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
            params![
                &message.id,
                &message.conversation_id,
                &message.from,
                &message.from_username,
                &message.to,
                &message.to_username,
                &message.text,
                message.created_at.to_rfc3339(),
                message.seen,
            ],
        )?;
        Ok(())
    }

    /// Most recent `limit` messages of a conversation, ascending by time.
    pub fn list_messages(&self, conversation_id: &str, limit: i64) -> StoreResult<Vec<Message>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"SELECT * FROM messages WHERE conversation_id = ?1
               ORDER BY created_at DESC LIMIT ?2"#,
        )?;
        let rows = stmt.query_map(params![conversation_id, limit], |row| row_to_message(row))?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        messages.reverse();
        Ok(messages)
    }

    pub fn last_message(&self, conversation_id: &str) -> StoreResult<Option<Message>> {
        let conn = self.conn.lock().unwrap();
        match conn.query_row(
            r#"SELECT * FROM messages WHERE conversation_id = ?1
               ORDER BY created_at DESC LIMIT 1"#,
            params![conversation_id],
            |row| row_to_message(row),
        ) {
            Ok(message) => Ok(Some(message)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    /// Latest message per conversation the user participates in, newest first.
    pub fn list_conversations_for(&self, user_id: &str) -> StoreResult<Vec<Message>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"SELECT * FROM messages WHERE from_id = ?1 OR to_id = ?1
               ORDER BY created_at DESC"#,
        )?;
        let rows = stmt.query_map(params![user_id], |row| row_to_message(row))?;

        let mut latest: HashMap<String, Message> = HashMap::new();
        let mut order = Vec::new();
        for row in rows {
            let message = row?;
            if !latest.contains_key(&message.conversation_id) {
                order.push(message.conversation_id.clone());
                latest.insert(message.conversation_id.clone(), message);
            }
        }

        Ok(order
            .into_iter()
            .filter_map(|cid| latest.remove(&cid))
            .collect())
    }
}

/// Shared with toggle/comment writers that already hold a transaction.
fn ensure_collection_interaction(
    tx: &rusqlite::Transaction,
    collection_id: &str,
) -> StoreResult<()> {
    let exists: bool = tx
        .query_row(
            "SELECT 1 FROM collection_interactions WHERE collection_id = ?1",
            params![collection_id],
            |_| Ok(true),
        )
        .unwrap_or(false);
    if !exists {
        let now = Utc::now().to_rfc3339();
        tx.execute(
            r#"INSERT INTO collection_interactions
                (collection_id, likes, comments, like_count, comment_count, created_at, updated_at)
               VALUES (?1, '[]', '[]', 0, 0, ?2, ?2)"#,
            params![collection_id, &now],
        )?;
    }
    Ok(())
}

fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    let followers: String = row.get("followers")?;
    let following: String = row.get("following")?;
    let collections_order: String = row.get("collections_order")?;

    Ok(User {
        id: row.get("id")?,
        username: row.get("username")?,
        email: row.get("email")?,
        password_hash: row.get("password_hash")?,
        followers: serde_json::from_str(&followers).unwrap_or_default(),
        following: serde_json::from_str(&following).unwrap_or_default(),
        collections_order: serde_json::from_str(&collections_order).unwrap_or_default(),
        profile_pic_url: row.get("profile_pic_url")?,
        bio: row.get("bio")?,
        created_at: parse_datetime(row.get::<_, String>("created_at")?),
        updated_at: parse_datetime(row.get::<_, String>("updated_at")?),
    })
}

fn row_to_collection(row: &rusqlite::Row) -> rusqlite::Result<Collection> {
    let items: String = row.get("items")?;
    let privacy: String = row.get("privacy")?;

    Ok(Collection {
        id: row.get("id")?,
        owner_id: row.get("owner_id")?,
        name: row.get("name")?,
        privacy: Privacy::parse(&privacy).unwrap_or(Privacy::Private),
        items: serde_json::from_str(&items).unwrap_or_default(),
        cover_image: row.get("cover_image")?,
        like_count: row.get("like_count")?,
        comment_count: row.get("comment_count")?,
        created_at: parse_datetime(row.get::<_, String>("created_at")?),
        updated_at: parse_datetime(row.get::<_, String>("updated_at")?),
    })
}

fn row_to_collection_interaction(row: &rusqlite::Row) -> rusqlite::Result<CollectionInteraction> {
    let likes: String = row.get("likes")?;
    let comments: String = row.get("comments")?;

    Ok(CollectionInteraction {
        collection_id: row.get("collection_id")?,
        likes: serde_json::from_str(&likes).unwrap_or_default(),
        comments: serde_json::from_str(&comments).unwrap_or_default(),
        like_count: row.get("like_count")?,
        comment_count: row.get("comment_count")?,
        created_at: parse_datetime(row.get::<_, String>("created_at")?),
        updated_at: parse_datetime(row.get::<_, String>("updated_at")?),
    })
}

fn row_to_post_interaction(row: &rusqlite::Row) -> rusqlite::Result<PostInteraction> {
    let likes: String = row.get("likes")?;
    let comments: String = row.get("comments")?;
    let saved: String = row.get("saved_in_collections")?;

    Ok(PostInteraction {
        post_id: row.get("post_id")?,
        title: row.get("title")?,
        url: row.get("url")?,
        media_type: row.get("media_type")?,
        likes: serde_json::from_str(&likes).unwrap_or_default(),
        comments: serde_json::from_str(&comments).unwrap_or_default(),
        saved_in_collections: serde_json::from_str(&saved).unwrap_or_default(),
        first_interaction_at: parse_datetime(row.get::<_, String>("first_interaction_at")?),
    })
}

fn row_to_message(row: &rusqlite::Row) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get("id")?,
        conversation_id: row.get("conversation_id")?,
        from: row.get("from_id")?,
        from_username: row.get("from_username")?,
        to: row.get("to_id")?,
        to_username: row.get("to_username")?,
        text: row.get("text")?,
        created_at: parse_datetime(row.get::<_, String>("created_at")?),
        seen: row.get("seen")?,
    })
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
