use actix_web::{web, HttpResponse, Responder};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;

use crate::apod::ApodClient;
use crate::auth::{AuthService, AuthUser, MaybeAuthUser};
use crate::collections::CollectionService;
use crate::feed::FeedService;
use crate::interactions::InteractionService;
use crate::messaging::MessagingService;
use crate::models::*;
use crate::social::SocialService;
use crate::store::{Store, StoreError};

pub struct AppState {
    pub store: Arc<Store>,
    pub auth_service: Arc<AuthService>,
    pub collections: Arc<CollectionService>,
    pub interactions: Arc<InteractionService>,
    pub feed: Arc<FeedService>,
    pub social: Arc<SocialService>,
    pub messaging: Arc<MessagingService>,
    pub apod: Arc<ApodClient>,
}

/// Shared status mapping for store/service failures.
fn error_response(e: StoreError) -> HttpResponse {
    match e {
        StoreError::NotFound(what) => {
            HttpResponse::NotFound().json(ApiResponse::<()>::error(format!("{} not found", what)))
        }
        StoreError::InvalidInput(msg) => {
            HttpResponse::BadRequest().json(ApiResponse::<()>::error(msg))
        }
        other => {
            log::error!("Request failed: {}", other);
            HttpResponse::InternalServerError().json(ApiResponse::<()>::error("Internal error"))
        }
    }
}

// ==================== Health Check ====================

pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339()
    }))
}

// ==================== Auth Endpoints ====================

pub async fn register(
    state: web::Data<AppState>,
    body: web::Json<RegisterRequest>,
) -> impl Responder {
    if body.username.trim().is_empty() || body.email.trim().is_empty() {
        return HttpResponse::BadRequest()
            .json(ApiResponse::<()>::error("Username and email are required"));
    }
    if body.password.is_empty() {
        return HttpResponse::BadRequest().json(ApiResponse::<()>::error("Password is required"));
    }

    let password_hash = match state.auth_service.hash_password(&body.password) {
        Ok(hash) => hash,
        Err(_) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to hash password"))
        }
    };

    let mut user = User {
        id: String::new(),
        username: body.username.trim().to_string(),
        email: body.email.trim().to_string(),
        password_hash,
        followers: Vec::new(),
        following: Vec::new(),
        collections_order: Vec::new(),
        profile_pic_url: String::new(),
        bio: String::new(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    if let Err(e) = state.store.create_user(&mut user) {
        return HttpResponse::BadRequest()
            .json(ApiResponse::<()>::error(format!("Failed to create user: {}", e)));
    }

    let token = match state.auth_service.generate_token(&user.id) {
        Ok(t) => t,
        Err(_) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to generate token"))
        }
    };

    HttpResponse::Created().json(ApiResponse::success(LoginResponse { token, user }))
}

pub async fn login(state: web::Data<AppState>, body: web::Json<LoginRequest>) -> impl Responder {
    let user = match state.store.get_user_by_username(&body.username) {
        Ok(u) => u,
        Err(StoreError::NotFound(_)) => {
            return HttpResponse::Unauthorized()
                .json(ApiResponse::<()>::error("Invalid credentials"));
        }
        Err(_) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Database error"));
        }
    };

    let valid = state
        .auth_service
        .verify_password(&body.password, &user.password_hash)
        .unwrap_or(false);

    if !valid {
        return HttpResponse::Unauthorized().json(ApiResponse::<()>::error("Invalid credentials"));
    }

    let token = match state.auth_service.generate_token(&user.id) {
        Ok(t) => t,
        Err(_) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to generate token"))
        }
    };

    HttpResponse::Ok().json(ApiResponse::success(LoginResponse { token, user }))
}

pub async fn get_current_user(
    state: web::Data<AppState>,
    auth_user: AuthUser,
) -> impl Responder {
    match state.store.get_user(&auth_user.user_id) {
        Ok(user) => HttpResponse::Ok().json(ApiResponse::success(user)),
        Err(_) => HttpResponse::NotFound().json(ApiResponse::<()>::error("User not found")),
    }
}

// ==================== User Endpoints ====================

#[derive(Deserialize)]
pub struct SearchQuery {
    q: Option<String>,
}

pub async fn search_users(
    state: web::Data<AppState>,
    query: web::Query<SearchQuery>,
) -> impl Responder {
    let q = query.q.as_deref().unwrap_or("");
    match state.social.search(q) {
        Ok(users) => HttpResponse::Ok().json(ApiResponse::success(users)),
        Err(e) => error_response(e),
    }
}

pub async fn get_profile(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let id = path.into_inner();
    match state.store.get_user(&id) {
        Ok(user) => HttpResponse::Ok().json(ApiResponse::success(user)),
        Err(e) => error_response(e),
    }
}

pub async fn update_profile(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    body: web::Json<UpdateProfileRequest>,
) -> impl Responder {
    if let Err(e) = state.store.update_profile(
        &auth_user.user_id,
        body.profile_pic_url.as_deref(),
        body.bio.as_deref(),
    ) {
        return error_response(e);
    }
    match state.store.get_user(&auth_user.user_id) {
        Ok(user) => HttpResponse::Ok().json(ApiResponse::success(user)),
        Err(e) => error_response(e),
    }
}

pub async fn get_followers(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    match state.social.followers_of(&path.into_inner()) {
        Ok(users) => HttpResponse::Ok().json(ApiResponse::success(users)),
        Err(e) => error_response(e),
    }
}

pub async fn get_following(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    match state.social.following_of(&path.into_inner()) {
        Ok(users) => HttpResponse::Ok().json(ApiResponse::success(users)),
        Err(e) => error_response(e),
    }
}

pub async fn get_mutuals(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    match state.social.mutuals(&path.into_inner()) {
        Ok(users) => HttpResponse::Ok().json(ApiResponse::success(users)),
        Err(e) => error_response(e),
    }
}

pub async fn follow_user(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> impl Responder {
    match state.social.follow(&auth_user.user_id, &path.into_inner()) {
        Ok(_) => HttpResponse::Ok().json(ApiResponse::success(serde_json::json!({"following": true}))),
        Err(e) => error_response(e),
    }
}

pub async fn unfollow_user(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> impl Responder {
    match state.social.unfollow(&auth_user.user_id, &path.into_inner()) {
        Ok(_) => {
            HttpResponse::Ok().json(ApiResponse::success(serde_json::json!({"following": false})))
        }
        Err(e) => error_response(e),
    }
}

// ==================== Collection Endpoints ====================

pub async fn create_collection(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    body: web::Json<CreateCollectionRequest>,
) -> impl Responder {
    match state
        .collections
        .create(&auth_user.user_id, &body.name, body.privacy)
    {
        Ok(collection) => HttpResponse::Created().json(ApiResponse::success(collection)),
        Err(e) => error_response(e),
    }
}

pub async fn get_collection(
    state: web::Data<AppState>,
    viewer: MaybeAuthUser,
    path: web::Path<String>,
) -> impl Responder {
    match state
        .collections
        .get_with_access(viewer.user_id(), &path.into_inner())
    {
        Ok(collection) => HttpResponse::Ok().json(ApiResponse::success(collection)),
        Err(e) => error_response(e),
    }
}

pub async fn update_collection(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
    body: web::Json<UpdateCollectionRequest>,
) -> impl Responder {
    match state.collections.update_details(
        &auth_user.user_id,
        &path.into_inner(),
        body.name.as_deref(),
        body.privacy,
    ) {
        Ok(collection) => HttpResponse::Ok().json(ApiResponse::success(collection)),
        Err(e) => error_response(e),
    }
}

pub async fn delete_collection(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> impl Responder {
    match state.collections.delete(&auth_user.user_id, &path.into_inner()) {
        Ok(_) => HttpResponse::NoContent().finish(),
        Err(e) => error_response(e),
    }
}

pub async fn toggle_collection_item(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
    body: web::Json<ToggleItemRequest>,
) -> impl Responder {
    match state
        .collections
        .toggle_item(
            &auth_user.user_id,
            &path.into_inner(),
            &body.post_id,
            body.title.as_deref(),
            body.media_type.as_deref(),
            body.url.as_deref(),
        )
        .await
    {
        Ok(outcome) => {
            HttpResponse::Ok().json(ApiResponse::success(serde_json::json!({"result": outcome})))
        }
        Err(e) => error_response(e),
    }
}

pub async fn reorder_collections(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    body: web::Json<ReorderRequest>,
) -> impl Responder {
    match state.collections.reorder(&auth_user.user_id, &body.order) {
        Ok(order) => {
            HttpResponse::Ok().json(ApiResponse::success(serde_json::json!({"order": order})))
        }
        Err(e) => error_response(e),
    }
}

pub async fn list_user_collections(
    state: web::Data<AppState>,
    viewer: MaybeAuthUser,
    path: web::Path<String>,
) -> impl Responder {
    match state
        .feed
        .profile_collections(&path.into_inner(), viewer.user_id())
    {
        Ok(collections) => HttpResponse::Ok().json(ApiResponse::success(collections)),
        Err(e) => error_response(e),
    }
}

// ==================== Feed Endpoints ====================

#[derive(Deserialize)]
pub struct CountQuery {
    count: Option<i64>,
}

pub async fn following_feed(state: web::Data<AppState>, auth_user: AuthUser) -> impl Responder {
    match state.feed.following_collections(&auth_user.user_id) {
        Ok(collections) => HttpResponse::Ok().json(ApiResponse::success(collections)),
        Err(e) => error_response(e),
    }
}

pub async fn recent_feed(
    state: web::Data<AppState>,
    query: web::Query<CountQuery>,
) -> impl Responder {
    let count = query.count.unwrap_or(10).min(100);
    match state.feed.recent_public(count) {
        Ok(collections) => HttpResponse::Ok().json(ApiResponse::success(collections)),
        Err(e) => error_response(e),
    }
}

pub async fn popular_feed(
    state: web::Data<AppState>,
    query: web::Query<CountQuery>,
) -> impl Responder {
    let count = query.count.unwrap_or(20).min(100);
    match state.interactions.popular_collections(count) {
        Ok(collections) => HttpResponse::Ok().json(ApiResponse::success(collections)),
        Err(e) => error_response(e),
    }
}

// ==================== Collection Interaction Endpoints ====================

pub async fn get_collection_interactions(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    match state.interactions.collection_interaction(&path.into_inner()) {
        Ok(interaction) => HttpResponse::Ok().json(ApiResponse::success(interaction)),
        Err(e) => error_response(e),
    }
}

pub async fn toggle_collection_like(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> impl Responder {
    match state
        .interactions
        .toggle_collection_like(&path.into_inner(), &auth_user.user_id)
    {
        Ok(liked) => {
            HttpResponse::Ok().json(ApiResponse::success(serde_json::json!({"liked": liked})))
        }
        Err(e) => error_response(e),
    }
}

pub async fn add_collection_comment(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
    body: web::Json<CommentRequest>,
) -> impl Responder {
    let user = match state.store.get_user(&auth_user.user_id) {
        Ok(u) => u,
        Err(e) => return error_response(e),
    };
    match state.interactions.add_collection_comment(
        &path.into_inner(),
        &user.id,
        &user.username,
        &body.text,
    ) {
        Ok(comment) => HttpResponse::Created().json(ApiResponse::success(comment)),
        Err(e) => error_response(e),
    }
}

pub async fn toggle_comment_like(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<(String, String)>,
) -> impl Responder {
    let (collection_id, comment_id) = path.into_inner();
    match state
        .interactions
        .toggle_comment_like(&collection_id, &comment_id, &auth_user.user_id)
    {
        Ok(liked) => {
            HttpResponse::Ok().json(ApiResponse::success(serde_json::json!({"liked": liked})))
        }
        Err(e) => error_response(e),
    }
}

// ==================== Post Interaction Endpoints ====================

pub async fn get_post_interactions(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    match state.interactions.post_interaction(&path.into_inner()) {
        Ok(interaction) => HttpResponse::Ok().json(ApiResponse::success(interaction)),
        Err(e) => error_response(e),
    }
}

pub async fn toggle_post_like(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
    body: web::Json<PostLikeRequest>,
) -> impl Responder {
    match state.interactions.toggle_post_like(
        &path.into_inner(),
        &auth_user.user_id,
        body.title.as_deref(),
        body.url.as_deref(),
        body.media_type.as_deref(),
    ) {
        Ok(liked) => {
            HttpResponse::Ok().json(ApiResponse::success(serde_json::json!({"liked": liked})))
        }
        Err(e) => error_response(e),
    }
}

pub async fn add_post_comment(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
    body: web::Json<PostCommentRequest>,
) -> impl Responder {
    let user = match state.store.get_user(&auth_user.user_id) {
        Ok(u) => u,
        Err(e) => return error_response(e),
    };
    match state.interactions.add_post_comment(
        &path.into_inner(),
        &user.id,
        &user.username,
        &body.text,
        body.title.as_deref(),
        body.url.as_deref(),
        body.media_type.as_deref(),
    ) {
        Ok(comment) => HttpResponse::Created().json(ApiResponse::success(comment)),
        Err(e) => error_response(e),
    }
}

// ==================== APOD Endpoints ====================

pub async fn apod_recent(state: web::Data<AppState>) -> impl Responder {
    match state.apod.recent_window(30).await {
        Ok(entries) => HttpResponse::Ok().json(ApiResponse::success(entries)),
        Err(e) => {
            log::warn!("APOD window fetch failed: {}", e);
            HttpResponse::BadGateway().json(ApiResponse::<()>::error("Image service unavailable"))
        }
    }
}

pub async fn apod_by_date(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let date = path.into_inner();
    match state.apod.fetch_by_date(&date).await {
        Ok(Some(apod)) => HttpResponse::Ok().json(ApiResponse::success(apod)),
        Ok(None) => {
            HttpResponse::NotFound().json(ApiResponse::<()>::error(format!("No entry for {}", date)))
        }
        Err(e) => {
            log::warn!("APOD fetch for {} failed: {}", date, e);
            HttpResponse::BadGateway().json(ApiResponse::<()>::error("Image service unavailable"))
        }
    }
}

// ==================== Message Endpoints ====================

pub async fn list_chats(state: web::Data<AppState>, auth_user: AuthUser) -> impl Responder {
    match state.messaging.conversations_for(&auth_user.user_id) {
        Ok(chats) => HttpResponse::Ok().json(ApiResponse::success(chats)),
        Err(e) => error_response(e),
    }
}

pub async fn message_history(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> impl Responder {
    match state.messaging.history(&auth_user.user_id, &path.into_inner()) {
        Ok(messages) => HttpResponse::Ok().json(ApiResponse::success(messages)),
        Err(e) => error_response(e),
    }
}

pub async fn send_message(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
    body: web::Json<SendMessageRequest>,
) -> impl Responder {
    let from = match state.store.get_user(&auth_user.user_id) {
        Ok(u) => u,
        Err(e) => return error_response(e),
    };
    let to = match state.store.get_user(&path.into_inner()) {
        Ok(u) => u,
        Err(e) => return error_response(e),
    };
    match state.messaging.send(&from, &to, &body.text) {
        Ok(message) => HttpResponse::Created().json(ApiResponse::success(message)),
        Err(e) => error_response(e),
    }
}

// ==================== Route Configuration ====================

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg
        // Health check
        .route("/health", web::get().to(health))
        // Auth
        .route("/api/auth/register", web::post().to(register))
        .route("/api/auth/login", web::post().to(login))
        .route("/api/auth/me", web::get().to(get_current_user))
        // Users & social graph
        .route("/api/users/search", web::get().to(search_users))
        .route("/api/users/me", web::put().to(update_profile))
        .route("/api/users/{id}", web::get().to(get_profile))
        .route("/api/users/{id}/followers", web::get().to(get_followers))
        .route("/api/users/{id}/following", web::get().to(get_following))
        .route("/api/users/{id}/mutuals", web::get().to(get_mutuals))
        .route("/api/users/{id}/follow", web::post().to(follow_user))
        .route("/api/users/{id}/follow", web::delete().to(unfollow_user))
        .route("/api/users/{id}/collections", web::get().to(list_user_collections))
        // Collections
        .route("/api/collections", web::post().to(create_collection))
        .route("/api/collections/order", web::put().to(reorder_collections))
        .route("/api/collections/{id}", web::get().to(get_collection))
        .route("/api/collections/{id}", web::put().to(update_collection))
        .route("/api/collections/{id}", web::delete().to(delete_collection))
        .route("/api/collections/{id}/items", web::post().to(toggle_collection_item))
        // Collection interactions
        .route("/api/collections/{id}/interactions", web::get().to(get_collection_interactions))
        .route("/api/collections/{id}/likes", web::post().to(toggle_collection_like))
        .route("/api/collections/{id}/comments", web::post().to(add_collection_comment))
        .route(
            "/api/collections/{id}/comments/{comment_id}/likes",
            web::post().to(toggle_comment_like),
        )
        // Feeds
        .route("/api/feed/following", web::get().to(following_feed))
        .route("/api/feed/recent", web::get().to(recent_feed))
        .route("/api/feed/popular", web::get().to(popular_feed))
        // Post interactions
        .route("/api/posts/{id}/interactions", web::get().to(get_post_interactions))
        .route("/api/posts/{id}/likes", web::post().to(toggle_post_like))
        .route("/api/posts/{id}/comments", web::post().to(add_post_comment))
        // APOD proxy
        .route("/api/apod/recent", web::get().to(apod_recent))
        .route("/api/apod/{date}", web::get().to(apod_by_date))
        // Messages
        .route("/api/messages", web::get().to(list_chats))
        .route("/api/messages/{peer}", web::get().to(message_history))
        .route("/api/messages/{peer}", web::post().to(send_message));
}
