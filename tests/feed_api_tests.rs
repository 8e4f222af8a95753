use actix_web::{test, web, App};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;

use astronova::api::{self, AppState};
use astronova::apod::ApodClient;
use astronova::auth::AuthService;
use astronova::collections::CollectionService;
use astronova::feed::FeedService;
use astronova::interactions::InteractionService;
use astronova::messaging::MessagingService;
use astronova::models::{Privacy, User};
use astronova::realtime::SubscriptionHub;
use astronova::social::SocialService;
use astronova::store::Store;

fn create_app_state(store: Arc<Store>, auth_service: Arc<AuthService>) -> AppState {
    let hub = SubscriptionHub::new();
    let apod = Arc::new(ApodClient::new("http://127.0.0.1:0", "TEST_KEY"));
    AppState {
        store: store.clone(),
        auth_service,
        collections: Arc::new(CollectionService::new(store.clone(), apod.clone())),
        interactions: Arc::new(InteractionService::new(store.clone(), hub.clone())),
        feed: Arc::new(FeedService::new(store.clone())),
        social: Arc::new(SocialService::new(store.clone())),
        messaging: Arc::new(MessagingService::new(store.clone(), hub)),
        apod,
    }
}

fn create_test_user_with_token(
    store: &Arc<Store>,
    auth_service: &Arc<AuthService>,
    username: &str,
) -> (User, String) {
    let mut user = User {
        id: String::new(),
        username: username.to_string(),
        email: format!("{}@test.com", username),
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
    let token = auth_service.generate_token(&user.id).unwrap();
    (user, token)
}

fn seed_collection(store: &Arc<Store>, owner_id: &str, name: &str, privacy: Privacy) -> String {
    let mut collection = astronova::models::Collection {
        id: String::new(),
        owner_id: owner_id.to_string(),
        name: name.to_string(),
        privacy,
        items: Vec::new(),
        cover_image: None,
        like_count: 0,
        comment_count: 0,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    store.create_collection(&mut collection).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(2));
    collection.id
}

#[actix_web::test]
async fn test_following_feed_filters_and_sorts() {
    let store = Arc::new(Store::in_memory().unwrap());
    let auth_service = Arc::new(AuthService::new("test_secret".to_string()));
    let (alice, alice_token) = create_test_user_with_token(&store, &auth_service, "alice");
    let (bob, _) = create_test_user_with_token(&store, &auth_service, "bob");
    let (carol, _) = create_test_user_with_token(&store, &auth_service, "carol");

    seed_collection(&store, &bob.id, "BobPublic", Privacy::Public);
    seed_collection(&store, &bob.id, "BobFollowers", Privacy::Followers);
    seed_collection(&store, &bob.id, "BobPrivate", Privacy::Private);
    seed_collection(&store, &carol.id, "CarolPublic", Privacy::Public);

    // alice follows bob only
    store.set_follow_edge(&alice.id, &bob.id).unwrap();

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(create_app_state(store.clone(), auth_service)))
            .configure(api::configure_routes),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/api/feed/following")
        .insert_header(("Authorization", format!("Bearer {}", alice_token)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    let names: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    // Newest first; carol is not followed; bob's private stays hidden
    assert_eq!(names, vec!["BobFollowers", "BobPublic"]);
}

#[actix_web::test]
async fn test_following_feed_requires_auth() {
    let store = Arc::new(Store::in_memory().unwrap());
    let auth_service = Arc::new(AuthService::new("test_secret".to_string()));

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(create_app_state(store, auth_service)))
            .configure(api::configure_routes),
    )
    .await;

    let req = test::TestRequest::get().uri("/api/feed/following").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
}

#[actix_web::test]
async fn test_recent_feed_public_only() {
    let store = Arc::new(Store::in_memory().unwrap());
    let auth_service = Arc::new(AuthService::new("test_secret".to_string()));
    let (owner, _) = create_test_user_with_token(&store, &auth_service, "owner");

    seed_collection(&store, &owner.id, "Old", Privacy::Public);
    seed_collection(&store, &owner.id, "Hidden", Privacy::Private);
    seed_collection(&store, &owner.id, "New", Privacy::Public);

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(create_app_state(store.clone(), auth_service)))
            .configure(api::configure_routes),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/api/feed/recent?count=1")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    let items = body["data"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["name"], "New");
}

#[actix_web::test]
async fn test_profile_listing_viewer_dependent() {
    let store = Arc::new(Store::in_memory().unwrap());
    let auth_service = Arc::new(AuthService::new("test_secret".to_string()));
    let (owner, owner_token) = create_test_user_with_token(&store, &auth_service, "owner");
    let (follower, follower_token) = create_test_user_with_token(&store, &auth_service, "follower");

    seed_collection(&store, &owner.id, "Public", Privacy::Public);
    seed_collection(&store, &owner.id, "ForFollowers", Privacy::Followers);
    seed_collection(&store, &owner.id, "Private", Privacy::Private);
    store.set_follow_edge(&follower.id, &owner.id).unwrap();

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(create_app_state(store.clone(), auth_service)))
            .configure(api::configure_routes),
    )
    .await;

    let list_as = |token: Option<String>| {
        let mut req =
            test::TestRequest::get().uri(&format!("/api/users/{}/collections", owner.id));
        if let Some(t) = token {
            req = req.insert_header(("Authorization", format!("Bearer {}", t)));
        }
        req.to_request()
    };

    let resp = test::call_service(&app, list_as(Some(owner_token))).await;
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 3);

    let resp = test::call_service(&app, list_as(Some(follower_token))).await;
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let resp = test::call_service(&app, list_as(None)).await;
    let body: serde_json::Value = test::read_body_json(resp).await;
    let items = body["data"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["name"], "Public");
}

#[actix_web::test]
async fn test_unfollow_removes_from_feed() {
    let store = Arc::new(Store::in_memory().unwrap());
    let auth_service = Arc::new(AuthService::new("test_secret".to_string()));
    let (alice, alice_token) = create_test_user_with_token(&store, &auth_service, "alice");
    let (bob, _) = create_test_user_with_token(&store, &auth_service, "bob");

    seed_collection(&store, &bob.id, "BobStuff", Privacy::Public);
    store.set_follow_edge(&alice.id, &bob.id).unwrap();

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(create_app_state(store.clone(), auth_service)))
            .configure(api::configure_routes),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/api/feed/following")
        .insert_header(("Authorization", format!("Bearer {}", alice_token)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let req = test::TestRequest::delete()
        .uri(&format!("/api/users/{}/follow", bob.id))
        .insert_header(("Authorization", format!("Bearer {}", alice_token)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let req = test::TestRequest::get()
        .uri("/api/feed/following")
        .insert_header(("Authorization", format!("Bearer {}", alice_token)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 0);
    assert_eq!(body["data"], json!([]));
}
