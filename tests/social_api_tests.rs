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
use astronova::models::User;
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

#[actix_web::test]
async fn test_follow_updates_both_relationship_arrays() {
    let store = Arc::new(Store::in_memory().unwrap());
    let auth_service = Arc::new(AuthService::new("test_secret".to_string()));
    let (alice, alice_token) = create_test_user_with_token(&store, &auth_service, "alice");
    let (bob, _) = create_test_user_with_token(&store, &auth_service, "bob");

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(create_app_state(store.clone(), auth_service)))
            .configure(api::configure_routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri(&format!("/api/users/{}/follow", bob.id))
        .insert_header(("Authorization", format!("Bearer {}", alice_token)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let req = test::TestRequest::get()
        .uri(&format!("/api/users/{}/followers", bob.id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["data"][0]["username"], "alice");

    let req = test::TestRequest::get()
        .uri(&format!("/api/users/{}/following", alice.id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["data"][0]["username"], "bob");
}

#[actix_web::test]
async fn test_self_follow_rejected() {
    let store = Arc::new(Store::in_memory().unwrap());
    let auth_service = Arc::new(AuthService::new("test_secret".to_string()));
    let (alice, alice_token) = create_test_user_with_token(&store, &auth_service, "alice");

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(create_app_state(store, auth_service)))
            .configure(api::configure_routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri(&format!("/api/users/{}/follow", alice.id))
        .insert_header(("Authorization", format!("Bearer {}", alice_token)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
async fn test_follow_unknown_user_404() {
    let store = Arc::new(Store::in_memory().unwrap());
    let auth_service = Arc::new(AuthService::new("test_secret".to_string()));
    let (_, alice_token) = create_test_user_with_token(&store, &auth_service, "alice");

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(create_app_state(store, auth_service)))
            .configure(api::configure_routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/users/no-such-user/follow")
        .insert_header(("Authorization", format!("Bearer {}", alice_token)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
async fn test_mutuals_endpoint() {
    let store = Arc::new(Store::in_memory().unwrap());
    let auth_service = Arc::new(AuthService::new("test_secret".to_string()));
    let (alice, _) = create_test_user_with_token(&store, &auth_service, "alice");
    let (bob, _) = create_test_user_with_token(&store, &auth_service, "bob");
    let (carol, _) = create_test_user_with_token(&store, &auth_service, "carol");

    // alice <-> bob mutual; carol only follows alice
    store.set_follow_edge(&alice.id, &bob.id).unwrap();
    store.set_follow_edge(&bob.id, &alice.id).unwrap();
    store.set_follow_edge(&carol.id, &alice.id).unwrap();

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(create_app_state(store.clone(), auth_service)))
            .configure(api::configure_routes),
    )
    .await;

    let req = test::TestRequest::get()
        .uri(&format!("/api/users/{}/mutuals", alice.id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    let names: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["username"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["bob"]);
}

#[actix_web::test]
async fn test_username_prefix_search() {
    let store = Arc::new(Store::in_memory().unwrap());
    let auth_service = Arc::new(AuthService::new("test_secret".to_string()));
    create_test_user_with_token(&store, &auth_service, "astra");
    create_test_user_with_token(&store, &auth_service, "astrid");
    create_test_user_with_token(&store, &auth_service, "nova");

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(create_app_state(store, auth_service)))
            .configure(api::configure_routes),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/api/users/search?q=astr")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    let names: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["username"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["astra", "astrid"]);

    // Empty query returns nothing rather than the whole directory
    let req = test::TestRequest::get().uri("/api/users/search").to_request();
    let resp = test::call_service(&app, req).await;
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["data"], json!([]));
}

#[actix_web::test]
async fn test_profile_update() {
    let store = Arc::new(Store::in_memory().unwrap());
    let auth_service = Arc::new(AuthService::new("test_secret".to_string()));
    let (_, token) = create_test_user_with_token(&store, &auth_service, "alice");

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(create_app_state(store, auth_service)))
            .configure(api::configure_routes),
    )
    .await;

    let req = test::TestRequest::put()
        .uri("/api/users/me")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .set_json(json!({"bio": "stargazer", "profile_pic_url": "https://pics/alice.png"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["data"]["bio"], "stargazer");
    assert_eq!(body["data"]["profile_pic_url"], "https://pics/alice.png");
}
