mod access;
mod api;
mod apod;
mod auth;
mod collections;
mod feed;
mod interactions;
mod messaging;
mod models;
mod realtime;
mod social;
mod store;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use std::env;
use std::sync::Arc;

use api::AppState;
use apod::ApodClient;
use auth::AuthService;
use collections::CollectionService;
use feed::FeedService;
use interactions::InteractionService;
use messaging::MessagingService;
use realtime::SubscriptionHub;
use social::SocialService;
use store::Store;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    // Load environment variables
    dotenvy::dotenv().ok();

    // Get configuration from environment
    let port: u16 = env::var("PORT")
        .unwrap_or_else(|_| "8070".to_string())
        .parse()
        .expect("PORT must be a number");

    let db_path = env::var("DATABASE_PATH").unwrap_or_else(|_| "astronova.db".to_string());

    let jwt_secret = env::var("JWT_SECRET").unwrap_or_else(|_| {
        log::warn!("JWT_SECRET not set, using default (not secure for production!)");
        "default_jwt_secret_change_me".to_string()
    });

    // Initialize store
    let store = Arc::new(Store::new(&db_path).expect("Failed to initialize database"));

    // Initialize services
    let auth_service = Arc::new(AuthService::new(jwt_secret));
    let hub = SubscriptionHub::new();
    let apod_client = Arc::new(ApodClient::from_env());
    let collection_service = Arc::new(CollectionService::new(
        store.clone(),
        apod_client.clone() as Arc<dyn apod::MediaLookup>,
    ));
    let interaction_service = Arc::new(InteractionService::new(store.clone(), hub.clone()));
    let feed_service = Arc::new(FeedService::new(store.clone()));
    let social_service = Arc::new(SocialService::new(store.clone()));
    let messaging_service = Arc::new(MessagingService::new(store.clone(), hub.clone()));

    log::info!("Database: {}", db_path);
    log::info!("Starting astronova server on port {}", port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(web::Data::new(AppState {
                store: store.clone(),
                auth_service: auth_service.clone(),
                collections: collection_service.clone(),
                interactions: interaction_service.clone(),
                feed: feed_service.clone(),
                social: social_service.clone(),
                messaging: messaging_service.clone(),
                apod: apod_client.clone(),
            }))
            .configure(api::configure_routes)
    })
    .workers(1) // Single worker for minimal memory
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
