pub mod ads;
pub mod auth;
pub mod error;
pub mod extract;
pub mod images;
pub mod indexer;
pub mod middleware;
pub mod payments;
pub mod search;
pub mod state;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, patch, post},
};

pub use state::{AppState, AppStateInner};

/// All API routes with state applied. Cross-cutting layers (CORS, tracing)
/// are added by the server binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/ads", get(ads::list_ads))
        .route("/ads/{ad_id}", get(ads::get_ad))
        .route("/search", get(search::search))
        .route("/webhooks/stripe", post(payments::stripe_webhook));

    let protected_routes = Router::new()
        .route("/ads", post(ads::create_ad))
        .route("/ads/{ad_id}", patch(ads::update_ad).delete(ads::delete_ad))
        .route("/me/ads", get(ads::my_ads))
        .route(
            "/images",
            // Multipart overhead on top of the image itself
            post(images::upload_image)
                .layer(DefaultBodyLimit::max(images::MAX_IMAGE_SIZE + 64 * 1024)),
        )
        .route("/payments/intent", post(payments::create_payment_intent))
        .layer(from_fn_with_state(state.clone(), middleware::require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
