//! API routes

pub mod admin;
pub mod auth;
pub mod checkout;
pub mod health;
pub mod subscriptions;
pub mod webhooks;

use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::state::AppState;

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    // Browser calls come from the tenant site at PUBLIC_URL
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_origin(
            state
                .config
                .public_url
                .parse::<HeaderValue>()
                .map(AllowOrigin::exact)
                .unwrap_or_else(|_| AllowOrigin::any()),
        );

    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // Public API routes. The webhook is public by design; it carries
    // its own signature verification.
    let api_routes = Router::new()
        .route("/webhook", post(webhooks::webhook))
        .route("/checkout/open", post(checkout::open_checkout))
        .route("/subscriptions", get(subscriptions::list_subscriptions))
        // Admin sweeps (token guarded inside the handlers)
        .route("/admin/cleanup/customers", post(admin::cleanup_customers))
        .route(
            "/admin/cleanup/cross-tenant",
            post(admin::cleanup_cross_tenant),
        );

    // Login callback lives outside /api to match the provider redirect
    let auth_routes = Router::new().route("/auth/callback", get(auth::callback));

    Router::new()
        .merge(health_routes)
        .merge(auth_routes)
        .nest("/api", api_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
