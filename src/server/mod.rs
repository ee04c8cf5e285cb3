//! HTTP surface for account deletion.
//!
//! # Endpoints
//!
//! - `GET /health`: Health check endpoint (no auth required)
//! - `GET /account/deletion`: Form state and anti-forgery token (auth required)
//! - `POST /account/deletion`: Request a confirmation email (auth required)
//! - `GET /account/deletion/confirm`: Follow the emailed link (auth required)
//! - `GET /account/deletion/done`: One-time success message (no auth required)

pub mod auth;
pub mod handlers;
pub mod response;

use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub use auth::{AntiForgery, AuthSession, SESSION_COOKIE};
pub use response::ErrorBody;

use crate::config::ConfigError;
use crate::service::{AccountDeletion, CONFIRM_PATH};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub deletion: Arc<AccountDeletion>,
    pub anti_forgery: AntiForgery,
}

impl AppState {
    pub fn new(deletion: AccountDeletion) -> Result<Self, ConfigError> {
        let anti_forgery = AntiForgery::new(deletion.config().hasher()?);
        Ok(Self {
            deletion: Arc::new(deletion),
            anti_forgery,
        })
    }
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    // Public routes (no auth)
    let public_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/account/deletion/done", get(handlers::deletion_done));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route(
            "/account/deletion",
            get(handlers::deletion_status).post(handlers::request_deletion),
        )
        .route(CONFIRM_PATH, get(handlers::confirm_deletion))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
