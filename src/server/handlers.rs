//! Route handlers.

use axum::{
    extract::{Query, State},
    response::Redirect,
    Extension, Form, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::auth::AuthSession;
use super::AppState;
use crate::error::DeletionError;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Health check endpoint (no auth required)
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Everything the deletion form needs to render.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub title: String,
    pub description: String,
    pub button_text: String,
    pub primary_color: String,
    pub eligible: bool,
    pub retry_after_seconds: Option<u64>,
    pub anti_forgery_token: String,
}

pub async fn deletion_status(
    State(state): State<AppState>,
    Extension(session): Extension<AuthSession>,
) -> Result<Json<StatusResponse>, DeletionError> {
    let status = state.deletion.status(&session.principal).await?;
    let messages = &state.deletion.config().messages;

    Ok(Json(StatusResponse {
        title: messages.title.clone(),
        description: messages.description.clone(),
        button_text: messages.button_text.clone(),
        primary_color: messages.primary_color.clone(),
        eligible: status.eligible,
        retry_after_seconds: status.retry_after_seconds,
        anti_forgery_token: state.anti_forgery.token_for(&session),
    }))
}

#[derive(Debug, Deserialize)]
pub struct RequestForm {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub anti_forgery_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RequestResponse {
    pub message: String,
    pub expires_at: DateTime<Utc>,
}

pub async fn request_deletion(
    State(state): State<AppState>,
    Extension(session): Extension<AuthSession>,
    Form(form): Form<RequestForm>,
) -> Result<Json<RequestResponse>, DeletionError> {
    state.anti_forgery.check(&session, &form.anti_forgery_token)?;
    if form.action != "request" {
        return Err(DeletionError::UnknownAction(form.action));
    }

    let requested = state.deletion.request(&session.principal).await?;

    Ok(Json(RequestResponse {
        message: format!(
            "A confirmation link has been sent to {}. Please check your inbox.",
            requested.email
        ),
        expires_at: requested.expires_at,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ConfirmQuery {
    pub action: Option<String>,
    pub token: Option<String>,
}

pub async fn confirm_deletion(
    State(state): State<AppState>,
    Extension(session): Extension<AuthSession>,
    Query(query): Query<ConfirmQuery>,
) -> Result<Redirect, DeletionError> {
    match query.action.as_deref() {
        Some("confirm") => {}
        other => return Err(DeletionError::UnknownAction(other.unwrap_or_default().to_string())),
    }
    let token = query.token.unwrap_or_default();

    let key = state.deletion.confirm(&session.principal, &token).await?;

    Ok(Redirect::to(&state.deletion.success_redirect(&key)))
}

#[derive(Debug, Deserialize)]
pub struct DoneQuery {
    pub rmd_done: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DoneResponse {
    pub shown: bool,
    pub message: Option<String>,
}

/// Shows the success message once per flash key (no auth required).
pub async fn deletion_done(
    State(state): State<AppState>,
    Query(query): Query<DoneQuery>,
) -> Result<Json<DoneResponse>, DeletionError> {
    let key = query.rmd_done.unwrap_or_default();
    let message = state.deletion.consume_flash(&key).await?;

    Ok(Json(DoneResponse {
        shown: message.is_some(),
        message,
    }))
}
