//! Session authentication and anti-forgery tokens.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::AppState;
use crate::error::DeletionError;
use crate::principal::Principal;
use crate::tokens::{digests_equal, KeyedHasher};

/// Name of the session cookie accepted in place of a bearer header.
pub const SESSION_COOKIE: &str = "rmd_session";

/// Authenticated principal, added to request extensions after auth
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub principal: Principal,
    pub session_token: String,
}

/// Extracts the session token from `Authorization: Bearer` or the session cookie.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|h| h.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Authentication middleware
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = session_token(request.headers()) else {
        return DeletionError::AuthenticationRequired.into_response();
    };

    let identity = &state.deletion.collaborators().identity;
    match identity.current_principal(&token).await {
        Ok(Some(principal)) => {
            request.extensions_mut().insert(AuthSession {
                principal,
                session_token: token,
            });
            next.run(request).await
        }
        Ok(None) => DeletionError::AuthenticationRequired.into_response(),
        Err(e) => DeletionError::Collaborator(e).into_response(),
    }
}

/// Issues and checks anti-forgery tokens bound to a principal and session.
#[derive(Clone)]
pub struct AntiForgery {
    hasher: KeyedHasher,
}

impl AntiForgery {
    pub fn new(hasher: KeyedHasher) -> Self {
        Self { hasher }
    }

    pub fn token_for(&self, session: &AuthSession) -> String {
        self.hasher.digest(&format!(
            "rmd-delete-request:{}:{}",
            session.principal.id, session.session_token
        ))
    }

    pub fn check(&self, session: &AuthSession, presented: &str) -> Result<(), DeletionError> {
        if digests_equal(&self.token_for(session), presented) {
            Ok(())
        } else {
            tracing::warn!(principal = %session.principal.id, "Anti-forgery check failed");
            Err(DeletionError::AntiForgeryCheckFailed)
        }
    }
}
