//! Error to HTTP response mapping.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::DeletionError;

/// JSON error body
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

impl DeletionError {
    /// Status code and stable machine-readable code for this error.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            DeletionError::AuthenticationRequired => {
                (StatusCode::FORBIDDEN, "authentication_required")
            }
            DeletionError::RoleNotAllowed => (StatusCode::FORBIDDEN, "role_not_allowed"),
            DeletionError::PrivilegedAccountProtected => {
                (StatusCode::FORBIDDEN, "privileged_account_protected")
            }
            DeletionError::AntiForgeryCheckFailed => (StatusCode::FORBIDDEN, "anti_forgery_failed"),
            DeletionError::TokenMismatch => (StatusCode::FORBIDDEN, "token_mismatch"),
            DeletionError::NoPendingRequest => (StatusCode::NOT_FOUND, "no_pending_request"),
            DeletionError::Expired => (StatusCode::GONE, "expired"),
            DeletionError::Throttled { .. } => (StatusCode::TOO_MANY_REQUESTS, "throttled"),
            DeletionError::UnknownAction(_) => (StatusCode::BAD_REQUEST, "unknown_action"),
            DeletionError::MailDeliveryFailed(_) => (StatusCode::BAD_GATEWAY, "mail_delivery_failed"),
            DeletionError::CollaboratorWipeFailed { .. } | DeletionError::Collaborator(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "collaborator_error")
            }
            DeletionError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
        }
    }
}

impl IntoResponse for DeletionError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        // Internal details stay in the log.
        let message = if status.is_server_error() && status != StatusCode::BAD_GATEWAY {
            tracing::error!("Request failed: {}", self);
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let mut response = (
            status,
            Json(ErrorBody {
                error: code,
                message,
            }),
        )
            .into_response();

        if let DeletionError::Throttled {
            retry_after_seconds,
        } = self
        {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_seconds));
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::EmailError;

    #[test]
    fn test_status_codes() {
        let cases = [
            (DeletionError::AuthenticationRequired, 403),
            (DeletionError::RoleNotAllowed, 403),
            (DeletionError::PrivilegedAccountProtected, 403),
            (DeletionError::AntiForgeryCheckFailed, 403),
            (DeletionError::TokenMismatch, 403),
            (DeletionError::NoPendingRequest, 404),
            (DeletionError::Expired, 410),
            (
                DeletionError::Throttled {
                    retry_after_seconds: 5,
                },
                429,
            ),
            (DeletionError::UnknownAction("x".to_string()), 400),
            (
                DeletionError::MailDeliveryFailed(EmailError::NotConfigured),
                502,
            ),
            (DeletionError::Storage(sqlx::Error::RowNotFound), 500),
        ];

        for (error, expected) in cases {
            assert_eq!(error.status_and_code().0.as_u16(), expected, "{:?}", error);
        }
    }

    #[test]
    fn test_throttled_sets_retry_after() {
        let response = DeletionError::Throttled {
            retry_after_seconds: 1800,
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "1800");
    }

    #[test]
    fn test_storage_error_hides_details() {
        let response = DeletionError::Storage(sqlx::Error::RowNotFound).into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get(header::RETRY_AFTER).is_none());
    }
}
