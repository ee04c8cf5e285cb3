//! Error types for the deletion flows.

use crate::email::EmailError;

/// Failure reported by an external collaborator (identity, content, hooks).
#[derive(Debug)]
pub enum CollaboratorError {
    /// Database error in a SQLite-backed collaborator.
    Database(sqlx::Error),
    /// Any other failure, described by the collaborator.
    Failed(String),
}

impl std::fmt::Display for CollaboratorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollaboratorError::Database(e) => write!(f, "Database error: {}", e),
            CollaboratorError::Failed(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CollaboratorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CollaboratorError::Database(e) => Some(e),
            CollaboratorError::Failed(_) => None,
        }
    }
}

impl From<sqlx::Error> for CollaboratorError {
    fn from(e: sqlx::Error) -> Self {
        CollaboratorError::Database(e)
    }
}

/// Errors that halt a deletion request or confirmation.
#[derive(Debug)]
pub enum DeletionError {
    /// No authenticated principal.
    AuthenticationRequired,
    /// The principal's roles are not allowed to self-delete.
    RoleNotAllowed,
    /// A token was issued too recently.
    Throttled { retry_after_seconds: u64 },
    /// Nothing is awaiting confirmation (or another request already consumed it).
    NoPendingRequest,
    /// The confirmation link is past its expiry.
    Expired,
    /// The presented token does not match the stored digest.
    TokenMismatch,
    /// The principal holds the protected privilege tier.
    PrivilegedAccountProtected,
    /// The form submission carried a missing or invalid anti-forgery token.
    AntiForgeryCheckFailed,
    /// A registered before-delete hook failed. Never returned to callers;
    /// it is logged and the pipeline continues.
    CollaboratorWipeFailed { hook: String, reason: String },
    /// The request did not name a known action.
    UnknownAction(String),
    /// The confirmation email could not be sent.
    MailDeliveryFailed(EmailError),
    /// The identity or content collaborator failed.
    Collaborator(CollaboratorError),
    /// The token or flash store failed.
    Storage(sqlx::Error),
}

impl DeletionError {
    /// Whole minutes to wait before retrying, rounded up.
    pub fn retry_after_minutes(&self) -> Option<u64> {
        match self {
            DeletionError::Throttled {
                retry_after_seconds,
            } => Some(retry_after_seconds.div_ceil(60)),
            _ => None,
        }
    }
}

impl std::fmt::Display for DeletionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeletionError::AuthenticationRequired => {
                write!(f, "You must be logged in to manage account deletion.")
            }
            DeletionError::RoleNotAllowed => {
                write!(f, "Account deletion is not available for your account type.")
            }
            DeletionError::Throttled { .. } => write!(
                f,
                "Please wait {} minute(s) before requesting another email.",
                self.retry_after_minutes().unwrap_or(1)
            ),
            DeletionError::NoPendingRequest => write!(
                f,
                "No pending deletion request found. Please request a new link."
            ),
            DeletionError::Expired => {
                write!(f, "This link has expired. Please request a new one.")
            }
            DeletionError::TokenMismatch => {
                write!(f, "Invalid or already-used security token.")
            }
            DeletionError::PrivilegedAccountProtected => write!(
                f,
                "Administrator accounts cannot be deleted via this tool."
            ),
            DeletionError::AntiForgeryCheckFailed => {
                write!(f, "Security check failed. Please refresh and try again.")
            }
            DeletionError::CollaboratorWipeFailed { hook, reason } => {
                write!(f, "Data wipe hook '{}' failed: {}", hook, reason)
            }
            DeletionError::UnknownAction(action) => write!(f, "Unknown action: {}", action),
            DeletionError::MailDeliveryFailed(e) => {
                write!(f, "Could not send the confirmation email: {}", e)
            }
            DeletionError::Collaborator(e) => write!(f, "Account service error: {}", e),
            DeletionError::Storage(e) => write!(f, "Storage error: {}", e),
        }
    }
}

impl std::error::Error for DeletionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DeletionError::MailDeliveryFailed(e) => Some(e),
            DeletionError::Collaborator(e) => Some(e),
            DeletionError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for DeletionError {
    fn from(e: sqlx::Error) -> Self {
        DeletionError::Storage(e)
    }
}

impl From<CollaboratorError> for DeletionError {
    fn from(e: CollaboratorError) -> Self {
        DeletionError::Collaborator(e)
    }
}
