//! Interfaces to the subsystems that own accounts, content and mail.
//!
//! The deletion core never reaches into those subsystems directly. It talks to
//! them through these traits, which are implemented by [`crate::db::accounts`]
//! and [`crate::email`] for the bundled server and by other crates for their
//! own data.

use async_trait::async_trait;
use std::sync::Arc;

use crate::email::EmailError;
use crate::error::{CollaboratorError, DeletionError};
use crate::principal::{ContentOwner, Principal, PrincipalId, PrincipalSnapshot};

/// Identifier of a content item.
pub type ContentId = i64;

/// A content item authored by a principal (e.g. a comment).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentItem {
    pub id: ContentId,
    pub author: PrincipalId,
    pub status: String,
}

/// Which content items to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    /// Every item regardless of moderation status.
    Any,
    /// Only items visible by default.
    Visible,
}

/// Account directory and session management.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolves the principal owning a session token.
    async fn current_principal(
        &self,
        session_token: &str,
    ) -> Result<Option<Principal>, CollaboratorError>;

    /// Loads a principal by id.
    async fn get_principal(&self, id: PrincipalId)
        -> Result<Option<Principal>, CollaboratorError>;

    /// Deletes the account, handing surviving content to `reassign_to`.
    ///
    /// Deleting an absent account is a no-op.
    async fn delete_principal(
        &self,
        id: PrincipalId,
        reassign_to: ContentOwner,
    ) -> Result<(), CollaboratorError>;

    /// Ends every active session of the principal.
    async fn end_sessions(&self, id: PrincipalId) -> Result<(), CollaboratorError>;
}

/// Content authored by principals.
#[async_trait]
pub trait ContentRepository: Send + Sync {
    async fn list_content_by(
        &self,
        author: PrincipalId,
        filter: StatusFilter,
    ) -> Result<Vec<ContentItem>, CollaboratorError>;

    /// Deletes a content item. Without `force` the item is only trashed.
    async fn delete_content(&self, id: ContentId, force: bool) -> Result<(), CollaboratorError>;
}

/// Outbound mail transport.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), EmailError>;
}

/// A collaborator that wipes its own data before an account is deleted.
#[async_trait]
pub trait BeforeDeleteHook: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Called while the account still exists. `snapshot` stays valid after
    /// the account is gone.
    async fn before_delete(
        &self,
        id: PrincipalId,
        snapshot: &PrincipalSnapshot,
    ) -> Result<(), CollaboratorError>;
}

/// Ordered list of before-delete hooks.
///
/// Hooks run one after another in registration order. A failing hook is
/// logged and skipped: deleting the account takes priority over any single
/// collaborator's cleanup.
#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: Vec<Arc<dyn BeforeDeleteHook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hook: Arc<dyn BeforeDeleteHook>) {
        self.hooks.push(hook);
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Runs every hook and returns the failures that were logged.
    pub async fn broadcast(
        &self,
        id: PrincipalId,
        snapshot: &PrincipalSnapshot,
    ) -> Vec<DeletionError> {
        let mut failures = Vec::new();
        for hook in &self.hooks {
            if let Err(e) = hook.before_delete(id, snapshot).await {
                let failure = DeletionError::CollaboratorWipeFailed {
                    hook: hook.name().to_string(),
                    reason: e.to_string(),
                };
                tracing::warn!(principal = %id, "{}", failure);
                failures.push(failure);
            }
        }
        failures
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.hooks.iter().map(|h| h.name()))
            .finish()
    }
}
