//! Checking confirmation tokens.

use crate::db::TokenStore;
use crate::error::DeletionError;
use crate::principal::Principal;
use crate::tokens::KeyedHasher;
use crate::SharedClock;

/// Outcome of checking a raw token against the stored request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    NoPendingRequest,
    Expired,
    TokenMismatch,
}

impl Verdict {
    /// Maps every non-valid verdict to the error that halts confirmation.
    pub fn into_result(self) -> Result<(), DeletionError> {
        match self {
            Verdict::Valid => Ok(()),
            Verdict::NoPendingRequest => Err(DeletionError::NoPendingRequest),
            Verdict::Expired => Err(DeletionError::Expired),
            Verdict::TokenMismatch => Err(DeletionError::TokenMismatch),
        }
    }
}

/// Validates raw tokens against stored digests.
pub struct ConfirmationVerifier {
    store: TokenStore,
    hasher: KeyedHasher,
    clock: SharedClock,
}

impl ConfirmationVerifier {
    pub fn new(store: TokenStore, hasher: KeyedHasher, clock: SharedClock) -> Self {
        Self {
            store,
            hasher,
            clock,
        }
    }

    /// Classifies `raw_token` for `principal`.
    ///
    /// Expiry is checked before the hash, and an expired request is deleted
    /// unless it was replaced in the meantime.
    /// A mismatch leaves the request in place so the user can retry.
    /// `Valid` consumes nothing: see [`ConfirmationVerifier::consume`].
    pub async fn verify(
        &self,
        principal: &Principal,
        raw_token: &str,
    ) -> Result<Verdict, DeletionError> {
        let Some(pending) = self.store.pending(principal.id).await? else {
            return Ok(Verdict::NoPendingRequest);
        };

        let now = self.clock.utc();
        if pending.is_expired(now) {
            self.store.remove_expired(principal.id, &pending).await?;
            tracing::info!(principal = %principal.id, "Deletion link expired");
            return Ok(Verdict::Expired);
        }

        if !self.hasher.matches(raw_token, &pending.token_hash) {
            tracing::warn!(principal = %principal.id, "Deletion token mismatch");
            return Ok(Verdict::TokenMismatch);
        }

        Ok(Verdict::Valid)
    }

    /// Atomically deletes the pending request if `raw_token` still matches it
    /// and it has not expired.
    ///
    /// Returns `true` for exactly one of any number of racing callers. This,
    /// not a prior `Valid` verdict, is what authorizes a deletion.
    pub async fn consume(
        &self,
        principal: &Principal,
        raw_token: &str,
    ) -> Result<bool, DeletionError> {
        let token_hash = self.hasher.digest(raw_token);
        let consumed = self
            .store
            .consume_pending(principal.id, &token_hash, self.clock.utc())
            .await?;
        Ok(consumed)
    }
}
