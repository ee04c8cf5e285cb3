//! Issuing deletion tokens.

use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

use crate::db::{IssueOutcome, TokenStore};
use crate::error::DeletionError;
use crate::principal::Principal;
use crate::tokens::{KeyedHasher, RawToken};
use crate::SharedClock;

/// A freshly issued token. The raw value goes into the email and nowhere else.
#[derive(Debug)]
pub struct IssuedToken {
    pub token: RawToken,
    pub expires_at: DateTime<Utc>,
}

/// Creates pending deletion requests, subject to a per-principal cooldown.
///
/// The token's lifetime equals the cooldown, so a principal never has more
/// than one live link and can only ask for a new one once the old one is dead.
pub struct TokenIssuer {
    store: TokenStore,
    hasher: KeyedHasher,
    clock: SharedClock,
    cooldown: Duration,
}

impl TokenIssuer {
    pub fn new(
        store: TokenStore,
        hasher: KeyedHasher,
        clock: SharedClock,
        cooldown: Duration,
    ) -> Self {
        Self {
            store,
            hasher,
            clock,
            cooldown,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Issues a token for an authenticated, authorized principal.
    ///
    /// Fails with [`DeletionError::Throttled`] without touching any state if
    /// the previous token was issued less than a cooldown ago.
    pub async fn issue(&self, principal: &Principal) -> Result<IssuedToken, DeletionError> {
        let now = self.clock.utc();
        let token = RawToken::generate();
        let token_hash = self.hasher.digest(token.as_str());
        let expires_at = now + self.cooldown_delta();

        let outcome = self
            .store
            .issue(principal.id, &token_hash, expires_at, now, self.cooldown)
            .await?;

        match outcome {
            IssueOutcome::Issued => {
                tracing::info!(principal = %principal.id, %expires_at, "Issued deletion token");
                Ok(IssuedToken { token, expires_at })
            }
            IssueOutcome::Throttled { last_issued_at } => {
                let retry_after_seconds = self.retry_after(last_issued_at, now);
                tracing::info!(
                    principal = %principal.id,
                    retry_after_seconds,
                    "Deletion token request throttled"
                );
                Err(DeletionError::Throttled {
                    retry_after_seconds,
                })
            }
        }
    }

    /// Seconds until the principal may request another token, if throttled.
    pub async fn retry_after_seconds(
        &self,
        principal: &Principal,
    ) -> Result<Option<u64>, DeletionError> {
        let now = self.clock.utc();
        let last = self.store.last_issued_at(principal.id).await?;

        Ok(last
            .map(|last| self.retry_after(last, now))
            .filter(|secs| *secs > 0))
    }

    fn retry_after(&self, last_issued_at: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
        let elapsed = (now - last_issued_at).num_seconds().max(0) as u64;
        self.cooldown.as_secs().saturating_sub(elapsed)
    }

    fn cooldown_delta(&self) -> TimeDelta {
        TimeDelta::seconds(self.cooldown.as_secs() as i64)
    }
}
