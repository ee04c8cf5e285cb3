//! Request and confirmation flows.
//!
//! [`AccountDeletion`] wires the issuer, verifier, coordinator and flash
//! flags together behind the two user-facing operations: asking for a
//! deletion link and following it.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::config::{Config, ConfigError};
use crate::coordinator::{Collaborators, CoordinatorSettings, DeletionCoordinator};
use crate::db::{FlashStore, TokenStore};
use crate::email::deletion_request_email;
use crate::error::DeletionError;
use crate::flash::FlashFlags;
use crate::issuer::TokenIssuer;
use crate::principal::Principal;
use crate::tokens::{FlashKey, RawToken};
use crate::verifier::ConfirmationVerifier;
use crate::SharedClock;

/// Path of the confirmation endpoint, relative to the base URL.
pub const CONFIRM_PATH: &str = "/account/deletion/confirm";

/// Query parameter carrying the flash key after a successful deletion.
pub const FLASH_PARAM: &str = "rmd_done";

/// Returned after a confirmation email was sent.
#[derive(Debug, Clone)]
pub struct DeletionRequested {
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

/// What the deletion form needs to know about a principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionStatus {
    pub eligible: bool,
    pub retry_after_seconds: Option<u64>,
}

pub struct AccountDeletion {
    config: Config,
    store: TokenStore,
    issuer: TokenIssuer,
    verifier: ConfirmationVerifier,
    coordinator: DeletionCoordinator,
    flash: FlashFlags,
    collaborators: Collaborators,
    clock: SharedClock,
}

impl AccountDeletion {
    /// Builds the service. Fails if the configured secret is too weak or a
    /// time window is out of range.
    pub fn new(
        config: Config,
        pool: SqlitePool,
        collaborators: Collaborators,
        clock: SharedClock,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let hasher = config.hasher()?;
        let store = TokenStore::new(pool.clone());
        let new_flags = || FlashFlags::new(FlashStore::new(pool.clone()), clock.clone(), config.flash_ttl());

        let issuer = TokenIssuer::new(store.clone(), hasher.clone(), clock.clone(), config.cooldown());
        let verifier = ConfirmationVerifier::new(store.clone(), hasher, clock.clone());
        let coordinator = DeletionCoordinator::new(
            store.clone(),
            new_flags(),
            collaborators.clone(),
            clock.clone(),
            CoordinatorSettings {
                site_name: config.site_name.clone(),
                notify_operator: config.notify_operator,
                operator_email: config.operator_email.clone(),
                reassign_content_to: config.reassign_target(),
            },
        );
        let flash = new_flags();

        Ok(Self {
            config,
            store,
            issuer,
            verifier,
            coordinator,
            flash,
            collaborators,
            clock,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    /// Checks the principal may self-delete at all.
    pub fn ensure_eligible(&self, principal: &Principal) -> Result<(), DeletionError> {
        DeletionCoordinator::ensure_deletable(principal)?;
        if !principal.has_any_role(&self.config.allowed_roles) {
            return Err(DeletionError::RoleNotAllowed);
        }
        Ok(())
    }

    pub async fn status(&self, principal: &Principal) -> Result<DeletionStatus, DeletionError> {
        let eligible = self.ensure_eligible(principal).is_ok();
        let retry_after_seconds = if eligible {
            self.issuer.retry_after_seconds(principal).await?
        } else {
            None
        };
        Ok(DeletionStatus {
            eligible,
            retry_after_seconds,
        })
    }

    /// Issues a token and emails the confirmation link.
    ///
    /// If the email cannot be sent the request is withdrawn, so the user is
    /// not locked out for a cooldown waiting for a link that never comes.
    pub async fn request(&self, principal: &Principal) -> Result<DeletionRequested, DeletionError> {
        self.ensure_eligible(principal)?;

        let issued = self.issuer.issue(principal).await?;
        let email = deletion_request_email(
            &self.config.site_name,
            &principal.display_name,
            &self.confirm_url(&issued.token),
            issued.expires_at,
            self.issuer.cooldown().as_secs().div_ceil(60),
        );

        if let Err(e) = self
            .collaborators
            .mailer
            .send(&principal.email, &email.subject, &email.body)
            .await
        {
            tracing::error!(principal = %principal.id, "Failed to send deletion email: {}", e);
            if let Err(e) = self.store.clear_principal(principal.id).await {
                tracing::warn!(principal = %principal.id, "Failed to withdraw request: {}", e);
            }
            return Err(DeletionError::MailDeliveryFailed(e));
        }

        Ok(DeletionRequested {
            email: principal.email.clone(),
            expires_at: issued.expires_at,
        })
    }

    /// Confirms a deletion and returns the flash key for the success redirect.
    pub async fn confirm(
        &self,
        principal: &Principal,
        raw_token: &str,
    ) -> Result<FlashKey, DeletionError> {
        self.verifier
            .verify(principal, raw_token)
            .await?
            .into_result()?;

        // A promotion since sign-in must be refused before the link is spent.
        DeletionCoordinator::ensure_deletable(principal)?;
        if let Some(live) = self
            .collaborators
            .identity
            .get_principal(principal.id)
            .await?
        {
            DeletionCoordinator::ensure_deletable(&live)?;
        }

        // Lost the race to a concurrent confirmation of the same link.
        if !self.verifier.consume(principal, raw_token).await? {
            return Err(DeletionError::NoPendingRequest);
        }

        self.coordinator.confirm_and_delete(principal).await
    }

    /// Consumes a flash key, returning the success message the first time.
    pub async fn consume_flash(&self, key: &str) -> Result<Option<String>, DeletionError> {
        if self.flash.consume(key).await? {
            Ok(Some(self.config.messages.success_message.clone()))
        } else {
            Ok(None)
        }
    }

    /// Removes expired pending requests and flash flags.
    ///
    /// Returns `(requests, flags)` removed.
    pub async fn purge_expired(&self) -> Result<(u64, u64), DeletionError> {
        let requests = self.store.purge_expired(self.clock.utc()).await?;
        let flags = self.flash.purge_expired().await?;
        Ok((requests, flags))
    }

    pub fn confirm_url(&self, token: &RawToken) -> String {
        format!(
            "{}{}?action=confirm&token={}",
            self.config.base_url,
            CONFIRM_PATH,
            urlencoding::encode(token.as_str())
        )
    }

    /// Where to send the browser after a successful deletion.
    pub fn success_redirect(&self, key: &FlashKey) -> String {
        format!(
            "{}/?{}={}",
            self.config.base_url,
            FLASH_PARAM,
            urlencoding::encode(key.as_str())
        )
    }
}
