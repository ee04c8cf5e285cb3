//! The confirmed-deletion pipeline.
//!
//! Runs once a confirmation token has been consumed:
//!
//! 1. snapshot the account
//! 2. clear pending request and throttle state
//! 3. broadcast to before-delete hooks (failures logged, never fatal)
//! 4. force-delete every comment authored by the account, any status
//! 5. delete the account, reassigning surviving content per configuration
//! 6. notify the operator if enabled
//! 7. raise a flash flag and end the account's sessions
//!
//! Steps 2 to 5 tolerate being re-run after a partial failure. Once step 5
//! has succeeded nothing later is reported as a failure.

use std::sync::Arc;

use crate::collaborators::{ContentRepository, HookRegistry, IdentityProvider, Mailer, StatusFilter};
use crate::db::TokenStore;
use crate::email::operator_notice_email;
use crate::error::DeletionError;
use crate::flash::FlashFlags;
use crate::principal::{ContentOwner, Principal, PrincipalSnapshot};
use crate::tokens::FlashKey;
use crate::SharedClock;

/// Configuration the pipeline needs.
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub site_name: String,
    pub notify_operator: bool,
    pub operator_email: Option<String>,
    /// New owner of content the built-in wipe does not remove.
    pub reassign_content_to: ContentOwner,
}

/// Collaborators the pipeline drives.
#[derive(Clone)]
pub struct Collaborators {
    pub identity: Arc<dyn IdentityProvider>,
    pub content: Arc<dyn ContentRepository>,
    pub mailer: Arc<dyn Mailer>,
    pub hooks: HookRegistry,
}

pub struct DeletionCoordinator {
    store: TokenStore,
    flash: FlashFlags,
    collaborators: Collaborators,
    clock: SharedClock,
    settings: CoordinatorSettings,
}

impl DeletionCoordinator {
    pub fn new(
        store: TokenStore,
        flash: FlashFlags,
        collaborators: Collaborators,
        clock: SharedClock,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            store,
            flash,
            collaborators,
            clock,
            settings,
        }
    }

    /// Rejects principals holding the protected privilege tier.
    pub fn ensure_deletable(principal: &Principal) -> Result<(), DeletionError> {
        if principal.is_protected() {
            tracing::warn!(principal = %principal.id, "Refusing to delete protected account");
            return Err(DeletionError::PrivilegedAccountProtected);
        }
        Ok(())
    }

    /// Deletes the principal's data and account, returning a flash key for
    /// the success redirect.
    ///
    /// Must only be called after the confirmation token was consumed.
    pub async fn confirm_and_delete(&self, principal: &Principal) -> Result<FlashKey, DeletionError> {
        Self::ensure_deletable(principal)?;

        // 1. The live record disappears in step 5.
        let current = self
            .collaborators
            .identity
            .get_principal(principal.id)
            .await?;
        if let Some(current) = &current {
            Self::ensure_deletable(current)?;
        }
        let snapshot = current.as_ref().unwrap_or(principal).snapshot();
        let id = snapshot.id;

        // 2.
        if let Err(e) = self.store.clear_principal(id).await {
            tracing::warn!(principal = %id, "Failed to clear deletion state: {}", e);
        }

        // 3.
        let failures = self.collaborators.hooks.broadcast(id, &snapshot).await;

        // 4.
        let removed = self.wipe_content(&snapshot).await?;

        // 5.
        self.collaborators
            .identity
            .delete_principal(id, self.settings.reassign_content_to)
            .await?;
        tracing::info!(
            principal = %id,
            comments_removed = removed,
            hook_failures = failures.len(),
            "Account deleted"
        );

        // 6.
        self.notify_operator(&snapshot).await;

        // 7.
        let flash_key = match self.flash.raise().await {
            Ok(key) => key,
            Err(e) => {
                // The redirect still happens; the banner just won't show.
                tracing::error!(principal = %id, "Failed to store success flag: {}", e);
                FlashKey::generate()
            }
        };
        if let Err(e) = self.collaborators.identity.end_sessions(id).await {
            tracing::error!(principal = %id, "Failed to end sessions: {}", e);
        }

        Ok(flash_key)
    }

    async fn wipe_content(&self, snapshot: &PrincipalSnapshot) -> Result<usize, DeletionError> {
        let items = self
            .collaborators
            .content
            .list_content_by(snapshot.id, StatusFilter::Any)
            .await?;

        for item in &items {
            self.collaborators
                .content
                .delete_content(item.id, true)
                .await?;
        }

        Ok(items.len())
    }

    async fn notify_operator(&self, snapshot: &PrincipalSnapshot) {
        if !self.settings.notify_operator {
            return;
        }
        let Some(operator) = self.settings.operator_email.as_deref() else {
            tracing::warn!("Operator notification enabled but no operator_email configured");
            return;
        };

        let email = operator_notice_email(&self.settings.site_name, snapshot, self.clock.utc());
        if let Err(e) = self
            .collaborators
            .mailer
            .send(operator, &email.subject, &email.body)
            .await
        {
            tracing::error!(principal = %snapshot.id, "Failed to notify operator: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::BeforeDeleteHook;
    use crate::db::{FlashStore, SqliteAccounts};
    use crate::principal::PrincipalId;
    use crate::test_support::{at, test_pool, MutableClock, RecordingHook, RecordingMailer};
    use std::sync::Mutex;
    use std::time::Duration;

    struct Fixture {
        _dir: tempfile::TempDir,
        accounts: SqliteAccounts,
        store: TokenStore,
        flash: FlashFlags,
        mailer: Arc<RecordingMailer>,
        log: Arc<Mutex<Vec<String>>>,
        coordinator: DeletionCoordinator,
    }

    async fn fixture(settings: CoordinatorSettings, failing_hook: bool) -> Fixture {
        let (dir, pool) = test_pool().await;
        let clock = MutableClock::new(at(0));
        let accounts = SqliteAccounts::new(pool.clone());
        let store = TokenStore::new(pool.clone());
        let mailer = RecordingMailer::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let mut hooks = HookRegistry::new();
        let first: Arc<dyn BeforeDeleteHook> = if failing_hook {
            Arc::new(RecordingHook::failing("orders", log.clone()))
        } else {
            Arc::new(RecordingHook::new("orders", log.clone()))
        };
        hooks.register(first);
        hooks.register(Arc::new(RecordingHook::new("forms", log.clone())));

        let collaborators = Collaborators {
            identity: Arc::new(accounts.clone()),
            content: Arc::new(accounts.clone()),
            mailer: mailer.clone(),
            hooks,
        };
        let new_flags = || {
            FlashFlags::new(
                FlashStore::new(pool.clone()),
                clock.clone(),
                Duration::from_secs(120),
            )
        };
        let coordinator = DeletionCoordinator::new(
            store.clone(),
            new_flags(),
            collaborators,
            clock.clone(),
            settings,
        );

        Fixture {
            _dir: dir,
            accounts,
            store,
            flash: new_flags(),
            mailer,
            log,
            coordinator,
        }
    }

    fn settings() -> CoordinatorSettings {
        CoordinatorSettings {
            site_name: "Example".to_string(),
            notify_operator: true,
            operator_email: Some("ops@example.com".to_string()),
            reassign_content_to: ContentOwner::NoOwner,
        }
    }

    #[tokio::test]
    async fn test_full_pipeline() {
        let f = fixture(settings(), false).await;
        let ada = f
            .accounts
            .create_user("ada@example.com", "Ada", &["subscriber".to_string()])
            .await
            .unwrap();
        f.accounts.add_comment(ada.id, "approved", "hi").await.unwrap();
        f.accounts.add_comment(ada.id, "spam", "buy").await.unwrap();
        let post = f.accounts.add_post(ada.id, "Notes").await.unwrap();
        let session = f.accounts.create_session(ada.id).await.unwrap();
        f.store
            .issue(ada.id, "hash", at(3600), at(0), Duration::from_secs(3600))
            .await
            .unwrap();

        let key = f.coordinator.confirm_and_delete(&ada).await.unwrap();

        assert!(f.accounts.get_principal(ada.id).await.unwrap().is_none());
        assert!(f
            .accounts
            .list_content_by(ada.id, StatusFilter::Any)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(f.accounts.post_author(post).await.unwrap(), None);
        assert!(f.accounts.current_principal(&session).await.unwrap().is_none());
        assert!(f.store.pending(ada.id).await.unwrap().is_none());
        assert!(f.store.last_issued_at(ada.id).await.unwrap().is_none());
        assert_eq!(
            *f.log.lock().unwrap(),
            vec![format!("orders:{}", ada.id), format!("forms:{}", ada.id)]
        );

        let sent = f.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "ops@example.com");
        assert!(sent[0].subject.contains("ada@example.com"));
        assert!(sent[0].body.contains("Display name: Ada"));

        assert!(f.flash.consume(key.as_str()).await.unwrap());
        assert!(!f.flash.consume(key.as_str()).await.unwrap());
    }

    #[tokio::test]
    async fn test_failing_hook_does_not_abort_deletion() {
        let f = fixture(settings(), true).await;
        let ada = f
            .accounts
            .create_user("ada@example.com", "Ada", &["subscriber".to_string()])
            .await
            .unwrap();

        f.coordinator.confirm_and_delete(&ada).await.unwrap();

        assert!(f.accounts.get_principal(ada.id).await.unwrap().is_none());
        assert_eq!(f.log.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_protected_account_rejected_before_side_effects() {
        let f = fixture(settings(), false).await;
        let root = f
            .accounts
            .create_user("root@example.com", "Root", &["administrator".to_string()])
            .await
            .unwrap();
        f.accounts.add_comment(root.id, "approved", "hi").await.unwrap();
        f.store
            .issue(root.id, "hash", at(3600), at(0), Duration::from_secs(3600))
            .await
            .unwrap();

        let err = f.coordinator.confirm_and_delete(&root).await.unwrap_err();

        assert!(matches!(err, DeletionError::PrivilegedAccountProtected));
        assert!(f.accounts.get_principal(root.id).await.unwrap().is_some());
        assert_eq!(
            f.accounts
                .list_content_by(root.id, StatusFilter::Any)
                .await
                .unwrap()
                .len(),
            1
        );
        assert!(f.store.pending(root.id).await.unwrap().is_some());
        assert!(f.log.lock().unwrap().is_empty());
        assert!(f.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_promoted_account_rejected_using_live_record() {
        let f = fixture(settings(), false).await;
        let root = f
            .accounts
            .create_user("root@example.com", "Root", &["administrator".to_string()])
            .await
            .unwrap();
        let stale = Principal {
            roles: vec!["subscriber".to_string()],
            ..root.clone()
        };

        let err = f.coordinator.confirm_and_delete(&stale).await.unwrap_err();

        assert!(matches!(err, DeletionError::PrivilegedAccountProtected));
        assert!(f.accounts.get_principal(root.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_rerun_after_account_gone_is_noop() {
        let f = fixture(settings(), false).await;
        let ada = f
            .accounts
            .create_user("ada@example.com", "Ada", &["subscriber".to_string()])
            .await
            .unwrap();

        f.coordinator.confirm_and_delete(&ada).await.unwrap();
        let again = f.coordinator.confirm_and_delete(&ada).await;

        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn test_reassigns_content_when_configured() {
        let f = fixture(
            CoordinatorSettings {
                reassign_content_to: ContentOwner::Principal(PrincipalId(1)),
                ..settings()
            },
            false,
        )
        .await;
        let heir = f
            .accounts
            .create_user("heir@example.com", "Heir", &["editor".to_string()])
            .await
            .unwrap();
        assert_eq!(heir.id, PrincipalId(1));
        let ada = f
            .accounts
            .create_user("ada@example.com", "Ada", &["subscriber".to_string()])
            .await
            .unwrap();
        let post = f.accounts.add_post(ada.id, "Notes").await.unwrap();

        f.coordinator.confirm_and_delete(&ada).await.unwrap();

        assert_eq!(f.accounts.post_author(post).await.unwrap(), Some(heir.id));
    }

    #[tokio::test]
    async fn test_operator_not_notified_when_disabled() {
        let f = fixture(
            CoordinatorSettings {
                notify_operator: false,
                ..settings()
            },
            false,
        )
        .await;
        let ada = f
            .accounts
            .create_user("ada@example.com", "Ada", &["subscriber".to_string()])
            .await
            .unwrap();

        f.coordinator.confirm_and_delete(&ada).await.unwrap();

        assert!(f.mailer.sent().is_empty());
    }

    #[test]
    fn test_ensure_deletable() {
        let p = Principal {
            id: PrincipalId(1),
            email: "a@example.com".to_string(),
            display_name: "A".to_string(),
            roles: vec!["subscriber".to_string()],
        };
        assert!(DeletionCoordinator::ensure_deletable(&p).is_ok());

        let admin = Principal {
            roles: vec!["administrator".to_string()],
            ..p
        };
        assert!(DeletionCoordinator::ensure_deletable(&admin).is_err());
    }
}
