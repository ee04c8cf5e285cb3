//! Remove My Data
//!
//! Self-service account deletion: a signed-in user asks for a deletion link,
//! receives it by email, and following it permanently removes the account
//! and everything it authored.

pub mod collaborators;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod email;
pub mod error;
pub mod flash;
pub mod issuer;
pub mod principal;
pub mod server;
pub mod service;
pub mod tokens;
pub mod verifier;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

/// Clock shared by every time-dependent component.
pub type SharedClock = Arc<dyn mockable::Clock + Send + Sync>;

pub use collaborators::{
    BeforeDeleteHook, ContentRepository, HookRegistry, IdentityProvider, Mailer,
};
pub use config::{Config, ConfigError};
pub use coordinator::{Collaborators, DeletionCoordinator};
pub use db::{init_db, SqliteAccounts};
pub use email::{EmailConfig, EmailError, EmailSender};
pub use error::{CollaboratorError, DeletionError};
pub use principal::{ContentOwner, Principal, PrincipalId, PrincipalSnapshot};
pub use service::{AccountDeletion, DeletionRequested, DeletionStatus};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
