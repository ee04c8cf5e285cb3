//! Shared test doubles.

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeDelta, Utc};
use mockable::Clock;
use sqlx::SqlitePool;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use crate::collaborators::{BeforeDeleteHook, Mailer};
use crate::config::Config;
use crate::db::init_db;
use crate::email::EmailError;
use crate::error::CollaboratorError;
use crate::principal::{PrincipalId, PrincipalSnapshot};

pub const TEST_SECRET: &str = "test-secret-test-secret-test-secret!";

/// Base instant for tests; `at(n)` is `n` seconds after it.
pub fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_767_225_600 + secs, 0).unwrap()
}

/// A fresh migrated database. Keep the `TempDir` alive for the test's duration.
pub async fn test_pool() -> (TempDir, SqlitePool) {
    let dir = TempDir::new().unwrap();
    let pool = init_db(&dir.path().join("test.db")).await.unwrap();
    (dir, pool)
}

pub fn test_config() -> Config {
    Config {
        secret_key: TEST_SECRET.to_string(),
        site_name: "Example".to_string(),
        base_url: "http://localhost:8080".to_string(),
        operator_email: Some("ops@example.com".to_string()),
        ..Config::default()
    }
}

pub fn snapshot(id: i64) -> PrincipalSnapshot {
    PrincipalSnapshot {
        id: PrincipalId(id),
        email: format!("user{}@example.com", id),
        display_name: format!("User {}", id),
        roles: vec!["subscriber".to_string()],
    }
}

pub struct MutableClock(Mutex<DateTime<Utc>>);

impl MutableClock {
    pub fn new(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self(Mutex::new(now)))
    }

    pub fn advance_seconds(&self, seconds: i64) {
        *self.0.lock().unwrap() += TimeDelta::seconds(seconds);
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.0.lock().unwrap() = now;
    }
}

impl Clock for MutableClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

/// A sent email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Mailer that records instead of sending.
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<SentEmail>>,
    pub fail: bool,
}

impl RecordingMailer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        })
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), EmailError> {
        if self.fail {
            return Err(EmailError::TransportError("connection refused".to_string()));
        }
        self.sent.lock().unwrap().push(SentEmail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

/// Hook that appends `"<name>:<id>"` to a shared log.
pub struct RecordingHook {
    name: String,
    log: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

impl RecordingHook {
    pub fn new(name: &str, log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name: name.to_string(),
            log,
            fail: false,
        }
    }

    pub fn failing(name: &str, log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            fail: true,
            ..Self::new(name, log)
        }
    }
}

#[async_trait]
impl BeforeDeleteHook for RecordingHook {
    fn name(&self) -> &str {
        &self.name
    }

    async fn before_delete(
        &self,
        id: PrincipalId,
        _snapshot: &PrincipalSnapshot,
    ) -> Result<(), CollaboratorError> {
        self.log.lock().unwrap().push(format!("{}:{}", self.name, id));
        if self.fail {
            return Err(CollaboratorError::Failed("order service unavailable".to_string()));
        }
        Ok(())
    }
}
