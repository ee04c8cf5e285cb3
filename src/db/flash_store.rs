//! Storage for one-time flash flags.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::tokens::FlashKey;

/// SQLite-backed flash flag storage with take-once reads.
#[derive(Debug, Clone)]
pub struct FlashStore {
    pool: SqlitePool,
}

impl FlashStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Stores a flag that stays redeemable until `expires_at`.
    pub async fn put(&self, key: &FlashKey, expires_at: DateTime<Utc>) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO flash_flags (flash_key, expires_at) VALUES (?, ?)
            ON CONFLICT(flash_key) DO UPDATE SET expires_at = excluded.expires_at
            "#,
        )
        .bind(key.as_str())
        .bind(expires_at.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Deletes the flag and reports whether a live one was there.
    ///
    /// Check and delete are one statement, so two concurrent readers can
    /// never both observe the flag.
    pub async fn take(&self, key: &str, now: DateTime<Utc>) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM flash_flags WHERE flash_key = ? AND expires_at >= ?")
            .bind(key)
            .bind(now.timestamp())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Removes all expired flags.
    ///
    /// Returns the number of flags removed.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM flash_flags WHERE expires_at < ?")
            .bind(now.timestamp())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
