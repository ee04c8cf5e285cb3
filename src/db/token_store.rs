//! Pending deletion requests and the issuance throttle.
//!
//! A principal has at most one pending request (re-issuing replaces it) and
//! one throttle record. The throttle survives confirm and expiry so the
//! cooldown keeps applying; only a completed deletion clears it.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::time::Duration;

use super::from_epoch;
use crate::principal::PrincipalId;

/// A request awaiting confirmation. Holds only the token's digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDeletionRequest {
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

impl PendingDeletionRequest {
    /// An expired request is treated as absent regardless of its hash.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Result of an attempt to record a new request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueOutcome {
    /// The request was written and the throttle advanced.
    Issued,
    /// The cooldown has not elapsed; nothing was written.
    Throttled { last_issued_at: DateTime<Utc> },
}

#[derive(sqlx::FromRow)]
struct PendingRow {
    token_hash: String,
    expires_at: i64,
}

#[derive(sqlx::FromRow)]
struct PendingListRow {
    user_id: i64,
    token_hash: String,
    expires_at: i64,
}

/// SQLite-backed token store.
#[derive(Debug, Clone)]
pub struct TokenStore {
    pool: SqlitePool,
}

impl TokenStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Records a new pending request if the cooldown allows it.
    ///
    /// The throttle check, the throttle update and the request write happen
    /// in one transaction. The conditional upsert on the throttle is the first
    /// statement, so concurrent issuers for the same principal serialize on it
    /// and at most one of them sees `Issued`.
    pub async fn issue(
        &self,
        id: PrincipalId,
        token_hash: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> Result<IssueOutcome, sqlx::Error> {
        let now_secs = now.timestamp();
        let cutoff = now_secs.saturating_sub(cooldown.as_secs() as i64);

        let mut tx = self.pool.begin().await?;

        let advanced = sqlx::query(
            r#"
            INSERT INTO issuance_throttle (user_id, last_issued_at) VALUES (?, ?)
            ON CONFLICT(user_id) DO UPDATE SET last_issued_at = excluded.last_issued_at
            WHERE issuance_throttle.last_issued_at <= ?
            "#,
        )
        .bind(id.0)
        .bind(now_secs)
        .bind(cutoff)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if advanced == 0 {
            let (last,): (i64,) =
                sqlx::query_as("SELECT last_issued_at FROM issuance_throttle WHERE user_id = ?")
                    .bind(id.0)
                    .fetch_one(&mut *tx)
                    .await?;
            tx.rollback().await?;
            return Ok(IssueOutcome::Throttled {
                last_issued_at: from_epoch(last),
            });
        }

        sqlx::query(
            r#"
            INSERT INTO pending_deletions (user_id, token_hash, expires_at) VALUES (?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                token_hash = excluded.token_hash,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(id.0)
        .bind(token_hash)
        .bind(expires_at.timestamp())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(IssueOutcome::Issued)
    }

    /// Loads the pending request for a principal.
    pub async fn pending(
        &self,
        id: PrincipalId,
    ) -> Result<Option<PendingDeletionRequest>, sqlx::Error> {
        let row: Option<PendingRow> = sqlx::query_as(
            "SELECT token_hash, expires_at FROM pending_deletions WHERE user_id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row
            .filter(|r| !r.token_hash.is_empty())
            .map(|r| PendingDeletionRequest {
                token_hash: r.token_hash,
                expires_at: from_epoch(r.expires_at),
            }))
    }

    /// When a token was last issued for the principal.
    pub async fn last_issued_at(
        &self,
        id: PrincipalId,
    ) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT last_issued_at FROM issuance_throttle WHERE user_id = ?")
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(secs,)| from_epoch(secs)))
    }

    /// Deletes `pending` if it is still the principal's stored request.
    ///
    /// A request issued after `pending` was read is left alone. Returns
    /// whether a row was removed.
    pub async fn remove_expired(
        &self,
        id: PrincipalId,
        pending: &PendingDeletionRequest,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM pending_deletions WHERE user_id = ? AND token_hash = ? AND expires_at = ?",
        )
        .bind(id.0)
        .bind(&pending.token_hash)
        .bind(pending.expires_at.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Atomically consumes the pending request if it still holds `token_hash`
    /// and has not expired.
    ///
    /// This is the single gate for confirmation: of any number of concurrent
    /// callers presenting the same token, exactly one gets `true`.
    pub async fn consume_pending(
        &self,
        id: PrincipalId,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM pending_deletions WHERE user_id = ? AND token_hash = ? AND expires_at >= ?",
        )
        .bind(id.0)
        .bind(token_hash)
        .bind(now.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Drops both the pending request and the throttle record.
    ///
    /// Absent records are not an error.
    pub async fn clear_principal(&self, id: PrincipalId) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM pending_deletions WHERE user_id = ?")
            .bind(id.0)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM issuance_throttle WHERE user_id = ?")
            .bind(id.0)
            .execute(&mut *tx)
            .await?;

        tx.commit().await
    }

    /// Removes every expired pending request.
    ///
    /// Returns the number of requests removed.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM pending_deletions WHERE expires_at < ?")
            .bind(now.timestamp())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Lists all pending requests, soonest expiry first.
    pub async fn list_pending(
        &self,
    ) -> Result<Vec<(PrincipalId, PendingDeletionRequest)>, sqlx::Error> {
        let rows: Vec<PendingListRow> = sqlx::query_as(
            "SELECT user_id, token_hash, expires_at FROM pending_deletions ORDER BY expires_at",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| {
                (
                    PrincipalId(r.user_id),
                    PendingDeletionRequest {
                        token_hash: r.token_hash,
                        expires_at: from_epoch(r.expires_at),
                    },
                )
            })
            .collect())
    }
}
