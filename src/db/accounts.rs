//! SQLite account directory and content store.
//!
//! Backs the identity and content collaborators for the bundled server and
//! admin CLI. Accounts are created with `remove-my-data-admin user add`.
//!
//! # Tables
//!
//! ```text
//! users     (id, email, display_name, roles JSON, created_at)
//! sessions  (token, user_id -> users.id ON DELETE CASCADE, created_at)
//! comments  (id, author_id, status, body)
//! posts     (id, author_id NULL, title)
//! ```

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::collaborators::{
    ContentId, ContentItem, ContentRepository, IdentityProvider, StatusFilter,
};
use crate::error::CollaboratorError;
use crate::principal::{ContentOwner, Principal, PrincipalId};

/// Comment status that hides a comment without deleting it.
const TRASH_STATUS: &str = "trash";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    email: String,
    display_name: String,
    roles: String,
}

impl UserRow {
    fn into_principal(self) -> Principal {
        let roles: Vec<String> = serde_json::from_str(&self.roles).unwrap_or_else(|e| {
            tracing::warn!(user = self.id, "Unreadable roles column: {}", e);
            Vec::new()
        });
        Principal {
            id: PrincipalId(self.id),
            email: self.email,
            display_name: self.display_name,
            roles,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CommentRow {
    id: i64,
    author_id: i64,
    status: String,
}

/// Accounts, sessions, comments and posts in one SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteAccounts {
    pool: SqlitePool,
}

impl SqliteAccounts {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Creates an account and returns it.
    pub async fn create_user(
        &self,
        email: &str,
        display_name: &str,
        roles: &[String],
    ) -> Result<Principal, sqlx::Error> {
        let roles_json = serde_json::to_string(roles).unwrap_or_else(|_| "[]".to_string());

        let result = sqlx::query(
            "INSERT INTO users (email, display_name, roles, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(email)
        .bind(display_name)
        .bind(&roles_json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(Principal {
            id: PrincipalId(result.last_insert_rowid()),
            email: email.to_string(),
            display_name: display_name.to_string(),
            roles: roles.to_vec(),
        })
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, email, display_name, roles FROM users WHERE LOWER(email) = LOWER(?)",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(UserRow::into_principal))
    }

    pub async fn list_users(&self) -> Result<Vec<Principal>, sqlx::Error> {
        let rows: Vec<UserRow> =
            sqlx::query_as("SELECT id, email, display_name, roles FROM users ORDER BY id")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(UserRow::into_principal).collect())
    }

    /// Replaces an account's roles. Returns whether the account exists.
    pub async fn set_roles(&self, id: PrincipalId, roles: &[String]) -> Result<bool, sqlx::Error> {
        let roles_json = serde_json::to_string(roles).unwrap_or_else(|_| "[]".to_string());

        let result = sqlx::query("UPDATE users SET roles = ? WHERE id = ?")
            .bind(&roles_json)
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Opens a session and returns its bearer token.
    pub async fn create_session(&self, id: PrincipalId) -> Result<String, sqlx::Error> {
        let token = uuid::Uuid::new_v4().simple().to_string();

        sqlx::query("INSERT INTO sessions (token, user_id, created_at) VALUES (?, ?, ?)")
            .bind(&token)
            .bind(id.0)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;

        Ok(token)
    }

    pub async fn add_comment(
        &self,
        author: PrincipalId,
        status: &str,
        body: &str,
    ) -> Result<ContentId, sqlx::Error> {
        let result = sqlx::query("INSERT INTO comments (author_id, status, body) VALUES (?, ?, ?)")
            .bind(author.0)
            .bind(status)
            .bind(body)
            .execute(&self.pool)
            .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn add_post(&self, author: PrincipalId, title: &str) -> Result<i64, sqlx::Error> {
        let result = sqlx::query("INSERT INTO posts (author_id, title) VALUES (?, ?)")
            .bind(author.0)
            .bind(title)
            .execute(&self.pool)
            .await?;

        Ok(result.last_insert_rowid())
    }

    /// Returns the current author of a post (`None` if unattributed or missing).
    pub async fn post_author(&self, post_id: i64) -> Result<Option<PrincipalId>, sqlx::Error> {
        let row: Option<(Option<i64>,)> = sqlx::query_as("SELECT author_id FROM posts WHERE id = ?")
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.and_then(|(author,)| author).map(PrincipalId))
    }
}

#[async_trait]
impl IdentityProvider for SqliteAccounts {
    async fn current_principal(
        &self,
        session_token: &str,
    ) -> Result<Option<Principal>, CollaboratorError> {
        let row: Option<UserRow> = sqlx::query_as(
            r#"
            SELECT u.id, u.email, u.display_name, u.roles
            FROM sessions s JOIN users u ON u.id = s.user_id
            WHERE s.token = ?
            "#,
        )
        .bind(session_token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(UserRow::into_principal))
    }

    async fn get_principal(
        &self,
        id: PrincipalId,
    ) -> Result<Option<Principal>, CollaboratorError> {
        let row: Option<UserRow> =
            sqlx::query_as("SELECT id, email, display_name, roles FROM users WHERE id = ?")
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(UserRow::into_principal))
    }

    async fn delete_principal(
        &self,
        id: PrincipalId,
        reassign_to: ContentOwner,
    ) -> Result<(), CollaboratorError> {
        let new_owner = match reassign_to {
            ContentOwner::NoOwner => None,
            ContentOwner::Principal(owner) => Some(owner.0),
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE posts SET author_id = ? WHERE author_id = ?")
            .bind(new_owner)
            .bind(id.0)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id.0)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn end_sessions(&self, id: PrincipalId) -> Result<(), CollaboratorError> {
        sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ContentRepository for SqliteAccounts {
    async fn list_content_by(
        &self,
        author: PrincipalId,
        filter: StatusFilter,
    ) -> Result<Vec<ContentItem>, CollaboratorError> {
        let sql = match filter {
            StatusFilter::Any => "SELECT id, author_id, status FROM comments WHERE author_id = ?",
            StatusFilter::Visible => {
                "SELECT id, author_id, status FROM comments WHERE author_id = ? AND status = 'approved'"
            }
        };

        let rows: Vec<CommentRow> = sqlx::query_as(sql)
            .bind(author.0)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|r| ContentItem {
                id: r.id,
                author: PrincipalId(r.author_id),
                status: r.status,
            })
            .collect())
    }

    async fn delete_content(&self, id: ContentId, force: bool) -> Result<(), CollaboratorError> {
        if force {
            sqlx::query("DELETE FROM comments WHERE id = ?")
                .bind(id)
                .execute(&self.pool)
                .await?;
        } else {
            sqlx::query("UPDATE comments SET status = ? WHERE id = ?")
                .bind(TRASH_STATUS)
                .bind(id)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_pool;

    fn roles(r: &[&str]) -> Vec<String> {
        r.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let (_dir, pool) = test_pool().await;
        let accounts = SqliteAccounts::new(pool);

        let ada = accounts
            .create_user("ada@example.com", "Ada", &roles(&["subscriber"]))
            .await
            .unwrap();
        let loaded = accounts.get_principal(ada.id).await.unwrap().unwrap();

        assert_eq!(loaded, ada);
        assert_eq!(
            accounts
                .find_by_email("ADA@example.com")
                .await
                .unwrap()
                .map(|p| p.id),
            Some(ada.id)
        );
        assert_eq!(accounts.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_set_roles() {
        let (_dir, pool) = test_pool().await;
        let accounts = SqliteAccounts::new(pool);
        let ada = accounts
            .create_user("ada@example.com", "Ada", &roles(&["subscriber"]))
            .await
            .unwrap();

        assert!(accounts
            .set_roles(ada.id, &roles(&["administrator"]))
            .await
            .unwrap());
        assert!(!accounts
            .set_roles(PrincipalId(999), &roles(&["subscriber"]))
            .await
            .unwrap());

        let live = accounts.get_principal(ada.id).await.unwrap().unwrap();
        assert!(live.is_protected());
    }

    #[tokio::test]
    async fn test_session_resolves_principal() {
        let (_dir, pool) = test_pool().await;
        let accounts = SqliteAccounts::new(pool);
        let ada = accounts
            .create_user("ada@example.com", "Ada", &roles(&["subscriber"]))
            .await
            .unwrap();

        let token = accounts.create_session(ada.id).await.unwrap();

        let current = accounts.current_principal(&token).await.unwrap();
        assert_eq!(current.map(|p| p.id), Some(ada.id));
        assert!(accounts.current_principal("bogus").await.unwrap().is_none());

        accounts.end_sessions(ada.id).await.unwrap();
        assert!(accounts.current_principal(&token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_principal_leaves_posts_unattributed() {
        let (_dir, pool) = test_pool().await;
        let accounts = SqliteAccounts::new(pool);
        let ada = accounts
            .create_user("ada@example.com", "Ada", &roles(&["subscriber"]))
            .await
            .unwrap();
        let post = accounts.add_post(ada.id, "Notes").await.unwrap();
        let token = accounts.create_session(ada.id).await.unwrap();

        accounts
            .delete_principal(ada.id, ContentOwner::NoOwner)
            .await
            .unwrap();

        assert!(accounts.get_principal(ada.id).await.unwrap().is_none());
        assert_eq!(accounts.post_author(post).await.unwrap(), None);
        assert!(accounts.current_principal(&token).await.unwrap().is_none());

        // Already gone: still fine.
        accounts
            .delete_principal(ada.id, ContentOwner::NoOwner)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delete_principal_reassigns_posts() {
        let (_dir, pool) = test_pool().await;
        let accounts = SqliteAccounts::new(pool);
        let ada = accounts
            .create_user("ada@example.com", "Ada", &roles(&["subscriber"]))
            .await
            .unwrap();
        let editor = accounts
            .create_user("ed@example.com", "Ed", &roles(&["editor"]))
            .await
            .unwrap();
        let post = accounts.add_post(ada.id, "Notes").await.unwrap();

        accounts
            .delete_principal(ada.id, ContentOwner::Principal(editor.id))
            .await
            .unwrap();

        assert_eq!(accounts.post_author(post).await.unwrap(), Some(editor.id));
    }

    #[tokio::test]
    async fn test_list_content_status_filter() {
        let (_dir, pool) = test_pool().await;
        let accounts = SqliteAccounts::new(pool);
        let author = PrincipalId(3);
        accounts.add_comment(author, "approved", "hi").await.unwrap();
        accounts.add_comment(author, "spam", "buy").await.unwrap();
        accounts.add_comment(author, "hold", "hmm").await.unwrap();
        accounts
            .add_comment(PrincipalId(4), "approved", "other")
            .await
            .unwrap();

        let any = accounts
            .list_content_by(author, StatusFilter::Any)
            .await
            .unwrap();
        let visible = accounts
            .list_content_by(author, StatusFilter::Visible)
            .await
            .unwrap();

        assert_eq!(any.len(), 3);
        assert_eq!(visible.len(), 1);
        assert!(any.iter().all(|c| c.author == author));
    }

    #[tokio::test]
    async fn test_delete_content_force_and_trash() {
        let (_dir, pool) = test_pool().await;
        let accounts = SqliteAccounts::new(pool);
        let author = PrincipalId(3);
        let keep = accounts.add_comment(author, "approved", "a").await.unwrap();
        let gone = accounts.add_comment(author, "approved", "b").await.unwrap();

        accounts.delete_content(keep, false).await.unwrap();
        accounts.delete_content(gone, true).await.unwrap();

        let left = accounts
            .list_content_by(author, StatusFilter::Any)
            .await
            .unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, keep);
        assert_eq!(left[0].status, TRASH_STATUS);
    }
}
