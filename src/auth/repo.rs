use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo_types::{NewUser, PendingReset, User};
use crate::visibility::Visibility;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("email already registered")]
    DuplicateEmail,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Durable user records. Every read takes an explicit [`Visibility`];
/// handlers go through `CredentialStore`, which picks it.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid, visibility: Visibility) -> anyhow::Result<Option<User>>;
    async fn find_by_email(
        &self,
        email: &str,
        visibility: Visibility,
    ) -> anyhow::Result<Option<User>>;
    async fn list(&self, visibility: Visibility) -> anyhow::Result<Vec<User>>;
    async fn insert(&self, user: NewUser) -> Result<User, StoreError>;
    async fn set_password(
        &self,
        id: Uuid,
        password_hash: &str,
        changed_at: OffsetDateTime,
    ) -> anyhow::Result<()>;
    /// Writes or clears both reset fields at once.
    async fn set_reset(&self, id: Uuid, reset: Option<PendingReset>) -> anyhow::Result<()>;
    /// Active user holding an unexpired reset with this hash, if any.
    async fn find_by_reset(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<User>>;
    /// Consumes a pending reset whose hash matches and whose expiry is after
    /// `now`, replacing the password in the same write. Returns the updated
    /// user, or `None` when nothing matched.
    async fn redeem_reset(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
        password_hash: &str,
    ) -> anyhow::Result<Option<User>>;
    async fn set_active(&self, id: Uuid, active: bool) -> anyhow::Result<()>;
}

const USER_COLUMNS: &str = "id, name, email, password_hash, role, active, password_changed_at, \
     password_reset_token_hash, password_reset_expires_at, created_at";

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, id: Uuid, visibility: Visibility) -> anyhow::Result<Option<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND {}",
            visibility.sql::<User>()
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn find_by_email(
        &self,
        email: &str,
        visibility: Visibility,
    ) -> anyhow::Result<Option<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1 AND {}",
            visibility.sql::<User>()
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn list(&self, visibility: Visibility) -> anyhow::Result<Vec<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE {} ORDER BY created_at",
            visibility.sql::<User>()
        );
        let users = sqlx::query_as::<_, User>(&sql).fetch_all(&self.db).await?;
        Ok(users)
    }

    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        let sql = format!(
            "INSERT INTO users (name, email, password_hash, role) \
             VALUES ($1, $2, $3, $4) RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(user.name)
            .bind(user.email)
            .bind(user.password_hash)
            .bind(user.role)
            .fetch_one(&self.db)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(db) = &e {
                    if db.is_unique_violation() {
                        return StoreError::DuplicateEmail;
                    }
                }
                StoreError::Other(e.into())
            })
    }

    async fn set_password(
        &self,
        id: Uuid,
        password_hash: &str,
        changed_at: OffsetDateTime,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE users
               SET password_hash = $2, password_changed_at = $3
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .bind(changed_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn set_reset(&self, id: Uuid, reset: Option<PendingReset>) -> anyhow::Result<()> {
        let (hash, expires_at) = match reset {
            Some(r) => (Some(r.token_hash), Some(r.expires_at)),
            None => (None, None),
        };
        sqlx::query(
            r#"
            UPDATE users
               SET password_reset_token_hash = $2, password_reset_expires_at = $3
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(hash)
        .bind(expires_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn find_by_reset(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users \
              WHERE password_reset_token_hash = $1 \
                AND password_reset_expires_at > $2 \
                AND {}",
            Visibility::Visible.sql::<User>()
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(token_hash)
            .bind(now)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn redeem_reset(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
        password_hash: &str,
    ) -> anyhow::Result<Option<User>> {
        let sql = format!(
            "UPDATE users \
                SET password_hash = $3, \
                    password_changed_at = $2, \
                    password_reset_token_hash = NULL, \
                    password_reset_expires_at = NULL \
              WHERE password_reset_token_hash = $1 \
                AND password_reset_expires_at > $2 \
                AND active \
          RETURNING {USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(token_hash)
            .bind(now)
            .bind(password_hash)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn set_active(&self, id: Uuid, active: bool) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET active = $2 WHERE id = $1")
            .bind(id)
            .bind(active)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}
