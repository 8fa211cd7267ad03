use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::{
    jwt::precise_now,
    password::{hash_password, validate_new_password, verify_dummy, verify_password},
    repo::{StoreError, UserStore},
    repo_types::{NewUser, PendingReset, Role, User},
};
use crate::error::{AppError, AppResult};
use crate::visibility::Visibility;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Input for [`CredentialStore::create_identity`]. Holds plaintext only for
/// the duration of the call.
pub struct NewIdentity<'a> {
    pub name: Option<String>,
    pub email: &'a str,
    pub password: &'a str,
    pub password_confirm: &'a str,
    pub role: Role,
}

/// Credential operations over a [`UserStore`]. Reads hide deactivated users
/// unless the operation's name says otherwise; every password write hashes
/// here.
#[derive(Clone)]
pub struct CredentialStore {
    users: Arc<dyn UserStore>,
}

impl CredentialStore {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    pub async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        self.users.find_by_id(id, Visibility::Visible).await
    }

    pub async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        self.users
            .find_by_email(&normalize_email(email), Visibility::Visible)
            .await
    }

    pub async fn list(&self) -> anyhow::Result<Vec<User>> {
        self.users.list(Visibility::Visible).await
    }

    /// Admin listing that also returns deactivated users.
    pub async fn list_including_inactive(&self) -> anyhow::Result<Vec<User>> {
        self.users.list(Visibility::IncludingHidden).await
    }

    pub async fn create_identity(&self, new: NewIdentity<'_>) -> AppResult<User> {
        let email = normalize_email(new.email);
        if !is_valid_email(&email) {
            warn!(email = %email, "invalid email");
            return Err(AppError::validation("please provide a valid email"));
        }
        validate_new_password(new.password, new.password_confirm)?;

        let password_hash = hash_password(new.password)?;
        let user = self
            .users
            .insert(NewUser {
                name: new.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
                email,
                password_hash,
                role: new.role,
            })
            .await
            .map_err(|e| match e {
                StoreError::DuplicateEmail => {
                    AppError::Conflict("email already registered".into())
                }
                StoreError::Other(e) => AppError::Internal(e),
            })?;
        info!(user_id = %user.id, role = ?user.role, "identity created");
        Ok(user)
    }

    /// Email + password check. Unknown email and wrong password produce the
    /// same error and cost the same.
    pub async fn authenticate(&self, email: &str, password: &str) -> AppResult<User> {
        const BAD_CREDENTIALS: &str = "incorrect email or password";

        let Some(user) = self.find_by_email(email).await? else {
            verify_dummy(password);
            warn!("login unknown email");
            return Err(AppError::Unauthenticated(BAD_CREDENTIALS));
        };
        if !verify_password(password, &user.password_hash)? {
            warn!(user_id = %user.id, "login invalid password");
            return Err(AppError::Unauthenticated(BAD_CREDENTIALS));
        }
        Ok(user)
    }

    /// Sets a new password for a signed-in user after checking the current one.
    pub async fn update_password(
        &self,
        user: &User,
        current: &str,
        password: &str,
        password_confirm: &str,
    ) -> AppResult<User> {
        if !verify_password(current, &user.password_hash)? {
            warn!(user_id = %user.id, "update password: current password mismatch");
            return Err(AppError::Unauthenticated("your current password is wrong"));
        }
        validate_new_password(password, password_confirm)?;

        let password_hash = hash_password(password)?;
        let changed_at = precise_now();
        self.users
            .set_password(user.id, &password_hash, changed_at)
            .await?;
        info!(user_id = %user.id, "password changed");
        Ok(User {
            password_hash,
            password_changed_at: Some(changed_at),
            ..user.clone()
        })
    }

    pub async fn set_reset(&self, id: Uuid, reset: PendingReset) -> anyhow::Result<()> {
        self.users.set_reset(id, Some(reset)).await
    }

    pub async fn clear_reset(&self, id: Uuid) -> anyhow::Result<()> {
        self.users.set_reset(id, None).await
    }

    /// Swaps `password` in for the user holding `token_hash`, if that reset
    /// is still pending and unexpired at `now`. Unknown tokens return before
    /// any hashing; the final write re-checks the token so it is consumed
    /// at most once.
    pub async fn redeem_reset(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
        password: &str,
    ) -> anyhow::Result<Option<User>> {
        if self.users.find_by_reset(token_hash, now).await?.is_none() {
            return Ok(None);
        }
        let password_hash = hash_password(password)?;
        self.users.redeem_reset(token_hash, now, &password_hash).await
    }

    /// Soft delete. The row stays; default reads stop returning it.
    pub async fn deactivate(&self, id: Uuid) -> anyhow::Result<()> {
        self.users.set_active(id, false).await?;
        info!(user_id = %id, "identity deactivated");
        Ok(())
    }
}
