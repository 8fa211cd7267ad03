//! Password recovery tokens: random plaintext goes to the user, only a
//! SHA-256 digest is stored, valid for ten minutes and consumed on use.

use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};
use tracing::{error, info, instrument, warn};

use crate::auth::{
    jwt::precise_now,
    password::validate_new_password,
    repo_types::{PendingReset, User},
    services::CredentialStore,
};
use crate::error::{AppError, AppResult};
use crate::notify::{Notification, Notifier};

pub const RESET_TOKEN_BYTES: usize = 32;
pub const RESET_TOKEN_TTL: Duration = Duration::minutes(10);

/// A freshly generated token. `plaintext` leaves the process once, by mail.
pub struct ResetToken {
    pub plaintext: String,
    pub pending: PendingReset,
}

pub fn hash_reset_token(plaintext: &str) -> String {
    hex::encode(Sha256::digest(plaintext.as_bytes()))
}

pub fn generate_at(now: OffsetDateTime) -> ResetToken {
    let mut bytes = [0u8; RESET_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    let plaintext = hex::encode(bytes);
    let pending = PendingReset {
        token_hash: hash_reset_token(&plaintext),
        expires_at: now + RESET_TOKEN_TTL,
    };
    ResetToken { plaintext, pending }
}

pub fn generate() -> ResetToken {
    generate_at(precise_now())
}

pub fn reset_url(public_url: &str, plaintext: &str) -> String {
    format!("{public_url}/api/v1/users/resetPassword/{plaintext}")
}

/// Stores a new reset token for `user` and mails the link. On delivery
/// failure the stored token is cleared again before returning.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn request_reset(
    store: &CredentialStore,
    notifier: &dyn Notifier,
    user: &User,
    public_url: &str,
) -> AppResult<()> {
    let token = generate();
    store.set_reset(user.id, token.pending).await?;

    let url = reset_url(public_url, &token.plaintext);
    let notification = Notification {
        recipient: user.email.clone(),
        subject: "Your password reset token (valid for 10 minutes)".into(),
        body: format!(
            "Forgot your password? Submit a PATCH request with your new password and \
             passwordConfirm to: {url}\nIf you didn't forget your password, please ignore this email."
        ),
    };

    if let Err(e) = notifier.send(&notification).await {
        error!(error = %e, "reset notification failed; clearing token");
        if let Err(e) = store.clear_reset(user.id).await {
            error!(error = %e, "failed to clear reset token after delivery failure");
        }
        return Err(AppError::DeliveryFailed);
    }
    info!("reset token issued");
    Ok(())
}

/// Redeems `plaintext` for a new password. Wrong, used and expired tokens
/// all fail the same way.
pub async fn redeem(
    store: &CredentialStore,
    plaintext: &str,
    password: &str,
    password_confirm: &str,
) -> AppResult<User> {
    validate_new_password(password, password_confirm)?;
    let token_hash = hash_reset_token(plaintext);
    match store.redeem_reset(&token_hash, precise_now(), password).await? {
        Some(user) => {
            info!(user_id = %user.id, "password reset");
            Ok(user)
        }
        None => {
            warn!("reset token rejected");
            Err(AppError::InvalidResetToken)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::verify_password;
    use crate::auth::repo_types::Role;
    use crate::auth::services::NewIdentity;
    use crate::testing::{MemoryUsers, RecordingNotifier};
    use std::sync::Arc;

    async fn setup() -> (CredentialStore, Arc<MemoryUsers>, User) {
        let users = Arc::new(MemoryUsers::default());
        let store = CredentialStore::new(users.clone());
        let user = store
            .create_identity(NewIdentity {
                name: None,
                email: "a@x.com",
                password: "password123",
                password_confirm: "password123",
                role: Role::User,
            })
            .await
            .unwrap();
        (store, users, user)
    }

    fn token_from(notifier: &RecordingNotifier) -> String {
        let sent = notifier.sent();
        let body = &sent.last().expect("a notification").body;
        let start = body.find("/resetPassword/").unwrap() + "/resetPassword/".len();
        body[start..start + RESET_TOKEN_BYTES * 2].to_string()
    }

    #[test]
    fn generated_token_is_high_entropy_and_only_hash_is_kept() {
        let now = precise_now();
        let a = generate_at(now);
        let b = generate_at(now);
        assert_eq!(a.plaintext.len(), RESET_TOKEN_BYTES * 2);
        assert_ne!(a.plaintext, b.plaintext);
        assert_ne!(a.pending.token_hash, a.plaintext);
        assert_eq!(a.pending.token_hash, hash_reset_token(&a.plaintext));
        assert_eq!(a.pending.expires_at, now + Duration::minutes(10));
    }

    #[tokio::test]
    async fn reset_token_redeems_once() {
        let (store, _, user) = setup().await;
        let notifier = RecordingNotifier::default();
        request_reset(&store, &notifier, &user, "http://localhost:8080")
            .await
            .unwrap();
        let plaintext = token_from(&notifier);
        assert_eq!(notifier.sent()[0].recipient, "a@x.com");

        let updated = redeem(&store, &plaintext, "brand-new-pass", "brand-new-pass")
            .await
            .unwrap();
        assert!(verify_password("brand-new-pass", &updated.password_hash).unwrap());
        assert!(updated.password_changed_at.is_some());
        assert!(!updated.has_pending_reset());
        assert!(updated.password_reset_expires_at.is_none());

        let again = redeem(&store, &plaintext, "another-pass1", "another-pass1").await;
        assert!(matches!(again, Err(AppError::InvalidResetToken)));
    }

    #[tokio::test]
    async fn expired_reset_token_is_rejected() {
        let (store, users, user) = setup().await;
        let token = generate_at(precise_now() - Duration::minutes(11));
        store.set_reset(user.id, token.pending).await.unwrap();

        let res = redeem(&store, &token.plaintext, "brand-new-pass", "brand-new-pass").await;
        assert!(matches!(res, Err(AppError::InvalidResetToken)));
        let stored = users.get(user.id).unwrap();
        assert!(verify_password("password123", &stored.password_hash).unwrap());
    }

    #[tokio::test]
    async fn wrong_and_expired_tokens_fail_identically() {
        let (store, _, _) = setup().await;
        let wrong = redeem(&store, "deadbeef", "brand-new-pass", "brand-new-pass")
            .await
            .unwrap_err();
        assert!(matches!(wrong, AppError::InvalidResetToken));
    }

    #[tokio::test]
    async fn newer_reset_request_invalidates_older_token() {
        let (store, _, user) = setup().await;
        let notifier = RecordingNotifier::default();
        request_reset(&store, &notifier, &user, "http://h").await.unwrap();
        let first = token_from(&notifier);
        request_reset(&store, &notifier, &user, "http://h").await.unwrap();
        let second = token_from(&notifier);

        let stale = redeem(&store, &first, "brand-new-pass", "brand-new-pass").await;
        assert!(matches!(stale, Err(AppError::InvalidResetToken)));
        assert!(redeem(&store, &second, "brand-new-pass", "brand-new-pass").await.is_ok());
    }

    #[tokio::test]
    async fn delivery_failure_clears_reset_fields() {
        let (store, users, user) = setup().await;
        let notifier = RecordingNotifier::failing();
        let res = request_reset(&store, &notifier, &user, "http://h").await;
        assert!(matches!(res, Err(AppError::DeliveryFailed)));

        let stored = users.get(user.id).unwrap();
        assert!(stored.password_reset_token_hash.is_none());
        assert!(stored.password_reset_expires_at.is_none());
    }

    #[tokio::test]
    async fn invalid_new_password_leaves_token_usable() {
        let (store, _, user) = setup().await;
        let notifier = RecordingNotifier::default();
        request_reset(&store, &notifier, &user, "http://h").await.unwrap();
        let plaintext = token_from(&notifier);

        let res = redeem(&store, &plaintext, "short", "short").await;
        assert!(matches!(res, Err(AppError::Validation(_))));
        assert!(redeem(&store, &plaintext, "long-enough-1", "long-enough-1").await.is_ok());
    }
}
