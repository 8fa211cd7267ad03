use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::{auth::claims::Claims, auth::repo_types::User, config::JwtConfig, state::AppState};

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid or expired token")]
    Invalid(#[from] jsonwebtoken::errors::Error),
    #[error("token carries an impossible issue time")]
    BadIssueTime,
}

/// What a successfully verified token tells us. Says nothing about whether
/// the subject still exists or may act.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verified {
    pub subject: Uuid,
    pub issued_at: OffsetDateTime,
}

#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub ttl: Duration,
}

impl From<&JwtConfig> for JwtKeys {
    fn from(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            ttl: Duration::from_secs(cfg.ttl_minutes.max(0) as u64 * 60),
        }
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        JwtKeys::from(&state.config.jwt)
    }
}

/// Current time truncated to the microsecond, the resolution Postgres keeps.
pub fn precise_now() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now.replace_nanosecond(now.nanosecond() / 1_000 * 1_000)
        .unwrap_or(now)
}

fn unix_micros(t: OffsetDateTime) -> i64 {
    (t.unix_timestamp_nanos() / 1_000) as i64
}

impl JwtKeys {
    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        validation
    }

    fn sign_at(&self, user_id: Uuid, issued_at: OffsetDateTime) -> anyhow::Result<String> {
        let exp = issued_at + TimeDuration::seconds(self.ttl.as_secs() as i64);
        let claims = Claims {
            sub: user_id,
            iat: issued_at.unix_timestamp(),
            iat_us: unix_micros(issued_at),
            exp: exp.unix_timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        debug!(user_id = %user_id, "jwt signed");
        Ok(token)
    }

    /// Issues a token for `user` whose issue time is strictly after the
    /// user's last password change, even if the clock has not advanced.
    pub fn sign_for(&self, user: &User) -> anyhow::Result<String> {
        let mut issued_at = precise_now();
        if let Some(changed_at) = user.password_changed_at {
            issued_at = issued_at.max(changed_at + TimeDuration::microseconds(1));
        }
        self.sign_at(user.id, issued_at)
    }

    pub fn verify(&self, token: &str) -> Result<Verified, TokenError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation())?;
        let claims = data.claims;
        let issued_at =
            OffsetDateTime::from_unix_timestamp_nanos(i128::from(claims.iat_us) * 1_000)
                .map_err(|_| TokenError::BadIssueTime)?;
        debug!(user_id = %claims.sub, "jwt verified");
        Ok(Verified {
            subject: claims.sub,
            issued_at,
        })
    }
}
