use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::extract::CookieJar;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    auth::{
        jwt::JwtKeys,
        repo_types::{Role, User},
    },
    error::AppError,
    state::AppState,
};

pub const AUTH_COOKIE_NAME: &str = "jwt";

/// The authenticated caller: token verified, user active, token not older
/// than the last password change.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl CurrentUser {
    /// Fails with `Forbidden` unless the caller holds one of `roles`.
    pub fn restrict_to(&self, roles: &[Role]) -> Result<&User, AppError> {
        if roles.contains(&self.0.role) {
            Ok(&self.0)
        } else {
            warn!(user_id = %self.0.id, role = ?self.0.role, "role not permitted");
            Err(AppError::Forbidden)
        }
    }

    pub fn is_guide_of(&self, guide_ids: &[Uuid]) -> bool {
        guide_ids.contains(&self.0.id)
    }
}

fn bearer_token(parts: &Parts) -> Option<String> {
    if let Some(header) = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        return header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
    }
    CookieJar::from_headers(&parts.headers)
        .get(AUTH_COOKIE_NAME)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty() && t != "loggedout")
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(AppError::Unauthenticated(
            "you are not logged in, please log in to get access",
        ))?;

        let keys = JwtKeys::from_ref(state);
        let verified = keys.verify(&token).map_err(|e| {
            debug!(error = %e, "token rejected");
            AppError::Unauthenticated("invalid or expired token")
        })?;

        let user = state
            .users
            .find_by_id(verified.subject)
            .await?
            .ok_or_else(|| {
                warn!(user_id = %verified.subject, "token for missing or inactive user");
                AppError::Unauthenticated("the user belonging to this token no longer exists")
            })?;

        if user.changed_password_after(verified.issued_at) {
            warn!(user_id = %user.id, "stale token after password change");
            return Err(AppError::Unauthenticated(
                "password was changed recently, please log in again",
            ));
        }

        Ok(CurrentUser(user))
    }
}
