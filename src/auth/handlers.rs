use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{delete, get, patch, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{
            ForgotPasswordRequest, LoginRequest, ResetPasswordRequest, SignupRequest,
            UpdatePasswordRequest, UserData, UsersData,
        },
        extractors::{CurrentUser, AUTH_COOKIE_NAME},
        jwt::JwtKeys,
        repo_types::{Role, User},
        reset,
        services::NewIdentity,
    },
    error::{AppError, AppResult},
    extract::{AppJson, AppPath},
    response::Success,
    state::AppState,
};

const RESET_SENT_MESSAGE: &str =
    "if an account exists for that email, a reset link has been sent to it";

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/users/signup", post(signup))
        .route("/users/login", post(login))
        .route("/users/logout", get(logout))
        .route("/users/forgotPassword", post(forgot_password))
        .route("/users/resetPassword/:token", patch(reset_password))
        .route("/users/updateMyPassword", patch(update_my_password))
}

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/users/me", get(get_me))
        .route("/users/deleteMe", delete(delete_me))
        .route("/users", get(list_users))
        .route("/users/all", get(list_all_users))
}

type TokenResponse = (StatusCode, CookieJar, Json<Success<UserData>>);

fn session_cookie(state: &AppState, value: String, max_age: time::Duration) -> Cookie<'static> {
    Cookie::build((AUTH_COOKIE_NAME, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.config.is_production())
        .max_age(max_age)
        .build()
}

/// Signs a token for `user`, mirrors it into the session cookie and wraps
/// the user in the success envelope.
fn send_token(
    state: &AppState,
    jar: CookieJar,
    user: User,
    status: StatusCode,
) -> AppResult<TokenResponse> {
    let keys = JwtKeys::from_ref(state);
    let token = keys.sign_for(&user)?;
    let max_age = time::Duration::days(state.config.jwt.cookie_days);
    let jar = jar.add(session_cookie(state, token.clone(), max_age));
    Ok((status, jar, Json(Success::with_token(token, UserData { user }))))
}

#[instrument(skip(state, jar, payload))]
pub async fn signup(
    State(state): State<AppState>,
    jar: CookieJar,
    AppJson(payload): AppJson<SignupRequest>,
) -> AppResult<TokenResponse> {
    if payload.email.trim().is_empty() || payload.password.is_empty() {
        return Err(AppError::validation("please provide email and password"));
    }
    let user = state
        .users
        .create_identity(NewIdentity {
            name: payload.name,
            email: &payload.email,
            password: &payload.password,
            password_confirm: &payload.password_confirm,
            role: Role::User,
        })
        .await?;
    info!(user_id = %user.id, email = %user.email, "user registered");
    send_token(&state, jar, user, StatusCode::CREATED)
}

#[instrument(skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    AppJson(payload): AppJson<LoginRequest>,
) -> AppResult<TokenResponse> {
    if payload.email.trim().is_empty() || payload.password.is_empty() {
        warn!("login missing credentials");
        return Err(AppError::validation("please provide email and password"));
    }
    let user = state
        .users
        .authenticate(&payload.email, &payload.password)
        .await?;
    info!(user_id = %user.id, "user logged in");
    send_token(&state, jar, user, StatusCode::OK)
}

/// Replaces the session cookie with a short-lived placeholder.
#[instrument(skip_all)]
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> (CookieJar, Json<Success<()>>) {
    let cookie = session_cookie(&state, "loggedout".into(), time::Duration::seconds(10));
    (jar.add(cookie), Json(Success::message("logged out")))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    AppJson(payload): AppJson<ForgotPasswordRequest>,
) -> AppResult<Json<Success<()>>> {
    if payload.email.trim().is_empty() {
        return Err(AppError::validation("please provide an email"));
    }
    match state.users.find_by_email(&payload.email).await? {
        Some(user) => {
            reset::request_reset(
                &state.users,
                state.notifier.as_ref(),
                &user,
                &state.config.public_url,
            )
            .await?
        }
        None => warn!("reset requested for unknown email"),
    }
    Ok(Json(Success::message(RESET_SENT_MESSAGE)))
}

#[instrument(skip_all)]
pub async fn reset_password(
    State(state): State<AppState>,
    jar: CookieJar,
    AppPath(token): AppPath<String>,
    AppJson(payload): AppJson<ResetPasswordRequest>,
) -> AppResult<TokenResponse> {
    let user = reset::redeem(
        &state.users,
        &token,
        &payload.password,
        &payload.password_confirm,
    )
    .await?;
    send_token(&state, jar, user, StatusCode::OK)
}

#[instrument(skip_all)]
pub async fn update_my_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    jar: CookieJar,
    AppJson(payload): AppJson<UpdatePasswordRequest>,
) -> AppResult<TokenResponse> {
    let user = state
        .users
        .update_password(
            &user,
            &payload.password_current,
            &payload.password,
            &payload.password_confirm,
        )
        .await?;
    send_token(&state, jar, user, StatusCode::OK)
}

#[instrument(skip_all)]
pub async fn get_me(CurrentUser(user): CurrentUser) -> Json<Success<UserData>> {
    Json(Success::data(UserData { user }))
}

#[instrument(skip_all)]
pub async fn delete_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<StatusCode> {
    state.users.deactivate(user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip_all)]
pub async fn list_users(
    State(state): State<AppState>,
    current: CurrentUser,
) -> AppResult<Json<Success<UsersData>>> {
    current.restrict_to(&[Role::Admin])?;
    let users = state.users.list().await?;
    Ok(Json(Success {
        results: Some(users.len()),
        ..Success::data(UsersData { users })
    }))
}

/// Admin view of a user that also shows the soft-delete flag.
#[derive(Debug, Serialize)]
pub struct AdminUserView {
    #[serde(flatten)]
    pub user: User,
    pub active: bool,
}

#[instrument(skip_all)]
pub async fn list_all_users(
    State(state): State<AppState>,
    current: CurrentUser,
) -> AppResult<Json<Success<Vec<AdminUserView>>>> {
    let admin = current.restrict_to(&[Role::Admin])?;
    let users: Vec<AdminUserView> = state
        .users
        .list_including_inactive()
        .await?
        .into_iter()
        .map(|user| AdminUserView {
            active: user.active,
            user,
        })
        .collect();
    info!(user_id = %admin.id, results = users.len(), "unfiltered user listing");
    Ok(Json(Success::list(users)))
}
