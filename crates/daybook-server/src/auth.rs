//! Account registration, login and the authenticated-user extractor.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequestParts, State},
    http::{header, request::Parts},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use tracing::{debug, info};

use daybook_shared::api::{Credentials, LoginResponse, SuccessResponse, UserResponse, UserSummary};
use daybook_shared::dates::format_timestamp;
use daybook_shared::UserId;
use daybook_store::{StoreError, User};

use crate::api::AppState;
use crate::error::ServerError;

/// The session user, resolved once at the request boundary.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub UserId);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        state
            .sessions
            .user_from_headers(&parts.headers)
            .map(AuthUser)
            .map_err(|e| {
                debug!(error = %e, "Rejecting unauthenticated request");
                ServerError::Unauthorized
            })
    }
}

fn summary(user: &User) -> UserSummary {
    UserSummary {
        id: user.id.to_string(),
        username: user.username.clone(),
        created_at: format_timestamp(&user.created_at),
    }
}

async fn hash_password(password: String) -> Result<String, ServerError> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut rand::rngs::OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| ServerError::Internal(format!("Password hashing failed: {e}")))
    })
    .await
    .map_err(|e| ServerError::Internal(e.to_string()))?
}

async fn verify_password(password: String, stored: String) -> Result<bool, ServerError> {
    tokio::task::spawn_blocking(move || {
        let parsed = PasswordHash::new(&stored)
            .map_err(|e| ServerError::Internal(format!("Stored hash unreadable: {e}")))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    })
    .await
    .map_err(|e| ServerError::Internal(e.to_string()))?
}

pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<Json<UserResponse>, ServerError> {
    let Json(credentials) = payload.map_err(|e| ServerError::MalformedBody(e.body_text()))?;
    let (username, password) = credentials.for_registration()?;

    let user = User {
        id: UserId::new(),
        username: username.to_string(),
        password_hash: hash_password(password.to_string()).await?,
        created_at: Utc::now(),
    };

    let record = user.clone();
    state
        .store
        .call(move |db| db.create_user(&record))
        .await
        .map_err(|e| match e {
            StoreError::Conflict(_) => ServerError::UsernameTaken,
            other => other.into(),
        })?;

    info!(user = %user.id, username = %user.username, "Registered user");
    Ok(Json(UserResponse {
        user: summary(&user),
    }))
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<impl IntoResponse, ServerError> {
    let Json(credentials) = payload.map_err(|e| ServerError::MalformedBody(e.body_text()))?;
    let (username, password) = credentials.required()?;

    let lookup = username.to_string();
    let user = state
        .store
        .call(move |db| db.find_user_by_username(&lookup))
        .await?
        .ok_or(ServerError::InvalidCredentials)?;

    if !verify_password(password.to_string(), user.password_hash.clone()).await? {
        debug!(username = %user.username, "Password mismatch");
        return Err(ServerError::InvalidCredentials);
    }

    let token = state
        .sessions
        .issue(user.id, &user.username)
        .map_err(|e| ServerError::Internal(e.to_string()))?;

    info!(user = %user.id, "User logged in");
    Ok((
        [(header::SET_COOKIE, state.sessions.cookie(&token))],
        Json(LoginResponse {
            user: summary(&user),
            token,
        }),
    ))
}

pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::SET_COOKIE, state.sessions.cleared_cookie())],
        Json(SuccessResponse::ok()),
    )
}

pub async fn me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<UserResponse>, ServerError> {
    let user = state
        .store
        .call(move |db| db.get_user(user_id))
        .await
        .map_err(|e| match e {
            StoreError::NotFound => ServerError::Unauthorized,
            other => other.into(),
        })?;

    Ok(Json(UserResponse {
        user: summary(&user),
    }))
}
