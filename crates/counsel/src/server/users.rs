//! Account handlers: registration, login, identity, profile

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::{self, AuthUser};
use crate::error::CounselError;
use crate::storage::{NewUser, User};

use super::{AppState, error_response};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub full_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Account shape returned to callers - never includes credentials
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub full_name: Option<String>,
    pub is_active: bool,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            username: user.username,
            full_name: user.full_name,
            is_active: user.is_active,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub discussions_count: i64,
    pub comments_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ProfileUpdateRequest {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> Result<Response, CounselError> {
    if state.store.user_by_email(&request.email).await?.is_some() {
        return Ok(error_response(
            StatusCode::BAD_REQUEST,
            "email_taken",
            "Email already registered",
        ));
    }
    if state
        .store
        .user_by_username(&request.username)
        .await?
        .is_some()
    {
        return Ok(error_response(
            StatusCode::BAD_REQUEST,
            "username_taken",
            "Username already taken",
        ));
    }

    let salt = auth::generate_salt();
    let password_digest = auth::hash_password(&request.password, &salt);
    let user = state
        .store
        .create_user(NewUser {
            email: request.email,
            username: request.username,
            password_digest,
            salt,
            full_name: request.full_name,
        })
        .await?;

    tracing::info!(username = %user.username, "Registered new account");
    Ok(Json(UserResponse::from(user)).into_response())
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Response, CounselError> {
    let user = state.store.user_by_username(&request.username).await?;
    let authenticated = user
        .filter(|u| auth::verify_password(&request.password, &u.salt, &u.password_digest));

    let Some(user) = authenticated else {
        return Ok(error_response(
            StatusCode::UNAUTHORIZED,
            "invalid_credentials",
            "Incorrect username or password",
        ));
    };

    let token = auth::generate_token();
    let expires_at = Utc::now() + Duration::minutes(state.config.auth.token_ttl_minutes);
    state.store.create_session(&token, user.id, expires_at).await?;

    Ok(Json(TokenResponse {
        access_token: token,
        token_type: "bearer".to_string(),
    })
    .into_response())
}

pub async fn me(AuthUser(user): AuthUser) -> Json<UserResponse> {
    Json(UserResponse::from(user))
}

pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Json<ProfileResponse>, CounselError> {
    let profile = state.store.profile_for_user(user.id).await?;
    let (discussions_count, comments_count) = state.store.user_activity_counts(user.id).await?;

    Ok(Json(ProfileResponse {
        id: user.id,
        username: user.username,
        email: user.email,
        full_name: user.full_name,
        bio: profile.bio,
        avatar_url: profile.avatar_url,
        discussions_count,
        comments_count,
        created_at: profile.created_at,
    }))
}

pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(request): Json<ProfileUpdateRequest>,
) -> Result<Json<ProfileResponse>, CounselError> {
    let profile = state
        .store
        .update_profile(
            user.id,
            request.full_name.clone(),
            request.bio,
            request.avatar_url,
        )
        .await?;
    let (discussions_count, comments_count) = state.store.user_activity_counts(user.id).await?;

    Ok(Json(ProfileResponse {
        id: user.id,
        username: user.username,
        email: user.email,
        full_name: request.full_name.or(user.full_name),
        bio: profile.bio,
        avatar_url: profile.avatar_url,
        discussions_count,
        comments_count,
        created_at: profile.created_at,
    }))
}
