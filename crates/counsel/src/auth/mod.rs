//! Password digests and bearer-session authentication
//!
//! Sessions are opaque UUID bearer tokens persisted server-side with an
//! expiry. Handlers gate on [`AuthUser`], which resolves the token into its
//! account or rejects the request before the handler body runs.

use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::response::Response;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

use crate::server::{AppState, error_response};
use crate::storage::User;

/// Generate a fresh random salt for one account
pub fn generate_salt() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Salted digest of a password, base64-encoded
pub fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Check a password attempt against a stored salt and digest
pub fn verify_password(password: &str, salt: &str, digest: &str) -> bool {
    hash_password(password, salt) == digest
}

/// Issue a new opaque bearer token
pub fn generate_token() -> String {
    Uuid::new_v4().to_string()
}

/// The authenticated account behind the request's bearer token.
///
/// Rejections: 401 without a token or with an unknown/expired one, 400 for a
/// deactivated account.
pub struct AuthUser(pub User);

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> std::result::Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|header| header.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty());

        let Some(token) = token else {
            return Err(error_response(
                StatusCode::UNAUTHORIZED,
                "not_authenticated",
                "Not authenticated",
            ));
        };

        match state.store.session_user(token, Utc::now()).await {
            Ok(Some(user)) if user.is_active => Ok(AuthUser(user)),
            Ok(Some(_)) => Err(error_response(
                StatusCode::BAD_REQUEST,
                "inactive_user",
                "Inactive user",
            )),
            Ok(None) => Err(error_response(
                StatusCode::UNAUTHORIZED,
                "invalid_token",
                "Could not validate credentials",
            )),
            Err(e) => {
                tracing::error!(error = %e, "Session lookup failed");
                Err(error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database_error",
                    "Internal server error",
                ))
            }
        }
    }
}
