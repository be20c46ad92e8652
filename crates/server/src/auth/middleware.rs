//! # Authentication Middleware
//!
//! This module provides JWT-based authentication for the Axum handlers.
//! It defines an `AuthenticatedUser` extractor that can be used in handlers to
//! ensure a valid user is present and to get their identity.

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use core_access::{get_or_create_user, Actor, User};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, warn};

use crate::state::AppState;

/// Represents the claims we expect to find in the JWT.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// The subject of the token, which we use as the unique user identifier.
    pub sub: String,
    /// The expiration timestamp.
    pub exp: usize,
}

/// An Axum extractor that provides the currently authenticated user.
///
/// 1.  **No Token Present**: Rejects the request with `401 Unauthorized`.
/// 2.  **Valid Token Present**: Resolves the subject to a stored user,
///     creating it on first sight.
/// 3.  **Invalid/Expired Token Present**: Rejects the request with `401 Unauthorized`.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl AuthenticatedUser {
    pub fn actor(&self) -> Actor {
        self.0.actor()
    }
}

/// A custom rejection type for authentication failures.
///
/// This allows the `FromRequestParts` implementation to return a specific
/// HTTP status code and error message, which Axum then turns into a response.
pub struct AuthError(StatusCode, String);

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

fn unauthorized(message: &str) -> AuthError {
    AuthError(StatusCode::UNAUTHORIZED, message.to_string())
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let bearer_header =
            Option::<TypedHeader<Authorization<Bearer>>>::from_request_parts(parts, state)
                .await
                .map_err(|e| {
                    warn!("Unexpected error during header extraction: {}", e);
                    AuthError(
                        StatusCode::BAD_REQUEST,
                        "Invalid Authorization header format.".to_string(),
                    )
                })?;

        let Some(TypedHeader(Authorization(bearer))) = bearer_header else {
            debug!("Request without bearer token rejected.");
            return Err(unauthorized("Missing bearer token."));
        };

        // `Validation::default()` checks `exp` with HS256.
        let token_data = decode::<Claims>(
            bearer.token(),
            &DecodingKey::from_secret(state.config.jwt_secret.as_ref()),
            &Validation::default(),
        )
        .map_err(|e| {
            warn!("JWT validation failed: {}", e);
            unauthorized("Invalid or expired token.")
        })?;

        let user = get_or_create_user(&state.db, &token_data.claims.sub, None)
            .await
            .map_err(|e| {
                error!("Failed to get or create user: {}", e);
                AuthError(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Could not retrieve user: {e}"),
                )
            })?;

        debug!(user_id = %user.id, role = %user.role, "Authenticated request.");
        Ok(AuthenticatedUser(user))
    }
}
