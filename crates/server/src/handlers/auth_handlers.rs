//! # Authentication Route Handlers
//!
//! Tokens are issued elsewhere; this module only exposes the identity the
//! server resolved from one.

use crate::{auth::middleware::AuthenticatedUser, errors::AppError};
use axum::response::Json;
use core_access::User;

/// Returns the details of the currently authenticated user.
pub async fn get_me_handler(user: AuthenticatedUser) -> Result<Json<User>, AppError> {
    Ok(Json(user.0))
}
