//! # Admin Route Handlers
//!
//! This module contains handlers for endpoints that require the `admin` role.

use crate::{
    auth::middleware::AuthenticatedUser,
    errors::AppError,
    handlers::{wrap_response, ApiResponse, DebugParams},
    state::AppState,
};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use axum_extra::extract::WithRejection;
use core_access::{list_users, set_user_role, Role, User};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

/// Body of `PATCH /users/{id}`.
#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: Role,
}

/// Handler for retrieving a list of all users.
///
/// **Authorization**: only accessible by users with the `admin` role.
pub async fn get_users_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    debug_params: Query<DebugParams>,
) -> Result<Json<ApiResponse<Vec<User>>>, AppError> {
    let current_user = user.0;
    info!(
        "User '{}' with role '{}' is attempting to access the all users list.",
        current_user.id, current_user.role
    );

    if !current_user.actor().is_admin() {
        return Err(AppError::Forbidden(
            "You do not have permission to access this resource.".to_string(),
        ));
    }

    let users = list_users(&app_state.db).await?;

    let debug_info = json!({ "requesting_user_id": current_user.id, "user_count": users.len() });
    Ok(wrap_response(users, debug_params, Some(debug_info)))
}

/// Handler for changing a user's role (`PATCH /users/{id}`).
///
/// **Authorization**: only accessible by users with the `admin` role.
pub async fn update_user_role_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    debug_params: Query<DebugParams>,
    WithRejection(Path(user_id), _): WithRejection<Path<String>, AppError>,
    WithRejection(Json(payload), _): WithRejection<Json<UpdateRoleRequest>, AppError>,
) -> Result<Json<ApiResponse<User>>, AppError> {
    let actor = user.actor();
    let updated = set_user_role(&app_state.db, &actor, &user_id, payload.role).await?;

    let debug_info = json!({ "requesting_user_id": actor.id });
    Ok(wrap_response(updated, debug_params, Some(debug_info)))
}
