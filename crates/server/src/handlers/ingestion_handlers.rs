//! # Ingestion Route Handlers
//!
//! One handler per lifecycle operation. Each resolves the caller to an
//! `Actor`, delegates to the `LifecycleManager`, and returns the affected
//! record together with its derived `progress` and `duration`.
//!
//! Creating, completing and failing a process additionally require the
//! `admin` or `editor` role.

use super::{wrap_response, ApiResponse, AppError, AppState, DebugParams};
use crate::auth::middleware::AuthenticatedUser;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::WithRejection;
use ingestflow::{
    types::DEFAULT_PAGE_LIMIT, Actor, IngestionStats, IngestionStatus, IngestionType,
    IngestionUpdate, JsonMap, NewIngestion, Page, PageRequest, ProcessFilter, ProcessView,
    SortField, SortOrder,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

// --- API Payloads ---

/// Query string accepted by the listing endpoint.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub status: Option<IngestionStatus>,
    #[serde(rename = "type")]
    pub kind: Option<IngestionType>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub sort_by: Option<SortField>,
    pub sort_order: Option<SortOrder>,
}

impl ListParams {
    fn split(&self) -> (ProcessFilter, PageRequest) {
        let filter = ProcessFilter {
            status: self.status,
            kind: self.kind,
        };
        let page = PageRequest::new(
            self.page.unwrap_or(1),
            self.limit.unwrap_or(DEFAULT_PAGE_LIMIT),
        )
        .sorted(
            self.sort_by.unwrap_or_default(),
            self.sort_order.unwrap_or_default(),
        );
        (filter, page)
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct CompleteRequest {
    #[serde(default)]
    pub result: Option<JsonMap>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailRequest {
    pub error_message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub id: Uuid,
    pub deleted: bool,
}

type IdPath = WithRejection<Path<Uuid>, AppError>;

/// Rejects callers that may not author or finalize processes.
fn require_author(actor: &Actor) -> Result<(), AppError> {
    if actor.can_author() {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "Role '{}' may not perform this action; admin or editor required.",
            actor.role
        )))
    }
}

// --- Handlers ---

/// `POST /ingestion`
pub async fn create_ingestion_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    debug_params: Query<DebugParams>,
    WithRejection(Json(payload), _): WithRejection<Json<NewIngestion>, AppError>,
) -> Result<(StatusCode, Json<ApiResponse<ProcessView>>), AppError> {
    let actor = user.actor();
    require_author(&actor)?;
    info!(user_id = %actor.id, kind = %payload.kind, "Creating ingestion process.");

    let process = app_state.manager.create(payload, &actor).await?;
    Ok((
        StatusCode::CREATED,
        wrap_response(process.view(), debug_params, None),
    ))
}

/// `GET /ingestion`
pub async fn list_ingestions_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    debug_params: Query<DebugParams>,
    WithRejection(Query(params), _): WithRejection<Query<ListParams>, AppError>,
) -> Result<Json<ApiResponse<Page<ProcessView>>>, AppError> {
    let actor = user.actor();
    let (filter, page) = params.split();

    let result = app_state.manager.list(filter, page, &actor).await?;
    let debug_info = json!({
        "actor": actor.id,
        "scoped_to_owner": !actor.is_admin(),
        "filter": filter,
        "page": page,
    });
    Ok(wrap_response(
        result.map(|p| p.view()),
        debug_params,
        Some(debug_info),
    ))
}

/// `GET /ingestion/stats`
pub async fn ingestion_stats_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    debug_params: Query<DebugParams>,
) -> Result<Json<ApiResponse<IngestionStats>>, AppError> {
    let actor = user.actor();
    let stats = app_state.manager.stats(Some(&actor)).await?;
    let debug_info = json!({ "store": app_state.manager.store().name() });
    Ok(wrap_response(stats, debug_params, Some(debug_info)))
}

/// `GET /ingestion/{id}`
pub async fn get_ingestion_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    debug_params: Query<DebugParams>,
    WithRejection(Path(id), _): IdPath,
) -> Result<Json<ApiResponse<ProcessView>>, AppError> {
    let process = app_state.manager.get_one(id, &user.actor()).await?;
    Ok(wrap_response(process.view(), debug_params, None))
}

/// `POST /ingestion/{id}/start`
pub async fn start_ingestion_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    debug_params: Query<DebugParams>,
    WithRejection(Path(id), _): IdPath,
) -> Result<Json<ApiResponse<ProcessView>>, AppError> {
    let process = app_state.manager.start(id, &user.actor()).await?;
    Ok(wrap_response(process.view(), debug_params, None))
}

/// `POST /ingestion/{id}/complete`
pub async fn complete_ingestion_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    debug_params: Query<DebugParams>,
    WithRejection(Path(id), _): IdPath,
    WithRejection(Json(payload), _): WithRejection<Json<CompleteRequest>, AppError>,
) -> Result<Json<ApiResponse<ProcessView>>, AppError> {
    let actor = user.actor();
    require_author(&actor)?;

    let process = app_state
        .manager
        .complete(id, payload.result.unwrap_or_default(), &actor)
        .await?;
    Ok(wrap_response(process.view(), debug_params, None))
}

/// `POST /ingestion/{id}/fail`
pub async fn fail_ingestion_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    debug_params: Query<DebugParams>,
    WithRejection(Path(id), _): IdPath,
    WithRejection(Json(payload), _): WithRejection<Json<FailRequest>, AppError>,
) -> Result<Json<ApiResponse<ProcessView>>, AppError> {
    let actor = user.actor();
    require_author(&actor)?;

    let process = app_state
        .manager
        .fail(id, payload.error_message, &actor)
        .await?;
    Ok(wrap_response(process.view(), debug_params, None))
}

/// `PATCH /ingestion/{id}`
pub async fn update_ingestion_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    debug_params: Query<DebugParams>,
    WithRejection(Path(id), _): IdPath,
    WithRejection(Json(payload), _): WithRejection<Json<IngestionUpdate>, AppError>,
) -> Result<Json<ApiResponse<ProcessView>>, AppError> {
    let process = app_state
        .manager
        .update(id, payload, &user.actor())
        .await?;
    Ok(wrap_response(process.view(), debug_params, None))
}

/// `DELETE /ingestion/{id}`
pub async fn delete_ingestion_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    debug_params: Query<DebugParams>,
    WithRejection(Path(id), _): IdPath,
) -> Result<Json<ApiResponse<DeleteResponse>>, AppError> {
    app_state.manager.remove(id, &user.actor()).await?;
    Ok(wrap_response(
        DeleteResponse { id, deleted: true },
        debug_params,
        None,
    ))
}
