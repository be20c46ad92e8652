//! # General Route Handlers
//!
//! This module contains the general-purpose Axum handlers for the
//! `ingestflow-server`: the root banner and the health checks.

use super::AppState;
use axum::{extract::State, Json};
use chrono::Utc;
use serde::Serialize;
use tracing::warn;

// --- API Payloads for General Handlers ---

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// RFC 3339 time of the check.
    pub timestamp: String,
    /// Seconds since the server state was built.
    pub uptime: f64,
    pub environment: String,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseCheck {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatorCheck {
    pub active_simulations: usize,
    pub unrecorded_faults: u64,
}

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    pub database: DatabaseCheck,
    pub simulator: SimulatorCheck,
}

#[derive(Debug, Serialize)]
pub struct DetailedHealthResponse {
    #[serde(flatten)]
    pub summary: HealthResponse,
    pub checks: HealthChecks,
}

fn health_summary(app_state: &AppState) -> HealthResponse {
    HealthResponse {
        status: "ok",
        timestamp: Utc::now().to_rfc3339(),
        uptime: app_state.started_at.elapsed().as_secs_f64(),
        environment: app_state.config.environment.clone(),
        version: env!("CARGO_PKG_VERSION"),
    }
}

// --- General-Purpose Handlers ---

/// The handler for the root (`/`) endpoint.
pub async fn root() -> &'static str {
    "ingestflow server is running."
}

/// The handler for the health check (`/health`) endpoint.
pub async fn health_check(State(app_state): State<AppState>) -> Json<HealthResponse> {
    Json(health_summary(&app_state))
}

/// The handler for `/health/detailed`. Round-trips the process store.
///
/// Always answers `200`; an unreachable store is reported as `unhealthy`.
pub async fn detailed_health_check(
    State(app_state): State<AppState>,
) -> Json<DetailedHealthResponse> {
    let database = match app_state.manager.store().ping().await {
        Ok(()) => DatabaseCheck {
            status: "healthy",
            connection: Some("active"),
            error: None,
        },
        Err(e) => {
            warn!("Store health check failed: {e}");
            DatabaseCheck {
                status: "unhealthy",
                connection: None,
                error: Some(e.to_string()),
            }
        }
    };

    let simulator = SimulatorCheck {
        active_simulations: app_state.manager.active_simulations().await,
        unrecorded_faults: app_state.faults.count(),
    };

    Json(DetailedHealthResponse {
        summary: health_summary(&app_state),
        checks: HealthChecks {
            database,
            simulator,
        },
    })
}
