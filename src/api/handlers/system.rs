//! System endpoints: health check and the device role catalog.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::api::dto::DeviceRoleInfo;
use crate::app_state::AppState;
use crate::domain::DeviceRole;

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Always `healthy` while the process serves requests.
    pub status: String,
    /// Current server time (RFC 3339).
    pub timestamp: String,
    /// Crate version.
    pub version: String,
}

/// `GET /health`: Service health status.
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    summary = "Health check",
    description = "Returns service health status, version, and current timestamp.",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
    )
)]
pub async fn health_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// `GET /config/device-roles`: List device roles.
#[utoipa::path(
    get,
    path = "/config/device-roles",
    tag = "System",
    summary = "List device roles",
    description = "Returns every role a device can be assigned. The role is stamped as the event type on each record the device produces.",
    responses(
        (status = 200, description = "Role catalog", body = Vec<DeviceRoleInfo>),
    )
)]
pub async fn device_roles_handler() -> impl IntoResponse {
    let roles: Vec<DeviceRoleInfo> = DeviceRole::ALL
        .into_iter()
        .map(|role| DeviceRoleInfo {
            role,
            description: role.description(),
        })
        .collect();
    (StatusCode::OK, Json(roles))
}

/// System routes mounted at the root level (not under /api).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/config/device-roles", get(device_roles_handler))
}
