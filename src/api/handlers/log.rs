//! Attendance log view.

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::LogQueryParams;
use crate::app_state::AppState;
use crate::domain::AttendanceLog;
use crate::error::GatewayError;

/// `GET /api/logs`: Newest attendance logs.
///
/// # Errors
///
/// Returns [`GatewayError`] on persistence failures.
#[utoipa::path(
    get,
    path = "/api/logs",
    tag = "Logs",
    summary = "List attendance logs",
    description = "Returns stored attendance logs newest first, each with a summary of its device. Optionally restricted to one device.",
    params(LogQueryParams),
    responses(
        (status = 200, description = "Log list", body = Vec<AttendanceLog>),
    )
)]
pub async fn list_logs(
    State(state): State<AppState>,
    Query(params): Query<LogQueryParams>,
) -> Result<impl IntoResponse, GatewayError> {
    let logs = state
        .device_service
        .list_logs(params.limit, params.device_id())
        .await?;
    Ok(Json(logs))
}

/// Log routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/logs", get(list_logs))
}
