//! REST API layer: route handlers, DTOs, and router composition.
//!
//! Resource endpoints are mounted under `/api`; `/health` and
//! `/config/device-roles` sit at the root.

pub mod dto;
pub mod handlers;

use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use tower_http::timeout::TimeoutLayer;

use crate::app_state::AppState;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    let router = Router::new()
        .nest("/api", handlers::routes())
        .merge(handlers::system::routes());

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", <ApiDoc as utoipa::OpenApi>::openapi()),
    );

    router
}

/// Answers `408 Request Timeout` for REST calls running past `timeout`.
///
/// Not meant for `/ws`: an upgraded socket outlives any request bound.
#[must_use]
pub fn request_timeout_layer(timeout: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout)
}

/// OpenAPI description of the REST endpoints.
#[cfg(feature = "swagger-ui")]
#[derive(Debug, utoipa::OpenApi)]
#[openapi(
    info(title = "attendance-gateway", description = "Device directory and attendance log API"),
    paths(
        handlers::system::health_handler,
        handlers::system::device_roles_handler,
        handlers::device::create_device,
        handlers::device::list_devices,
        handlers::device::get_device,
        handlers::device::update_device,
        handlers::device::delete_device,
        handlers::log::list_logs,
    ),
    tags(
        (name = "Devices", description = "Terminal configuration"),
        (name = "Logs", description = "Ingested attendance records"),
        (name = "System", description = "Health and catalogs"),
    )
)]
pub struct ApiDoc;
