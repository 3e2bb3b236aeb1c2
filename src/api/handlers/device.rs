//! Device CRUD handlers: create, list, get, update, delete.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::{CreateDeviceRequest, UpdateDeviceRequest};
use crate::app_state::AppState;
use crate::domain::{Device, DeviceId};
use crate::error::{ErrorResponse, GatewayError};

/// `POST /api/devices`: Register a terminal.
///
/// # Errors
///
/// Returns [`GatewayError`] on a blank or malformed field.
#[utoipa::path(
    post,
    path = "/api/devices",
    tag = "Devices",
    summary = "Register a device",
    description = "Adds a terminal to the directory. `port`, `api_endpoint` and `is_active` fall back to the configured defaults. New devices start offline.",
    request_body = CreateDeviceRequest,
    responses(
        (status = 201, description = "Device created", body = Device),
        (status = 400, description = "Invalid request", body = ErrorResponse),
    )
)]
pub async fn create_device(
    State(state): State<AppState>,
    Json(req): Json<CreateDeviceRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let input = req.into_new_device(state.device_service.defaults());
    let device = state.device_service.create_device(input).await?;
    Ok((StatusCode::CREATED, Json(device)))
}

/// `GET /api/devices`: List every device.
///
/// # Errors
///
/// Returns [`GatewayError`] on persistence failures.
#[utoipa::path(
    get,
    path = "/api/devices",
    tag = "Devices",
    summary = "List devices",
    description = "Returns every configured device, newest first, including its last polled status.",
    responses(
        (status = 200, description = "Device list", body = Vec<Device>),
    )
)]
pub async fn list_devices(State(state): State<AppState>) -> Result<impl IntoResponse, GatewayError> {
    let devices = state.device_service.list_devices().await?;
    Ok(Json(devices))
}

/// `GET /api/devices/{id}`: Get one device.
///
/// # Errors
///
/// Returns [`GatewayError::DeviceNotFound`] for an unknown id.
#[utoipa::path(
    get,
    path = "/api/devices/{id}",
    tag = "Devices",
    summary = "Get device",
    params(
        ("id" = uuid::Uuid, Path, description = "Device UUID"),
    ),
    responses(
        (status = 200, description = "Device details", body = Device),
        (status = 404, description = "Device not found", body = ErrorResponse),
    )
)]
pub async fn get_device(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, GatewayError> {
    let device = state
        .device_service
        .get_device(DeviceId::from_uuid(id))
        .await?;
    Ok(Json(device))
}

/// `PUT /api/devices/{id}`: Partially update a device.
///
/// # Errors
///
/// Returns [`GatewayError`] on a malformed field or an unknown id.
#[utoipa::path(
    put,
    path = "/api/devices/{id}",
    tag = "Devices",
    summary = "Update device",
    description = "Changes only the fields present in the body. Send `\"role\": null` to clear the role, which pauses ingestion for the device.",
    params(
        ("id" = uuid::Uuid, Path, description = "Device UUID"),
    ),
    request_body = UpdateDeviceRequest,
    responses(
        (status = 200, description = "Device updated", body = Device),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 404, description = "Device not found", body = ErrorResponse),
    )
)]
pub async fn update_device(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
    Json(req): Json<UpdateDeviceRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let device = state
        .device_service
        .update_device(DeviceId::from_uuid(id), req.into())
        .await?;
    Ok(Json(device))
}

/// `DELETE /api/devices/{id}`: Remove a device and its logs.
///
/// # Errors
///
/// Returns [`GatewayError::DeviceNotFound`] for an unknown id.
#[utoipa::path(
    delete,
    path = "/api/devices/{id}",
    tag = "Devices",
    summary = "Delete device",
    params(
        ("id" = uuid::Uuid, Path, description = "Device UUID"),
    ),
    responses(
        (status = 204, description = "Device deleted"),
        (status = 404, description = "Device not found", body = ErrorResponse),
    )
)]
pub async fn delete_device(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, GatewayError> {
    state
        .device_service
        .delete_device(DeviceId::from_uuid(id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Device routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/devices", get(list_devices).post(create_device))
        .route(
            "/devices/{id}",
            get(get_device).put(update_device).delete(delete_device),
        )
}
