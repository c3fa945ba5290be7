use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{
    dto::{DeviceDto, Page, SensorDataDto},
    errors::ApiError,
    AppState,
};
use crate::{
    auth::AuthUser,
    devices::{DeviceService, DeviceUpdate, NewDevice},
    sensors::{NewReading, SensorDataService},
};

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<i64>,
    pub size: Option<i64>,
}

impl PageParams {
    fn resolve(&self) -> Result<(i64, i64), ApiError> {
        let page = self.page.unwrap_or(0);
        let size = self.size.unwrap_or(20);
        if page < 0 {
            return Err(ApiError::Validation("page must not be negative".into()));
        }
        if !(1..=500).contains(&size) {
            return Err(ApiError::Validation("size must be between 1 and 500".into()));
        }
        Ok((page, size))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SensorDataParams {
    pub sensor_type: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub page: Option<i64>,
    pub size: Option<i64>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// List devices with their type and location names, paged by id.
#[utoipa::path(
    get,
    path = "/api/v1/devices",
    params(
        ("page" = Option<i64>, Query, description = "Page number, 0-based"),
        ("size" = Option<i64>, Query, description = "Page size, default 20"),
    ),
    responses(
        (status = 200, description = "Page of devices", body = Page<DeviceDto>),
        (status = 401, description = "Missing or invalid token"),
    ),
    security(("bearer_auth" = [])),
    tag = "devices"
)]
pub async fn list_devices(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(params): Query<PageParams>,
) -> Result<Json<Page<DeviceDto>>, ApiError> {
    let (page, size) = params.resolve()?;
    let service = DeviceService::new(state.pool.clone());
    let (rows, total) = service.list(page, size).await?;
    let content = rows.into_iter().map(DeviceDto::from).collect();
    Ok(Json(Page::new(content, page, size, total)))
}

/// Fetch a single device.
#[utoipa::path(
    get,
    path = "/api/v1/devices/{id}",
    params(("id" = i64, Path, description = "Device id")),
    responses(
        (status = 200, description = "The device", body = DeviceDto),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Device not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "devices"
)]
pub async fn get_device(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<DeviceDto>, ApiError> {
    let service = DeviceService::new(state.pool.clone());
    Ok(Json(service.find_by_id(id).await?.into()))
}

/// Register a device. The authenticated user is recorded as its creator.
#[utoipa::path(
    post,
    path = "/api/v1/devices",
    request_body = NewDevice,
    responses(
        (status = 201, description = "Created device", body = DeviceDto),
        (status = 400, description = "Validation failure"),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Referenced type or location not found"),
        (status = 409, description = "Duplicate serial number or MAC address"),
    ),
    security(("bearer_auth" = [])),
    tag = "devices"
)]
pub async fn create_device(
    State(state): State<AppState>,
    user: AuthUser,
    Json(new): Json<NewDevice>,
) -> Result<(StatusCode, Json<DeviceDto>), ApiError> {
    let service = DeviceService::new(state.pool.clone());
    let created = service.create(&new, user.user_id).await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

/// Update device fields. Absent fields are left unchanged.
#[utoipa::path(
    patch,
    path = "/api/v1/devices/{id}",
    params(("id" = i64, Path, description = "Device id")),
    request_body = DeviceUpdate,
    responses(
        (status = 200, description = "Updated device", body = DeviceDto),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Device not found"),
        (status = 409, description = "Duplicate serial number or MAC address"),
    ),
    security(("bearer_auth" = [])),
    tag = "devices"
)]
pub async fn update_device(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<i64>,
    Json(update): Json<DeviceUpdate>,
) -> Result<Json<DeviceDto>, ApiError> {
    let service = DeviceService::new(state.pool.clone());
    Ok(Json(service.update(id, &update).await?.into()))
}

/// Delete a device along with its readings and alerts.
#[utoipa::path(
    delete,
    path = "/api/v1/devices/{id}",
    params(("id" = i64, Path, description = "Device id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Device not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "devices"
)]
pub async fn delete_device(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let service = DeviceService::new(state.pool.clone());
    service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Paged readings for a device, optionally narrowed by sensor type and
/// time range. Newest first.
#[utoipa::path(
    get,
    path = "/api/v1/devices/{id}/sensor-data",
    params(
        ("id" = i64, Path, description = "Device id"),
        ("sensor_type" = Option<String>, Query, description = "Filter by sensor type (exact match)"),
        ("start_date" = Option<String>, Query, description = "Recorded at or after (RFC3339)"),
        ("end_date" = Option<String>, Query, description = "Recorded at or before (RFC3339)"),
        ("page" = Option<i64>, Query, description = "Page number, 0-based"),
        ("size" = Option<i64>, Query, description = "Page size, default 20"),
    ),
    responses(
        (status = 200, description = "Page of readings", body = Page<SensorDataDto>),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Device not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "devices"
)]
pub async fn device_sensor_data(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<i64>,
    Query(params): Query<SensorDataParams>,
) -> Result<Json<Page<SensorDataDto>>, ApiError> {
    let paging = PageParams {
        page: params.page,
        size: params.size,
    };
    let (page, size) = paging.resolve()?;
    let service = SensorDataService::new(state.pool.clone());
    let (rows, total) = service
        .device_sensor_data(
            id,
            params.sensor_type.as_deref(),
            params.start_date,
            params.end_date,
            page,
            size,
        )
        .await?;
    let content = rows.into_iter().map(SensorDataDto::from).collect();
    Ok(Json(Page::new(content, page, size, total)))
}

/// The distinct sensor types a device has ever reported, sorted.
#[utoipa::path(
    get,
    path = "/api/v1/devices/{id}/sensor-types",
    params(("id" = i64, Path, description = "Device id")),
    responses(
        (status = 200, description = "Sorted distinct sensor types", body = Vec<String>),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Device not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "devices"
)]
pub async fn device_sensor_types(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Vec<String>>, ApiError> {
    let service = SensorDataService::new(state.pool.clone());
    Ok(Json(service.distinct_sensor_types(id).await?))
}

/// Record a reading for a device. The timestamp is stamped server-side.
#[utoipa::path(
    post,
    path = "/api/v1/devices/{id}/readings",
    params(("id" = i64, Path, description = "Device id")),
    request_body = NewReading,
    responses(
        (status = 201, description = "Stored reading", body = SensorDataDto),
        (status = 400, description = "Validation failure"),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Device not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "devices"
)]
pub async fn add_reading(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<i64>,
    Json(reading): Json<NewReading>,
) -> Result<(StatusCode, Json<SensorDataDto>), ApiError> {
    let service = SensorDataService::new(state.pool.clone());
    let stored = service.add_reading(id, &reading).await?;
    Ok((StatusCode::CREATED, Json(stored.into())))
}
