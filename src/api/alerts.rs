use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{
    dto::{AlertDto, BatchAcknowledgeRequest, BatchAcknowledgeResponse, Page},
    errors::ApiError,
    AppState,
};
use crate::{
    alerts::{AlertFilter, AlertService, AlertUpdate, NewAlert, PageRequest},
    auth::AuthUser,
    db::models::{AlertStatus, Severity},
};

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct AlertListParams {
    pub device_id: Option<i64>,
    pub alert_type: Option<String>,
    pub severity: Option<Severity>,
    pub status: Option<AlertStatus>,
    pub is_active: Option<bool>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub page: Option<i64>,
    pub size: Option<i64>,
    /// `field` or `field,direction`, e.g. `severity,asc`.
    pub sort: Option<String>,
}

impl AlertListParams {
    fn filter(&self) -> AlertFilter {
        AlertFilter {
            device_id: self.device_id,
            alert_type: self.alert_type.clone(),
            severity: self.severity,
            status: self.status,
            is_active: self.is_active,
            start_date: self.start_date,
            end_date: self.end_date,
        }
    }

    fn page_request(&self) -> Result<PageRequest, ApiError> {
        let mut req = PageRequest::default();
        if let Some(page) = self.page {
            if page < 0 {
                return Err(ApiError::Validation("page must not be negative".into()));
            }
            req.page = page;
        }
        if let Some(size) = self.size {
            if !(1..=500).contains(&size) {
                return Err(ApiError::Validation(
                    "size must be between 1 and 500".into(),
                ));
            }
            req.size = size;
        }
        if let Some(ref sort) = self.sort {
            let (field, direction) = PageRequest::parse_sort(sort)
                .map_err(|e| ApiError::Validation(e.to_string()))?;
            req.sort_field = field;
            req.direction = direction;
        }
        Ok(req)
    }
}

#[derive(Debug, Deserialize)]
pub struct LatestParams {
    pub count: Option<i64>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// List alerts matching the conjunction of the given filters, paged.
#[utoipa::path(
    get,
    path = "/api/v1/alerts",
    params(
        ("device_id" = Option<i64>, Query, description = "Filter by device"),
        ("alert_type" = Option<String>, Query, description = "Filter by alert type (exact match)"),
        ("severity" = Option<Severity>, Query, description = "Filter by severity"),
        ("status" = Option<AlertStatus>, Query, description = "Filter by lifecycle status"),
        ("is_active" = Option<bool>, Query, description = "Filter by active flag"),
        ("start_date" = Option<String>, Query, description = "Created at or after (RFC3339)"),
        ("end_date" = Option<String>, Query, description = "Created at or before (RFC3339)"),
        ("page" = Option<i64>, Query, description = "Page number, 0-based"),
        ("size" = Option<i64>, Query, description = "Page size, default 20"),
        ("sort" = Option<String>, Query, description = "Sort as `field` or `field,direction`"),
    ),
    responses(
        (status = 200, description = "Page of alerts", body = Page<AlertDto>),
        (status = 400, description = "Invalid sort or paging parameters"),
        (status = 401, description = "Missing or invalid token"),
    ),
    security(("bearer_auth" = [])),
    tag = "alerts"
)]
pub async fn list_alerts(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(params): Query<AlertListParams>,
) -> Result<Json<Page<AlertDto>>, ApiError> {
    let page_req = params.page_request()?;
    let service = AlertService::new(state.pool.clone());
    let (rows, total) = service.find_with_filters(&params.filter(), &page_req).await?;
    let content = rows.into_iter().map(AlertDto::from).collect();
    Ok(Json(Page::new(content, page_req.page, page_req.size, total)))
}

/// Fetch a single alert with joined device and user names.
#[utoipa::path(
    get,
    path = "/api/v1/alerts/{id}",
    params(("id" = i64, Path, description = "Alert id")),
    responses(
        (status = 200, description = "The alert", body = AlertDto),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Alert not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "alerts"
)]
pub async fn get_alert(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<AlertDto>, ApiError> {
    let service = AlertService::new(state.pool.clone());
    Ok(Json(service.find_by_id(id).await?.into()))
}

/// Create an alert. New alerts always start Open.
#[utoipa::path(
    post,
    path = "/api/v1/alerts",
    request_body = NewAlert,
    responses(
        (status = 201, description = "Created alert", body = AlertDto),
        (status = 400, description = "Validation failure"),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Referenced device or user not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "alerts"
)]
pub async fn create_alert(
    State(state): State<AppState>,
    _user: AuthUser,
    Json(new): Json<NewAlert>,
) -> Result<(StatusCode, Json<AlertDto>), ApiError> {
    let service = AlertService::new(state.pool.clone());
    let created = service.create(&new).await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

/// Update the mutable content fields of an alert.
#[utoipa::path(
    put,
    path = "/api/v1/alerts/{id}",
    params(("id" = i64, Path, description = "Alert id")),
    request_body = AlertUpdate,
    responses(
        (status = 200, description = "Updated alert", body = AlertDto),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Alert not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "alerts"
)]
pub async fn update_alert(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<i64>,
    Json(update): Json<AlertUpdate>,
) -> Result<Json<AlertDto>, ApiError> {
    let service = AlertService::new(state.pool.clone());
    Ok(Json(service.update(id, &update).await?.into()))
}

/// Delete an alert.
#[utoipa::path(
    delete,
    path = "/api/v1/alerts/{id}",
    params(("id" = i64, Path, description = "Alert id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Alert not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "alerts"
)]
pub async fn delete_alert(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let service = AlertService::new(state.pool.clone());
    service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Acknowledge an alert as the authenticated user.
#[utoipa::path(
    patch,
    path = "/api/v1/alerts/{id}/acknowledge",
    params(("id" = i64, Path, description = "Alert id")),
    responses(
        (status = 200, description = "Acknowledged alert", body = AlertDto),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Alert or user not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "alerts"
)]
pub async fn acknowledge_alert(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<AlertDto>, ApiError> {
    let service = AlertService::new(state.pool.clone());
    Ok(Json(service.acknowledge(id, user.user_id).await?.into()))
}

/// Resolve an alert as the authenticated user.
#[utoipa::path(
    put,
    path = "/api/v1/alerts/{id}/resolve",
    params(("id" = i64, Path, description = "Alert id")),
    responses(
        (status = 200, description = "Resolved alert", body = AlertDto),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Alert or user not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "alerts"
)]
pub async fn resolve_alert(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<AlertDto>, ApiError> {
    let service = AlertService::new(state.pool.clone());
    Ok(Json(service.resolve(id, user.user_id).await?.into()))
}

/// Acknowledge a set of alerts in one statement. Unknown ids are skipped;
/// the response carries the number actually updated.
#[utoipa::path(
    put,
    path = "/api/v1/alerts/batch-acknowledge",
    request_body = BatchAcknowledgeRequest,
    responses(
        (status = 200, description = "Number of alerts acknowledged", body = BatchAcknowledgeResponse),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Acknowledging user not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "alerts"
)]
pub async fn batch_acknowledge(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<BatchAcknowledgeRequest>,
) -> Result<Json<BatchAcknowledgeResponse>, ApiError> {
    let service = AlertService::new(state.pool.clone());
    let acknowledged = service.batch_acknowledge(&req.alert_ids, user.user_id).await?;
    Ok(Json(BatchAcknowledgeResponse { acknowledged }))
}

/// Alert counts grouped by severity. Severities with no alerts are absent.
#[utoipa::path(
    get,
    path = "/api/v1/alerts/count-by-severity",
    responses(
        (status = 200, description = "Counts keyed by severity", body = std::collections::BTreeMap<String, i64>),
        (status = 401, description = "Missing or invalid token"),
    ),
    security(("bearer_auth" = [])),
    tag = "alerts"
)]
pub async fn count_by_severity(
    State(state): State<AppState>,
    _user: AuthUser,
) -> Result<Json<BTreeMap<Severity, i64>>, ApiError> {
    let service = AlertService::new(state.pool.clone());
    Ok(Json(service.count_by_severity().await?))
}

/// Alert counts grouped by lifecycle status. Statuses with no alerts are absent.
#[utoipa::path(
    get,
    path = "/api/v1/alerts/count-by-status",
    responses(
        (status = 200, description = "Counts keyed by status", body = std::collections::BTreeMap<String, i64>),
        (status = 401, description = "Missing or invalid token"),
    ),
    security(("bearer_auth" = [])),
    tag = "alerts"
)]
pub async fn count_by_status(
    State(state): State<AppState>,
    _user: AuthUser,
) -> Result<Json<BTreeMap<AlertStatus, i64>>, ApiError> {
    let service = AlertService::new(state.pool.clone());
    Ok(Json(service.count_by_status().await?))
}

/// Critical alerts that have not been acknowledged, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/alerts/critical-unacknowledged",
    responses(
        (status = 200, description = "Critical alerts not in Acknowledged status", body = Vec<AlertDto>),
        (status = 401, description = "Missing or invalid token"),
    ),
    security(("bearer_auth" = [])),
    tag = "alerts"
)]
pub async fn critical_unacknowledged(
    State(state): State<AppState>,
    _user: AuthUser,
) -> Result<Json<Vec<AlertDto>>, ApiError> {
    let service = AlertService::new(state.pool.clone());
    let rows = service.find_critical_unacknowledged().await?;
    Ok(Json(rows.into_iter().map(AlertDto::from).collect()))
}

/// The most recent alerts for one device, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/alerts/device/{device_id}/latest",
    params(
        ("device_id" = i64, Path, description = "Device id"),
        ("count" = Option<i64>, Query, description = "Maximum number of alerts, default 10"),
    ),
    responses(
        (status = 200, description = "Latest alerts for the device", body = Vec<AlertDto>),
        (status = 400, description = "Count below 1"),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Device not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "alerts"
)]
pub async fn latest_for_device(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(device_id): Path<i64>,
    Query(params): Query<LatestParams>,
) -> Result<Json<Vec<AlertDto>>, ApiError> {
    let service = AlertService::new(state.pool.clone());
    let rows = service
        .find_latest(device_id, params.count.unwrap_or(10))
        .await?;
    Ok(Json(rows.into_iter().map(AlertDto::from).collect()))
}
