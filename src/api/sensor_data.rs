use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use super::{dto::SensorDataDto, errors::ApiError, AppState};
use crate::{auth::AuthUser, sensors::SensorDataService};

#[derive(Debug, Deserialize)]
pub struct LatestParams {
    pub count: Option<i64>,
}

/// The most recent readings across the whole fleet, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/sensor-data/latest",
    params(
        ("count" = Option<i64>, Query, description = "Maximum number of readings, default 10"),
    ),
    responses(
        (status = 200, description = "Latest readings", body = Vec<SensorDataDto>),
        (status = 400, description = "Count below 1"),
        (status = 401, description = "Missing or invalid token"),
    ),
    security(("bearer_auth" = [])),
    tag = "sensors"
)]
pub async fn latest_readings(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(params): Query<LatestParams>,
) -> Result<Json<Vec<SensorDataDto>>, ApiError> {
    let service = SensorDataService::new(state.pool.clone());
    let rows = service.latest_readings(params.count.unwrap_or(10)).await?;
    Ok(Json(rows.into_iter().map(SensorDataDto::from).collect()))
}
