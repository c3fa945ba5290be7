pub mod alerts;
pub mod auth;
pub mod devices;
pub mod dto;
pub mod errors;
pub mod sensor_data;
pub mod users;

use axum::{
    routing::{get, patch, post, put},
    Router,
};
use sqlx::PgPool;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_axum::router::OpenApiRouter;

use crate::auth::JwtKeys;

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub jwt: JwtKeys,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(state: AppState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        // Auth (public)
        .route("/api/v1/auth/register", post(auth::register))
        .route("/api/v1/auth/login", post(auth::login))
        .route("/api/v1/auth/verify", post(auth::verify))
        // Alerts
        .route(
            "/api/v1/alerts",
            get(alerts::list_alerts).post(alerts::create_alert),
        )
        .route(
            "/api/v1/alerts/count-by-severity",
            get(alerts::count_by_severity),
        )
        .route(
            "/api/v1/alerts/count-by-status",
            get(alerts::count_by_status),
        )
        .route(
            "/api/v1/alerts/critical-unacknowledged",
            get(alerts::critical_unacknowledged),
        )
        .route(
            "/api/v1/alerts/batch-acknowledge",
            put(alerts::batch_acknowledge),
        )
        .route(
            "/api/v1/alerts/device/{device_id}/latest",
            get(alerts::latest_for_device),
        )
        .route(
            "/api/v1/alerts/{id}",
            get(alerts::get_alert)
                .put(alerts::update_alert)
                .delete(alerts::delete_alert),
        )
        .route(
            "/api/v1/alerts/{id}/acknowledge",
            patch(alerts::acknowledge_alert),
        )
        .route("/api/v1/alerts/{id}/resolve", put(alerts::resolve_alert))
        // Devices
        .route(
            "/api/v1/devices",
            get(devices::list_devices).post(devices::create_device),
        )
        .route(
            "/api/v1/devices/{id}",
            get(devices::get_device)
                .patch(devices::update_device)
                .delete(devices::delete_device),
        )
        .route(
            "/api/v1/devices/{id}/sensor-data",
            get(devices::device_sensor_data),
        )
        .route(
            "/api/v1/devices/{id}/sensor-types",
            get(devices::device_sensor_types),
        )
        .route("/api/v1/devices/{id}/readings", post(devices::add_reading))
        // Sensor data
        .route(
            "/api/v1/sensor-data/latest",
            get(sensor_data::latest_readings),
        )
        // Users
        .route("/api/v1/users", get(users::list_users))
        .route(
            "/api/v1/users/profile",
            get(users::get_profile).patch(users::update_profile),
        )
        .route("/api/v1/users/password", patch(users::change_password))
        .route("/api/v1/users/{id}", get(users::get_user))
        .with_state(state)
        .split_for_parts();

    router
        .route("/health", get(health))
        .route(
            "/api-docs/openapi.json",
            get(move || async move { axum::Json(api) }),
        )
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is up"),
    ),
    tag = "system"
)]
pub async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}

// ---------------------------------------------------------------------------
// OpenAPI spec
// ---------------------------------------------------------------------------

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::register,
        auth::login,
        auth::verify,
        alerts::list_alerts,
        alerts::get_alert,
        alerts::create_alert,
        alerts::update_alert,
        alerts::delete_alert,
        alerts::acknowledge_alert,
        alerts::resolve_alert,
        alerts::batch_acknowledge,
        alerts::count_by_severity,
        alerts::count_by_status,
        alerts::critical_unacknowledged,
        alerts::latest_for_device,
        devices::list_devices,
        devices::get_device,
        devices::create_device,
        devices::update_device,
        devices::delete_device,
        devices::device_sensor_data,
        devices::device_sensor_types,
        devices::add_reading,
        sensor_data::latest_readings,
        users::list_users,
        users::get_user,
        users::get_profile,
        users::update_profile,
        users::change_password,
        health,
    ),
    components(schemas(
        dto::AlertDto,
        dto::DeviceDto,
        dto::SensorDataDto,
        dto::UserDto,
        dto::UserProfileDto,
        dto::NotificationSettingsDto,
        dto::PreferencesDto,
        dto::Page<dto::AlertDto>,
        dto::Page<dto::DeviceDto>,
        dto::Page<dto::SensorDataDto>,
        dto::RegisterRequest,
        dto::LoginRequest,
        dto::UpdateProfileRequest,
        dto::ChangePasswordRequest,
        dto::BatchAcknowledgeRequest,
        dto::BatchAcknowledgeResponse,
        auth::VerifyResponse,
        crate::alerts::NewAlert,
        crate::alerts::AlertUpdate,
        crate::devices::NewDevice,
        crate::devices::DeviceUpdate,
        crate::sensors::NewReading,
        crate::users::NotificationSettingsUpdate,
        crate::users::PreferencesUpdate,
        crate::auth::AuthResponse,
        crate::db::models::Severity,
        crate::db::models::AlertStatus,
        crate::db::models::DeviceStatus,
        crate::db::models::SensorType,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth",    description = "Registration, login and token verification"),
        (name = "alerts",  description = "Alert CRUD, lifecycle and aggregation endpoints"),
        (name = "devices", description = "Device CRUD and per-device sensor data"),
        (name = "sensors", description = "Fleet-wide sensor data endpoints"),
        (name = "users",   description = "Profile and password endpoints"),
        (name = "system",  description = "System endpoints"),
    ),
    info(
        title = "IoT Fleet Service API",
        version = "0.1.0",
        description = "REST API for device fleet management, sensor data and alerting"
    )
)]
pub struct ApiDoc;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
