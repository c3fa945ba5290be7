use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use super::{
    dto::{ChangePasswordRequest, UpdateProfileRequest, UserDto, UserProfileDto},
    errors::ApiError,
    AppState,
};
use crate::{auth::AuthUser, users::UserService};

/// All users, without settings. The per-user read carries those.
#[utoipa::path(
    get,
    path = "/api/v1/users",
    responses(
        (status = 200, description = "All users", body = Vec<UserDto>),
        (status = 401, description = "Missing or invalid token"),
    ),
    security(("bearer_auth" = [])),
    tag = "users"
)]
pub async fn list_users(
    State(state): State<AppState>,
    _user: AuthUser,
) -> Result<Json<Vec<UserDto>>, ApiError> {
    let service = UserService::new(state.pool.clone());
    let users = service.list().await?;
    Ok(Json(users.into_iter().map(UserDto::from).collect()))
}

/// A single user with their settings. Settings records are created with
/// defaults on first access.
#[utoipa::path(
    get,
    path = "/api/v1/users/{id}",
    params(("id" = i64, Path, description = "User id")),
    responses(
        (status = 200, description = "The user with settings", body = UserProfileDto),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "User not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "users"
)]
pub async fn get_user(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<UserProfileDto>, ApiError> {
    let service = UserService::new(state.pool.clone());
    Ok(Json(service.profile(id).await?.into()))
}

/// The authenticated user's profile. Settings records are created with
/// defaults on first access.
#[utoipa::path(
    get,
    path = "/api/v1/users/profile",
    responses(
        (status = 200, description = "The caller's profile", body = UserProfileDto),
        (status = 401, description = "Missing or invalid token"),
    ),
    security(("bearer_auth" = [])),
    tag = "users"
)]
pub async fn get_profile(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<UserProfileDto>, ApiError> {
    let service = UserService::new(state.pool.clone());
    Ok(Json(service.profile(user.user_id).await?.into()))
}

/// Update the caller's profile. Absent fields are left unchanged.
#[utoipa::path(
    patch,
    path = "/api/v1/users/profile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated profile", body = UserProfileDto),
        (status = 401, description = "Missing or invalid token"),
        (status = 409, description = "Email already in use"),
    ),
    security(("bearer_auth" = [])),
    tag = "users"
)]
pub async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<UserProfileDto>, ApiError> {
    let service = UserService::new(state.pool.clone());
    let profile = service
        .update_profile(
            user.user_id,
            req.first_name.as_deref(),
            req.last_name.as_deref(),
            req.email.as_deref(),
            req.notification_settings.as_ref(),
            req.preferences.as_ref(),
        )
        .await?;
    Ok(Json(profile.into()))
}

/// Change the caller's password after verifying the current one.
#[utoipa::path(
    patch,
    path = "/api/v1/users/password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 204, description = "Password changed"),
        (status = 400, description = "Current password incorrect or new password invalid"),
        (status = 401, description = "Missing or invalid token"),
    ),
    security(("bearer_auth" = [])),
    tag = "users"
)]
pub async fn change_password(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<StatusCode, ApiError> {
    let service = UserService::new(state.pool.clone());
    service
        .change_password(user.user_id, &req.current_password, &req.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
