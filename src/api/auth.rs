use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use super::{
    dto::{LoginRequest, RegisterRequest},
    errors::ApiError,
    AppState,
};
use crate::auth::{AuthResponse, AuthService};

#[derive(Debug, Serialize, ToSchema)]
pub struct VerifyResponse {
    pub user_id: i64,
    pub username: String,
}

/// Register a new account and issue a token.
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 400, description = "Validation failure"),
        (status = 409, description = "Username or email already taken"),
    ),
    tag = "auth"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let service = AuthService::new(state.pool.clone(), state.jwt.clone());
    let resp = service
        .register(
            &req.username,
            req.first_name.as_deref(),
            req.last_name.as_deref(),
            &req.email,
            &req.password,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

/// Exchange credentials for a token.
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token issued", body = AuthResponse),
        (status = 401, description = "Invalid credentials or disabled account"),
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let service = AuthService::new(state.pool.clone(), state.jwt.clone());
    Ok(Json(service.login(&req.email, &req.password).await?))
}

/// Check the bearer token against the user store and return who it
/// belongs to.
#[utoipa::path(
    post,
    path = "/api/v1/auth/verify",
    responses(
        (status = 200, description = "Token is valid", body = VerifyResponse),
        (status = 401, description = "Missing, invalid, expired or orphaned token"),
    ),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub async fn verify(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<VerifyResponse>, ApiError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::Unauthorized("missing bearer token".into()))?;

    let service = AuthService::new(state.pool.clone(), state.jwt.clone());
    let claims = service.verify(token).await?;
    Ok(Json(VerifyResponse {
        user_id: claims.sub,
        username: claims.username,
    }))
}
