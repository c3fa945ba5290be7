pub mod jwt;
pub mod password;

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use sqlx::PgPool;
use tracing::info;

use crate::{
    api::{errors::ApiError, AppState},
    db::models::User,
};

pub use jwt::{Claims, JwtKeys};

/// The authenticated caller, extracted from the `Authorization: Bearer`
/// header. All acting-user identity flows through this extractor: the actor
/// is taken from the verified token claim, never from a client-supplied
/// header.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i64,
    pub username: String,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("missing bearer token".into()))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::Unauthorized("malformed authorization header".into()))?;

        let claims = state.jwt.verify_token(token)?;
        Ok(AuthUser {
            user_id: claims.sub,
            username: claims.username,
        })
    }
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub struct AuthResponse {
    pub user_id: i64,
    pub token: String,
}

/// Registration, login and token verification against the user store.
pub struct AuthService {
    pool: PgPool,
    jwt: JwtKeys,
}

const USER_COLUMNS: &str = "id, first_name, last_name, username, email, password_hash, \
                            is_active, last_login_at, created_at, updated_at";

impl AuthService {
    pub fn new(pool: PgPool, jwt: JwtKeys) -> Self {
        Self { pool, jwt }
    }

    /// Creates a user with the OPERATOR role and issues a token. Duplicate
    /// username or email surfaces as Conflict via the unique constraints.
    pub async fn register(
        &self,
        username: &str,
        first_name: Option<&str>,
        last_name: Option<&str>,
        email: &str,
        password: &str,
    ) -> Result<AuthResponse, ApiError> {
        if username.trim().is_empty() {
            return Err(ApiError::Validation("username must not be empty".into()));
        }
        if email.trim().is_empty() {
            return Err(ApiError::Validation("email must not be empty".into()));
        }
        if password.len() < 8 {
            return Err(ApiError::Validation(
                "password must be at least 8 characters".into(),
            ));
        }

        let password_hash = password::hash_password(password)?;

        let mut tx = self.pool.begin().await?;

        let user: User = sqlx::query_as(&format!(
            "INSERT INTO users (username, first_name, last_name, email, password_hash) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(username)
        .bind(first_name)
        .bind(last_name)
        .bind(email)
        .bind(&password_hash)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO user_roles (user_id, role_id) \
             SELECT $1, id FROM roles WHERE name = 'OPERATOR'",
        )
        .bind(user.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(user_id = user.id, username = %user.username, "user registered");

        let token = self.jwt.generate_token(user.id, &user.username)?;
        Ok(AuthResponse {
            user_id: user.id,
            token,
        })
    }

    /// Verifies credentials, stamps `last_login_at` and issues a token.
    /// Unknown email and wrong password are indistinguishable to the caller.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ApiError> {
        let user: Option<User> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;

        let user = user.ok_or_else(|| ApiError::Unauthorized("invalid credentials".into()))?;

        if !password::verify_password(password, &user.password_hash) {
            return Err(ApiError::Unauthorized("invalid credentials".into()));
        }
        if !user.is_active {
            return Err(ApiError::Unauthorized("account is disabled".into()));
        }

        sqlx::query("UPDATE users SET last_login_at = now() WHERE id = $1")
            .bind(user.id)
            .execute(&self.pool)
            .await?;

        let token = self.jwt.generate_token(user.id, &user.username)?;
        Ok(AuthResponse {
            user_id: user.id,
            token,
        })
    }

    /// Decodes the token and checks it still matches an active user record.
    pub async fn verify(&self, token: &str) -> Result<Claims, ApiError> {
        let claims = self.jwt.verify_token(token)?;

        let user: Option<User> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                .bind(claims.sub)
                .fetch_optional(&self.pool)
                .await?;

        match user {
            Some(u) if u.username == claims.username && u.is_active => Ok(claims),
            _ => Err(ApiError::Unauthorized(
                "token does not match an active user".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use sqlx::PgPool;

    use super::*;

    fn service(pool: PgPool) -> AuthService {
        AuthService::new(pool, JwtKeys::new("test-secret", 1))
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn register_assigns_operator_role(pool: PgPool) {
        let svc = service(pool.clone());
        let resp = svc
            .register("op1", None, None, "op1@example.com", "password123")
            .await
            .unwrap();

        let role: String = sqlx::query_scalar(
            "SELECT r.name FROM roles r \
             JOIN user_roles ur ON ur.role_id = r.id WHERE ur.user_id = $1",
        )
        .bind(resp.user_id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(role, "OPERATOR");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn short_password_is_rejected(pool: PgPool) {
        let svc = service(pool);
        assert!(matches!(
            svc.register("op1", None, None, "op1@example.com", "short")
                .await,
            Err(ApiError::Validation(_))
        ));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn login_stamps_last_login(pool: PgPool) {
        let svc = service(pool.clone());
        let resp = svc
            .register("op1", None, None, "op1@example.com", "password123")
            .await
            .unwrap();

        svc.login("op1@example.com", "password123").await.unwrap();

        let last_login: Option<chrono::DateTime<chrono::Utc>> =
            sqlx::query_scalar("SELECT last_login_at FROM users WHERE id = $1")
                .bind(resp.user_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert!(last_login.is_some());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn disabled_account_cannot_login(pool: PgPool) {
        let svc = service(pool.clone());
        let resp = svc
            .register("op1", None, None, "op1@example.com", "password123")
            .await
            .unwrap();

        sqlx::query("UPDATE users SET is_active = false WHERE id = $1")
            .bind(resp.user_id)
            .execute(&pool)
            .await
            .unwrap();

        assert!(matches!(
            svc.login("op1@example.com", "password123").await,
            Err(ApiError::Unauthorized(_))
        ));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn verify_rejects_token_of_deleted_user(pool: PgPool) {
        let svc = service(pool.clone());
        let resp = svc
            .register("op1", None, None, "op1@example.com", "password123")
            .await
            .unwrap();

        svc.verify(&resp.token).await.unwrap();

        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(resp.user_id)
            .execute(&pool)
            .await
            .unwrap();

        assert!(matches!(
            svc.verify(&resp.token).await,
            Err(ApiError::Unauthorized(_))
        ));
    }
}
