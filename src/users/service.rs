use serde::Deserialize;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::info;
use utoipa::ToSchema;

use crate::api::errors::ApiError;
use crate::auth::password;
use crate::db::models::{NotificationSettings, Preferences, User};

const USER_COLUMNS: &str = "id, first_name, last_name, username, email, password_hash, \
                            is_active, last_login_at, created_at, updated_at";

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct NotificationSettingsUpdate {
    pub email_alerts: Option<bool>,
    pub push_notifications: Option<bool>,
    pub sms_alerts: Option<bool>,
    pub critical_only: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct PreferencesUpdate {
    pub theme: Option<String>,
    pub language: Option<String>,
    pub timezone: Option<String>,
}

/// A user together with their settings records.
#[derive(Debug, Clone)]
pub struct UserProfile {
    pub user: User,
    pub notification_settings: NotificationSettings,
    pub preferences: Preferences,
}

pub struct UserService {
    pool: PgPool,
}

impl UserService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// All users ordered by id. Settings are not joined here; the per-user
    /// read carries them.
    pub async fn list(&self) -> Result<Vec<User>, ApiError> {
        Ok(
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))
                .fetch_all(&self.pool)
                .await?,
        )
    }

    /// Loads the profile. Settings records are created with defaults on
    /// first access: an explicit get-or-create, so the write happens here
    /// at the service boundary, not inside a read accessor.
    pub async fn profile(&self, user_id: i64) -> Result<UserProfile, ApiError> {
        let mut tx = self.pool.begin().await?;
        let user = Self::require_user(&mut tx, user_id).await?;
        let notification_settings = Self::get_or_create_settings(&mut tx, user_id).await?;
        let preferences = Self::get_or_create_preferences(&mut tx, user_id).await?;
        tx.commit().await?;

        Ok(UserProfile {
            user,
            notification_settings,
            preferences,
        })
    }

    /// Updates names/email and, when present, the settings records.
    pub async fn update_profile(
        &self,
        user_id: i64,
        first_name: Option<&str>,
        last_name: Option<&str>,
        email: Option<&str>,
        settings: Option<&NotificationSettingsUpdate>,
        preferences: Option<&PreferencesUpdate>,
    ) -> Result<UserProfile, ApiError> {
        let mut tx = self.pool.begin().await?;
        Self::require_user(&mut tx, user_id).await?;

        let user: User = sqlx::query_as(&format!(
            "UPDATE users \
                SET first_name = COALESCE($2, first_name), \
                    last_name = COALESCE($3, last_name), \
                    email = COALESCE($4, email), \
                    updated_at = now() \
              WHERE id = $1 \
              RETURNING {USER_COLUMNS}"
        ))
        .bind(user_id)
        .bind(first_name)
        .bind(last_name)
        .bind(email)
        .fetch_one(&mut *tx)
        .await?;

        let mut notification_settings = Self::get_or_create_settings(&mut tx, user_id).await?;
        let mut prefs = Self::get_or_create_preferences(&mut tx, user_id).await?;

        if let Some(update) = settings {
            notification_settings = sqlx::query_as(
                "UPDATE notification_settings \
                    SET email_alerts = COALESCE($2, email_alerts), \
                        push_notifications = COALESCE($3, push_notifications), \
                        sms_alerts = COALESCE($4, sms_alerts), \
                        critical_only = COALESCE($5, critical_only), \
                        updated_at = now() \
                  WHERE user_id = $1 \
                  RETURNING *",
            )
            .bind(user_id)
            .bind(update.email_alerts)
            .bind(update.push_notifications)
            .bind(update.sms_alerts)
            .bind(update.critical_only)
            .fetch_one(&mut *tx)
            .await?;
        }

        if let Some(update) = preferences {
            prefs = sqlx::query_as(
                "UPDATE preferences \
                    SET theme = COALESCE($2, theme), \
                        language = COALESCE($3, language), \
                        timezone = COALESCE($4, timezone), \
                        updated_at = now() \
                  WHERE user_id = $1 \
                  RETURNING *",
            )
            .bind(user_id)
            .bind(&update.theme)
            .bind(&update.language)
            .bind(&update.timezone)
            .fetch_one(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(user_id, "profile updated");
        Ok(UserProfile {
            user,
            notification_settings,
            preferences: prefs,
        })
    }

    /// Verifies the current password and replaces the stored hash.
    pub async fn change_password(
        &self,
        user_id: i64,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), ApiError> {
        let mut tx = self.pool.begin().await?;
        let user = Self::require_user(&mut tx, user_id).await?;

        if !password::verify_password(current_password, &user.password_hash) {
            return Err(ApiError::Validation("current password is incorrect".into()));
        }
        if current_password == new_password {
            return Err(ApiError::Validation(
                "new password must differ from the current password".into(),
            ));
        }
        if new_password.len() < 8 {
            return Err(ApiError::Validation(
                "password must be at least 8 characters".into(),
            ));
        }

        let hash = password::hash_password(new_password)?;
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
            .bind(user_id)
            .bind(&hash)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(user_id, "password changed");
        Ok(())
    }

    async fn require_user(
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
    ) -> Result<User, ApiError> {
        sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(user_id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| ApiError::not_found("User", user_id))
    }

    async fn get_or_create_settings(
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
    ) -> Result<NotificationSettings, ApiError> {
        sqlx::query(
            "INSERT INTO notification_settings (user_id) VALUES ($1) \
             ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user_id)
        .execute(&mut **tx)
        .await?;

        Ok(
            sqlx::query_as("SELECT * FROM notification_settings WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&mut **tx)
                .await?,
        )
    }

    async fn get_or_create_preferences(
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
    ) -> Result<Preferences, ApiError> {
        sqlx::query(
            "INSERT INTO preferences (user_id) VALUES ($1) \
             ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user_id)
        .execute(&mut **tx)
        .await?;

        Ok(sqlx::query_as("SELECT * FROM preferences WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&mut **tx)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use sqlx::PgPool;

    use super::*;

    async fn insert_user(pool: &PgPool, username: &str, password_plain: &str) -> i64 {
        let hash = password::hash_password(password_plain).unwrap();
        sqlx::query_scalar(
            "INSERT INTO users (username, email, password_hash) \
             VALUES ($1, $1 || '@example.com', $2) RETURNING id",
        )
        .bind(username)
        .bind(hash)
        .fetch_one(pool)
        .await
        .unwrap()
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn profile_creates_default_settings_on_first_read(pool: PgPool) {
        let user = insert_user(&pool, "op1", "password123").await;
        let svc = UserService::new(pool.clone());

        let before: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notification_settings")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(before, 0);

        let profile = svc.profile(user).await.unwrap();
        assert!(profile.notification_settings.email_alerts);
        assert!(profile.notification_settings.push_notifications);
        assert!(!profile.notification_settings.sms_alerts);
        assert!(!profile.notification_settings.critical_only);
        assert_eq!(profile.preferences.theme, "light");
        assert_eq!(profile.preferences.language, "en");
        assert_eq!(profile.preferences.timezone, "UTC");

        // A second read reuses the same rows.
        let again = svc.profile(user).await.unwrap();
        assert_eq!(again.notification_settings.id, profile.notification_settings.id);
        assert_eq!(again.preferences.id, profile.preferences.id);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn update_profile_applies_settings(pool: PgPool) {
        let user = insert_user(&pool, "op1", "password123").await;
        let svc = UserService::new(pool);

        let profile = svc
            .update_profile(
                user,
                Some("Ada"),
                Some("Lovelace"),
                None,
                Some(&NotificationSettingsUpdate {
                    critical_only: Some(true),
                    ..Default::default()
                }),
                Some(&PreferencesUpdate {
                    theme: Some("dark".into()),
                    ..Default::default()
                }),
            )
            .await
            .unwrap();

        assert_eq!(profile.user.first_name.as_deref(), Some("Ada"));
        assert!(profile.notification_settings.critical_only);
        assert!(profile.notification_settings.email_alerts);
        assert_eq!(profile.preferences.theme, "dark");
        assert_eq!(profile.preferences.language, "en");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn change_password_requires_correct_current(pool: PgPool) {
        let user = insert_user(&pool, "op1", "password123").await;
        let svc = UserService::new(pool);

        assert!(matches!(
            svc.change_password(user, "wrong", "newpassword1").await,
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            svc.change_password(user, "password123", "password123").await,
            Err(ApiError::Validation(_))
        ));

        svc.change_password(user, "password123", "newpassword1")
            .await
            .unwrap();

        // Old password no longer verifies, new one does.
        assert!(matches!(
            svc.change_password(user, "password123", "whatever123").await,
            Err(ApiError::Validation(_))
        ));
        svc.change_password(user, "newpassword1", "password123")
            .await
            .unwrap();
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn list_returns_all_users_ordered(pool: PgPool) {
        let first = insert_user(&pool, "op1", "password123").await;
        let second = insert_user(&pool, "op2", "password123").await;
        let svc = UserService::new(pool);

        let users = svc.list().await.unwrap();
        let ids: Vec<i64> = users.iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![first, second]);
        assert_eq!(users[0].username, "op1");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn missing_user_is_not_found(pool: PgPool) {
        let svc = UserService::new(pool);
        assert!(matches!(svc.profile(9999).await, Err(ApiError::NotFound(_))));
    }
}
