use std::collections::BTreeMap;

use serde::Deserialize;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::info;
use utoipa::ToSchema;

use crate::api::errors::ApiError;
use crate::db::models::{AlertDetails, AlertStatus, Severity};

use super::filter::{AlertFilter, PageRequest};

/// Base SELECT for alert reads: the alert row plus the flattened display
/// names (device, actor usernames) the mapping layer projects into DTOs.
/// Ends in `WHERE true` so filters can push plain ` AND ..` conjuncts.
const ALERT_DETAILS_SELECT: &str = "\
    SELECT a.id, a.device_id, a.alert_type, a.severity, a.message, a.additional_data, \
           a.status, a.is_active, a.created_by, a.acknowledged_by, a.resolved_by, \
           a.created_at, a.updated_at, a.acknowledged_at, a.resolved_at, \
           d.name AS device_name, t.type_name AS device_type, \
           cu.username AS created_by_name, \
           au.username AS acknowledged_by_name, \
           ru.username AS resolved_by_name \
      FROM alerts a \
      JOIN devices d ON d.id = a.device_id \
      LEFT JOIN device_types t ON t.id = d.type_id \
      LEFT JOIN users cu ON cu.id = a.created_by \
      LEFT JOIN users au ON au.id = a.acknowledged_by \
      LEFT JOIN users ru ON ru.id = a.resolved_by \
     WHERE true";

/// Fields accepted when creating an alert. Relationship fields are
/// identifier-only stubs; they are resolved against the store (NotFound if
/// absent) before the row is written.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewAlert {
    pub device_id: i64,
    pub alert_type: String,
    pub severity: Severity,
    pub message: String,
    pub additional_data: Option<serde_json::Value>,
    pub created_by: Option<i64>,
}

/// Fields updatable after creation. Lifecycle fields change only through
/// the transition operations.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct AlertUpdate {
    pub message: Option<String>,
    pub additional_data: Option<serde_json::Value>,
}

pub struct AlertService {
    pool: PgPool,
}

impl AlertService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // -----------------------------------------------------------------------
    // Filtered listing
    // -----------------------------------------------------------------------

    /// Returns one page of alerts matching the filter, plus the total number
    /// of matches for pagination metadata.
    pub async fn find_with_filters(
        &self,
        filter: &AlertFilter,
        page: &PageRequest,
    ) -> Result<(Vec<AlertDetails>, i64), ApiError> {
        let mut count_qb: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM alerts a WHERE true");
        filter.apply(&mut count_qb);
        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(ALERT_DETAILS_SELECT);
        filter.apply(&mut qb);
        page.apply(&mut qb);
        let rows: Vec<AlertDetails> = qb.build_query_as().fetch_all(&self.pool).await?;

        Ok((rows, total))
    }

    pub async fn find_by_id(&self, id: i64) -> Result<AlertDetails, ApiError> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(ALERT_DETAILS_SELECT);
        qb.push(" AND a.id = ").push_bind(id);
        qb.build_query_as()
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found("Alert", id))
    }

    // -----------------------------------------------------------------------
    // CRUD
    // -----------------------------------------------------------------------

    pub async fn create(&self, new: &NewAlert) -> Result<AlertDetails, ApiError> {
        let mut tx = self.pool.begin().await?;

        let device_exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM devices WHERE id = $1)")
                .bind(new.device_id)
                .fetch_one(&mut *tx)
                .await?;
        if !device_exists {
            return Err(ApiError::not_found("Device", new.device_id));
        }

        if let Some(user_id) = new.created_by {
            let user_exists: bool =
                sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)")
                    .bind(user_id)
                    .fetch_one(&mut *tx)
                    .await?;
            if !user_exists {
                return Err(ApiError::not_found("User", user_id));
            }
        }

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO alerts (device_id, alert_type, severity, message, additional_data, created_by) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id",
        )
        .bind(new.device_id)
        .bind(&new.alert_type)
        .bind(new.severity)
        .bind(&new.message)
        .bind(&new.additional_data)
        .bind(new.created_by)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(alert_id = id, device_id = new.device_id, "alert created");
        self.find_by_id(id).await
    }

    pub async fn update(&self, id: i64, update: &AlertUpdate) -> Result<AlertDetails, ApiError> {
        let rows = sqlx::query(
            "UPDATE alerts \
                SET message = COALESCE($2, message), \
                    additional_data = COALESCE($3, additional_data), \
                    updated_at = now() \
              WHERE id = $1",
        )
        .bind(id)
        .bind(&update.message)
        .bind(&update.additional_data)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows == 0 {
            return Err(ApiError::not_found("Alert", id));
        }
        self.find_by_id(id).await
    }

    pub async fn delete(&self, id: i64) -> Result<(), ApiError> {
        let rows = sqlx::query("DELETE FROM alerts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if rows == 0 {
            return Err(ApiError::not_found("Alert", id));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Lifecycle transitions
    // -----------------------------------------------------------------------

    /// Marks the alert acknowledged by `user_id`, stamping actor and time.
    /// No guard against re-acknowledging: a second call overwrites both.
    /// Concurrent calls are last-writer-wins.
    pub async fn acknowledge(&self, alert_id: i64, user_id: i64) -> Result<AlertDetails, ApiError> {
        let mut tx = self.pool.begin().await?;
        Self::require_user(&mut tx, user_id).await?;

        let rows = sqlx::query(
            "UPDATE alerts \
                SET status = $2, acknowledged_by = $3, acknowledged_at = now(), updated_at = now() \
              WHERE id = $1",
        )
        .bind(alert_id)
        .bind(AlertStatus::Acknowledged)
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if rows == 0 {
            return Err(ApiError::not_found("Alert", alert_id));
        }
        tx.commit().await?;

        info!(alert_id, user_id, "alert acknowledged");
        self.find_by_id(alert_id).await
    }

    /// Marks the alert resolved by `user_id`. Permitted from any status,
    /// including directly from Open.
    pub async fn resolve(&self, alert_id: i64, user_id: i64) -> Result<AlertDetails, ApiError> {
        let mut tx = self.pool.begin().await?;
        Self::require_user(&mut tx, user_id).await?;

        let rows = sqlx::query(
            "UPDATE alerts \
                SET status = $2, resolved_by = $3, resolved_at = now(), updated_at = now() \
              WHERE id = $1",
        )
        .bind(alert_id)
        .bind(AlertStatus::Resolved)
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if rows == 0 {
            return Err(ApiError::not_found("Alert", alert_id));
        }
        tx.commit().await?;

        info!(alert_id, user_id, "alert resolved");
        self.find_by_id(alert_id).await
    }

    /// Acknowledges every alert in `ids` with one set-based UPDATE and
    /// returns the number of rows actually updated. Ids that do not exist
    /// are skipped silently, not reported as errors.
    pub async fn batch_acknowledge(&self, ids: &[i64], user_id: i64) -> Result<u64, ApiError> {
        let mut tx = self.pool.begin().await?;
        Self::require_user(&mut tx, user_id).await?;

        let rows = sqlx::query(
            "UPDATE alerts \
                SET status = $2, acknowledged_by = $3, acknowledged_at = now(), updated_at = now() \
              WHERE id = ANY($1)",
        )
        .bind(ids)
        .bind(AlertStatus::Acknowledged)
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        info!(user_id, requested = ids.len(), updated = rows, "batch acknowledge");
        Ok(rows)
    }

    async fn require_user(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        user_id: i64,
    ) -> Result<(), ApiError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)")
            .bind(user_id)
            .fetch_one(&mut **tx)
            .await?;
        if !exists {
            return Err(ApiError::not_found("User", user_id));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Aggregation queries
    // -----------------------------------------------------------------------

    /// Grouped counts over the full alert set in one query (single snapshot).
    /// Severities with zero alerts are absent from the map, never zero.
    pub async fn count_by_severity(&self) -> Result<BTreeMap<Severity, i64>, ApiError> {
        let rows: Vec<(Severity, i64)> =
            sqlx::query_as("SELECT severity, COUNT(*) FROM alerts GROUP BY severity")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().collect())
    }

    /// Same contract as `count_by_severity`, grouped by status.
    pub async fn count_by_status(&self) -> Result<BTreeMap<AlertStatus, i64>, ApiError> {
        let rows: Vec<(AlertStatus, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM alerts GROUP BY status")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().collect())
    }

    /// All Critical alerts whose status is not Acknowledged. Filters only on
    /// "not acknowledged", so Resolved and Suppressed criticals are included.
    pub async fn find_critical_unacknowledged(&self) -> Result<Vec<AlertDetails>, ApiError> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(ALERT_DETAILS_SELECT);
        qb.push(" AND a.severity = ")
            .push_bind(Severity::Critical)
            .push(" AND a.status <> ")
            .push_bind(AlertStatus::Acknowledged)
            .push(" ORDER BY a.created_at DESC");
        Ok(qb.build_query_as().fetch_all(&self.pool).await?)
    }

    /// Up to `count` most recent alerts for a device, newest first.
    pub async fn find_latest(
        &self,
        device_id: i64,
        count: i64,
    ) -> Result<Vec<AlertDetails>, ApiError> {
        if count < 1 {
            return Err(ApiError::Validation("count must be at least 1".into()));
        }

        let device_exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM devices WHERE id = $1)")
                .bind(device_id)
                .fetch_one(&self.pool)
                .await?;
        if !device_exists {
            return Err(ApiError::not_found("Device", device_id));
        }

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(ALERT_DETAILS_SELECT);
        qb.push(" AND a.device_id = ")
            .push_bind(device_id)
            .push(" ORDER BY a.created_at DESC LIMIT ")
            .push_bind(count);
        Ok(qb.build_query_as().fetch_all(&self.pool).await?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
