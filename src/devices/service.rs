use serde::Deserialize;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::info;
use utoipa::ToSchema;

use crate::api::errors::ApiError;
use crate::db::models::{DeviceDetails, DeviceStatus};

/// Base SELECT for device reads with flattened type and location names.
const DEVICE_DETAILS_SELECT: &str = "\
    SELECT d.id, d.name, d.type_id, d.serial_number, d.mac_address, d.ip_address, \
           d.location_id, d.status, d.is_online, d.last_seen_at, d.firmware_version, \
           d.metadata, d.created_by, d.created_at, d.updated_at, \
           t.type_name, l.name AS location_name \
      FROM devices d \
      LEFT JOIN device_types t ON t.id = d.type_id \
      LEFT JOIN locations l ON l.id = d.location_id \
     WHERE true";

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewDevice {
    pub name: String,
    pub type_id: Option<i64>,
    pub serial_number: Option<String>,
    pub mac_address: Option<String>,
    pub ip_address: Option<String>,
    pub location_id: Option<i64>,
    pub firmware_version: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct DeviceUpdate {
    pub name: Option<String>,
    pub type_id: Option<i64>,
    pub ip_address: Option<String>,
    pub location_id: Option<i64>,
    pub status: Option<DeviceStatus>,
    pub firmware_version: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

pub struct DeviceService {
    pool: PgPool,
}

impl DeviceService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, page: i64, size: i64) -> Result<(Vec<DeviceDetails>, i64), ApiError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM devices")
            .fetch_one(&self.pool)
            .await?;

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(DEVICE_DETAILS_SELECT);
        qb.push(" ORDER BY d.id LIMIT ")
            .push_bind(size)
            .push(" OFFSET ")
            .push_bind(page * size);
        let rows: Vec<DeviceDetails> = qb.build_query_as().fetch_all(&self.pool).await?;

        Ok((rows, total))
    }

    pub async fn find_by_id(&self, id: i64) -> Result<DeviceDetails, ApiError> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(DEVICE_DETAILS_SELECT);
        qb.push(" AND d.id = ").push_bind(id);
        qb.build_query_as()
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found("Device", id))
    }

    /// Creates a device for `created_by`. Referenced type/location stubs are
    /// resolved first; duplicate serial number or MAC address surfaces as
    /// Conflict via the unique constraints.
    pub async fn create(&self, new: &NewDevice, created_by: i64) -> Result<DeviceDetails, ApiError> {
        if new.name.trim().is_empty() {
            return Err(ApiError::Validation("device name must not be empty".into()));
        }

        let mut tx = self.pool.begin().await?;

        if let Some(type_id) = new.type_id {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM device_types WHERE id = $1)")
                    .bind(type_id)
                    .fetch_one(&mut *tx)
                    .await?;
            if !exists {
                return Err(ApiError::not_found("DeviceType", type_id));
            }
        }
        if let Some(location_id) = new.location_id {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM locations WHERE id = $1)")
                    .bind(location_id)
                    .fetch_one(&mut *tx)
                    .await?;
            if !exists {
                return Err(ApiError::not_found("Location", location_id));
            }
        }

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO devices (name, type_id, serial_number, mac_address, ip_address, \
                                  location_id, firmware_version, metadata, created_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING id",
        )
        .bind(&new.name)
        .bind(new.type_id)
        .bind(&new.serial_number)
        .bind(&new.mac_address)
        .bind(&new.ip_address)
        .bind(new.location_id)
        .bind(&new.firmware_version)
        .bind(&new.metadata)
        .bind(created_by)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(device_id = id, "device created");
        self.find_by_id(id).await
    }

    pub async fn update(&self, id: i64, update: &DeviceUpdate) -> Result<DeviceDetails, ApiError> {
        let rows = sqlx::query(
            "UPDATE devices \
                SET name = COALESCE($2, name), \
                    type_id = COALESCE($3, type_id), \
                    ip_address = COALESCE($4, ip_address), \
                    location_id = COALESCE($5, location_id), \
                    status = COALESCE($6, status), \
                    firmware_version = COALESCE($7, firmware_version), \
                    metadata = COALESCE($8, metadata), \
                    updated_at = now() \
              WHERE id = $1",
        )
        .bind(id)
        .bind(&update.name)
        .bind(update.type_id)
        .bind(&update.ip_address)
        .bind(update.location_id)
        .bind(update.status)
        .bind(&update.firmware_version)
        .bind(&update.metadata)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows == 0 {
            return Err(ApiError::not_found("Device", id));
        }
        self.find_by_id(id).await
    }

    /// Deleting a device cascades to its alerts and sensor data; the device
    /// is their aggregate root.
    pub async fn delete(&self, id: i64) -> Result<(), ApiError> {
        let rows = sqlx::query("DELETE FROM devices WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if rows == 0 {
            return Err(ApiError::not_found("Device", id));
        }
        info!(device_id = id, "device deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use sqlx::PgPool;

    use super::*;

    async fn insert_user(pool: &PgPool, username: &str) -> i64 {
        sqlx::query_scalar(
            "INSERT INTO users (username, email, password_hash) \
             VALUES ($1, $1 || '@example.com', 'x') RETURNING id",
        )
        .bind(username)
        .fetch_one(pool)
        .await
        .unwrap()
    }

    fn make_device(name: &str, serial: &str, mac: &str) -> NewDevice {
        NewDevice {
            name: name.into(),
            type_id: None,
            serial_number: Some(serial.into()),
            mac_address: Some(mac.into()),
            ip_address: None,
            location_id: None,
            firmware_version: Some("1.0.0".into()),
            metadata: None,
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn create_and_fetch_device(pool: PgPool) {
        let user = insert_user(&pool, "op1").await;
        let svc = DeviceService::new(pool);

        let details = svc
            .create(&make_device("gw-01", "SN-1", "AA:BB:CC:DD:EE:01"), user)
            .await
            .unwrap();

        assert_eq!(details.device.name, "gw-01");
        assert_eq!(details.device.status, DeviceStatus::Inactive);
        assert_eq!(details.device.created_by, Some(user));
        assert!(!details.device.is_online);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn duplicate_serial_is_conflict(pool: PgPool) {
        let user = insert_user(&pool, "op1").await;
        let svc = DeviceService::new(pool);

        svc.create(&make_device("gw-01", "SN-1", "AA:BB:CC:DD:EE:01"), user)
            .await
            .unwrap();
        let err = svc
            .create(&make_device("gw-02", "SN-1", "AA:BB:CC:DD:EE:02"), user)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn duplicate_mac_is_conflict(pool: PgPool) {
        let user = insert_user(&pool, "op1").await;
        let svc = DeviceService::new(pool);

        svc.create(&make_device("gw-01", "SN-1", "AA:BB:CC:DD:EE:01"), user)
            .await
            .unwrap();
        let err = svc
            .create(&make_device("gw-02", "SN-2", "AA:BB:CC:DD:EE:01"), user)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn unknown_type_stub_is_not_found(pool: PgPool) {
        let user = insert_user(&pool, "op1").await;
        let svc = DeviceService::new(pool);

        let mut new = make_device("gw-01", "SN-1", "AA:BB:CC:DD:EE:01");
        new.type_id = Some(9999);
        assert!(matches!(
            svc.create(&new, user).await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn delete_cascades_to_alerts(pool: PgPool) {
        let user = insert_user(&pool, "op1").await;
        let svc = DeviceService::new(pool.clone());
        let device = svc
            .create(&make_device("gw-01", "SN-1", "AA:BB:CC:DD:EE:01"), user)
            .await
            .unwrap();

        sqlx::query(
            "INSERT INTO alerts (device_id, alert_type, severity, message) \
             VALUES ($1, 'TEST', 'Low', 'm')",
        )
        .bind(device.device.id)
        .execute(&pool)
        .await
        .unwrap();

        svc.delete(device.device.id).await.unwrap();

        let alerts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM alerts")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(alerts, 0);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn update_partial_fields(pool: PgPool) {
        let user = insert_user(&pool, "op1").await;
        let svc = DeviceService::new(pool);
        let device = svc
            .create(&make_device("gw-01", "SN-1", "AA:BB:CC:DD:EE:01"), user)
            .await
            .unwrap();

        let updated = svc
            .update(
                device.device.id,
                &DeviceUpdate {
                    status: Some(DeviceStatus::Maintenance),
                    firmware_version: Some("1.1.0".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.device.status, DeviceStatus::Maintenance);
        assert_eq!(updated.device.firmware_version.as_deref(), Some("1.1.0"));
        assert_eq!(updated.device.name, "gw-01");
    }
}
