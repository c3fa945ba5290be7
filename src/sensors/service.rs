use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::{PgPool, Postgres, QueryBuilder};
use utoipa::ToSchema;

use crate::api::errors::ApiError;
use crate::db::models::SensorData;

const SENSOR_DATA_SELECT: &str = "\
    SELECT sd.id, sd.device_id, sd.sensor_type, sd.value, sd.unit, sd.recorded_at, \
           sd.accuracy, sd.status_code, sd.metadata \
      FROM sensor_data sd \
     WHERE true";

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewReading {
    pub sensor_type: String,
    pub value: f64,
    pub unit: String,
    pub accuracy: Option<f64>,
    pub status_code: Option<i32>,
    pub metadata: Option<serde_json::Value>,
}

pub struct SensorDataService {
    pool: PgPool,
}

impl SensorDataService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Paged readings for a device, optionally narrowed by sensor type
    /// and/or an inclusive time range. Newest first.
    pub async fn device_sensor_data(
        &self,
        device_id: i64,
        sensor_type: Option<&str>,
        start_date: Option<DateTime<Utc>>,
        end_date: Option<DateTime<Utc>>,
        page: i64,
        size: i64,
    ) -> Result<(Vec<SensorData>, i64), ApiError> {
        self.require_device(device_id).await?;

        let push_filters = |qb: &mut QueryBuilder<Postgres>| {
            qb.push(" AND sd.device_id = ").push_bind(device_id);
            if let Some(sensor_type) = sensor_type {
                qb.push(" AND sd.sensor_type = ")
                    .push_bind(sensor_type.to_owned());
            }
            match (start_date, end_date) {
                (Some(start), Some(end)) => {
                    qb.push(" AND sd.recorded_at BETWEEN ")
                        .push_bind(start)
                        .push(" AND ")
                        .push_bind(end);
                }
                (Some(start), None) => {
                    qb.push(" AND sd.recorded_at >= ").push_bind(start);
                }
                (None, Some(end)) => {
                    qb.push(" AND sd.recorded_at <= ").push_bind(end);
                }
                (None, None) => {}
            }
        };

        let mut count_qb: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM sensor_data sd WHERE true");
        push_filters(&mut count_qb);
        let total: i64 = count_qb.build_query_scalar().fetch_one(&self.pool).await?;

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(SENSOR_DATA_SELECT);
        push_filters(&mut qb);
        qb.push(" ORDER BY sd.recorded_at DESC LIMIT ")
            .push_bind(size)
            .push(" OFFSET ")
            .push_bind(page * size);
        let rows: Vec<SensorData> = qb.build_query_as().fetch_all(&self.pool).await?;

        Ok((rows, total))
    }

    pub async fn distinct_sensor_types(&self, device_id: i64) -> Result<Vec<String>, ApiError> {
        self.require_device(device_id).await?;

        let types: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT sensor_type FROM sensor_data WHERE device_id = $1 ORDER BY sensor_type",
        )
        .bind(device_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(types)
    }

    /// Records a reading for a device. `recorded_at` is stamped by the
    /// database at insert and never changes afterwards.
    pub async fn add_reading(
        &self,
        device_id: i64,
        reading: &NewReading,
    ) -> Result<SensorData, ApiError> {
        self.require_device(device_id).await?;

        if reading.unit.trim().is_empty() {
            return Err(ApiError::Validation("unit must not be empty".into()));
        }

        let row: SensorData = sqlx::query_as(
            "INSERT INTO sensor_data (device_id, sensor_type, value, unit, accuracy, status_code, metadata) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING id, device_id, sensor_type, value, unit, recorded_at, accuracy, status_code, metadata",
        )
        .bind(device_id)
        .bind(&reading.sensor_type)
        .bind(reading.value)
        .bind(&reading.unit)
        .bind(reading.accuracy)
        .bind(reading.status_code)
        .bind(&reading.metadata)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    /// The `count` most recent readings across all devices, newest first.
    pub async fn latest_readings(&self, count: i64) -> Result<Vec<SensorData>, ApiError> {
        if count < 1 {
            return Err(ApiError::Validation("count must be at least 1".into()));
        }

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(SENSOR_DATA_SELECT);
        qb.push(" ORDER BY sd.recorded_at DESC LIMIT ").push_bind(count);
        Ok(qb.build_query_as().fetch_all(&self.pool).await?)
    }

    async fn require_device(&self, device_id: i64) -> Result<(), ApiError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM devices WHERE id = $1)")
                .bind(device_id)
                .fetch_one(&self.pool)
                .await?;
        if !exists {
            return Err(ApiError::not_found("Device", device_id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use sqlx::PgPool;

    use super::*;

    async fn insert_device(pool: &PgPool, name: &str) -> i64 {
        sqlx::query_scalar("INSERT INTO devices (name) VALUES ($1) RETURNING id")
            .bind(name)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    fn reading(sensor_type: &str, value: f64) -> NewReading {
        NewReading {
            sensor_type: sensor_type.into(),
            value,
            unit: "C".into(),
            accuracy: None,
            status_code: None,
            metadata: None,
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn add_and_query_readings(pool: PgPool) {
        let device = insert_device(&pool, "dev1").await;
        let svc = SensorDataService::new(pool);

        svc.add_reading(device, &reading("Temperature", 21.5)).await.unwrap();
        svc.add_reading(device, &reading("Temperature", 22.0)).await.unwrap();
        svc.add_reading(device, &reading("Humidity", 60.0)).await.unwrap();

        let (rows, total) = svc
            .device_sensor_data(device, Some("Temperature"), None, None, 0, 20)
            .await
            .unwrap();
        assert_eq!(total, 2);
        assert!(rows.iter().all(|r| r.sensor_type == "Temperature"));
        assert!(rows[0].recorded_at >= rows[1].recorded_at);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn unknown_device_is_not_found(pool: PgPool) {
        let svc = SensorDataService::new(pool);
        assert!(matches!(
            svc.device_sensor_data(9999, None, None, None, 0, 20).await,
            Err(ApiError::NotFound(_))
        ));
        assert!(matches!(
            svc.add_reading(9999, &reading("Temperature", 1.0)).await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn distinct_types_are_sorted_and_unique(pool: PgPool) {
        let device = insert_device(&pool, "dev1").await;
        let svc = SensorDataService::new(pool);

        svc.add_reading(device, &reading("Temperature", 1.0)).await.unwrap();
        svc.add_reading(device, &reading("Temperature", 2.0)).await.unwrap();
        svc.add_reading(device, &reading("Humidity", 3.0)).await.unwrap();

        let types = svc.distinct_sensor_types(device).await.unwrap();
        assert_eq!(types, vec!["Humidity", "Temperature"]);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn latest_readings_capped_and_ordered(pool: PgPool) {
        let device = insert_device(&pool, "dev1").await;
        let svc = SensorDataService::new(pool);

        for i in 0..5 {
            svc.add_reading(device, &reading("Temperature", i as f64)).await.unwrap();
        }

        let latest = svc.latest_readings(3).await.unwrap();
        assert_eq!(latest.len(), 3);
        assert!(latest.windows(2).all(|w| w[0].recorded_at >= w[1].recorded_at));

        assert!(matches!(
            svc.latest_readings(0).await,
            Err(ApiError::Validation(_))
        ));
    }
}
