use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Mirrors the `severity` Postgres enum. Ordered: Low < Medium < High < Critical.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
    ToSchema,
)]
#[sqlx(type_name = "severity")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Mirrors the `alert_status` Postgres enum.
///
/// `Unacknowledged` is a valid stored value but is never assigned by any
/// lifecycle transition; freshly created alerts start as `Open`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
    ToSchema,
)]
#[sqlx(type_name = "alert_status")]
pub enum AlertStatus {
    Open,
    Acknowledged,
    Resolved,
    Suppressed,
    Unacknowledged,
}

impl AlertStatus {
    /// An alert is active while it is Open or Acknowledged.
    pub fn is_active(self) -> bool {
        matches!(self, AlertStatus::Open | AlertStatus::Acknowledged)
    }
}

/// Mirrors the `device_status` Postgres enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "device_status")]
pub enum DeviceStatus {
    Active,
    Inactive,
    Maintenance,
    Retired,
}

/// Known sensor categories. Stored as free text in `sensor_data.sensor_type`;
/// anything outside the known set classifies as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum SensorType {
    Temperature,
    Humidity,
    Pressure,
    AirQuality,
    LightIntensity,
    Motion,
    Voltage,
    Current,
    Power,
    Other,
}

impl FromStr for SensorType {
    type Err = std::convert::Infallible;

    /// Exact name match with an `Other` fallback; never fails.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "Temperature" => SensorType::Temperature,
            "Humidity" => SensorType::Humidity,
            "Pressure" => SensorType::Pressure,
            "AirQuality" => SensorType::AirQuality,
            "LightIntensity" => SensorType::LightIntensity,
            "Motion" => SensorType::Motion,
            "Voltage" => SensorType::Voltage,
            "Current" => SensorType::Current,
            "Power" => SensorType::Power,
            _ => SensorType::Other,
        })
    }
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SensorType::Temperature => "Temperature",
            SensorType::Humidity => "Humidity",
            SensorType::Pressure => "Pressure",
            SensorType::AirQuality => "AirQuality",
            SensorType::LightIntensity => "LightIntensity",
            SensorType::Motion => "Motion",
            SensorType::Voltage => "Voltage",
            SensorType::Current => "Current",
            SensorType::Power => "Power",
            SensorType::Other => "OTHER",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Alert
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Alert {
    pub id: i64,
    pub device_id: i64,
    pub alert_type: String,
    pub severity: Severity,
    pub message: String,
    pub additional_data: Option<serde_json::Value>,
    pub status: AlertStatus,
    /// Generated column in the database; the transition methods keep it in
    /// sync for in-memory instances.
    pub is_active: bool,
    pub created_by: Option<i64>,
    pub acknowledged_by: Option<i64>,
    pub resolved_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Marks the alert acknowledged by `user_id`. Re-acknowledging overwrites
    /// the previous actor and timestamp.
    ///
    /// In-memory mirror of the transition `AlertService::acknowledge` applies
    /// in SQL; that path is authoritative, keep the two in step.
    pub fn acknowledge(&mut self, user_id: i64, at: DateTime<Utc>) {
        self.status = AlertStatus::Acknowledged;
        self.acknowledged_by = Some(user_id);
        self.acknowledged_at = Some(at);
        self.updated_at = at;
        self.is_active = self.status.is_active();
    }

    /// Marks the alert resolved by `user_id`. Permitted from any status;
    /// no Acknowledged intermediate step is required.
    ///
    /// In-memory mirror of the transition `AlertService::resolve` applies
    /// in SQL; that path is authoritative, keep the two in step.
    pub fn resolve(&mut self, user_id: i64, at: DateTime<Utc>) {
        self.status = AlertStatus::Resolved;
        self.resolved_by = Some(user_id);
        self.resolved_at = Some(at);
        self.updated_at = at;
        self.is_active = self.status.is_active();
    }
}

/// An alert row joined with the display names the mapping layer flattens
/// references into (device name/type, actor usernames).
#[derive(Debug, Clone, FromRow)]
pub struct AlertDetails {
    #[sqlx(flatten)]
    pub alert: Alert,
    pub device_name: String,
    pub device_type: Option<String>,
    pub created_by_name: Option<String>,
    pub acknowledged_by_name: Option<String>,
    pub resolved_by_name: Option<String>,
}

// ---------------------------------------------------------------------------
// Device
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Device {
    pub id: i64,
    pub name: String,
    pub type_id: Option<i64>,
    pub serial_number: Option<String>,
    pub mac_address: Option<String>,
    pub ip_address: Option<String>,
    pub location_id: Option<i64>,
    pub status: DeviceStatus,
    pub is_online: bool,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub firmware_version: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Device {
    /// Stamps the device online. An Inactive device is promoted to Active;
    /// Maintenance and Retired are left alone.
    pub fn mark_online(&mut self, at: DateTime<Utc>) {
        self.is_online = true;
        self.last_seen_at = Some(at);
        if self.status == DeviceStatus::Inactive {
            self.status = DeviceStatus::Active;
        }
    }

    pub fn mark_offline(&mut self, at: DateTime<Utc>) {
        self.is_online = false;
        self.last_seen_at = Some(at);
    }
}

/// A device row joined with its type and location display names.
#[derive(Debug, Clone, FromRow)]
pub struct DeviceDetails {
    #[sqlx(flatten)]
    pub device: Device,
    pub type_name: Option<String>,
    pub location_name: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DeviceType {
    pub id: i64,
    pub type_name: String,
    pub description: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub capabilities: Option<serde_json::Value>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Location {
    pub id: i64,
    pub name: String,
    pub parent_location_id: Option<i64>,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// SensorData
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SensorData {
    pub id: i64,
    pub device_id: i64,
    pub sensor_type: String,
    pub value: f64,
    pub unit: String,
    /// Set when the row is inserted; immutable afterwards.
    pub recorded_at: DateTime<Utc>,
    pub accuracy: Option<f64>,
    pub status_code: Option<i32>,
    pub metadata: Option<serde_json::Value>,
}

impl SensorData {
    /// Classifies the free-text sensor type; unknown strings are `Other`.
    pub fn sensor_kind(&self) -> SensorType {
        self.sensor_type.parse().unwrap_or(SensorType::Other)
    }

    pub fn formatted_value(&self) -> String {
        format!("{:.2} {}", self.value, self.unit)
    }

    /// Status codes of 300 and above signal a warning condition.
    pub fn has_warning_status(&self) -> bool {
        self.status_code.is_some_and(|c| c >= 300)
    }

    pub fn is_value_within_range(&self, min: f64, max: f64) -> bool {
        self.value >= min && self.value <= max
    }
}

// ---------------------------------------------------------------------------
// User & settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct NotificationSettings {
    pub id: i64,
    pub user_id: i64,
    pub email_alerts: bool,
    pub push_notifications: bool,
    pub sms_alerts: bool,
    pub critical_only: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Preferences {
    pub id: i64,
    pub user_id: i64,
    pub theme: String,
    pub language: String,
    pub timezone: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn make_alert(status: AlertStatus) -> Alert {
        Alert {
            id: 1,
            device_id: 1,
            alert_type: "TEMPERATURE_HIGH".into(),
            severity: Severity::High,
            message: "temperature above threshold".into(),
            additional_data: None,
            status,
            is_active: status.is_active(),
            created_by: None,
            acknowledged_by: None,
            resolved_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            acknowledged_at: None,
            resolved_at: None,
        }
    }

    #[test]
    fn is_active_matches_status_for_every_variant() {
        for status in [
            AlertStatus::Open,
            AlertStatus::Acknowledged,
            AlertStatus::Resolved,
            AlertStatus::Suppressed,
            AlertStatus::Unacknowledged,
        ] {
            let alert = make_alert(status);
            assert_eq!(
                alert.is_active(),
                status == AlertStatus::Open || status == AlertStatus::Acknowledged
            );
        }
    }

    #[test]
    fn acknowledge_stamps_actor_and_time() {
        let mut alert = make_alert(AlertStatus::Open);
        let before = Utc::now();
        alert.acknowledge(42, Utc::now());

        assert_eq!(alert.status, AlertStatus::Acknowledged);
        assert_eq!(alert.acknowledged_by, Some(42));
        assert!(alert.acknowledged_at.unwrap() >= before);
        assert!(alert.is_active());
    }

    #[test]
    fn re_acknowledge_overwrites_actor() {
        let mut alert = make_alert(AlertStatus::Open);
        alert.acknowledge(1, Utc::now());
        let first = alert.acknowledged_at.unwrap();
        alert.acknowledge(2, Utc::now());

        assert_eq!(alert.acknowledged_by, Some(2));
        assert!(alert.acknowledged_at.unwrap() >= first);
    }

    #[test]
    fn resolve_allowed_directly_from_open() {
        let mut alert = make_alert(AlertStatus::Open);
        alert.resolve(7, Utc::now());

        assert_eq!(alert.status, AlertStatus::Resolved);
        assert_eq!(alert.resolved_by, Some(7));
        assert!(alert.resolved_at.is_some());
        assert!(!alert.is_active());
    }

    #[test]
    fn severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn unknown_sensor_type_falls_back_to_other() {
        assert_eq!("Temperature".parse(), Ok(SensorType::Temperature));
        assert_eq!("Radioactivity".parse(), Ok(SensorType::Other));
        assert_eq!("".parse(), Ok(SensorType::Other));
    }

    #[test]
    fn sensor_data_derived_fields() {
        let data = SensorData {
            id: 1,
            device_id: 1,
            sensor_type: "Temperature".into(),
            value: 21.456,
            unit: "C".into(),
            recorded_at: Utc::now(),
            accuracy: Some(0.5),
            status_code: Some(305),
            metadata: None,
        };

        assert_eq!(data.formatted_value(), "21.46 C");
        assert!(data.has_warning_status());
        assert!(data.is_value_within_range(20.0, 22.0));
        assert!(!data.is_value_within_range(0.0, 10.0));
        assert_eq!(data.sensor_kind(), SensorType::Temperature);
    }

    #[test]
    fn mark_online_promotes_inactive_device() {
        let mut device = Device {
            id: 1,
            name: "gw-01".into(),
            type_id: None,
            serial_number: Some("SN-1".into()),
            mac_address: Some("AA:BB:CC:DD:EE:FF".into()),
            ip_address: None,
            location_id: None,
            status: DeviceStatus::Inactive,
            is_online: false,
            last_seen_at: None,
            firmware_version: None,
            metadata: None,
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        device.mark_online(Utc::now());
        assert!(device.is_online);
        assert_eq!(device.status, DeviceStatus::Active);
        assert!(device.last_seen_at.is_some());

        device.mark_offline(Utc::now());
        assert!(!device.is_online);
        assert_eq!(device.status, DeviceStatus::Active);
    }
}
