use chrono::{DateTime, Local, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::models::{
    AlertDetails, AlertStatus, DeviceDetails, DeviceStatus, NotificationSettings, Preferences,
    SensorData, Severity,
};
use crate::users::UserProfile;

// ---------------------------------------------------------------------------
// Timestamp projection
// ---------------------------------------------------------------------------

/// Projects a stored instant into the server's local timezone as a wall-clock
/// value. The offset is dropped, so this is one-way: mapping back would need
/// the zone again.
fn to_local(ts: DateTime<Utc>) -> NaiveDateTime {
    ts.with_timezone(&Local).naive_local()
}

fn to_local_opt(ts: Option<DateTime<Utc>>) -> Option<NaiveDateTime> {
    ts.map(to_local)
}

// ---------------------------------------------------------------------------
// Page envelope
// ---------------------------------------------------------------------------

/// A page of results plus paging metadata. `total_pages` is derived from
/// `total_elements` and the requested size.
#[derive(Debug, Serialize, ToSchema)]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page: i64,
    pub size: i64,
    pub total_elements: i64,
    pub total_pages: i64,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, page: i64, size: i64, total_elements: i64) -> Self {
        let total_pages = if size > 0 {
            (total_elements + size - 1) / size
        } else {
            0
        };
        Self {
            content,
            page,
            size,
            total_elements,
            total_pages,
        }
    }
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct AlertDto {
    pub id: i64,
    pub device_id: i64,
    pub device_name: String,
    pub device_type: Option<String>,
    pub alert_type: String,
    pub severity: Severity,
    pub status: AlertStatus,
    pub message: String,
    pub additional_data: Option<serde_json::Value>,
    pub is_active: bool,
    pub created_by: Option<i64>,
    pub created_by_name: Option<String>,
    pub acknowledged_by: Option<i64>,
    pub acknowledged_by_name: Option<String>,
    pub resolved_by: Option<i64>,
    pub resolved_by_name: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub acknowledged_at: Option<NaiveDateTime>,
    pub resolved_at: Option<NaiveDateTime>,
}

impl From<AlertDetails> for AlertDto {
    fn from(d: AlertDetails) -> Self {
        let a = d.alert;
        Self {
            id: a.id,
            device_id: a.device_id,
            device_name: d.device_name,
            device_type: d.device_type,
            alert_type: a.alert_type,
            severity: a.severity,
            status: a.status,
            message: a.message,
            additional_data: a.additional_data,
            is_active: a.is_active,
            created_by: a.created_by,
            created_by_name: d.created_by_name,
            acknowledged_by: a.acknowledged_by,
            acknowledged_by_name: d.acknowledged_by_name,
            resolved_by: a.resolved_by,
            resolved_by_name: d.resolved_by_name,
            created_at: to_local(a.created_at),
            updated_at: to_local(a.updated_at),
            acknowledged_at: to_local_opt(a.acknowledged_at),
            resolved_at: to_local_opt(a.resolved_at),
        }
    }
}

// ---------------------------------------------------------------------------
// Devices
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct DeviceDto {
    pub id: i64,
    pub name: String,
    pub type_id: Option<i64>,
    pub type_name: Option<String>,
    pub serial_number: Option<String>,
    pub mac_address: Option<String>,
    pub ip_address: Option<String>,
    pub location_id: Option<i64>,
    pub location_name: Option<String>,
    pub status: DeviceStatus,
    pub is_online: bool,
    pub last_seen_at: Option<NaiveDateTime>,
    pub firmware_version: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl From<DeviceDetails> for DeviceDto {
    fn from(d: DeviceDetails) -> Self {
        let dev = d.device;
        Self {
            id: dev.id,
            name: dev.name,
            type_id: dev.type_id,
            type_name: d.type_name,
            serial_number: dev.serial_number,
            mac_address: dev.mac_address,
            ip_address: dev.ip_address,
            location_id: dev.location_id,
            location_name: d.location_name,
            status: dev.status,
            is_online: dev.is_online,
            last_seen_at: to_local_opt(dev.last_seen_at),
            firmware_version: dev.firmware_version,
            metadata: dev.metadata,
            created_at: to_local(dev.created_at),
            updated_at: to_local(dev.updated_at),
        }
    }
}

// ---------------------------------------------------------------------------
// Sensor data
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct SensorDataDto {
    pub id: i64,
    pub device_id: i64,
    pub sensor_type: String,
    pub value: f64,
    pub unit: String,
    /// Display string, value rounded to two decimals plus the unit.
    pub formatted_value: String,
    pub recorded_at: NaiveDateTime,
    pub accuracy: Option<f64>,
    pub status_code: Option<i32>,
    pub metadata: Option<serde_json::Value>,
}

impl From<SensorData> for SensorDataDto {
    fn from(s: SensorData) -> Self {
        let formatted_value = s.formatted_value();
        Self {
            id: s.id,
            device_id: s.device_id,
            sensor_type: s.sensor_type,
            value: s.value,
            unit: s.unit,
            formatted_value,
            recorded_at: to_local(s.recorded_at),
            accuracy: s.accuracy,
            status_code: s.status_code,
            metadata: s.metadata,
        }
    }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct NotificationSettingsDto {
    pub email_alerts: bool,
    pub push_notifications: bool,
    pub sms_alerts: bool,
    pub critical_only: bool,
}

impl From<NotificationSettings> for NotificationSettingsDto {
    fn from(s: NotificationSettings) -> Self {
        Self {
            email_alerts: s.email_alerts,
            push_notifications: s.push_notifications,
            sms_alerts: s.sms_alerts,
            critical_only: s.critical_only,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PreferencesDto {
    pub theme: String,
    pub language: String,
    pub timezone: String,
}

impl From<Preferences> for PreferencesDto {
    fn from(p: Preferences) -> Self {
        Self {
            theme: p.theme,
            language: p.language,
            timezone: p.timezone,
        }
    }
}

/// A user as seen in listings. Never exposes the password hash.
#[derive(Debug, Serialize, ToSchema)]
pub struct UserDto {
    pub id: i64,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: String,
    pub is_active: bool,
    pub last_login_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

impl From<crate::db::models::User> for UserDto {
    fn from(u: crate::db::models::User) -> Self {
        Self {
            id: u.id,
            username: u.username,
            first_name: u.first_name,
            last_name: u.last_name,
            email: u.email,
            is_active: u.is_active,
            last_login_at: to_local_opt(u.last_login_at),
            created_at: to_local(u.created_at),
        }
    }
}

/// A user with their settings records. Never exposes the password hash.
#[derive(Debug, Serialize, ToSchema)]
pub struct UserProfileDto {
    pub id: i64,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: String,
    pub is_active: bool,
    pub last_login_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub notification_settings: NotificationSettingsDto,
    pub preferences: PreferencesDto,
}

impl From<UserProfile> for UserProfileDto {
    fn from(p: UserProfile) -> Self {
        let u = p.user;
        Self {
            id: u.id,
            username: u.username,
            first_name: u.first_name,
            last_name: u.last_name,
            email: u.email,
            is_active: u.is_active,
            last_login_at: to_local_opt(u.last_login_at),
            created_at: to_local(u.created_at),
            notification_settings: p.notification_settings.into(),
            preferences: p.preferences.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub notification_settings: Option<crate::users::NotificationSettingsUpdate>,
    pub preferences: Option<crate::users::PreferencesUpdate>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BatchAcknowledgeRequest {
    pub alert_ids: Vec<i64>,
}

/// Result of a batch acknowledgement: how many alerts were updated.
#[derive(Debug, Serialize, ToSchema)]
pub struct BatchAcknowledgeResponse {
    pub acknowledged: u64,
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::db::models::Alert;

    fn sample_alert() -> AlertDetails {
        let created = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        AlertDetails {
            alert: Alert {
                id: 7,
                device_id: 3,
                alert_type: "OVERHEAT".into(),
                severity: Severity::Critical,
                message: "too hot".into(),
                additional_data: None,
                status: AlertStatus::Open,
                is_active: true,
                created_by: Some(1),
                acknowledged_by: None,
                resolved_by: None,
                created_at: created,
                updated_at: created,
                acknowledged_at: None,
                resolved_at: None,
            },
            device_name: "boiler".into(),
            device_type: Some("thermostat".into()),
            created_by_name: Some("op1".into()),
            acknowledged_by_name: None,
            resolved_by_name: None,
        }
    }

    #[test]
    fn alert_dto_carries_scalars_and_joined_names() {
        let dto = AlertDto::from(sample_alert());
        assert_eq!(dto.id, 7);
        assert_eq!(dto.device_name, "boiler");
        assert_eq!(dto.created_by_name.as_deref(), Some("op1"));
        assert_eq!(dto.severity, Severity::Critical);
        assert!(dto.is_active);
        assert!(dto.acknowledged_at.is_none());
    }

    #[test]
    fn alert_timestamps_are_projected_to_local_wall_clock() {
        let details = sample_alert();
        let instant = details.alert.created_at;
        let dto = AlertDto::from(details);
        assert_eq!(dto.created_at, instant.with_timezone(&Local).naive_local());
    }

    #[test]
    fn page_derives_total_pages() {
        let page = Page::new(vec![1, 2, 3], 0, 20, 43);
        assert_eq!(page.total_pages, 3);

        let exact = Page::<i32>::new(vec![], 1, 20, 40);
        assert_eq!(exact.total_pages, 2);

        let empty = Page::<i32>::new(vec![], 0, 20, 0);
        assert_eq!(empty.total_pages, 0);
    }

    #[test]
    fn sensor_dto_formats_value() {
        let s = SensorData {
            id: 1,
            device_id: 2,
            sensor_type: "Temperature".into(),
            value: 21.456,
            unit: "C".into(),
            recorded_at: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
            accuracy: None,
            status_code: None,
            metadata: None,
        };
        let dto = SensorDataDto::from(s);
        assert_eq!(dto.formatted_value, "21.46 C");
    }
}
