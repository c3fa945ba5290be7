use std::str::FromStr;

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, QueryBuilder};

use crate::db::models::{AlertStatus, Severity};

// ---------------------------------------------------------------------------
// AlertFilter
// ---------------------------------------------------------------------------

/// Optional filter fields over the alert set. The query predicate is the
/// conjunction of only the present fields; an absent field adds no
/// constraint, so omitting a filter always widens the result set.
#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    pub device_id: Option<i64>,
    pub alert_type: Option<String>,
    pub severity: Option<Severity>,
    pub status: Option<AlertStatus>,
    pub is_active: Option<bool>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl AlertFilter {
    /// Appends ` AND <condition>` per present field to a query whose WHERE
    /// clause is already open (the base queries end in `WHERE true`).
    ///
    /// Equality filters match exactly (case-sensitive for `alert_type`).
    /// Date bounds are inclusive: both → BETWEEN, start only → `>=`,
    /// end only → `<=`.
    pub fn apply(&self, qb: &mut QueryBuilder<Postgres>) {
        if let Some(device_id) = self.device_id {
            qb.push(" AND a.device_id = ").push_bind(device_id);
        }
        if let Some(ref alert_type) = self.alert_type {
            qb.push(" AND a.alert_type = ").push_bind(alert_type.clone());
        }
        if let Some(severity) = self.severity {
            qb.push(" AND a.severity = ").push_bind(severity);
        }
        if let Some(status) = self.status {
            qb.push(" AND a.status = ").push_bind(status);
        }
        if let Some(is_active) = self.is_active {
            qb.push(" AND a.is_active = ").push_bind(is_active);
        }
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) => {
                qb.push(" AND a.created_at BETWEEN ")
                    .push_bind(start)
                    .push(" AND ")
                    .push_bind(end);
            }
            (Some(start), None) => {
                qb.push(" AND a.created_at >= ").push_bind(start);
            }
            (None, Some(end)) => {
                qb.push(" AND a.created_at <= ").push_bind(end);
            }
            (None, None) => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Pagination & sorting
// ---------------------------------------------------------------------------

/// Whitelisted sort columns for alert listings. Sort input parses into this
/// closed set; anything else fails at the conversion boundary before a query
/// is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlertSortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    Severity,
    Status,
    AlertType,
    Id,
}

impl AlertSortField {
    fn column(self) -> &'static str {
        match self {
            AlertSortField::CreatedAt => "a.created_at",
            AlertSortField::UpdatedAt => "a.updated_at",
            AlertSortField::Severity => "a.severity",
            AlertSortField::Status => "a.status",
            AlertSortField::AlertType => "a.alert_type",
            AlertSortField::Id => "a.id",
        }
    }
}

impl FromStr for AlertSortField {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "created_at" => Ok(Self::CreatedAt),
            "updated_at" => Ok(Self::UpdatedAt),
            "severity" => Ok(Self::Severity),
            "status" => Ok(Self::Status),
            "alert_type" => Ok(Self::AlertType),
            "id" => Ok(Self::Id),
            other => Err(anyhow::anyhow!("unknown sort field: {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl FromStr for SortDirection {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(anyhow::anyhow!("unknown sort direction: {other:?}")),
        }
    }
}

/// Page number (0-based), page size and sort order. Orthogonal to
/// `AlertFilter`: either can be defaulted independently.
#[derive(Debug, Clone)]
pub struct PageRequest {
    pub page: i64,
    pub size: i64,
    pub sort_field: AlertSortField,
    pub direction: SortDirection,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 0,
            size: 20,
            sort_field: AlertSortField::default(),
            direction: SortDirection::default(),
        }
    }
}

impl PageRequest {
    /// Parses a `field,direction` sort expression, e.g.
    /// `created_at,desc`. A bare field name defaults the direction.
    pub fn parse_sort(sort: &str) -> Result<(AlertSortField, SortDirection)> {
        match sort.split_once(',') {
            Some((field, dir)) => Ok((field.trim().parse()?, dir.trim().parse()?)),
            None => Ok((sort.trim().parse()?, SortDirection::default())),
        }
    }

    pub fn offset(&self) -> i64 {
        self.page * self.size
    }

    /// Appends `ORDER BY .. LIMIT .. OFFSET ..`. The sort column comes from
    /// the whitelist enum, never from raw input.
    pub fn apply(&self, qb: &mut QueryBuilder<Postgres>) {
        qb.push(" ORDER BY ").push(self.sort_field.column());
        match self.direction {
            SortDirection::Asc => qb.push(" ASC"),
            SortDirection::Desc => qb.push(" DESC"),
        };
        qb.push(" LIMIT ")
            .push_bind(self.size)
            .push(" OFFSET ")
            .push_bind(self.offset());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
