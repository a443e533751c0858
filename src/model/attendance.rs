use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::model::Employee;

/// Informational status tag stored with a record. Not authoritative for the
/// derived live state; see [`EffectiveStatus`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, sqlx::Type,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum StoredStatus {
    Present,
    Absent,
    Late,
    HalfDay,
}

impl Default for StoredStatus {
    fn default() -> Self {
        StoredStatus::Present
    }
}

/// Approval tri-state. `Pending` is the unreviewed initial state; the two
/// decided states are terminal as far as this engine is concerned.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, sqlx::Type,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl Default for ApprovalStatus {
    fn default() -> Self {
        ApprovalStatus::Pending
    }
}

/// Persisted attendance record, one per (employee, date) once a check-in has
/// happened. Coordinates are opaque attributes; the engine never validates
/// them.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AttendanceRecord {
    pub id: u64,
    pub employee_id: u64,
    pub date: NaiveDate,
    pub check_in: Option<NaiveTime>,
    pub check_out: Option<NaiveTime>,
    #[serde(default)]
    pub status: StoredStatus,
    pub location_lat: Option<f64>,
    pub location_lng: Option<f64>,
    pub location_accuracy: Option<f64>,
    pub notes: Option<String>,
    #[serde(default)]
    pub approval_status: ApprovalStatus,
    pub approved_by: Option<u64>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
}

/// Live state derived solely from check-in/check-out presence. These are the
/// only three reachable states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
pub enum EffectiveStatus {
    /// Checked in, not yet out. Sorts first.
    Active,
    /// Checked in and out.
    Closed,
    /// No check-in (absent).
    Inactive,
}

impl EffectiveStatus {
    pub fn priority(self) -> u8 {
        match self {
            EffectiveStatus::Active => 0,
            EffectiveStatus::Closed => 1,
            EffectiveStatus::Inactive => 2,
        }
    }
}

/// One row of the merged view: a real record, or a synthesized placeholder for
/// a roster member with no record on the viewed date. Placeholders live only
/// in memory and are recomputed on every reconciliation pass.
#[derive(Debug, Clone, Serialize)]
pub struct MergedRecord {
    pub employee_id: u64,
    pub date: NaiveDate,
    pub display_name: String,
    pub email: String,
    pub department: Option<String>,
    pub position: Option<String>,
    pub avatar_url: Option<String>,
    /// `None` marks a placeholder.
    pub record: Option<AttendanceRecord>,
}

impl MergedRecord {
    pub fn real(employee: &Employee, record: AttendanceRecord) -> Self {
        Self {
            employee_id: employee.id,
            date: record.date,
            display_name: employee.display_name(),
            email: employee.email.clone(),
            department: employee.department.clone(),
            position: employee.position.clone(),
            avatar_url: employee.avatar_url.clone(),
            record: Some(record),
        }
    }

    pub fn placeholder(employee: &Employee, date: NaiveDate) -> Self {
        Self {
            employee_id: employee.id,
            date,
            display_name: employee.display_name(),
            email: employee.email.clone(),
            department: employee.department.clone(),
            position: employee.position.clone(),
            avatar_url: employee.avatar_url.clone(),
            record: None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.record.is_none()
    }

    pub fn check_in(&self) -> Option<NaiveTime> {
        self.record.as_ref().and_then(|r| r.check_in)
    }

    pub fn check_out(&self) -> Option<NaiveTime> {
        self.record.as_ref().and_then(|r| r.check_out)
    }

    /// Stored status tag; placeholders carry no record and read as `Absent`.
    pub fn status(&self) -> StoredStatus {
        self.record
            .as_ref()
            .map(|r| r.status)
            .unwrap_or(StoredStatus::Absent)
    }

    pub fn approval_status(&self) -> ApprovalStatus {
        self.record
            .as_ref()
            .map(|r| r.approval_status)
            .unwrap_or_default()
    }

    pub fn effective_status(&self) -> EffectiveStatus {
        match (self.check_in(), self.check_out()) {
            (Some(_), None) => EffectiveStatus::Active,
            (Some(_), Some(_)) => EffectiveStatus::Closed,
            (None, _) => EffectiveStatus::Inactive,
        }
    }

    /// Most recent activity on the record: check-out if set, else check-in.
    /// Placeholders have none and sort as epoch.
    pub fn last_activity(&self) -> Option<NaiveTime> {
        self.check_out().or_else(|| self.check_in())
    }
}
