pub mod memory;
pub mod mysql;
pub mod roster_cache;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

use crate::error::Result;
use crate::model::{AttendanceRecord, Employee, NotificationRequest, StoredStatus};

pub use memory::{MemoryAttendanceStore, MemoryNotificationSink, MemoryRoster};
pub use mysql::{MySqlAttendanceStore, MySqlNotificationSink, MySqlRoster};
pub use roster_cache::RosterCache;

/// Fields for a new attendance row (a check-in).
#[derive(Debug, Clone)]
pub struct NewAttendance {
    pub employee_id: u64,
    pub date: NaiveDate,
    pub check_in: Option<NaiveTime>,
    pub status: StoredStatus,
    pub location_lat: Option<f64>,
    pub location_lng: Option<f64>,
    pub location_accuracy: Option<f64>,
    pub notes: Option<String>,
}

/// Partial update; only set fields are written.
#[derive(Debug, Clone, Default)]
pub struct AttendanceUpdate {
    pub check_out: Option<NaiveTime>,
    pub status: Option<StoredStatus>,
    pub notes: Option<String>,
}

/// An approval-workflow decision to persist. Applied conditionally on the
/// record still being pending, so the first writer wins.
#[derive(Debug, Clone)]
pub struct ApprovalDecision {
    pub approved: bool,
    pub decided_by: u64,
    pub decided_at: DateTime<Utc>,
    /// Required for rejections.
    pub reason: Option<String>,
}

/// Read-only source of active roster members.
#[async_trait]
pub trait RosterSource: Send + Sync {
    async fn list_active(&self) -> Result<Vec<Employee>>;

    /// Active members holding the given role (notification fan-out targets).
    async fn list_role(&self, role: &str) -> Result<Vec<Employee>>;
}

/// The attendance repository: single source of truth for records. The merged
/// view is a derived, disposable cache over it.
#[async_trait]
pub trait AttendanceStore: Send + Sync {
    async fn get_by_date(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>>;

    async fn get_by_id(&self, id: u64) -> Result<Option<AttendanceRecord>>;

    async fn insert(&self, new: NewAttendance) -> Result<u64>;

    async fn update_fields(&self, id: u64, update: AttendanceUpdate) -> Result<()>;

    /// Most recent date holding at least one record, if any exists at all.
    async fn most_recent_date_with_data(&self) -> Result<Option<NaiveDate>>;

    /// Compare-and-set: persists the decision only if the record is still
    /// pending. Returns `false` when another decision already landed.
    async fn apply_decision(&self, id: u64, decision: &ApprovalDecision) -> Result<bool>;
}

/// Outbound notification queue.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn enqueue(&self, request: NotificationRequest) -> Result<()>;
}
