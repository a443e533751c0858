use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;

use crate::error::{EngineError, Result};
use crate::model::{ApprovalStatus, AttendanceRecord, Employee, NotificationRequest};
use crate::store::{
    ApprovalDecision, AttendanceStore, AttendanceUpdate, NewAttendance, NotificationSink,
    RosterSource,
};

/// In-memory roster, used by tests and the demo wiring.
#[derive(Default)]
pub struct MemoryRoster {
    employees: RwLock<Vec<Employee>>,
}

impl MemoryRoster {
    pub fn new(employees: Vec<Employee>) -> Self {
        Self {
            employees: RwLock::new(employees),
        }
    }
}

#[async_trait]
impl RosterSource for MemoryRoster {
    async fn list_active(&self) -> Result<Vec<Employee>> {
        let employees = self.employees.read().await;
        Ok(employees.iter().filter(|e| e.is_active).cloned().collect())
    }

    async fn list_role(&self, role: &str) -> Result<Vec<Employee>> {
        let employees = self.employees.read().await;
        Ok(employees
            .iter()
            .filter(|e| e.is_active && e.role == role)
            .cloned()
            .collect())
    }
}

/// In-memory attendance repository with the same conditional-update semantics
/// as the MySQL implementation. `set_unavailable` lets tests exercise the
/// stale-but-consistent reload path.
pub struct MemoryAttendanceStore {
    records: RwLock<BTreeMap<u64, AttendanceRecord>>,
    next_id: AtomicU64,
    unavailable: AtomicBool,
}

impl MemoryAttendanceStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            unavailable: AtomicBool::new(false),
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(EngineError::UpstreamUnavailable(
                "attendance store offline".to_string(),
            ));
        }
        Ok(())
    }

    /// Seeds a full record directly, bypassing the check-in shape. Test helper.
    pub async fn seed(&self, mut record: AttendanceRecord) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        record.id = id;
        self.records.write().await.insert(id, record);
        id
    }
}

#[async_trait]
impl AttendanceStore for MemoryAttendanceStore {
    async fn get_by_date(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>> {
        self.check_available()?;
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|r| r.date == date)
            .cloned()
            .collect())
    }

    async fn get_by_id(&self, id: u64) -> Result<Option<AttendanceRecord>> {
        self.check_available()?;
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn insert(&self, new: NewAttendance) -> Result<u64> {
        self.check_available()?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let record = AttendanceRecord {
            id,
            employee_id: new.employee_id,
            date: new.date,
            check_in: new.check_in,
            check_out: None,
            status: new.status,
            location_lat: new.location_lat,
            location_lng: new.location_lng,
            location_accuracy: new.location_accuracy,
            notes: new.notes,
            approval_status: ApprovalStatus::Pending,
            approved_by: None,
            approved_at: None,
            rejection_reason: None,
        };
        self.records.write().await.insert(id, record);
        Ok(id)
    }

    async fn update_fields(&self, id: u64, update: AttendanceUpdate) -> Result<()> {
        self.check_available()?;
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&id)
            .ok_or_else(|| EngineError::NotFound(format!("attendance record {id}")))?;

        if let Some(check_out) = update.check_out {
            record.check_out = Some(check_out);
        }
        if let Some(status) = update.status {
            record.status = status;
        }
        if let Some(notes) = update.notes {
            record.notes = Some(notes);
        }
        Ok(())
    }

    async fn most_recent_date_with_data(&self) -> Result<Option<NaiveDate>> {
        self.check_available()?;
        let records = self.records.read().await;
        Ok(records.values().map(|r| r.date).max())
    }

    async fn apply_decision(&self, id: u64, decision: &ApprovalDecision) -> Result<bool> {
        self.check_available()?;
        let mut records = self.records.write().await;
        let record = match records.get_mut(&id) {
            Some(r) => r,
            None => return Ok(false),
        };

        if record.approval_status != ApprovalStatus::Pending {
            return Ok(false);
        }

        record.approval_status = if decision.approved {
            ApprovalStatus::Approved
        } else {
            ApprovalStatus::Rejected
        };
        record.approved_by = Some(decision.decided_by);
        record.approved_at = Some(decision.decided_at);
        record.rejection_reason = decision.reason.clone();
        Ok(true)
    }
}

/// Records every enqueued request; can be flipped to fail for testing the
/// dispatcher's best-effort contract.
#[derive(Default)]
pub struct MemoryNotificationSink {
    sent: RwLock<Vec<NotificationRequest>>,
    fail: AtomicBool,
}

impl MemoryNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub async fn sent(&self) -> Vec<NotificationRequest> {
        self.sent.read().await.clone()
    }
}

#[async_trait]
impl NotificationSink for MemoryNotificationSink {
    async fn enqueue(&self, request: NotificationRequest) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(EngineError::UpstreamUnavailable(
                "notification sink offline".to_string(),
            ));
        }
        self.sent.write().await.push(request);
        Ok(())
    }
}
