use std::sync::Arc;

use chrono::Utc;

use crate::error::{EngineError, Result};
use crate::model::{ApprovalStatus, AttendanceRecord};
use crate::notify::NotificationDispatcher;
use crate::store::{ApprovalDecision, AttendanceStore};

/// The pending → approved/rejected workflow. Both decided states are terminal
/// here; re-opening is an administrative action outside this engine.
pub struct ApprovalWorkflow {
    store: Arc<dyn AttendanceStore>,
    dispatcher: Arc<NotificationDispatcher>,
}

impl ApprovalWorkflow {
    pub fn new(store: Arc<dyn AttendanceStore>, dispatcher: Arc<NotificationDispatcher>) -> Self {
        Self { store, dispatcher }
    }

    pub async fn approve(&self, record_id: u64, actor_id: u64) -> Result<AttendanceRecord> {
        self.decide(record_id, actor_id, true, None).await
    }

    pub async fn reject(
        &self,
        record_id: u64,
        actor_id: u64,
        reason: &str,
    ) -> Result<AttendanceRecord> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(EngineError::InvalidInput(
                "a rejection requires a reason".to_string(),
            ));
        }
        self.decide(record_id, actor_id, false, Some(reason.to_string()))
            .await
    }

    async fn decide(
        &self,
        record_id: u64,
        actor_id: u64,
        approved: bool,
        reason: Option<String>,
    ) -> Result<AttendanceRecord> {
        let mut record = self
            .store
            .get_by_id(record_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("attendance record {record_id}")))?;

        if record.approval_status != ApprovalStatus::Pending {
            return Err(EngineError::InvalidState(format!(
                "attendance record {record_id} is already {}",
                record.approval_status
            )));
        }

        let decision = ApprovalDecision {
            approved,
            decided_by: actor_id,
            decided_at: Utc::now(),
            reason: reason.clone(),
        };

        // Persistence first; a conditional update so a concurrent decision on
        // the same record loses cleanly instead of overwriting.
        if !self.store.apply_decision(record_id, &decision).await? {
            return Err(EngineError::InvalidState(format!(
                "attendance record {record_id} was decided concurrently"
            )));
        }

        record.approval_status = if approved {
            ApprovalStatus::Approved
        } else {
            ApprovalStatus::Rejected
        };
        record.approved_by = Some(actor_id);
        record.approved_at = Some(decision.decided_at);
        record.rejection_reason = reason.clone();

        tracing::info!(
            record_id,
            actor_id,
            approved,
            "Attendance approval decision persisted"
        );

        // Owner notification is best-effort: a dispatch failure must not roll
        // back the persisted decision.
        self.dispatcher
            .approval_decided(record.employee_id, record.date, approved, reason.as_deref())
            .await;

        Ok(record)
    }
}
