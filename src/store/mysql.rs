use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::MySqlPool;

use crate::error::Result;
use crate::model::{AttendanceRecord, Employee, NotificationRequest};
use crate::store::{
    ApprovalDecision, AttendanceStore, AttendanceUpdate, NewAttendance, NotificationSink,
    RosterSource,
};

const RECORD_COLUMNS: &str = "id, employee_id, date, check_in, check_out, status, \
     location_lat, location_lng, location_accuracy, notes, \
     approval_status, approved_by, approved_at, rejection_reason";

#[derive(Clone)]
pub struct MySqlRoster {
    pool: MySqlPool,
}

impl MySqlRoster {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RosterSource for MySqlRoster {
    async fn list_active(&self) -> Result<Vec<Employee>> {
        let employees = sqlx::query_as::<_, Employee>(
            r#"
            SELECT id, first_name, last_name, email, department, position,
                   role, is_active, avatar_url
            FROM employees
            WHERE is_active = 1
            ORDER BY last_name, first_name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to list active employees");
            e
        })?;

        Ok(employees)
    }

    async fn list_role(&self, role: &str) -> Result<Vec<Employee>> {
        let employees = sqlx::query_as::<_, Employee>(
            r#"
            SELECT id, first_name, last_name, email, department, position,
                   role, is_active, avatar_url
            FROM employees
            WHERE is_active = 1 AND role = ?
            "#,
        )
        .bind(role)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, role, "Failed to list employees by role");
            e
        })?;

        Ok(employees)
    }
}

#[derive(Clone)]
pub struct MySqlAttendanceStore {
    pool: MySqlPool,
}

impl MySqlAttendanceStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AttendanceStore for MySqlAttendanceStore {
    async fn get_by_date(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM attendance WHERE date = ? ORDER BY check_in DESC"
        );

        let records = sqlx::query_as::<_, AttendanceRecord>(&sql)
            .bind(date)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, %date, "Failed to fetch attendance by date");
                e
            })?;

        Ok(records)
    }

    async fn get_by_id(&self, id: u64) -> Result<Option<AttendanceRecord>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM attendance WHERE id = ?");

        let record = sqlx::query_as::<_, AttendanceRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, id, "Failed to fetch attendance record");
                e
            })?;

        Ok(record)
    }

    async fn insert(&self, new: NewAttendance) -> Result<u64> {
        let result = sqlx::query(
            r#"
            INSERT INTO attendance
                (employee_id, date, check_in, status,
                 location_lat, location_lng, location_accuracy, notes)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(new.employee_id)
        .bind(new.date)
        .bind(new.check_in)
        .bind(new.status)
        .bind(new.location_lat)
        .bind(new.location_lng)
        .bind(new.location_accuracy)
        .bind(new.notes)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, employee_id = new.employee_id, "Check-in insert failed");
            e
        })?;

        Ok(result.last_insert_id())
    }

    async fn update_fields(&self, id: u64, update: AttendanceUpdate) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE attendance
            SET check_out = COALESCE(?, check_out),
                status    = COALESCE(?, status),
                notes     = COALESCE(?, notes)
            WHERE id = ?
            "#,
        )
        .bind(update.check_out)
        .bind(update.status)
        .bind(update.notes)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, id, "Attendance update failed");
            e
        })?;

        Ok(())
    }

    async fn most_recent_date_with_data(&self) -> Result<Option<NaiveDate>> {
        let date = sqlx::query_scalar::<_, NaiveDate>(
            "SELECT date FROM attendance ORDER BY date DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to find most recent attendance date");
            e
        })?;

        Ok(date)
    }

    async fn apply_decision(&self, id: u64, decision: &ApprovalDecision) -> Result<bool> {
        // Guarded update: only a still-pending record can be decided, so
        // concurrent approvers serialize on the row and the first one wins.
        let status = if decision.approved {
            "approved"
        } else {
            "rejected"
        };

        let result = sqlx::query(
            r#"
            UPDATE attendance
            SET approval_status = ?,
                approved_by = ?,
                approved_at = ?,
                rejection_reason = ?
            WHERE id = ?
            AND approval_status = 'pending'
            "#,
        )
        .bind(status)
        .bind(decision.decided_by)
        .bind(decision.decided_at)
        .bind(decision.reason.as_deref())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, id, "Approval decision update failed");
            e
        })?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(Clone)]
pub struct MySqlNotificationSink {
    pool: MySqlPool,
}

impl MySqlNotificationSink {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationSink for MySqlNotificationSink {
    async fn enqueue(&self, request: NotificationRequest) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications (external_id, user_id, title, message, type, action_url)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(request.id.to_string())
        .bind(request.user_id)
        .bind(&request.title)
        .bind(&request.message)
        .bind(&request.category)
        .bind(request.action_url.as_deref())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, user_id = request.user_id, "Notification enqueue failed");
            e
        })?;

        Ok(())
    }
}
