use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use futures::future::join_all;
use uuid::Uuid;

use crate::model::NotificationRequest;
use crate::store::{NotificationSink, RosterCache};

/// Outcome of one enqueue attempt. Failures are logged by the dispatcher and
/// never propagated to the triggering operation.
#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub request_id: Uuid,
    pub user_id: u64,
    pub delivered: bool,
}

/// Best-effort fan-out of notification requests. Clock-in/out events notify
/// every member of the supervisory role; approval decisions notify the record
/// owner. A batch carries at most one request per target; per-target ordering
/// comes from callers dispatching batches sequentially.
pub struct NotificationDispatcher {
    sink: Arc<dyn NotificationSink>,
    roster: Arc<RosterCache>,
    supervisor_role: String,
}

impl NotificationDispatcher {
    pub fn new(
        sink: Arc<dyn NotificationSink>,
        roster: Arc<RosterCache>,
        supervisor_role: impl Into<String>,
    ) -> Self {
        Self {
            sink,
            roster,
            supervisor_role: supervisor_role.into(),
        }
    }

    pub async fn dispatch(&self, requests: Vec<NotificationRequest>) -> Vec<DispatchResult> {
        let attempts = requests.into_iter().map(|request| {
            let sink = Arc::clone(&self.sink);
            async move {
                let request_id = request.id;
                let user_id = request.user_id;
                let delivered = match sink.enqueue(request).await {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!(error = %e, user_id, "Notification dispatch failed");
                        false
                    }
                };
                DispatchResult {
                    request_id,
                    user_id,
                    delivered,
                }
            }
        });

        join_all(attempts).await
    }

    /// Fan-out to the supervisory role set on a clock-in.
    pub async fn clocked_in(&self, display_name: &str, at: NaiveTime) -> Vec<DispatchResult> {
        self.fan_out(
            "Employee Clocked In",
            format!("{display_name} clocked in at {at}"),
        )
        .await
    }

    /// Fan-out to the supervisory role set on a clock-out.
    pub async fn clocked_out(&self, display_name: &str, at: NaiveTime) -> Vec<DispatchResult> {
        self.fan_out(
            "Employee Clocked Out",
            format!("{display_name} clocked out at {at}"),
        )
        .await
    }

    /// Single notification to the record owner on an approval decision.
    pub async fn approval_decided(
        &self,
        employee_id: u64,
        date: NaiveDate,
        approved: bool,
        reason: Option<&str>,
    ) -> Vec<DispatchResult> {
        let (title, message) = if approved {
            (
                "Attendance Approved",
                format!("Your attendance for {date} has been approved by HR."),
            )
        } else {
            let mut message = format!("Your attendance for {date} has been rejected by HR.");
            if let Some(reason) = reason {
                message.push_str(&format!(" Reason: {reason}"));
            }
            ("Attendance Rejected", message)
        };

        self.dispatch(vec![NotificationRequest::attendance(
            employee_id,
            title,
            message,
            "/dashboard/employee/attendance",
        )])
        .await
    }

    async fn fan_out(&self, title: &str, message: String) -> Vec<DispatchResult> {
        let supervisors = match self.roster.role(&self.supervisor_role).await {
            Ok(supervisors) => supervisors,
            Err(e) => {
                tracing::warn!(error = %e, role = %self.supervisor_role,
                    "Could not resolve notification recipients");
                return Vec::new();
            }
        };

        let requests = supervisors
            .iter()
            .map(|supervisor| {
                NotificationRequest::attendance(
                    supervisor.id,
                    title,
                    message.clone(),
                    "/dashboard/hr",
                )
            })
            .collect();

        self.dispatch(requests).await
    }
}
