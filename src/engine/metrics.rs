use chrono::{Duration, NaiveDateTime, NaiveTime};
use serde::Serialize;

use crate::model::{EffectiveStatus, MergedRecord};

/// Aggregate metrics over one merged view. Derived, never stored; recomputed
/// on every merge and on the fixed tick so open sessions keep growing.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AttendanceMetrics {
    pub roster_size: usize,
    pub present: usize,
    pub absent: usize,
    pub late: usize,
    /// Mean elapsed working hours across present members.
    pub average_working_hours: f64,
    /// present / roster size, 0.0 for an empty roster.
    pub attendance_rate: f64,
}

/// Strictly after the threshold counts as late; exactly on it does not.
pub fn is_late(check_in: NaiveTime, work_start: NaiveTime) -> bool {
    check_in > work_start
}

/// Elapsed working time for one row. Closed rows use check-out − check-in,
/// open rows keep growing against `now`, absent rows have none. Negative
/// spans (clock skew in the data) clamp to zero.
pub fn elapsed(record: &MergedRecord, now: NaiveDateTime) -> Option<Duration> {
    let check_in = record.check_in()?;
    let start = record.date.and_time(check_in);

    let span = match record.check_out() {
        Some(check_out) => record.date.and_time(check_out) - start,
        None => now - start,
    };

    Some(span.max(Duration::zero()))
}

/// `"3h 25m"` style rendering for consumers.
pub fn format_duration(span: Duration) -> String {
    let minutes = span.num_minutes().max(0);
    format!("{}h {}m", minutes / 60, minutes % 60)
}

pub fn compute(
    view: &[MergedRecord],
    work_start: NaiveTime,
    now: NaiveDateTime,
) -> AttendanceMetrics {
    let roster_size = view.len();

    let mut present = 0usize;
    let mut late = 0usize;
    let mut total_hours = 0.0f64;

    for record in view {
        let Some(check_in) = record.check_in() else {
            continue;
        };
        present += 1;
        if is_late(check_in, work_start) {
            late += 1;
        }
        if let Some(span) = elapsed(record, now) {
            total_hours += span.num_seconds() as f64 / 3600.0;
        }
    }

    let average_working_hours = if present > 0 {
        total_hours / present as f64
    } else {
        0.0
    };
    let attendance_rate = if roster_size > 0 {
        present as f64 / roster_size as f64
    } else {
        0.0
    };

    AttendanceMetrics {
        roster_size,
        present,
        absent: roster_size - present,
        late,
        average_working_hours,
        attendance_rate,
    }
}

/// Present with no check-out yet; used to decide whether the tick actually
/// changes anything.
pub fn has_open_sessions(view: &[MergedRecord]) -> bool {
    view.iter()
        .any(|m| m.effective_status() == EffectiveStatus::Active)
}
