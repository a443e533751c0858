use std::collections::HashMap;

use chrono::NaiveDate;

use crate::model::{AttendanceRecord, Employee, MergedRecord};

/// Merges the active roster with the records held for `date` into a complete
/// view: every roster member appears exactly once, as a real record or as a
/// synthesized absent placeholder. The result is sorted for display.
pub fn reconcile(
    date: NaiveDate,
    roster: &[Employee],
    records: Vec<AttendanceRecord>,
) -> Vec<MergedRecord> {
    let mut by_employee: HashMap<u64, AttendanceRecord> = HashMap::with_capacity(records.len());
    for record in records {
        // One row per employee per date upstream; if the feed ever hands us
        // duplicates the later one wins, same as the incremental path.
        by_employee.insert(record.employee_id, record);
    }

    let mut view: Vec<MergedRecord> = roster
        .iter()
        .map(|employee| match by_employee.remove(&employee.id) {
            Some(record) => MergedRecord::real(employee, record),
            None => MergedRecord::placeholder(employee, date),
        })
        .collect();

    sort_view(&mut view);
    view
}

/// Active before Closed before Inactive, then most recent activity first
/// (check-out over check-in, placeholders last), then name as the final
/// deterministic tiebreak.
pub fn sort_view(view: &mut [MergedRecord]) {
    view.sort_by(|a, b| {
        a.effective_status()
            .priority()
            .cmp(&b.effective_status().priority())
            .then_with(|| b.last_activity().cmp(&a.last_activity()))
            .then_with(|| {
                a.display_name
                    .to_lowercase()
                    .cmp(&b.display_name.to_lowercase())
            })
    });
}

/// Applies one insert/update to the view in place: whole-record replacement of
/// the employee's row (displacing a placeholder if one was there), then
/// re-sort. Returns `false` for employees outside the current roster, which
/// the caller ignores until the next full reload picks the roster change up.
pub fn upsert_record(view: &mut Vec<MergedRecord>, record: AttendanceRecord) -> bool {
    let Some(row) = view.iter_mut().find(|m| m.employee_id == record.employee_id) else {
        return false;
    };

    row.date = record.date;
    row.record = Some(record);
    sort_view(view);
    true
}
