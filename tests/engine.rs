use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Notify;
use uuid::Uuid;

use hrm_attendance::engine::ReconciliationEngine;
use hrm_attendance::feed::{AttendanceEvent, ConnectionState, FeedMessage};
use hrm_attendance::model::{
    ApprovalStatus, AttendanceRecord, EffectiveStatus, Employee, StoredStatus,
};
use hrm_attendance::store::{
    ApprovalDecision, AttendanceStore, AttendanceUpdate, MemoryAttendanceStore,
    MemoryNotificationSink, MemoryRoster, NewAttendance, NotificationSink,
};
use hrm_attendance::{Config, EngineError, Result};

fn employee(id: u64, first: &str, last: &str, role: &str) -> Employee {
    Employee {
        id,
        first_name: first.into(),
        last_name: last.into(),
        email: format!("{}@company.com", first.to_lowercase()),
        department: Some("Engineering".into()),
        position: None,
        role: role.into(),
        is_active: true,
        avatar_url: None,
    }
}

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
}

fn record(
    employee_id: u64,
    on: NaiveDate,
    check_in: Option<&str>,
    check_out: Option<&str>,
) -> AttendanceRecord {
    AttendanceRecord {
        id: 0,
        employee_id,
        date: on,
        check_in: check_in.map(|t| t.parse().unwrap()),
        check_out: check_out.map(|t| t.parse().unwrap()),
        status: StoredStatus::Present,
        location_lat: None,
        location_lng: None,
        location_accuracy: None,
        notes: None,
        approval_status: ApprovalStatus::Pending,
        approved_by: None,
        approved_at: None,
        rejection_reason: None,
    }
}

struct Fixture {
    engine: Arc<ReconciliationEngine>,
    store: Arc<MemoryAttendanceStore>,
    sink: Arc<MemoryNotificationSink>,
}

fn fixture(roster: Vec<Employee>) -> Fixture {
    let store = Arc::new(MemoryAttendanceStore::new());
    let sink = Arc::new(MemoryNotificationSink::new());
    let engine = ReconciliationEngine::new(
        Arc::new(MemoryRoster::new(roster)),
        Arc::clone(&store) as Arc<dyn AttendanceStore>,
        Arc::clone(&sink) as Arc<dyn NotificationSink>,
        Config::default(),
    );
    Fixture {
        engine,
        store,
        sink,
    }
}

/// Repository wrapper that parks one `get_by_date` call after it has taken its
/// snapshot, so the test can land a live event inside the reload's I/O window.
struct ParkedReadStore {
    inner: Arc<MemoryAttendanceStore>,
    armed: AtomicBool,
    entered: Notify,
    release: Notify,
}

impl ParkedReadStore {
    fn new(inner: Arc<MemoryAttendanceStore>) -> Self {
        Self {
            inner,
            armed: AtomicBool::new(false),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }

    fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    async fn wait_until_parked(&self) {
        self.entered.notified().await;
    }

    fn release(&self) {
        self.release.notify_one();
    }
}

#[async_trait]
impl AttendanceStore for ParkedReadStore {
    async fn get_by_date(&self, on: NaiveDate) -> Result<Vec<AttendanceRecord>> {
        let snapshot = self.inner.get_by_date(on).await?;
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        Ok(snapshot)
    }

    async fn get_by_id(&self, id: u64) -> Result<Option<AttendanceRecord>> {
        self.inner.get_by_id(id).await
    }

    async fn insert(&self, new: NewAttendance) -> Result<u64> {
        self.inner.insert(new).await
    }

    async fn update_fields(&self, id: u64, update: AttendanceUpdate) -> Result<()> {
        self.inner.update_fields(id, update).await
    }

    async fn most_recent_date_with_data(&self) -> Result<Option<NaiveDate>> {
        self.inner.most_recent_date_with_data().await
    }

    async fn apply_decision(&self, id: u64, decision: &ApprovalDecision) -> Result<bool> {
        self.inner.apply_decision(id, decision).await
    }
}

fn parked_fixture(
    roster: Vec<Employee>,
) -> (
    Arc<ReconciliationEngine>,
    Arc<MemoryAttendanceStore>,
    Arc<ParkedReadStore>,
) {
    let store = Arc::new(MemoryAttendanceStore::new());
    let parked = Arc::new(ParkedReadStore::new(Arc::clone(&store)));
    let engine = ReconciliationEngine::new(
        Arc::new(MemoryRoster::new(roster)),
        Arc::clone(&parked) as Arc<dyn AttendanceStore>,
        Arc::new(MemoryNotificationSink::new()) as Arc<dyn NotificationSink>,
        Config::default(),
    );
    (engine, store, parked)
}

fn default_roster() -> Vec<Employee> {
    vec![
        employee(1, "Ada", "Byron", "employee"),
        employee(2, "Grace", "Hopper", "employee"),
        employee(3, "Alan", "Turing", "employee"),
        employee(10, "Hana", "Reyes", "hr"),
    ]
}

#[tokio::test]
async fn empty_date_yields_all_inactive_placeholders() {
    let fx = fixture(vec![
        employee(1, "Ada", "Byron", "employee"),
        employee(2, "Grace", "Hopper", "employee"),
        employee(3, "Alan", "Turing", "employee"),
    ]);
    fx.engine.set_viewed_date(date()).await.unwrap();

    let view = fx.engine.merged_view().await;
    assert_eq!(view.len(), 3);
    assert!(view
        .iter()
        .all(|m| m.effective_status() == EffectiveStatus::Inactive));

    let metrics = fx.engine.metrics().await;
    assert_eq!(metrics.present, 0);
    assert_eq!(metrics.absent, 3);
    assert_eq!(metrics.attendance_rate, 0.0);
}

#[tokio::test]
async fn lateness_flags_only_after_threshold() {
    let fx = fixture(default_roster());
    fx.store.seed(record(1, date(), Some("08:55:00"), None)).await;
    fx.store.seed(record(2, date(), Some("09:10:00"), None)).await;
    fx.engine.set_viewed_date(date()).await.unwrap();

    let view = fx.engine.merged_view().await;
    let active = view
        .iter()
        .filter(|m| m.effective_status() == EffectiveStatus::Active)
        .count();
    assert_eq!(active, 2);

    let metrics = fx.engine.metrics().await;
    assert_eq!(metrics.present, 2);
    assert_eq!(metrics.late, 1);
}

#[tokio::test]
async fn closed_record_reports_exact_working_hours() {
    let fx = fixture(default_roster());
    fx.store
        .seed(record(1, date(), Some("08:55:00"), Some("17:25:00")))
        .await;
    fx.engine.set_viewed_date(date()).await.unwrap();

    let view = fx.engine.merged_view().await;
    let ada = view.iter().find(|m| m.employee_id == 1).unwrap();
    assert_eq!(ada.effective_status(), EffectiveStatus::Closed);

    let metrics = fx.engine.metrics().await;
    assert!((metrics.average_working_hours - 8.5).abs() < 1e-9);
}

#[tokio::test]
async fn duplicate_event_replay_leaves_view_unchanged() {
    let fx = fixture(default_roster());
    fx.engine.set_viewed_date(date()).await.unwrap();

    let mut checked_in = record(1, date(), Some("08:40:00"), None);
    checked_in.id = 55;
    let event = AttendanceEvent::Inserted {
        event_id: Uuid::new_v4(),
        record: checked_in,
    };

    fx.engine.apply_event(event.clone()).await;
    let once = fx.engine.merged_view().await;
    let once_metrics = fx.engine.metrics().await;

    fx.engine.apply_event(event).await;
    let twice = fx.engine.merged_view().await;

    assert_eq!(once.len(), twice.len());
    assert_eq!(
        once.iter().map(|m| m.employee_id).collect::<Vec<_>>(),
        twice.iter().map(|m| m.employee_id).collect::<Vec<_>>()
    );
    assert_eq!(
        twice
            .iter()
            .filter(|m| m.effective_status() == EffectiveStatus::Active)
            .count(),
        1
    );
    assert_eq!(once_metrics.present, fx.engine.metrics().await.present);
}

#[tokio::test]
async fn event_for_other_date_is_ignored() {
    let fx = fixture(default_roster());
    fx.engine.set_viewed_date(date()).await.unwrap();

    let other_day = date().succ_opt().unwrap();
    fx.engine
        .apply_event(AttendanceEvent::Inserted {
            event_id: Uuid::new_v4(),
            record: record(1, other_day, Some("08:40:00"), None),
        })
        .await;

    assert!(fx.engine.merged_view().await.iter().all(|m| m.is_placeholder()));
}

#[tokio::test]
async fn check_in_event_fans_out_to_supervisors() {
    let mut roster = default_roster();
    roster.push(employee(11, "Noor", "Haddad", "hr"));
    let fx = fixture(roster);
    fx.engine.set_viewed_date(date()).await.unwrap();

    fx.engine
        .apply_event(AttendanceEvent::Inserted {
            event_id: Uuid::new_v4(),
            record: record(1, date(), Some("08:40:00"), None),
        })
        .await;
    // dispatch is spawned off the merge path
    tokio::time::sleep(Duration::from_millis(50)).await;

    let sent = fx.sink.sent().await;
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|n| n.title == "Employee Clocked In"));
    let mut targets: Vec<u64> = sent.iter().map(|n| n.user_id).collect();
    targets.sort_unstable();
    assert_eq!(targets, vec![10, 11]);
    assert!(sent.iter().all(|n| n.action_url.as_deref() == Some("/dashboard/hr")));
}

#[tokio::test]
async fn check_out_update_fans_out_once() {
    let fx = fixture(default_roster());
    let id = fx.store.seed(record(1, date(), Some("08:40:00"), None)).await;
    fx.engine.set_viewed_date(date()).await.unwrap();

    let mut closed = record(1, date(), Some("08:40:00"), Some("17:05:00"));
    closed.id = id;
    let event = AttendanceEvent::Updated {
        event_id: Uuid::new_v4(),
        record: closed,
    };
    fx.engine.apply_event(event.clone()).await;
    fx.engine.apply_event(event).await; // replay
    tokio::time::sleep(Duration::from_millis(50)).await;

    let sent = fx.sink.sent().await;
    let clock_outs: Vec<_> = sent
        .iter()
        .filter(|n| n.title == "Employee Clocked Out")
        .collect();
    assert_eq!(clock_outs.len(), 1);
}

#[tokio::test]
async fn supervisor_sees_clock_in_before_clock_out() {
    let fx = fixture(default_roster());
    fx.engine.set_viewed_date(date()).await.unwrap();

    let mut open = record(1, date(), Some("08:40:00"), None);
    open.id = 55;
    fx.engine
        .apply_event(AttendanceEvent::Inserted {
            event_id: Uuid::new_v4(),
            record: open,
        })
        .await;

    let mut closed = record(1, date(), Some("08:40:00"), Some("17:05:00"));
    closed.id = 55;
    fx.engine
        .apply_event(AttendanceEvent::Updated {
            event_id: Uuid::new_v4(),
            record: closed,
        })
        .await;

    tokio::time::sleep(Duration::from_millis(50)).await;

    let titles: Vec<String> = fx
        .sink
        .sent()
        .await
        .iter()
        .filter(|n| n.user_id == 10)
        .map(|n| n.title.clone())
        .collect();
    assert_eq!(titles, vec!["Employee Clocked In", "Employee Clocked Out"]);
}

#[tokio::test]
async fn reload_does_not_regress_past_a_newer_live_event() {
    let (engine, store, parked) = parked_fixture(default_roster());
    let id = store.seed(record(1, date(), Some("08:00:00"), None)).await;
    engine.set_viewed_date(date()).await.unwrap();

    parked.arm();
    let reloading = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.refresh().await })
    };
    parked.wait_until_parked().await;

    // lands after the reload took its snapshot
    let mut closed = record(1, date(), Some("08:00:00"), Some("16:00:00"));
    closed.id = id;
    engine
        .apply_event(AttendanceEvent::Updated {
            event_id: Uuid::new_v4(),
            record: closed,
        })
        .await;

    parked.release();
    reloading.await.unwrap().unwrap();

    let view = engine.merged_view().await;
    let ada = view.iter().find(|m| m.employee_id == 1).unwrap();
    assert_eq!(ada.check_out(), Some("16:00:00".parse().unwrap()));
    assert_eq!(ada.effective_status(), EffectiveStatus::Closed);
    assert!(!engine.is_stale().await);
}

#[tokio::test]
async fn date_switch_discards_the_inflight_reload() {
    let (engine, store, parked) = parked_fixture(default_roster());
    let first = date();
    let second = date().succ_opt().unwrap();
    store.seed(record(1, first, Some("08:10:00"), None)).await;
    store.seed(record(2, second, Some("09:20:00"), None)).await;
    engine.set_viewed_date(first).await.unwrap();

    parked.arm();
    let reloading = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.refresh().await })
    };
    parked.wait_until_parked().await;

    engine.set_viewed_date(second).await.unwrap();
    parked.release();

    // superseded, not a failure
    assert!(reloading.await.unwrap().is_ok());

    assert_eq!(engine.viewed_date().await, second);
    let view = engine.merged_view().await;
    let ada = view.iter().find(|m| m.employee_id == 1).unwrap();
    assert!(ada.is_placeholder());
    let grace = view.iter().find(|m| m.employee_id == 2).unwrap();
    assert_eq!(grace.effective_status(), EffectiveStatus::Active);
}

#[tokio::test]
async fn approve_persists_and_notifies_owner() {
    let fx = fixture(default_roster());
    let id = fx.store.seed(record(2, date(), Some("08:30:00"), None)).await;
    fx.engine.set_viewed_date(date()).await.unwrap();

    let decided = fx.engine.approve(id, 10).await.unwrap();
    assert_eq!(decided.approval_status, ApprovalStatus::Approved);
    assert_eq!(decided.approved_by, Some(10));

    let stored = fx.store.get_by_id(id).await.unwrap().unwrap();
    assert_eq!(stored.approval_status, ApprovalStatus::Approved);

    // optimistic overlay lands in the merged view immediately
    let view = fx.engine.merged_view().await;
    let grace = view.iter().find(|m| m.employee_id == 2).unwrap();
    assert_eq!(grace.approval_status(), ApprovalStatus::Approved);

    let sent = fx.sink.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].user_id, 2);
    assert_eq!(sent[0].title, "Attendance Approved");
    assert_eq!(
        sent[0].action_url.as_deref(),
        Some("/dashboard/employee/attendance")
    );
}

#[tokio::test]
async fn decided_records_are_terminal() {
    let fx = fixture(default_roster());
    let id = fx.store.seed(record(2, date(), Some("08:30:00"), None)).await;
    fx.engine.set_viewed_date(date()).await.unwrap();

    fx.engine.approve(id, 10).await.unwrap();

    let again = fx.engine.approve(id, 10).await;
    assert!(matches!(again, Err(EngineError::InvalidState(_))));

    let reject = fx.engine.reject(id, 10, "too late").await;
    assert!(matches!(reject, Err(EngineError::InvalidState(_))));

    // original decision untouched
    let stored = fx.store.get_by_id(id).await.unwrap().unwrap();
    assert_eq!(stored.approval_status, ApprovalStatus::Approved);
    assert_eq!(stored.rejection_reason, None);
}

#[tokio::test]
async fn reject_requires_a_reason() {
    let fx = fixture(default_roster());
    let id = fx.store.seed(record(1, date(), Some("09:45:00"), None)).await;
    fx.engine.set_viewed_date(date()).await.unwrap();

    let err = fx.engine.reject(id, 10, "  ").await;
    assert!(matches!(err, Err(EngineError::InvalidInput(_))));

    let stored = fx.store.get_by_id(id).await.unwrap().unwrap();
    assert_eq!(stored.approval_status, ApprovalStatus::Pending);
}

#[tokio::test]
async fn reject_reason_reaches_the_owner() {
    let fx = fixture(default_roster());
    let id = fx.store.seed(record(1, date(), Some("09:45:00"), None)).await;
    fx.engine.set_viewed_date(date()).await.unwrap();

    let decided = fx.engine.reject(id, 10, "no prior notice").await.unwrap();
    assert_eq!(decided.approval_status, ApprovalStatus::Rejected);
    assert_eq!(decided.rejection_reason.as_deref(), Some("no prior notice"));

    let sent = fx.sink.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].title, "Attendance Rejected");
    assert!(sent[0].message.contains("no prior notice"));
}

#[tokio::test]
async fn approving_missing_record_is_not_found() {
    let fx = fixture(default_roster());
    fx.engine.set_viewed_date(date()).await.unwrap();

    let err = fx.engine.approve(999, 10).await;
    assert!(matches!(err, Err(EngineError::NotFound(_))));
}

#[tokio::test]
async fn notification_failure_does_not_roll_back_decision() {
    let fx = fixture(default_roster());
    let id = fx.store.seed(record(1, date(), Some("08:30:00"), None)).await;
    fx.engine.set_viewed_date(date()).await.unwrap();

    fx.sink.set_failing(true);
    let decided = fx.engine.approve(id, 10).await.unwrap();
    assert_eq!(decided.approval_status, ApprovalStatus::Approved);

    let stored = fx.store.get_by_id(id).await.unwrap().unwrap();
    assert_eq!(stored.approval_status, ApprovalStatus::Approved);
}

#[tokio::test]
async fn empty_viewed_date_falls_back_to_latest_date_with_data() {
    let fx = fixture(default_roster());
    let earlier = date().pred_opt().unwrap();
    fx.store
        .seed(record(3, earlier, Some("08:15:00"), Some("16:45:00")))
        .await;

    fx.engine.set_viewed_date(date()).await.unwrap();

    assert_eq!(fx.engine.viewed_date().await, earlier);
    let view = fx.engine.merged_view().await;
    assert_eq!(view.len(), 4);
    let alan = view.iter().find(|m| m.employee_id == 3).unwrap();
    assert_eq!(alan.effective_status(), EffectiveStatus::Closed);
}

#[tokio::test]
async fn failed_reload_keeps_last_known_good_view() {
    let fx = fixture(default_roster());
    fx.store.seed(record(1, date(), Some("08:30:00"), None)).await;
    fx.engine.set_viewed_date(date()).await.unwrap();
    assert_eq!(fx.engine.merged_view().await.len(), 4);

    fx.store.set_unavailable(true);
    let err = fx.engine.refresh().await;
    assert!(matches!(err, Err(EngineError::UpstreamUnavailable(_))));
    assert!(fx.engine.is_stale().await);
    // stale but consistent: the previous merged view is still served
    assert_eq!(fx.engine.merged_view().await.len(), 4);

    fx.store.set_unavailable(false);
    fx.engine.refresh().await.unwrap();
    assert!(!fx.engine.is_stale().await);
}

#[tokio::test]
async fn reconnect_reloads_missed_changes() {
    let fx = fixture(default_roster());
    fx.engine.set_viewed_date(date()).await.unwrap();
    fx.engine
        .set_connection_state(ConnectionState::Disconnected)
        .await;
    assert_eq!(fx.engine.connection_state(), ConnectionState::Disconnected);

    // change lands while the feed is down
    fx.store.seed(record(2, date(), Some("10:02:00"), None)).await;

    fx.engine
        .set_connection_state(ConnectionState::Connected)
        .await;
    assert_eq!(fx.engine.connection_state(), ConnectionState::Connected);

    let view = fx.engine.merged_view().await;
    let grace = view.iter().find(|m| m.employee_id == 2).unwrap();
    assert_eq!(grace.effective_status(), EffectiveStatus::Active);
}

#[tokio::test]
async fn feed_channel_drives_the_engine() {
    let fx = fixture(default_roster());
    fx.engine.set_viewed_date(date()).await.unwrap();

    let (tx, rx) = tokio::sync::mpsc::channel(8);
    let _handles = fx.engine.run(rx);

    tx.send(FeedMessage::Connection(ConnectionState::Connected))
        .await
        .unwrap();
    tx.send(FeedMessage::Event(AttendanceEvent::Inserted {
        event_id: Uuid::new_v4(),
        record: record(1, date(), Some("08:50:00"), None),
    }))
    .await
    .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;

    let metrics = fx.engine.metrics().await;
    assert_eq!(metrics.present, 1);
    assert_eq!(metrics.absent, 3);

    let activity = fx.engine.recent_activity().await;
    assert_eq!(activity.len(), 1);
    assert_eq!(activity[0].display_name, "Ada Byron");
}

#[tokio::test]
async fn recent_activity_is_capped() {
    let fx = fixture(default_roster());
    fx.engine.set_viewed_date(date()).await.unwrap();

    for i in 0..15u64 {
        // alternate two employees so each event is an upsert for a known member
        let employee_id = if i % 2 == 0 { 1 } else { 2 };
        let minute = format!("08:{:02}:00", i + 1);
        fx.engine
            .apply_event(AttendanceEvent::Inserted {
                event_id: Uuid::new_v4(),
                record: record(employee_id, date(), Some(&minute), None),
            })
            .await;
    }

    assert_eq!(fx.engine.recent_activity().await.len(), 10);
}
