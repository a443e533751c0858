pub mod approval;
pub mod merge;
pub mod metrics;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use strum_macros::Display;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{EngineError, Result};
use crate::feed::{AttendanceEvent, ConnectionState, FeedMessage};
use crate::model::{AttendanceRecord, MergedRecord};
use crate::notify::NotificationDispatcher;
use crate::store::{AttendanceStore, NotificationSink, RosterCache, RosterSource};

pub use approval::ApprovalWorkflow;
pub use metrics::AttendanceMetrics;

/// Duplicate-event detection window. Replays older than this are still
/// harmless because event application is whole-record last-write-wins.
const SEEN_EVENTS_CAP: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActivityKind {
    ClockIn,
    ClockOut,
}

/// Recent clock-in/out entry kept for display.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityEntry {
    pub kind: ActivityKind,
    pub employee_id: u64,
    pub display_name: String,
    pub at: DateTime<Utc>,
}

/// One fan-out batch queued for the dispatch loop.
struct NotifyJob {
    kind: ActivityKind,
    display_name: String,
    at: NaiveTime,
}

struct ViewState {
    date: NaiveDate,
    /// Bumped on every date switch; reloads stamped with an older generation
    /// are discarded so no stale-date write lands in the current view.
    generation: u64,
    view: Vec<MergedRecord>,
    metrics: AttendanceMetrics,
    /// Monotonic count of applied feed events.
    applied_seq: u64,
    /// Per-employee sequence of the newest applied event; guards reloads
    /// whose snapshot predates a live event.
    last_event_seq: HashMap<u64, u64>,
    seen_events: VecDeque<Uuid>,
    activity: VecDeque<ActivityEntry>,
    /// True while serving the last known-good view after a failed reload.
    stale: bool,
}

impl ViewState {
    fn new(date: NaiveDate) -> Self {
        Self {
            date,
            generation: 0,
            view: Vec::new(),
            metrics: AttendanceMetrics::default(),
            applied_seq: 0,
            last_event_seq: HashMap::new(),
            seen_events: VecDeque::new(),
            activity: VecDeque::new(),
            stale: false,
        }
    }
}

/// Maintains a complete, gap-free, sorted attendance view for one viewed date
/// by merging the roster with the attendance repository, applying event-feed
/// deltas in between full reloads. The view is a derived, disposable cache;
/// the repository stays the single source of truth.
pub struct ReconciliationEngine {
    config: Config,
    roster: Arc<RosterCache>,
    store: Arc<dyn AttendanceStore>,
    approval: ApprovalWorkflow,
    state: RwLock<ViewState>,
    notify_tx: mpsc::Sender<NotifyJob>,
    conn_tx: watch::Sender<ConnectionState>,
    conn_rx: watch::Receiver<ConnectionState>,
}

impl ReconciliationEngine {
    /// Must be called from within a Tokio runtime: the notification dispatch
    /// loop is spawned here so feed-event fan-outs reach each target in
    /// trigger order.
    pub fn new(
        roster_source: Arc<dyn RosterSource>,
        store: Arc<dyn AttendanceStore>,
        sink: Arc<dyn NotificationSink>,
        config: Config,
    ) -> Arc<Self> {
        let roster = Arc::new(RosterCache::new(roster_source, config.roster_cache_ttl));
        let dispatcher = Arc::new(NotificationDispatcher::new(
            sink,
            Arc::clone(&roster),
            config.supervisor_role.clone(),
        ));
        let approval = ApprovalWorkflow::new(Arc::clone(&store), Arc::clone(&dispatcher));
        let (conn_tx, conn_rx) = watch::channel(ConnectionState::Connecting);

        // Single consumer: one batch finishes before the next starts, so a
        // clock-in and the matching clock-out cannot reach a supervisor
        // inverted. Ends when the engine is dropped.
        let (notify_tx, mut notify_rx) = mpsc::channel::<NotifyJob>(128);
        let dispatch = Arc::clone(&dispatcher);
        tokio::spawn(async move {
            while let Some(job) = notify_rx.recv().await {
                match job.kind {
                    ActivityKind::ClockIn => dispatch.clocked_in(&job.display_name, job.at).await,
                    ActivityKind::ClockOut => dispatch.clocked_out(&job.display_name, job.at).await,
                };
            }
        });

        Arc::new(Self {
            roster,
            store,
            approval,
            state: RwLock::new(ViewState::new(Local::now().date_naive())),
            notify_tx,
            conn_tx,
            conn_rx,
            config,
        })
    }

    /// Spawns the consumer loop for one viewing session: the feed consumer,
    /// the fixed metrics tick, and the reload poller used while disconnected.
    pub fn run(self: &Arc<Self>, mut feed_rx: mpsc::Receiver<FeedMessage>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        let engine = Arc::clone(self);
        handles.push(tokio::spawn(async move {
            while let Some(msg) = feed_rx.recv().await {
                engine.handle_message(msg).await;
            }
            tracing::info!("Event feed channel closed");
        }));

        let engine = Arc::clone(self);
        let tick = self.config.tick_interval;
        handles.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                engine.recompute_metrics().await;
            }
        }));

        let engine = Arc::clone(self);
        let poll = self.config.reload_interval;
        handles.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(poll);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if engine.connection_state() == ConnectionState::Disconnected {
                    if let Err(e) = engine.refresh().await {
                        tracing::warn!(error = %e, "Periodic reload failed while feed disconnected");
                    }
                }
            }
        }));

        handles
    }

    /// Pre-populates the roster cache so the first reconciliation does not
    /// pay the cold read.
    pub async fn warmup(&self) -> Result<()> {
        self.roster.warmup().await
    }

    /// Switches the viewed date and reloads. Any reload still in flight for
    /// the previous date is invalidated by the generation bump.
    pub async fn set_viewed_date(&self, date: NaiveDate) -> Result<()> {
        let generation = {
            let mut state = self.state.write().await;
            if state.date != date {
                state.date = date;
                state.last_event_seq.clear();
            }
            state.generation += 1;
            state.generation
        };
        self.roster.invalidate();
        self.reload(generation).await
    }

    /// Full reload of the currently viewed date.
    pub async fn refresh(&self) -> Result<()> {
        let generation = self.state.read().await.generation;
        self.reload(generation).await
    }

    pub async fn merged_view(&self) -> Vec<MergedRecord> {
        self.state.read().await.view.clone()
    }

    pub async fn metrics(&self) -> AttendanceMetrics {
        self.state.read().await.metrics.clone()
    }

    pub async fn viewed_date(&self) -> NaiveDate {
        self.state.read().await.date
    }

    /// True while the engine serves a last known-good view after a failed
    /// reload. Consumers show a degraded indicator rather than an error page.
    pub async fn is_stale(&self) -> bool {
        self.state.read().await.stale
    }

    pub async fn recent_activity(&self) -> Vec<ActivityEntry> {
        self.state.read().await.activity.iter().cloned().collect()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.conn_rx.borrow()
    }

    pub async fn approve(&self, record_id: u64, actor_id: u64) -> Result<AttendanceRecord> {
        let record = self.approval.approve(record_id, actor_id).await?;
        self.apply_local_decision(&record).await;
        Ok(record)
    }

    pub async fn reject(
        &self,
        record_id: u64,
        actor_id: u64,
        reason: &str,
    ) -> Result<AttendanceRecord> {
        let record = self.approval.reject(record_id, actor_id, reason).await?;
        self.apply_local_decision(&record).await;
        Ok(record)
    }

    pub async fn handle_message(&self, msg: FeedMessage) {
        match msg {
            FeedMessage::Event(event) => self.apply_event(event).await,
            FeedMessage::Connection(state) => self.set_connection_state(state).await,
        }
    }

    /// Applies one feed event. Idempotent: replays are dropped by event id,
    /// and application is whole-record replacement so even an unnoticed replay
    /// leaves the view unchanged. Events for other dates are ignored.
    pub async fn apply_event(&self, event: AttendanceEvent) {
        let is_insert = event.is_insert();
        let event_id = event.event_id();
        let record = event.into_record();
        let employee_id = record.employee_id;

        let mut notify: Option<(ActivityKind, String, NaiveTime)> = None;
        {
            let mut state = self.state.write().await;

            if record.date != state.date {
                tracing::debug!(employee_id, event_date = %record.date, viewed = %state.date,
                    "Ignoring event for a different date");
                return;
            }
            if state.seen_events.contains(&event_id) {
                tracing::debug!(%event_id, "Ignoring duplicate event replay");
                return;
            }
            state.seen_events.push_back(event_id);
            if state.seen_events.len() > SEEN_EVENTS_CAP {
                state.seen_events.pop_front();
            }

            let prev_check_out = state
                .view
                .iter()
                .find(|m| m.employee_id == employee_id)
                .and_then(|m| m.check_out());
            let check_in = record.check_in;
            let check_out = record.check_out;

            if !merge::upsert_record(&mut state.view, record) {
                tracing::debug!(
                    employee_id,
                    "Event for employee outside current roster; next reload will pick it up"
                );
                return;
            }

            state.applied_seq += 1;
            let seq = state.applied_seq;
            state.last_event_seq.insert(employee_id, seq);

            let display_name = state
                .view
                .iter()
                .find(|m| m.employee_id == employee_id)
                .map(|m| m.display_name.clone())
                .unwrap_or_default();

            if is_insert {
                if let Some(at) = check_in {
                    notify = Some((ActivityKind::ClockIn, display_name, at));
                }
            } else if prev_check_out.is_none() {
                if let Some(at) = check_out {
                    notify = Some((ActivityKind::ClockOut, display_name, at));
                }
            }

            if let Some((kind, ref name, _)) = notify {
                state.activity.push_front(ActivityEntry {
                    kind,
                    employee_id,
                    display_name: name.clone(),
                    at: Utc::now(),
                });
                state.activity.truncate(self.config.activity_log_len);
            }

            Self::recompute_locked(&mut state, self.config.work_start);
        }

        // Queued for the dispatch loop outside the state lock: sink failures
        // never touch the merge path, and enqueue order is delivery order.
        if let Some((kind, display_name, at)) = notify {
            let job = NotifyJob {
                kind,
                display_name,
                at,
            };
            if self.notify_tx.send(job).await.is_err() {
                tracing::warn!("Notification dispatch loop gone; dropping fan-out");
            }
        }
    }

    pub async fn set_connection_state(&self, next: ConnectionState) {
        let prev = *self.conn_rx.borrow();
        if prev == next {
            return;
        }
        self.conn_tx.send_replace(next);
        tracing::info!(from = %prev, to = %next, "Event feed connection state changed");

        // Catch up on anything missed while we were away from the feed.
        if next == ConnectionState::Connected {
            if let Err(e) = self.refresh().await {
                tracing::warn!(error = %e, "Reload after reconnect failed");
            }
        }
    }

    /// Recomputes metrics against the current wall clock. Driven by the fixed
    /// tick so open sessions keep growing without new events.
    pub async fn recompute_metrics(&self) {
        {
            let state = self.state.read().await;
            if !metrics::has_open_sessions(&state.view) {
                return;
            }
        }
        let mut state = self.state.write().await;
        Self::recompute_locked(&mut state, self.config.work_start);
    }

    async fn apply_local_decision(&self, record: &AttendanceRecord) {
        let mut state = self.state.write().await;
        if record.date != state.date {
            return;
        }
        // Optimistic overlay; the repository's own update event (and any full
        // reload) carries the authoritative row and supersedes this.
        if let Some(row) = state
            .view
            .iter_mut()
            .find(|m| m.record.as_ref().map(|r| r.id) == Some(record.id))
        {
            row.record = Some(record.clone());
        }
    }

    /// Full reload stamped with the generation it was issued for. A reload
    /// superseded by a date switch surfaces internally as `StaleWrite` and is
    /// swallowed here; it is not a failure for the caller.
    async fn reload(&self, generation: u64) -> Result<()> {
        match self.reload_snapshot(generation).await {
            Err(EngineError::StaleWrite(reason)) => {
                tracing::debug!(%reason, "Discarding reload for a superseded view");
                Ok(())
            }
            other => other,
        }
    }

    async fn reload_snapshot(&self, generation: u64) -> Result<()> {
        loop {
            let (date, snapshot_seq) = {
                let state = self.state.read().await;
                if state.generation != generation {
                    return Err(EngineError::StaleWrite(format!(
                        "reload generation {generation} superseded by {}",
                        state.generation
                    )));
                }
                (state.date, state.applied_seq)
            };

            let roster = match self.roster.active().await {
                Ok(roster) => roster,
                Err(e) => return self.mark_stale(e).await,
            };
            let records = match self.store.get_by_date(date).await {
                Ok(records) => records,
                Err(e) => return self.mark_stale(e).await,
            };

            // Nobody has checked in on the requested date: switch to the most
            // recent date that has data instead of serving a blank view.
            if records.is_empty() {
                let latest = match self.store.most_recent_date_with_data().await {
                    Ok(latest) => latest,
                    Err(e) => return self.mark_stale(e).await,
                };
                if let Some(latest) = latest {
                    if latest != date {
                        let mut state = self.state.write().await;
                        if state.generation != generation {
                            return Err(EngineError::StaleWrite(format!(
                                "reload generation {generation} superseded by {}",
                                state.generation
                            )));
                        }
                        tracing::info!(requested = %date, fallback = %latest,
                            "No attendance for viewed date; falling back to most recent date with data");
                        state.date = latest;
                        state.last_event_seq.clear();
                        continue;
                    }
                }
            }

            let mut view = merge::reconcile(date, &roster, records);

            let mut state = self.state.write().await;
            if state.generation != generation || state.date != date {
                return Err(EngineError::StaleWrite(format!(
                    "reload of {date} (generation {generation}) superseded"
                )));
            }

            // A reload must not regress an employee past an event applied
            // after this snapshot was taken.
            for row in view.iter_mut() {
                let newer = state
                    .last_event_seq
                    .get(&row.employee_id)
                    .is_some_and(|&seq| seq > snapshot_seq);
                if newer {
                    if let Some(live) = state.view.iter().find(|m| m.employee_id == row.employee_id)
                    {
                        row.date = live.date;
                        row.record = live.record.clone();
                    }
                }
            }
            merge::sort_view(&mut view);

            state.view = view;
            state.stale = false;
            Self::recompute_locked(&mut state, self.config.work_start);
            tracing::debug!(%date, rows = state.view.len(), "Reconciled view refreshed");
            return Ok(());
        }
    }

    async fn mark_stale(&self, e: EngineError) -> Result<()> {
        let mut state = self.state.write().await;
        state.stale = true;
        tracing::warn!(error = %e, "Reload failed; keeping last known-good view");
        Err(e)
    }

    fn recompute_locked(state: &mut ViewState, work_start: NaiveTime) {
        state.metrics = metrics::compute(&state.view, work_start, Local::now().naive_local());
    }
}
