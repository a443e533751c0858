//! Roster/attendance reconciliation engine for the HRM dashboard.
//!
//! Merges the active employee roster with the attendance repository into a
//! complete, gap-free, sorted view for one viewed date, keeps it current from
//! an at-least-once change feed, recomputes live metrics on a fixed tick, and
//! runs the attendance approval workflow with best-effort notification
//! fan-out. Consumed in-process; it owns no HTTP surface or wire format.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod feed;
pub mod model;
pub mod notify;
pub mod store;

pub use config::Config;
pub use engine::{ActivityEntry, ActivityKind, AttendanceMetrics, ReconciliationEngine};
pub use error::{EngineError, Result};
pub use feed::{AttendanceEvent, ConnectionState, FeedMessage};
pub use model::{
    ApprovalStatus, AttendanceRecord, EffectiveStatus, Employee, MergedRecord,
    NotificationRequest, StoredStatus,
};
