pub mod attendance;
pub mod employee;
pub mod notification;

pub use attendance::{
    ApprovalStatus, AttendanceRecord, EffectiveStatus, MergedRecord, StoredStatus,
};
pub use employee::Employee;
pub use notification::NotificationRequest;
