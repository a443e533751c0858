use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{Display, EnumString};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::model::AttendanceRecord;

/// Event feed connection state, observable by consumers for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    Connected,
    Connecting,
    Disconnected,
}

/// A validated change notification over the attendance repository. Delivery is
/// at-least-once and possibly out of order; each event carries the full record
/// so applying one is a whole-record replacement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AttendanceEvent {
    Inserted {
        event_id: Uuid,
        record: AttendanceRecord,
    },
    Updated {
        event_id: Uuid,
        record: AttendanceRecord,
    },
}

impl AttendanceEvent {
    pub fn event_id(&self) -> Uuid {
        match self {
            AttendanceEvent::Inserted { event_id, .. } => *event_id,
            AttendanceEvent::Updated { event_id, .. } => *event_id,
        }
    }

    pub fn record(&self) -> &AttendanceRecord {
        match self {
            AttendanceEvent::Inserted { record, .. } => record,
            AttendanceEvent::Updated { record, .. } => record,
        }
    }

    pub fn into_record(self) -> AttendanceRecord {
        match self {
            AttendanceEvent::Inserted { record, .. } => record,
            AttendanceEvent::Updated { record, .. } => record,
        }
    }

    pub fn is_insert(&self) -> bool {
        matches!(self, AttendanceEvent::Inserted { .. })
    }
}

/// What the feed adapter hands to the engine.
#[derive(Debug, Clone)]
pub enum FeedMessage {
    Event(AttendanceEvent),
    Connection(ConnectionState),
}

/// Parses a loosely-shaped change payload (`{"eventType": "INSERT"|"UPDATE",
/// "new": {...}}`) into a typed event, rejecting anything missing the required
/// fields. Validation happens here, at the boundary, so the engine only ever
/// sees well-formed events.
pub fn parse_payload(payload: &Value) -> Result<AttendanceEvent> {
    let event_type = payload
        .get("eventType")
        .and_then(Value::as_str)
        .ok_or_else(|| EngineError::InvalidInput("feed payload missing eventType".to_string()))?;

    let new = payload
        .get("new")
        .filter(|v| v.is_object())
        .ok_or_else(|| EngineError::InvalidInput("feed payload missing new row".to_string()))?;

    for field in ["id", "employee_id", "date"] {
        if new.get(field).map_or(true, Value::is_null) {
            return Err(EngineError::InvalidInput(format!(
                "feed payload missing required field {field}"
            )));
        }
    }

    let record: AttendanceRecord = serde_json::from_value(new.clone())
        .map_err(|e| EngineError::InvalidInput(format!("malformed feed payload: {e}")))?;

    // Replayed deliveries of the same upstream event reuse its id, which is
    // what duplicate detection keys on.
    let event_id = payload
        .get("event_id")
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);

    match event_type {
        "INSERT" => Ok(AttendanceEvent::Inserted { event_id, record }),
        "UPDATE" => Ok(AttendanceEvent::Updated { event_id, record }),
        other => Err(EngineError::InvalidInput(format!(
            "unknown feed event type {other}"
        ))),
    }
}
