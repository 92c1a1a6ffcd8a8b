//! Change-event adapter.
//!
//! Decodes the backend's loosely-typed realtime payloads into typed
//! `ChangeEvent` messages. Accepted shape:
//!
//! ```json
//! { "eventType": "INSERT", "new": { ...row... }, "old": {} }
//! { "eventType": "DELETE", "new": {}, "old": { "id": "..." } }
//! ```
//!
//! `type`, `record` and `old_record` are accepted as aliases.

use crate::model::bookmark::{BookmarkId, BookmarkRecord, RecordValidationError};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Typed change notification for one bookmark collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Insert(BookmarkRecord),
    Delete(BookmarkId),
    /// Update, bulk or unrecognized change; handled by a full refetch.
    Other { kind: String },
}

/// Payload that cannot be turned into a `ChangeEvent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventDecodeError {
    NotAnObject,
    MissingEventType,
    MalformedRecord(RecordValidationError),
    MissingDeletedId,
}

impl Display for EventDecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAnObject => write!(f, "change payload is not a JSON object"),
            Self::MissingEventType => write!(f, "change payload has no event type"),
            Self::MalformedRecord(err) => write!(f, "change payload record: {err}"),
            Self::MissingDeletedId => write!(f, "delete payload has no old record id"),
        }
    }
}

impl Error for EventDecodeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::MalformedRecord(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RecordValidationError> for EventDecodeError {
    fn from(value: RecordValidationError) -> Self {
        Self::MalformedRecord(value)
    }
}

/// Decodes one realtime payload.
pub fn decode_change(payload: &Value) -> Result<ChangeEvent, EventDecodeError> {
    let object = payload.as_object().ok_or(EventDecodeError::NotAnObject)?;
    let kind = object
        .get("eventType")
        .or_else(|| object.get("type"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|kind| !kind.is_empty())
        .ok_or(EventDecodeError::MissingEventType)?;

    match kind.to_ascii_uppercase().as_str() {
        "INSERT" => {
            let row = object
                .get("new")
                .or_else(|| object.get("record"))
                .unwrap_or(&Value::Null);
            Ok(ChangeEvent::Insert(BookmarkRecord::from_value(row)?))
        }
        "DELETE" => {
            let old = object.get("old").or_else(|| object.get("old_record"));
            let id = match old.and_then(|row| row.get("id")) {
                Some(Value::String(text)) if !text.trim().is_empty() => text.clone(),
                Some(Value::Number(number)) => number.to_string(),
                _ => return Err(EventDecodeError::MissingDeletedId),
            };
            Ok(ChangeEvent::Delete(BookmarkId::new(id)))
        }
        _ => Ok(ChangeEvent::Other {
            kind: kind.to_ascii_lowercase(),
        }),
    }
}
