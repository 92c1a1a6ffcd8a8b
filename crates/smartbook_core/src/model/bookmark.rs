//! Bookmark domain model.
//!
//! # Responsibility
//! - Define the canonical bookmark record and its insert request shape.
//! - Convert untyped JSON rows into validated records.
//!
//! # Invariants
//! - `id`, `url` and `owner_id` are never empty on a validated record.
//! - `created_at` is Unix epoch milliseconds.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const PLACEHOLDER_PREFIX: &str = "local-";

/// Opaque bookmark identifier assigned by the remote gateway.
///
/// Its contents are never interpreted; placeholders minted for in-flight
/// inserts are tracked by the core that issued them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookmarkId(String);

impl BookmarkId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Mints a provisional id for an optimistic insert.
    pub fn placeholder() -> Self {
        Self(format!("{PLACEHOLDER_PREFIX}{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for BookmarkId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BookmarkId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for BookmarkId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Validation error for bookmark payloads and insert requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordValidationError {
    NotAnObject,
    MissingField(&'static str),
    EmptyField(&'static str),
    InvalidField {
        field: &'static str,
        message: String,
    },
}

impl Display for RecordValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAnObject => write!(f, "bookmark payload is not a JSON object"),
            Self::MissingField(field) => write!(f, "bookmark field `{field}` is missing"),
            Self::EmptyField(field) => write!(f, "bookmark field `{field}` is empty"),
            Self::InvalidField { field, message } => {
                write!(f, "bookmark field `{field}` is invalid: {message}")
            }
        }
    }
}

impl Error for RecordValidationError {}

/// Canonical bookmark record as committed by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookmarkRecord {
    pub id: BookmarkId,
    pub title: String,
    pub url: String,
    pub owner_id: String,
    /// Unix epoch milliseconds.
    pub created_at: i64,
}

impl BookmarkRecord {
    /// Checks required fields on an already-typed record.
    pub fn validate(&self) -> Result<(), RecordValidationError> {
        if self.id.as_str().trim().is_empty() {
            return Err(RecordValidationError::EmptyField("id"));
        }
        if self.url.trim().is_empty() {
            return Err(RecordValidationError::EmptyField("url"));
        }
        if self.owner_id.trim().is_empty() {
            return Err(RecordValidationError::EmptyField("owner_id"));
        }
        Ok(())
    }

    /// Builds a validated record from an untyped gateway row.
    ///
    /// Accepts numeric or string ids, `owner_id` or `user_id` for the owner,
    /// and `created_at` as epoch milliseconds or an RFC 3339 string.
    pub fn from_value(value: &Value) -> Result<Self, RecordValidationError> {
        let object = value.as_object().ok_or(RecordValidationError::NotAnObject)?;

        let id = match object.get("id") {
            Some(Value::String(text)) => text.clone(),
            Some(Value::Number(number)) => number.to_string(),
            Some(Value::Null) | None => return Err(RecordValidationError::MissingField("id")),
            Some(_) => {
                return Err(RecordValidationError::InvalidField {
                    field: "id",
                    message: "expected string or number".to_string(),
                })
            }
        };

        let owner_id = match object.get("owner_id") {
            Some(_) => required_string(object, "owner_id")?,
            None => required_string(object, "user_id").map_err(|err| match err {
                RecordValidationError::MissingField(_) => {
                    RecordValidationError::MissingField("owner_id")
                }
                other => other,
            })?,
        };

        let record = Self {
            id: BookmarkId::new(id),
            title: required_string(object, "title")?,
            url: required_string(object, "url")?,
            owner_id,
            created_at: parse_created_at(object.get("created_at"))?,
        };
        record.validate()?;
        Ok(record)
    }

    /// Serializes the record into the gateway row shape.
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "id": self.id.as_str(),
            "title": self.title,
            "url": self.url,
            "owner_id": self.owner_id,
            "created_at": self.created_at,
        })
    }
}

/// Insert request fields; the gateway assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBookmark {
    pub title: String,
    pub url: String,
    pub owner_id: String,
}

impl NewBookmark {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        owner_id: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            owner_id: owner_id.into(),
        }
    }

    pub fn validate(&self) -> Result<(), RecordValidationError> {
        if self.title.trim().is_empty() {
            return Err(RecordValidationError::EmptyField("title"));
        }
        if self.url.trim().is_empty() {
            return Err(RecordValidationError::EmptyField("url"));
        }
        if self.owner_id.trim().is_empty() {
            return Err(RecordValidationError::EmptyField("owner_id"));
        }
        Ok(())
    }

    /// Projects the request into a provisional record for optimistic display.
    pub fn to_provisional(&self, id: BookmarkId, created_at: i64) -> BookmarkRecord {
        BookmarkRecord {
            id,
            title: self.title.clone(),
            url: self.url.clone(),
            owner_id: self.owner_id.clone(),
            created_at,
        }
    }
}

fn required_string(
    object: &Map<String, Value>,
    field: &'static str,
) -> Result<String, RecordValidationError> {
    match object.get(field) {
        Some(Value::String(text)) => Ok(text.clone()),
        Some(Value::Null) | None => Err(RecordValidationError::MissingField(field)),
        Some(_) => Err(RecordValidationError::InvalidField {
            field,
            message: "expected string".to_string(),
        }),
    }
}

fn parse_created_at(value: Option<&Value>) -> Result<i64, RecordValidationError> {
    match value {
        Some(Value::Number(number)) => {
            number
                .as_i64()
                .ok_or_else(|| RecordValidationError::InvalidField {
                    field: "created_at",
                    message: format!("`{number}` is not an integer millisecond timestamp"),
                })
        }
        Some(Value::String(text)) => DateTime::parse_from_rfc3339(text)
            .map(|parsed| parsed.timestamp_millis())
            .map_err(|err| RecordValidationError::InvalidField {
                field: "created_at",
                message: err.to_string(),
            }),
        Some(Value::Null) | None => Err(RecordValidationError::MissingField("created_at")),
        Some(_) => Err(RecordValidationError::InvalidField {
            field: "created_at",
            message: "expected number or RFC 3339 string".to_string(),
        }),
    }
}
