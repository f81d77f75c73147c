//! Change Events
//!
//! Wire contract of the workload change-event consumed from the ingestion
//! queue, plus the header names used on dead-lettered copies.

use serde::{Deserialize, Serialize};

/// Current schema version of [`ChangeEvent`]
pub const CHANGE_EVENT_SCHEMA_VERSION: u32 = 1;

/// Header carrying the failure reason on a dead-lettered message
pub const HEADER_ERROR_REASON: &str = "error.reason";

/// Header carrying the correlation ID of the failed message
pub const HEADER_ORIGINAL_TRANSACTION_ID: &str = "original.transaction.id";

/// Header carrying the failure time (epoch millis)
pub const HEADER_ERROR_TIMESTAMP: &str = "error.timestamp";

/// Transport header that may carry a correlation ID
pub const HEADER_CORRELATION_ID: &str = "correlationId";

/// Kind of change described by a [`ChangeEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    CreateUpdate,
    Delete,
    /// Any value this service does not know how to handle
    #[serde(other)]
    Unknown,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::CreateUpdate => "CREATE_UPDATE",
            MessageType::Delete => "DELETE",
            MessageType::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Workload change for one (trainer, year, month).
///
/// Every field is defaulted on decode so that incomplete payloads reach the
/// validator instead of failing as malformed JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub year: i32,
    #[serde(default)]
    pub month: i32,
    #[serde(default)]
    pub duration_minutes: i64,
    #[serde(default)]
    pub message_type: Option<MessageType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

fn default_schema_version() -> u32 {
    CHANGE_EVENT_SCHEMA_VERSION
}

impl ChangeEvent {
    /// Build a CREATE_UPDATE event
    pub fn create_update(
        username: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        active: bool,
        year: i32,
        month: i32,
        duration_minutes: i64,
    ) -> Self {
        Self {
            schema_version: CHANGE_EVENT_SCHEMA_VERSION,
            username: username.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            active,
            year,
            month,
            duration_minutes,
            message_type: Some(MessageType::CreateUpdate),
            correlation_id: None,
        }
    }

    /// Build a DELETE event
    pub fn delete(
        username: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        year: i32,
        month: i32,
    ) -> Self {
        Self {
            message_type: Some(MessageType::Delete),
            ..Self::create_update(username, first_name, last_name, false, year, month, 0)
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Month as an unsigned value; only meaningful after validation
    pub fn month_number(&self) -> u32 {
        u32::try_from(self.month).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_camel_case_payload() {
        let payload = json!({
            "username": "alice",
            "firstName": "Alice",
            "lastName": "Smith",
            "active": true,
            "year": 2025,
            "month": 5,
            "durationMinutes": 60,
            "messageType": "CREATE_UPDATE",
            "correlationId": "corr-1"
        });

        let event: ChangeEvent = serde_json::from_value(payload).unwrap();
        assert_eq!(event.username, "alice");
        assert_eq!(event.first_name, "Alice");
        assert_eq!(event.duration_minutes, 60);
        assert_eq!(event.message_type, Some(MessageType::CreateUpdate));
        assert_eq!(event.correlation_id.as_deref(), Some("corr-1"));
        assert_eq!(event.schema_version, CHANGE_EVENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_unknown_message_type_decodes() {
        let event: ChangeEvent =
            serde_json::from_value(json!({ "messageType": "ARCHIVE" })).unwrap();
        assert_eq!(event.message_type, Some(MessageType::Unknown));
    }

    #[test]
    fn test_missing_fields_default() {
        let event: ChangeEvent = serde_json::from_value(json!({})).unwrap();
        assert!(event.username.is_empty());
        assert_eq!(event.year, 0);
        assert!(event.message_type.is_none());
    }

    #[test]
    fn test_delete_builder() {
        let event = ChangeEvent::delete("bob", "Bob", "Jones", 2024, 12);
        assert_eq!(event.message_type, Some(MessageType::Delete));
        assert_eq!(event.duration_minutes, 0);
        assert_eq!(event.month_number(), 12);
    }

    #[test]
    fn test_negative_month_number_is_zero() {
        let mut event = ChangeEvent::delete("bob", "Bob", "Jones", 2024, 1);
        event.month = -4;
        assert_eq!(event.month_number(), 0);
    }
}
