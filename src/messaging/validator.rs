//! Change-event validation
//!
//! Pure checks on a decoded [`ChangeEvent`]. All rules run independently and
//! every violation is reported; an empty list means the event is valid.

use crate::domain::{ChangeEvent, MessageType};

pub const MESSAGE_MISSING: &str = "Message must not be null";
pub const USERNAME_REQUIRED: &str = "Username is required";
pub const FIRST_NAME_REQUIRED: &str = "First name is required";
pub const LAST_NAME_REQUIRED: &str = "Last name is required";
pub const YEAR_NOT_POSITIVE: &str = "Year must be a positive number";
pub const MONTH_OUT_OF_RANGE: &str = "Month must be between 1 and 12";
pub const MESSAGE_TYPE_REQUIRED: &str = "Message type is required";
pub const DURATION_NOT_POSITIVE: &str = "Duration must be positive for CREATE_UPDATE messages";

/// Separator used when violations are joined into a dead-letter reason
pub const VIOLATION_SEPARATOR: &str = "; ";

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Collect every rule violation of `event`
pub fn validate(event: Option<&ChangeEvent>) -> Vec<String> {
    let Some(event) = event else {
        return vec![MESSAGE_MISSING.to_string()];
    };

    let mut violations = Vec::new();

    if is_blank(&event.username) {
        violations.push(USERNAME_REQUIRED);
    }
    if is_blank(&event.first_name) {
        violations.push(FIRST_NAME_REQUIRED);
    }
    if is_blank(&event.last_name) {
        violations.push(LAST_NAME_REQUIRED);
    }
    if event.year <= 0 {
        violations.push(YEAR_NOT_POSITIVE);
    }
    if !(1..=12).contains(&event.month) {
        violations.push(MONTH_OUT_OF_RANGE);
    }

    match event.message_type {
        None => violations.push(MESSAGE_TYPE_REQUIRED),
        Some(MessageType::CreateUpdate) if event.duration_minutes <= 0 => {
            violations.push(DURATION_NOT_POSITIVE)
        }
        Some(_) => {}
    }

    violations.into_iter().map(String::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> ChangeEvent {
        ChangeEvent::create_update("alice", "Alice", "Smith", true, 2025, 5, 60)
    }

    #[test]
    fn test_valid_event_has_no_violations() {
        assert!(validate(Some(&valid())).is_empty());
        assert!(validate(Some(&ChangeEvent::delete("alice", "Alice", "Smith", 2025, 5))).is_empty());
    }

    #[test]
    fn test_absent_event_short_circuits() {
        assert_eq!(validate(None), vec![MESSAGE_MISSING.to_string()]);
    }

    #[test]
    fn test_missing_username() {
        let mut event = valid();
        event.username = String::new();
        assert_eq!(validate(Some(&event)), vec![USERNAME_REQUIRED.to_string()]);
    }

    #[test]
    fn test_whitespace_counts_as_empty() {
        let mut event = valid();
        event.first_name = "   ".to_string();
        event.last_name = "\t".to_string();
        assert_eq!(
            validate(Some(&event)),
            vec![FIRST_NAME_REQUIRED.to_string(), LAST_NAME_REQUIRED.to_string()]
        );
    }

    #[test]
    fn test_all_violations_collected() {
        let event = ChangeEvent {
            username: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            year: 0,
            month: 13,
            message_type: None,
            ..valid()
        };

        let violations = validate(Some(&event));
        assert_eq!(violations.len(), 6);
        assert_eq!(violations.last().map(String::as_str), Some(MESSAGE_TYPE_REQUIRED));
    }

    #[test]
    fn test_duration_rule_only_for_create_update() {
        let mut event = valid();
        event.duration_minutes = 0;
        assert_eq!(validate(Some(&event)), vec![DURATION_NOT_POSITIVE.to_string()]);

        event.message_type = Some(MessageType::Delete);
        assert!(validate(Some(&event)).is_empty());
    }

    #[test]
    fn test_month_bounds() {
        for month in [0, -1, 13] {
            let mut event = valid();
            event.month = month;
            assert_eq!(validate(Some(&event)), vec![MONTH_OUT_OF_RANGE.to_string()]);
        }
    }
}
