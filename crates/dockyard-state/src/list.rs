//! List records — space-separated value lists stored under a single key.
//!
//! Membership is by whole-token equality, never substring match, so
//! `svc-a` is not considered present in `svc-ab`.

use crate::error::{StateError, StateResult};

/// Separator between values of a list record.
pub const LIST_SEPARATOR: char = ' ';

/// Split a stored list record into its values. Empty tokens are skipped.
pub fn split(raw: &str) -> Vec<String> {
    raw.split(LIST_SEPARATOR)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

/// Join values back into the stored representation.
pub fn join(values: &[String]) -> String {
    values.join(" ")
}

/// Reject values that would corrupt the record encoding.
pub fn validate_value(value: &str) -> StateResult<()> {
    if value.is_empty() || value.chars().any(char::is_whitespace) {
        return Err(StateError::InvalidListValue(value.to_string()));
    }
    Ok(())
}

/// Append `value` unless it is already present. Returns true if appended.
pub fn append_value(values: &mut Vec<String>, value: &str) -> bool {
    if values.iter().any(|v| v == value) {
        return false;
    }
    values.push(value.to_string());
    true
}

/// Remove every occurrence of `value`. Returns true if anything was removed.
pub fn eject_value(values: &mut Vec<String>, value: &str) -> bool {
    let before = values.len();
    values.retain(|v| v != value);
    values.len() != before
}
