//! Task records — pending provisioning work.
//!
//! A task is stored durably under `Task-<suffix>` with the value
//! `<action> <target-identity> <image> <count>`, drained into the dispatch
//! queue, and handed to exactly one agent.

use std::fmt;

use thiserror::Error;

use dockyard_runtime::command::parse_count;
use dockyard_runtime::identity::generate_suffix;
use dockyard_runtime::{Action, CommandError, IdentityError, logical_name};

/// Base name for task keys; keys look like `Task-<suffix>`.
pub const TASK_BASE: &str = "Task";

/// Prefix every durable task key starts with.
pub const TASK_PREFIX: &str = "Task-";

/// Errors decoding a task payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("expected 4 fields, got {got}: {raw:?}")]
    FieldCount { got: usize, raw: String },

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("bad target: {0}")]
    Target(#[from] IdentityError),
}

/// A decoded task payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    pub action: Action,
    /// Identity of the container the task produces.
    pub target: String,
    pub image: String,
    pub count: u32,
}

impl TaskSpec {
    /// A `create` task for one container.
    pub fn create(target: String, image: String) -> Self {
        Self {
            action: Action::Create,
            target,
            image,
            count: 1,
        }
    }

    /// Strictly decode a stored payload.
    pub fn parse(raw: &str) -> Result<Self, TaskError> {
        let fields: Vec<&str> = raw.split_whitespace().collect();
        let [action, target, image, count] = fields.as_slice() else {
            return Err(TaskError::FieldCount {
                got: fields.len(),
                raw: raw.to_string(),
            });
        };
        logical_name(target)?;
        Ok(Self {
            action: action.parse()?,
            target: target.to_string(),
            image: image.to_string(),
            count: parse_count(count)?,
        })
    }

    /// Parameters handed to the agent: `<target> <image> <count>`.
    pub fn params(&self) -> String {
        format!("{} {} {}", self.target, self.image, self.count)
    }

    /// Logical name (service) the target belongs to.
    pub fn service(&self) -> &str {
        // Validated at construction by `parse`; `create` callers pass
        // identities minted by `new_identity`.
        logical_name(&self.target).unwrap_or(&self.target)
    }
}

impl fmt::Display for TaskSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.action, self.params())
    }
}

/// Mint a fresh durable task key.
pub fn new_task_key() -> String {
    format!("{TASK_PREFIX}{}", generate_suffix())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockyard_runtime::new_identity;

    #[test]
    fn parse_and_display() {
        let target = new_identity("web").unwrap();
        let raw = format!("create {target} nginx:alpine 1");
        let task = TaskSpec::parse(&raw).unwrap();

        assert_eq!(task.action, Action::Create);
        assert_eq!(task.service(), "web");
        assert_eq!(task.params(), format!("{target} nginx:alpine 1"));
        assert_eq!(task.to_string(), raw);
    }

    #[test]
    fn wrong_field_count_is_rejected() {
        assert!(matches!(
            TaskSpec::parse("create web-abcdefghijklmnopqrst nginx"),
            Err(TaskError::FieldCount { got: 3, .. })
        ));
        assert!(matches!(TaskSpec::parse(""), Err(TaskError::FieldCount { got: 0, .. })));
        assert!(TaskSpec::parse("create web-abcdefghijklmnopqrst nginx 1 extra").is_err());
    }

    #[test]
    fn bad_fields_are_rejected() {
        assert!(matches!(
            TaskSpec::parse("launch web-abcdefghijklmnopqrst nginx 1"),
            Err(TaskError::Command(CommandError::UnknownAction(_)))
        ));
        assert!(matches!(
            TaskSpec::parse("create web nginx 1"),
            Err(TaskError::Target(_))
        ));
        assert!(matches!(
            TaskSpec::parse("create web-abcdefghijklmnopqrst nginx many"),
            Err(TaskError::Command(CommandError::InvalidCount(_)))
        ));
    }

    #[test]
    fn task_keys_carry_prefix() {
        let key = new_task_key();
        assert!(key.starts_with(TASK_PREFIX));
        assert_eq!(logical_name(&key).unwrap(), TASK_BASE);
    }
}
