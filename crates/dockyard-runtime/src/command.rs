//! The command grammar shared by the control plane and node agents.
//!
//! Commands travel as an action word plus a space-separated, positional
//! parameter string:
//!
//! ```text
//! create   <identity> <image> [count]
//! recreate <old-identity> <new-identity> <image>
//! delete   <identity>
//! ```
//!
//! Parsing is strict: any other field count is rejected.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Errors from decoding an action or its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown action {0:?}")]
    UnknownAction(String),

    #[error("`{action}` expects {expected} parameters, got {got}: {params:?}")]
    FieldCount {
        action: Action,
        expected: &'static str,
        got: usize,
        params: String,
    },

    #[error("invalid replica count {0:?}")]
    InvalidCount(String),
}

/// What an agent is asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Create,
    Recreate,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Recreate => "recreate",
            Action::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Action::Create),
            "recreate" => Ok(Action::Recreate),
            "delete" => Ok(Action::Delete),
            other => Err(CommandError::UnknownAction(other.to_string())),
        }
    }
}

/// A fully decoded command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Create {
        identity: String,
        image: String,
        replicas: u32,
    },
    Recreate {
        old: String,
        new: String,
        image: String,
    },
    Delete {
        identity: String,
    },
}

impl Command {
    /// Decode an action word and its parameter string.
    pub fn parse(action: &str, params: &str) -> Result<Self, CommandError> {
        let action: Action = action.parse()?;
        let fields: Vec<&str> = params.split_whitespace().collect();
        let wrong_count = |expected| CommandError::FieldCount {
            action,
            expected,
            got: fields.len(),
            params: params.to_string(),
        };

        match (action, fields.as_slice()) {
            (Action::Create, [identity, image]) => Ok(Command::Create {
                identity: identity.to_string(),
                image: image.to_string(),
                replicas: 1,
            }),
            (Action::Create, [identity, image, count]) => Ok(Command::Create {
                identity: identity.to_string(),
                image: image.to_string(),
                replicas: parse_count(count)?,
            }),
            (Action::Create, _) => Err(wrong_count("2 or 3")),
            (Action::Recreate, [old, new, image]) => Ok(Command::Recreate {
                old: old.to_string(),
                new: new.to_string(),
                image: image.to_string(),
            }),
            (Action::Recreate, _) => Err(wrong_count("3")),
            (Action::Delete, [identity]) => Ok(Command::Delete {
                identity: identity.to_string(),
            }),
            (Action::Delete, _) => Err(wrong_count("1")),
        }
    }

    pub fn action(&self) -> Action {
        match self {
            Command::Create { .. } => Action::Create,
            Command::Recreate { .. } => Action::Recreate,
            Command::Delete { .. } => Action::Delete,
        }
    }

    /// Encode the parameter string.
    pub fn params(&self) -> String {
        match self {
            Command::Create {
                identity,
                image,
                replicas,
            } => format!("{identity} {image} {replicas}"),
            Command::Recreate { old, new, image } => format!("{old} {new} {image}"),
            Command::Delete { identity } => identity.clone(),
        }
    }
}

/// Parse a replica count; must be a positive integer.
pub fn parse_count(raw: &str) -> Result<u32, CommandError> {
    match raw.parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(CommandError::InvalidCount(raw.to_string())),
    }
}
