//! Container runtime error types.

use thiserror::Error;

use crate::identity::IdentityError;

/// Errors that can occur while driving the container runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("unparseable runtime output: {0}")]
    Parse(String),

    #[error("container not found: {0}")]
    NotFound(String),

    #[error("image not available: {0}")]
    ImageUnavailable(String),

    #[error(transparent)]
    Identity(#[from] IdentityError),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
