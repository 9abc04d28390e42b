//! Cluster error types.

use thiserror::Error;

use dockyard_runtime::{IdentityError, RuntimeError};
use dockyard_state::StateError;

use crate::task::TaskError;

/// Errors that can occur in control-plane and agent operations.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("state store error: {0}")]
    State(#[from] StateError),

    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("container runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("malformed task: {0}")]
    Task(#[from] TaskError),

    #[error("invalid {kind} name {name:?}")]
    InvalidName { kind: &'static str, name: String },

    #[error("{kind} name {name:?} is already a registered {owner}")]
    NameTaken {
        kind: &'static str,
        name: String,
        owner: &'static str,
    },

    #[error("invalid image {0:?}")]
    InvalidImage(String),

    #[error("replica count must be at least 1, got {0}")]
    InvalidReplicas(u32),

    #[error("dispatch queue closed")]
    QueueClosed,
}

pub type ClusterResult<T> = Result<T, ClusterError>;
