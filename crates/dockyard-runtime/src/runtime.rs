//! The container runtime capability.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RuntimeResult;

/// State string reported by the runtime for a healthy container.
pub const RUNNING: &str = "running";

/// Which containers a listing should include.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListScope {
    /// Every container, whatever its state.
    All,
    /// Only running containers.
    Running,
}

/// A container as observed by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    /// Container name, which doubles as its Dockyard identity.
    pub identity: String,
    /// Short runtime id; docker also uses it as the default hostname.
    #[serde(default)]
    pub id: String,
    pub image: String,
    /// Runtime state (`running`, `exited`, `created`, ...).
    pub state: String,
    /// Human-readable uptime/status line.
    pub uptime: String,
}

impl ContainerInfo {
    pub fn is_running(&self) -> bool {
        self.state == RUNNING
    }
}

/// Operations Dockyard needs from a container runtime.
///
/// Implementations must be safe to call concurrently from several loops.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Enumerate containers visible to this runtime.
    async fn list(&self, scope: ListScope) -> RuntimeResult<Vec<ContainerInfo>>;

    /// Whether `image` is present locally.
    async fn image_exists(&self, image: &str) -> RuntimeResult<bool>;

    /// Fetch `image` from its registry.
    async fn pull_image(&self, image: &str) -> RuntimeResult<()>;

    /// Create and start a container called `name` from `image`.
    async fn run(&self, name: &str, image: &str) -> RuntimeResult<()>;

    /// Stop a running container.
    async fn stop(&self, identity: &str) -> RuntimeResult<()>;

    /// Remove a container, stopping it first if needed.
    async fn remove(&self, identity: &str) -> RuntimeResult<()>;

    /// IP address of a container, if it has one.
    async fn inspect_ip(&self, identity: &str) -> RuntimeResult<Option<String>>;
}
