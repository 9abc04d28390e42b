//! Reconciliation loops that run inside the control plane.
//!
//! - [`DispatchDrainer`] moves durable `Task-*` records into the dispatch
//!   queue. Once a task is queued its durable key is deleted, so a crash
//!   after that point loses the task.
//! - [`NodeAuditor`] compares the registered node roster with the node
//!   containers the runtime reports as running, and logs divergence. It
//!   does not reschedule anything by itself; a [`NodeFailureCallback`] can
//!   be attached to act on missing nodes (for example
//!   [`ControlPlane::evacuate_node`](crate::ControlPlane::evacuate_node)).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use dockyard_runtime::{ContainerRuntime, ListScope, logical_name};

use crate::error::ClusterResult;
use crate::model::ClusterModel;
use crate::queue::DispatchQueue;
use crate::task::TaskSpec;

/// Reference interval of the drain loop.
pub const DEFAULT_DRAIN_INTERVAL: Duration = Duration::from_secs(5);

/// Reference interval of the node audit loop.
pub const DEFAULT_AUDIT_INTERVAL: Duration = Duration::from_secs(3);

/// Logical name of node containers.
pub const DEFAULT_NODE_PREFIX: &str = "node";

/// Callback invoked with the ids of registered nodes that are not live.
pub type NodeFailureCallback = Arc<dyn Fn(Vec<String>) -> BoxFuture + Send + Sync>;

/// Future returned by a [`NodeFailureCallback`].
pub type BoxFuture = std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>;

// ── Drain ──────────────────────────────────────────────────────────

/// Periodically moves durable tasks into the dispatch queue.
pub struct DispatchDrainer {
    model: ClusterModel,
    queue: DispatchQueue,
    interval: Duration,
}

impl DispatchDrainer {
    pub fn new(model: ClusterModel, queue: DispatchQueue) -> Self {
        Self {
            model,
            queue,
            interval: DEFAULT_DRAIN_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// One pass over every durable task, in store order. Waits whenever
    /// the queue is full. Returns the number of tasks queued.
    pub async fn drain_once(&self) -> ClusterResult<usize> {
        let store = self.model.store();
        let mut queued = 0;

        for key in self.model.pending_tasks()? {
            let raw = match store.get(&key) {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(e) => {
                    warn!(%key, error = %e, "failed to read task");
                    continue;
                }
            };

            match TaskSpec::parse(&raw) {
                Ok(task) => {
                    self.queue.push(task).await?;
                    queued += 1;
                    debug!(%key, "task queued");
                }
                Err(e) => {
                    warn!(%key, %raw, error = %e, "dropping malformed task");
                }
            }

            if let Err(e) = store.delete(&key) {
                warn!(%key, error = %e, "failed to delete drained task");
            }
        }

        if queued > 0 {
            info!(queued, depth = self.queue.len(), "tasks drained into dispatch queue");
        }
        Ok(queued)
    }

    /// Drain on every tick until shutdown.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(interval = ?self.interval, "dispatch drain loop started");
        loop {
            tokio::select! {
                result = self.drain_once() => {
                    if let Err(e) = result {
                        warn!(error = %e, "dispatch drain failed");
                    }
                }
                _ = shutdown.changed() => break,
            }
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.changed() => break,
            }
        }
        info!("dispatch drain loop stopped");
    }
}

// ── Node audit ─────────────────────────────────────────────────────

/// Outcome of one audit pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeAudit {
    /// Registered node ids.
    pub desired: Vec<String>,
    /// Running node containers (identities).
    pub live: Vec<String>,
    /// Registered ids matching no running node container.
    pub missing: Vec<String>,
}

impl NodeAudit {
    pub fn diverged(&self) -> bool {
        !self.missing.is_empty() || self.live.len() != self.desired.len()
    }
}

/// Periodically checks the node roster against live node containers.
pub struct NodeAuditor {
    model: ClusterModel,
    runtime: Arc<dyn ContainerRuntime>,
    node_prefix: String,
    interval: Duration,
    on_failure: Option<NodeFailureCallback>,
}

impl NodeAuditor {
    pub fn new(model: ClusterModel, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            model,
            runtime,
            node_prefix: DEFAULT_NODE_PREFIX.to_string(),
            interval: DEFAULT_AUDIT_INTERVAL,
            on_failure: None,
        }
    }

    pub fn with_node_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.node_prefix = prefix.into();
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Act on missing nodes. Without a callback the audit only logs.
    pub fn with_callback(mut self, callback: NodeFailureCallback) -> Self {
        self.on_failure = Some(callback);
        self
    }

    /// One comparison of roster against runtime.
    ///
    /// A registered id counts as live if it equals a running node
    /// container's identity, its short runtime id (the default hostname
    /// agents register under), or its IP address.
    pub async fn audit_once(&self) -> ClusterResult<NodeAudit> {
        let desired = self.model.nodes()?;

        let mut live = Vec::new();
        let mut live_keys = HashSet::new();
        for container in self.runtime.list(ListScope::Running).await? {
            if !logical_name(&container.identity).is_ok_and(|name| name == self.node_prefix) {
                continue;
            }
            match self.runtime.inspect_ip(&container.identity).await {
                Ok(Some(ip)) => {
                    live_keys.insert(ip);
                }
                Ok(None) => {}
                Err(e) => debug!(node = %container.identity, error = %e, "no address for node"),
            }
            if !container.id.is_empty() {
                live_keys.insert(container.id.clone());
            }
            live_keys.insert(container.identity.clone());
            live.push(container.identity);
        }

        let missing = desired
            .iter()
            .filter(|node| !live_keys.contains(*node))
            .cloned()
            .collect();

        Ok(NodeAudit {
            desired,
            live,
            missing,
        })
    }

    /// Audit on every tick until shutdown.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.interval);
        info!(interval = ?self.interval, prefix = %self.node_prefix, "node audit loop started");
        loop {
            tokio::select! {
                _ = interval.tick() => self.tick().await,
                _ = shutdown.changed() => break,
            }
        }
        info!("node audit loop stopped");
    }

    async fn tick(&self) {
        match self.audit_once().await {
            Ok(audit) if audit.diverged() => {
                warn!(
                    desired = audit.desired.len(),
                    live = audit.live.len(),
                    missing = ?audit.missing,
                    "node roster diverged from live nodes"
                );
                if let (Some(cb), false) = (&self.on_failure, audit.missing.is_empty()) {
                    cb(audit.missing).await;
                }
            }
            Ok(audit) => debug!(nodes = audit.desired.len(), "all nodes live"),
            Err(e) => warn!(error = %e, "node audit failed"),
        }
    }
}
