//! Node agent — client-side cluster participation.
//!
//! The agent runs on each worker node and talks to the control plane's
//! `Dockyard` service. It registers once, then runs two independent
//! loops: one reports the state of every local container and applies any
//! recreate order it gets back, the other polls for a queued task and
//! executes it. A failed RPC only costs the current tick.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;
use tonic::transport::{Channel, Endpoint};
use tracing::{debug, info, warn};

use dockyard_runtime::{Command, ContainerRuntime, ListScope, RUNNING, execute};

use crate::control::NO_JOB;
use crate::model::NODE_REGISTRATION;
use crate::proto;
use crate::proto::dockyard_client::DockyardClient;

/// Configuration for the node agent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Address of the control plane's gRPC endpoint (`host:port` or a URI).
    pub control_plane_addr: String,
    /// Identifier this node reports under.
    pub node_id: String,
    /// Period of the container state report loop.
    pub report_interval: Duration,
    /// Period of the task poll loop.
    pub poll_interval: Duration,
    /// Deadline of every RPC.
    pub rpc_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            control_plane_addr: "172.17.0.1:50051".to_string(),
            node_id: std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string()),
            report_interval: Duration::from_secs(5),
            poll_interval: Duration::from_secs(5),
            rpc_timeout: Duration::from_secs(1),
        }
    }
}

/// The per-node agent.
pub struct NodeAgent {
    config: AgentConfig,
    client: DockyardClient<Channel>,
    runtime: Arc<dyn ContainerRuntime>,
    registered: AtomicBool,
}

impl NodeAgent {
    /// Build an agent. The connection is established lazily on the first
    /// RPC, so this succeeds while the control plane is still down.
    pub fn new(config: AgentConfig, runtime: Arc<dyn ContainerRuntime>) -> anyhow::Result<Self> {
        let uri = if config.control_plane_addr.contains("://") {
            config.control_plane_addr.clone()
        } else {
            format!("http://{}", config.control_plane_addr)
        };
        let channel = Endpoint::from_shared(uri)
            .with_context(|| format!("invalid control plane address {:?}", config.control_plane_addr))?
            .connect_timeout(config.rpc_timeout)
            .timeout(config.rpc_timeout)
            .connect_lazy();

        Ok(Self {
            config,
            client: DockyardClient::new(channel),
            runtime,
            registered: AtomicBool::new(false),
        })
    }

    pub fn node_id(&self) -> &str {
        &self.config.node_id
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Relaxed)
    }

    /// Announce this node with the registration sentinel.
    pub async fn register(&self) -> anyhow::Result<()> {
        let reply = self.check_in(NODE_REGISTRATION, RUNNING).await?;
        self.registered.store(true, Ordering::Relaxed);
        info!(node = %self.config.node_id, reply = %reply.params, "registered with control plane");
        Ok(())
    }

    /// Report every local container once. Returns how many recreate
    /// orders were applied.
    pub async fn report_once(&self) -> anyhow::Result<usize> {
        let containers = self
            .runtime
            .list(ListScope::All)
            .await
            .context("listing local containers")?;

        let mut applied = 0;
        for container in containers {
            let reply = match self.check_in(&container.identity, &container.state).await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(node = %self.config.node_id, container = %container.identity, error = %e, "check-in failed");
                    continue;
                }
            };
            if reply.status {
                continue;
            }
            warn!(
                container = %container.identity,
                state = %container.state,
                command = %reply.command,
                params = %reply.params,
                "control plane ordered a replacement"
            );
            if self.apply(&reply.command, &reply.params).await {
                applied += 1;
            }
        }
        Ok(applied)
    }

    /// Ask for one task and execute it. Returns true if a job was run.
    pub async fn poll_once(&self) -> anyhow::Result<bool> {
        let reply = self
            .client
            .clone()
            .check_for_task(proto::TaskRequest {
                node: self.config.node_id.clone(),
            })
            .await
            .context("task poll")?
            .into_inner();

        if reply.job == NO_JOB {
            debug!(node = %self.config.node_id, "no task");
            return Ok(false);
        }
        info!(node = %self.config.node_id, job = %reply.job, params = %reply.params, "task received");
        Ok(self.apply(&reply.job, &reply.params).await)
    }

    /// Register, then run both loops until shutdown.
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        if let Err(e) = self.register().await {
            warn!(node = %self.config.node_id, error = %e, "registration failed, retrying on next report");
        }
        tokio::join!(self.report_loop(shutdown.clone()), self.poll_loop(shutdown));
        info!(node = %self.config.node_id, "agent stopped");
    }

    async fn report_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.report_interval);
        info!(interval = ?self.config.report_interval, "report loop started");
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if !self.is_registered() {
                        if let Err(e) = self.register().await {
                            warn!(node = %self.config.node_id, error = %e, "registration failed");
                            continue;
                        }
                    }
                    match self.report_once().await {
                        Ok(0) => {}
                        Ok(applied) => info!(applied, "replacements applied"),
                        Err(e) => warn!(error = %e, "container report failed"),
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    }

    async fn poll_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.poll_interval);
        info!(interval = ?self.config.poll_interval, "poll loop started");
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.poll_once().await {
                        warn!(node = %self.config.node_id, error = %e, "task poll failed");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    }

    async fn check_in(&self, service: &str, state: &str) -> anyhow::Result<proto::CheckResponse> {
        let reply = self
            .client
            .clone()
            .check_worker(proto::CheckRequest {
                node: self.config.node_id.clone(),
                service: service.to_string(),
                state: state.to_string(),
            })
            .await
            .with_context(|| format!("check-in for {service}"))?;
        Ok(reply.into_inner())
    }

    /// Decode and run one command; failures are logged and dropped.
    async fn apply(&self, action: &str, params: &str) -> bool {
        let command = match Command::parse(action, params) {
            Ok(command) => command,
            Err(e) => {
                warn!(%action, %params, error = %e, "dropping malformed command");
                return false;
            }
        };
        match execute(self.runtime.as_ref(), &command).await {
            Ok(()) => true,
            Err(e) => {
                warn!(%action, %params, error = %e, "command failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockyard_runtime::MemoryRuntime;

    #[test]
    fn default_config_uses_reference_timings() {
        let config = AgentConfig::default();
        assert_eq!(config.report_interval, Duration::from_secs(5));
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.rpc_timeout, Duration::from_secs(1));
        assert!(!config.node_id.is_empty());
    }

    #[tokio::test]
    async fn rejects_bad_address() {
        let config = AgentConfig {
            control_plane_addr: "not a uri".to_string(),
            ..Default::default()
        };
        assert!(NodeAgent::new(config, Arc::new(MemoryRuntime::new())).is_err());
    }

    #[tokio::test]
    async fn unreachable_control_plane_fails_the_call_only() {
        let config = AgentConfig {
            control_plane_addr: "127.0.0.1:1".to_string(),
            node_id: "n1".to_string(),
            rpc_timeout: Duration::from_millis(200),
            ..Default::default()
        };
        let agent = NodeAgent::new(config, Arc::new(MemoryRuntime::new())).unwrap();
        assert!(agent.register().await.is_err());
        assert!(!agent.is_registered());
        assert!(agent.poll_once().await.is_err());
    }

    #[tokio::test]
    async fn malformed_command_is_dropped() {
        let runtime = MemoryRuntime::new();
        let config = AgentConfig {
            control_plane_addr: "127.0.0.1:1".to_string(),
            ..Default::default()
        };
        let agent = NodeAgent::new(config, Arc::new(runtime.clone())).unwrap();
        assert!(!agent.apply("create", "only-one-field").await);
        assert!(!agent.apply("explode", "x").await);
        assert!(runtime.calls().await.is_empty());
    }
}
