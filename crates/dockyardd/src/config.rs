//! Command-line arguments and the config structs they resolve into.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use dockyard_cluster::AgentConfig;
use dockyard_cluster::control::DEFAULT_IMAGE;
use dockyard_cluster::queue::DEFAULT_CAPACITY;
use dockyard_cluster::reconcile::{DEFAULT_AUDIT_INTERVAL, DEFAULT_DRAIN_INTERVAL, DEFAULT_NODE_PREFIX};

/// Everything the control plane needs at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlPlaneConfig {
    pub grpc_port: u16,
    pub api_port: u16,
    pub data_dir: PathBuf,
    pub queue_capacity: usize,
    pub drain_interval: Duration,
    pub audit_interval: Duration,
    pub node_prefix: String,
    pub default_image: String,
    /// Requeue the work of nodes the audit finds missing.
    pub evacuate_missing_nodes: bool,
    pub docker_bin: String,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            grpc_port: 50051,
            api_port: 8080,
            data_dir: PathBuf::from("/tmp/db"),
            queue_capacity: DEFAULT_CAPACITY,
            drain_interval: DEFAULT_DRAIN_INTERVAL,
            audit_interval: DEFAULT_AUDIT_INTERVAL,
            node_prefix: DEFAULT_NODE_PREFIX.to_string(),
            default_image: DEFAULT_IMAGE.to_string(),
            evacuate_missing_nodes: false,
            docker_bin: "docker".to_string(),
        }
    }
}

#[derive(Debug, Args)]
pub struct ControlPlaneArgs {
    /// Port of the agent-facing gRPC endpoint.
    #[arg(long, default_value = "50051")]
    pub grpc_port: u16,

    /// Port of the admin HTTP API.
    #[arg(long, default_value = "8080")]
    pub api_port: u16,

    /// Directory holding the state database.
    #[arg(long, default_value = "/tmp/db")]
    pub data_dir: PathBuf,

    /// Capacity of the in-memory dispatch queue.
    #[arg(long, default_value = "100")]
    pub queue_capacity: usize,

    /// Seconds between task drain passes.
    #[arg(long, default_value = "5")]
    pub drain_interval_secs: u64,

    /// Seconds between node audits.
    #[arg(long, default_value = "3")]
    pub audit_interval_secs: u64,

    /// Logical name of node containers.
    #[arg(long, default_value = "node")]
    pub node_prefix: String,

    /// Image for recreating containers whose spec is gone.
    #[arg(long, default_value = "nginx:alpine")]
    pub default_image: String,

    /// Requeue the containers of nodes the audit finds missing.
    #[arg(long)]
    pub evacuate_missing_nodes: bool,

    /// Docker client binary.
    #[arg(long, default_value = "docker")]
    pub docker_bin: String,
}

impl From<ControlPlaneArgs> for ControlPlaneConfig {
    fn from(args: ControlPlaneArgs) -> Self {
        Self {
            grpc_port: args.grpc_port,
            api_port: args.api_port,
            data_dir: args.data_dir,
            queue_capacity: args.queue_capacity,
            drain_interval: Duration::from_secs(args.drain_interval_secs),
            audit_interval: Duration::from_secs(args.audit_interval_secs),
            node_prefix: args.node_prefix,
            default_image: args.default_image,
            evacuate_missing_nodes: args.evacuate_missing_nodes,
            docker_bin: args.docker_bin,
        }
    }
}

#[derive(Debug, Args)]
pub struct AgentArgs {
    /// Control plane gRPC address.
    #[arg(long, default_value = "172.17.0.1:50051")]
    pub control_plane: String,

    /// Identifier this node reports under. Inside a node container the
    /// default hostname is the container's short id, which the control
    /// plane's node audit recognizes.
    #[arg(long, env = "HOSTNAME")]
    pub node_id: String,

    /// Seconds between container state reports.
    #[arg(long, default_value = "5")]
    pub report_interval_secs: u64,

    /// Seconds between task polls.
    #[arg(long, default_value = "5")]
    pub poll_interval_secs: u64,

    /// Deadline of every RPC, in milliseconds.
    #[arg(long, default_value = "1000")]
    pub rpc_timeout_ms: u64,

    /// Docker client binary.
    #[arg(long, default_value = "docker")]
    pub docker_bin: String,
}

impl AgentArgs {
    pub fn into_config(self) -> (AgentConfig, String) {
        let config = AgentConfig {
            control_plane_addr: self.control_plane,
            node_id: self.node_id,
            report_interval: Duration::from_secs(self.report_interval_secs),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            rpc_timeout: Duration::from_millis(self.rpc_timeout_ms),
        };
        (config, self.docker_bin)
    }
}
