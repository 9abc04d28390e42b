//! Agent mode — runs on worker nodes next to the docker daemon.
//!
//! In this mode, the daemon:
//! 1. Registers this node with the control plane
//! 2. Reports local container state, applying any recreate orders
//! 3. Polls for queued tasks and executes them through docker

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use dockyard_cluster::{AgentConfig, NodeAgent};
use dockyard_runtime::DockerCli;

use crate::shutdown_on_ctrl_c;

/// Run the node agent until Ctrl-C.
pub async fn run_agent(config: AgentConfig, docker_bin: String) -> anyhow::Result<()> {
    info!(
        node = %config.node_id,
        control_plane = %config.control_plane_addr,
        "Dockyard daemon starting in agent mode"
    );

    let runtime = Arc::new(DockerCli::new(docker_bin));
    let agent = NodeAgent::new(config, runtime)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let agent_handle = tokio::spawn(agent.run(shutdown_rx));

    shutdown_on_ctrl_c(shutdown_tx).await;
    let _ = agent_handle.await;

    info!("agent stopped");
    Ok(())
}
