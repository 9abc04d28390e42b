//! Control plane mode — agent gRPC service, reconcile loops, admin API.
//!
//! In this mode, the daemon:
//! 1. Opens the state store
//! 2. Serves the `Dockyard` check-in/task RPCs over gRPC
//! 3. Runs the task drain loop and the node audit loop
//! 4. Serves the admin REST API over HTTP (separate port)

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tonic::transport::server::TcpIncoming;
use tracing::{error, info, warn};

use dockyard_cluster::{
    ClusterModel, ClusterServer, ControlPlane, DispatchDrainer, DispatchQueue, NodeAuditor,
    NodeFailureCallback,
};
use dockyard_cluster::reconcile::BoxFuture;
use dockyard_runtime::{ContainerRuntime, DockerCli};
use dockyard_state::StateStore;

use crate::config::ControlPlaneConfig;
use crate::{shutdown_on_ctrl_c, wait_for_shutdown};

/// Run the control plane until Ctrl-C.
pub async fn run_control_plane(config: ControlPlaneConfig) -> anyhow::Result<()> {
    info!("Dockyard daemon starting in control-plane mode");

    // ── State store ──────────────────────────────────────────────
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("create data dir {}", config.data_dir.display()))?;
    let db_path = config.data_dir.join("dockyard.redb");
    let store = StateStore::open(&db_path).context("open state store")?;
    info!(path = ?db_path, "state store opened");

    let model = ClusterModel::new(store);
    let queue = DispatchQueue::new(config.queue_capacity);
    let control = ControlPlane::new(model.clone(), queue.clone())
        .with_default_image(config.default_image.clone());
    let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerCli::new(config.docker_bin.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── gRPC server ──────────────────────────────────────────────
    let grpc_addr = SocketAddr::from(([0, 0, 0, 0], config.grpc_port));
    let grpc_incoming = TcpIncoming::new(grpc_addr, true, None)
        .map_err(|e| anyhow::anyhow!("bind gRPC port {grpc_addr}: {e}"))?;
    info!(%grpc_addr, "gRPC server starting");

    let cluster_grpc = ClusterServer::new(control.clone());
    let grpc_shutdown = shutdown_rx.clone();
    let grpc_handle = tokio::spawn(async move {
        if let Err(e) = tonic::transport::Server::builder()
            .add_service(cluster_grpc.into_service())
            .serve_with_incoming_shutdown(grpc_incoming, wait_for_shutdown(grpc_shutdown))
            .await
        {
            error!(error = %e, "gRPC server error");
        }
    });

    // ── Background loops ─────────────────────────────────────────
    let drainer = DispatchDrainer::new(model.clone(), queue).with_interval(config.drain_interval);
    let drain_handle = tokio::spawn(drainer.run(shutdown_rx.clone()));

    let mut auditor = NodeAuditor::new(model, Arc::clone(&runtime))
        .with_node_prefix(config.node_prefix.clone())
        .with_interval(config.audit_interval);
    if config.evacuate_missing_nodes {
        auditor = auditor.with_callback(evacuate_callback(control.clone()));
        info!("missing nodes will be evacuated");
    }
    let audit_handle = tokio::spawn(auditor.run(shutdown_rx.clone()));

    // ── REST API server ──────────────────────────────────────────
    let router = dockyard_api::build_router(control, runtime);
    let api_addr = SocketAddr::from(([0, 0, 0, 0], config.api_port));
    let listener = TcpListener::bind(api_addr)
        .await
        .with_context(|| format!("bind API port {api_addr}"))?;
    info!(%api_addr, "API server starting");

    tokio::spawn(shutdown_on_ctrl_c(shutdown_tx));
    axum::serve(listener, router)
        .with_graceful_shutdown(wait_for_shutdown(shutdown_rx))
        .await?;

    // Clean up.
    let _ = grpc_handle.await;
    let _ = drain_handle.await;
    let _ = audit_handle.await;

    info!("control plane stopped");
    Ok(())
}

/// Requeue every container of each missing node.
fn evacuate_callback(control: ControlPlane) -> NodeFailureCallback {
    Arc::new(move |missing: Vec<String>| -> BoxFuture {
        let control = control.clone();
        Box::pin(async move {
            for node in missing {
                match control.evacuate_node(&node) {
                    Ok(tasks) if !tasks.is_empty() => {
                        info!(%node, requeued = tasks.len(), "evacuated missing node");
                    }
                    Ok(_) => {}
                    Err(e) => warn!(%node, error = %e, "failed to evacuate node"),
                }
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockyard_runtime::new_identity;

    #[tokio::test]
    async fn evacuate_callback_requeues_work() {
        let model = ClusterModel::new(StateStore::open_in_memory().unwrap());
        let control = ControlPlane::new(model.clone(), DispatchQueue::new(4));
        control.check_in("n1", "nodereg", "running").unwrap();

        let container = new_identity("web").unwrap();
        model.add_member("web", &container).unwrap();
        model.assign("n1", &container).unwrap();
        model
            .record_spec(&container, &dockyard_cluster::ContainerSpec::new("nginx", 1))
            .unwrap();

        let callback = evacuate_callback(control);
        callback(vec!["n1".to_string()]).await;

        assert!(model.assignments("n1").unwrap().is_empty());
        assert_eq!(model.pending_tasks().unwrap().len(), 1);
    }
}
