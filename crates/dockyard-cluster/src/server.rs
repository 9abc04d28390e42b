//! Cluster gRPC server — control plane side.
//!
//! Implements the `Dockyard` gRPC interface. Runs on the control plane
//! and answers the check-in and task-pull RPCs from node agents.

use tonic::{Request, Response, Status};
use tracing::warn;

use crate::control::ControlPlane;
use crate::proto;
use crate::proto::dockyard_server::{Dockyard, DockyardServer};

/// gRPC implementation of the agent protocol.
pub struct ClusterServer {
    control: ControlPlane,
}

impl ClusterServer {
    pub fn new(control: ControlPlane) -> Self {
        Self { control }
    }

    /// Get the tonic service for mounting on a gRPC server.
    pub fn into_service(self) -> DockyardServer<Self> {
        DockyardServer::new(self)
    }
}

#[tonic::async_trait]
impl Dockyard for ClusterServer {
    async fn check_worker(
        &self,
        request: Request<proto::CheckRequest>,
    ) -> Result<Response<proto::CheckResponse>, Status> {
        let req = request.into_inner();

        let reply = self
            .control
            .check_in(&req.node, &req.service, &req.state)
            .map_err(|e| {
                warn!(node = %req.node, container = %req.service, error = %e, "check-in failed");
                Status::internal(e.to_string())
            })?;

        Ok(Response::new(proto::CheckResponse {
            command: reply.command,
            params: reply.params,
            status: reply.healthy,
        }))
    }

    async fn check_for_task(
        &self,
        request: Request<proto::TaskRequest>,
    ) -> Result<Response<proto::TaskResponse>, Status> {
        let req = request.into_inner();
        let reply = self.control.pull_task(&req.node).await;

        Ok(Response::new(proto::TaskResponse {
            job: reply.job,
            params: reply.params,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockyard_state::StateStore;

    use crate::model::ClusterModel;
    use crate::queue::DispatchQueue;

    fn server() -> (ClusterServer, ControlPlane) {
        let model = ClusterModel::new(StateStore::open_in_memory().unwrap());
        let control = ControlPlane::new(model, DispatchQueue::new(8));
        (ClusterServer::new(control.clone()), control)
    }

    #[tokio::test]
    async fn check_worker_registers_node() {
        let (server, control) = server();
        let resp = server
            .check_worker(Request::new(proto::CheckRequest {
                node: "n1".into(),
                service: "nodereg".into(),
                state: "running".into(),
            }))
            .await
            .unwrap()
            .into_inner();

        assert!(resp.status);
        assert_eq!(resp.params, "Node Registered");
        assert_eq!(control.model().nodes().unwrap(), vec!["n1"]);
    }

    #[tokio::test]
    async fn invalid_node_maps_to_internal() {
        let (server, _) = server();
        let err = server
            .check_worker(Request::new(proto::CheckRequest {
                node: "Nodes".into(),
                service: "nodereg".into(),
                state: "running".into(),
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::Internal);
    }

    #[tokio::test]
    async fn check_for_task_on_empty_queue() {
        let (server, _) = server();
        let resp = server
            .check_for_task(Request::new(proto::TaskRequest { node: "n1".into() }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(resp.job, "nojob");
        assert_eq!(resp.params, "noparams");
    }
}
