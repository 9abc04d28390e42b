//! Read-only cluster snapshot for the admin surface.
//!
//! Built purely from the state store plus runtime lookups for node
//! addresses and uptime; holds no state of its own.

use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use dockyard_runtime::{ContainerRuntime, ListScope};

use crate::control::ControlPlane;
use crate::error::ClusterResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeView {
    pub name: String,
    pub ip: Option<String>,
    pub uptime: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerView {
    pub name: String,
    pub image: Option<String>,
    pub node: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceView {
    pub name: String,
    /// Recorded container specs for the service.
    pub rs: usize,
    pub containers: Vec<ContainerView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterView {
    pub nodes: Vec<NodeView>,
    pub services: Vec<ServiceView>,
    pub pending_tasks: usize,
    pub queue_depth: usize,
}

impl ClusterView {
    pub async fn collect(control: &ControlPlane, runtime: &dyn ContainerRuntime) -> ClusterResult<Self> {
        let model = control.model();

        let uptimes: HashMap<String, String> = match runtime.list(ListScope::All).await {
            Ok(containers) => containers.into_iter().map(|c| (c.identity, c.uptime)).collect(),
            Err(e) => {
                debug!(error = %e, "runtime listing unavailable for snapshot");
                HashMap::new()
            }
        };

        let mut nodes = Vec::new();
        for name in model.nodes()? {
            let ip = runtime.inspect_ip(&name).await.ok().flatten();
            nodes.push(NodeView {
                uptime: uptimes.get(&name).cloned(),
                ip,
                name,
            });
        }

        let placements = model.placements()?;
        let mut services = Vec::new();
        for name in model.services()? {
            let mut containers = Vec::new();
            for container in model.members(&name)? {
                containers.push(ContainerView {
                    image: model.spec(&container)?.map(|spec| spec.image),
                    node: placements.get(&container).cloned(),
                    name: container,
                });
            }
            services.push(ServiceView {
                rs: model.count_replicas(&name)?,
                containers,
                name,
            });
        }

        Ok(Self {
            nodes,
            services,
            pending_tasks: model.pending_tasks()?.len(),
            queue_depth: control.queue().len(),
        })
    }

    /// Containers across every service.
    pub fn container_count(&self) -> usize {
        self.services.iter().map(|s| s.containers.len()).sum()
    }
}
