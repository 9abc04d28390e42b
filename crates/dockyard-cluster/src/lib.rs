//! dockyard-cluster — control plane and node agent coordination.
//!
//! Provides the cluster state model layered on the key/value store, the
//! control-plane state machine behind the two agent RPCs, the background
//! reconciliation loops, and the node agent that drives local containers.
//!
//! # Architecture
//!
//! ```text
//! Control Plane
//!   ├── ClusterServer (gRPC)
//!   │   ├── CheckWorker()  → register node / ack / order a recreate
//!   │   └── CheckForTask() → pop one task from the dispatch queue
//!   ├── ControlPlane
//!   │   ├── ClusterModel (Nodes, Services, assignments, specs, Task-*)
//!   │   └── DispatchQueue (bounded, in memory)
//!   ├── DispatchDrainer → moves durable Task-* records into the queue
//!   └── NodeAuditor     → compares the node roster with live node containers
//!
//! Agent Node
//!   └── NodeAgent
//!       ├── registers once with the `nodereg` sentinel
//!       ├── reports every local container's state
//!       └── polls for tasks and executes them via the container runtime
//! ```

pub mod agent;
pub mod control;
pub mod error;
pub mod model;
pub mod queue;
pub mod reconcile;
pub mod server;
pub mod task;
pub mod view;

/// Wire messages and generated gRPC service stubs.
pub mod proto {
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct CheckRequest {
        #[prost(string, tag = "1")]
        pub node: String,
        /// Reported container name, or the `nodereg` sentinel.
        #[prost(string, tag = "2")]
        pub service: String,
        #[prost(string, tag = "3")]
        pub state: String,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct CheckResponse {
        #[prost(string, tag = "1")]
        pub command: String,
        #[prost(string, tag = "2")]
        pub params: String,
        /// False when the agent must act on `command`.
        #[prost(bool, tag = "3")]
        pub status: bool,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct TaskRequest {
        #[prost(string, tag = "1")]
        pub node: String,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct TaskResponse {
        #[prost(string, tag = "1")]
        pub job: String,
        #[prost(string, tag = "2")]
        pub params: String,
    }

    include!(concat!(env!("OUT_DIR"), "/dockyard.Dockyard.rs"));
}

pub use agent::{AgentConfig, NodeAgent};
pub use control::{CheckInReply, ControlPlane, TaskReply};
pub use error::{ClusterError, ClusterResult};
pub use model::{ClusterModel, ContainerSpec};
pub use queue::DispatchQueue;
pub use reconcile::{DispatchDrainer, NodeAudit, NodeAuditor, NodeFailureCallback};
pub use server::ClusterServer;
pub use task::TaskSpec;
pub use view::{ClusterView, ContainerView, NodeView, ServiceView};
