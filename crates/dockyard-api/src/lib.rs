//! dockyard-api — admin HTTP surface of the control plane.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/` | Plain-text banner |
//! | POST | `/service` | Launch a service (`{"name", "image", "rs"}`) |
//! | GET | `/state` | Nodes, services, and container placement |
//! | GET | `/metrics` | Prometheus exposition |

pub mod handlers;
pub mod metrics;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use dockyard_cluster::ControlPlane;
use dockyard_runtime::ContainerRuntime;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub control: ControlPlane,
    /// Used to resolve node addresses and uptime for `/state`.
    pub runtime: Arc<dyn ContainerRuntime>,
}

/// Build the admin router.
pub fn build_router(control: ControlPlane, runtime: Arc<dyn ContainerRuntime>) -> Router {
    let state = ApiState { control, runtime };

    Router::new()
        .route("/", get(handlers::banner))
        .route("/service", post(handlers::launch_service))
        .route("/state", get(handlers::cluster_state))
        .route("/metrics", get(handlers::prometheus_metrics))
        .with_state(state)
}
