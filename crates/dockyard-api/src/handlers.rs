//! Admin API handlers.
//!
//! Each handler goes through the shared `ControlPlane` and returns JSON
//! wrapped in a uniform envelope, except the banner and `/metrics`.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use dockyard_cluster::{ClusterError, ClusterView};

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

fn cluster_error_status(e: &ClusterError) -> StatusCode {
    match e {
        ClusterError::InvalidName { .. }
        | ClusterError::InvalidImage(_)
        | ClusterError::InvalidReplicas(_) => StatusCode::BAD_REQUEST,
        ClusterError::NameTaken { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// GET /
pub async fn banner() -> &'static str {
    "Dockyard control plane\n"
}

// ── Services ───────────────────────────────────────────────────

/// Body of `POST /service`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub name: String,
    pub image: String,
    #[serde(default = "default_replicas")]
    pub rs: u32,
}

fn default_replicas() -> u32 {
    1
}

#[derive(Serialize)]
struct LaunchResponse {
    #[serde(flatten)]
    service: ServiceRequest,
    tasks: Vec<String>,
}

/// POST /service
pub async fn launch_service(
    State(state): State<ApiState>,
    body: Result<Json<ServiceRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "rejected service request");
            return error_response(&rejection.body_text(), StatusCode::BAD_REQUEST).into_response();
        }
    };

    match state.control.launch_service(&req.name, &req.image, req.rs) {
        Ok(tasks) => {
            info!(service = %req.name, image = %req.image, rs = req.rs, "service submitted");
            (
                StatusCode::CREATED,
                ApiResponse::ok(LaunchResponse { service: req, tasks }),
            )
                .into_response()
        }
        Err(e) => error_response(&e.to_string(), cluster_error_status(&e)).into_response(),
    }
}

// ── State ──────────────────────────────────────────────────────

/// GET /state
pub async fn cluster_state(State(state): State<ApiState>) -> impl IntoResponse {
    match ClusterView::collect(&state.control, state.runtime.as_ref()).await {
        Ok(view) => ApiResponse::ok(view).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Prometheus ─────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let (status, body) = match ClusterView::collect(&state.control, state.runtime.as_ref()).await {
        Ok(view) => (StatusCode::OK, crate::metrics::render_prometheus(&view)),
        Err(e) => {
            warn!(error = %e, "failed to collect cluster view for metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("# collection failed: {e}\n"))
        }
    };
    (
        status,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use dockyard_cluster::{ClusterModel, ControlPlane, DispatchQueue};
    use dockyard_runtime::MemoryRuntime;
    use dockyard_state::StateStore;

    fn test_state() -> ApiState {
        let model = ClusterModel::new(StateStore::open_in_memory().unwrap());
        ApiState {
            control: ControlPlane::new(model, DispatchQueue::new(8)),
            runtime: Arc::new(MemoryRuntime::new()),
        }
    }

    fn request(name: &str, image: &str, rs: u32) -> Result<Json<ServiceRequest>, JsonRejection> {
        Ok(Json(ServiceRequest {
            name: name.to_string(),
            image: image.to_string(),
            rs,
        }))
    }

    #[tokio::test]
    async fn launch_creates_tasks() {
        let state = test_state();
        let resp = launch_service(State(state.clone()), request("web", "nginx", 2)).await;
        assert_eq!(resp.into_response().status(), StatusCode::CREATED);
        assert_eq!(state.control.model().pending_tasks().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn launch_rejects_reserved_name() {
        let state = test_state();
        let resp = launch_service(State(state.clone()), request("Services", "nginx", 1)).await;
        assert_eq!(resp.into_response().status(), StatusCode::BAD_REQUEST);
        assert!(state.control.model().pending_tasks().unwrap().is_empty());
    }

    #[tokio::test]
    async fn launch_conflicting_with_node_is_409() {
        let state = test_state();
        state.control.check_in("web", "nodereg", "running").unwrap();
        let resp = launch_service(State(state.clone()), request("web", "nginx", 1)).await;
        assert_eq!(resp.into_response().status(), StatusCode::CONFLICT);
        assert!(state.control.model().services().unwrap().is_empty());
    }

    #[tokio::test]
    async fn launch_rejects_zero_replicas() {
        let state = test_state();
        let resp = launch_service(State(state), request("web", "nginx", 0)).await;
        assert_eq!(resp.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn state_of_empty_cluster() {
        let resp = cluster_state(State(test_state())).await;
        assert_eq!(resp.into_response().status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn prometheus_endpoint_returns_text() {
        let resp = prometheus_metrics(State(test_state())).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let content_type = resp.headers().get("content-type").unwrap().to_str().unwrap();
        assert!(content_type.contains("text/plain"));
    }
}
