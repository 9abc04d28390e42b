//! In-memory container runtime.
//!
//! Keeps containers and images in maps and records every mutating call, so
//! tests can drive the agent and control plane without a docker daemon.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{RuntimeError, RuntimeResult};
use crate::runtime::{ContainerInfo, ContainerRuntime, ListScope, RUNNING};

#[derive(Default)]
struct Inner {
    containers: BTreeMap<String, ContainerInfo>,
    images: BTreeSet<String>,
    ips: BTreeMap<String, String>,
    calls: Vec<String>,
}

/// Container runtime that lives entirely in memory.
#[derive(Clone, Default)]
pub struct MemoryRuntime {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a container as-is.
    pub async fn insert(&self, info: ContainerInfo) {
        self.inner
            .lock()
            .await
            .containers
            .insert(info.identity.clone(), info);
    }

    /// Convenience for inserting a running container with an IP address.
    pub async fn insert_running(&self, identity: &str, image: &str, ip: &str) {
        let mut inner = self.inner.lock().await;
        inner.containers.insert(identity.to_string(), running(identity, image));
        inner.ips.insert(identity.to_string(), ip.to_string());
    }

    /// Overwrite the state of an existing container.
    pub async fn set_state(&self, identity: &str, state: &str) {
        if let Some(c) = self.inner.lock().await.containers.get_mut(identity) {
            c.state = state.to_string();
        }
    }

    /// Mark an image as locally present.
    pub async fn add_image(&self, image: &str) {
        self.inner.lock().await.images.insert(image.to_string());
    }

    pub async fn get(&self, identity: &str) -> Option<ContainerInfo> {
        self.inner.lock().await.containers.get(identity).cloned()
    }

    /// Names of all known containers.
    pub async fn identities(&self) -> Vec<String> {
        self.inner.lock().await.containers.keys().cloned().collect()
    }

    /// Log of mutating calls, e.g. `pull nginx` or `run web-... nginx`.
    pub async fn calls(&self) -> Vec<String> {
        self.inner.lock().await.calls.clone()
    }
}

fn running(identity: &str, image: &str) -> ContainerInfo {
    ContainerInfo {
        identity: identity.to_string(),
        id: String::new(),
        image: image.to_string(),
        state: RUNNING.to_string(),
        uptime: "Up".to_string(),
    }
}

#[async_trait]
impl ContainerRuntime for MemoryRuntime {
    async fn list(&self, scope: ListScope) -> RuntimeResult<Vec<ContainerInfo>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .containers
            .values()
            .filter(|c| scope == ListScope::All || c.is_running())
            .cloned()
            .collect())
    }

    async fn image_exists(&self, image: &str) -> RuntimeResult<bool> {
        Ok(self.inner.lock().await.images.contains(image))
    }

    async fn pull_image(&self, image: &str) -> RuntimeResult<()> {
        let mut inner = self.inner.lock().await;
        inner.calls.push(format!("pull {image}"));
        inner.images.insert(image.to_string());
        Ok(())
    }

    async fn run(&self, name: &str, image: &str) -> RuntimeResult<()> {
        let mut inner = self.inner.lock().await;
        inner.calls.push(format!("run {name} {image}"));
        if !inner.images.contains(image) {
            return Err(RuntimeError::ImageUnavailable(image.to_string()));
        }
        inner.containers.insert(name.to_string(), running(name, image));
        Ok(())
    }

    async fn stop(&self, identity: &str) -> RuntimeResult<()> {
        let mut inner = self.inner.lock().await;
        inner.calls.push(format!("stop {identity}"));
        let container = inner
            .containers
            .get_mut(identity)
            .ok_or_else(|| RuntimeError::NotFound(identity.to_string()))?;
        container.state = "exited".to_string();
        Ok(())
    }

    async fn remove(&self, identity: &str) -> RuntimeResult<()> {
        let mut inner = self.inner.lock().await;
        inner.calls.push(format!("rm {identity}"));
        inner.ips.remove(identity);
        inner
            .containers
            .remove(identity)
            .map(|_| ())
            .ok_or_else(|| RuntimeError::NotFound(identity.to_string()))
    }

    async fn inspect_ip(&self, identity: &str) -> RuntimeResult<Option<String>> {
        let inner = self.inner.lock().await;
        if !inner.containers.contains_key(identity) {
            return Err(RuntimeError::NotFound(identity.to_string()));
        }
        Ok(inner.ips.get(identity).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn list_respects_scope() {
        let rt = MemoryRuntime::new();
        rt.insert_running("a", "img", "10.0.0.2").await;
        rt.insert_running("b", "img", "10.0.0.3").await;
        rt.set_state("b", "exited").await;

        assert_eq!(rt.list(ListScope::All).await.unwrap().len(), 2);
        let running = rt.list(ListScope::Running).await.unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].identity, "a");
    }

    #[tokio::test]
    async fn run_requires_local_image() {
        let rt = MemoryRuntime::new();
        assert!(matches!(
            rt.run("web", "nginx").await,
            Err(RuntimeError::ImageUnavailable(_))
        ));
        rt.add_image("nginx").await;
        rt.run("web", "nginx").await.unwrap();
        assert!(rt.get("web").await.unwrap().is_running());
    }

    #[tokio::test]
    async fn inspect_ip_of_unknown_container_fails() {
        let rt = MemoryRuntime::new();
        assert!(rt.inspect_ip("ghost").await.is_err());
        rt.insert_running("n", "img", "10.0.0.9").await;
        assert_eq!(rt.inspect_ip("n").await.unwrap().as_deref(), Some("10.0.0.9"));
    }
}
