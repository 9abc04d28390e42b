//! Command execution against a container runtime.
//!
//! These are the composite operations agents run for `create`,
//! `recreate`, and `delete`. Nothing here rolls back: a failure part way
//! leaves whatever already happened in place, and the next health report
//! corrects it.

use tracing::{info, warn};

use crate::command::Command;
use crate::error::{RuntimeError, RuntimeResult};
use crate::identity::{logical_name, new_identity};
use crate::runtime::ContainerRuntime;

/// Run a decoded command.
pub async fn execute(runtime: &dyn ContainerRuntime, command: &Command) -> RuntimeResult<()> {
    match command {
        Command::Create {
            identity,
            image,
            replicas,
        } => create(runtime, identity, image, *replicas).await,
        Command::Recreate { old, new, image } => recreate(runtime, old, new, image).await,
        Command::Delete { identity } => delete(runtime, identity).await,
    }
}

/// Pull `image` unless it is already present locally.
pub async fn ensure_image(runtime: &dyn ContainerRuntime, image: &str) -> RuntimeResult<()> {
    if !runtime.image_exists(image).await? {
        info!(%image, "pulling image");
        runtime.pull_image(image).await?;
    }
    Ok(())
}

/// Start `replicas` containers of `image`. The first takes `identity`;
/// the rest get fresh identities with the same logical name.
pub async fn create(
    runtime: &dyn ContainerRuntime,
    identity: &str,
    image: &str,
    replicas: u32,
) -> RuntimeResult<()> {
    ensure_image(runtime, image).await?;
    runtime.run(identity, image).await?;
    info!(%identity, %image, "container created");

    if replicas > 1 {
        let base = logical_name(identity)?;
        for _ in 1..replicas {
            let extra = new_identity(base)?;
            runtime.run(&extra, image).await?;
            info!(identity = %extra, %image, "container created");
        }
    }
    Ok(())
}

/// Replace `old` with a fresh `new` container running `image`.
pub async fn recreate(
    runtime: &dyn ContainerRuntime,
    old: &str,
    new: &str,
    image: &str,
) -> RuntimeResult<()> {
    match runtime.remove(old).await {
        Ok(()) => {}
        Err(RuntimeError::NotFound(_)) => {
            warn!(identity = %old, "container to replace is already gone");
        }
        Err(e) => return Err(e),
    }
    ensure_image(runtime, image).await?;
    runtime.run(new, image).await?;
    info!(%old, %new, %image, "container recreated");
    Ok(())
}

/// Stop and remove a container.
pub async fn delete(runtime: &dyn ContainerRuntime, identity: &str) -> RuntimeResult<()> {
    runtime.stop(identity).await?;
    runtime.remove(identity).await?;
    info!(%identity, "container deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::new_identity;
    use crate::memory::MemoryRuntime;
    use crate::runtime::ListScope;

    #[tokio::test]
    async fn create_pulls_missing_image_once() {
        let rt = MemoryRuntime::new();
        let id = new_identity("web").unwrap();

        execute(&rt, &Command::parse("create", &format!("{id} nginx:alpine 1")).unwrap())
            .await
            .unwrap();

        assert_eq!(rt.calls().await, vec![
            "pull nginx:alpine".to_string(),
            format!("run {id} nginx:alpine"),
        ]);
        assert!(rt.get(&id).await.unwrap().is_running());
    }

    #[tokio::test]
    async fn create_extra_replicas_share_logical_name() {
        let rt = MemoryRuntime::new();
        rt.add_image("nginx").await;
        let id = new_identity("web").unwrap();

        create(&rt, &id, "nginx", 3).await.unwrap();

        let all = rt.list(ListScope::All).await.unwrap();
        assert_eq!(all.len(), 3);
        for c in all {
            assert_eq!(logical_name(&c.identity).unwrap(), "web");
        }
    }

    #[tokio::test]
    async fn recreate_replaces_old_container() {
        let rt = MemoryRuntime::new();
        rt.add_image("nginx").await;
        let old = new_identity("svc").unwrap();
        let new = new_identity("svc").unwrap();
        rt.insert_running(&old, "nginx", "10.0.0.5").await;
        rt.set_state(&old, "exited").await;

        recreate(&rt, &old, &new, "nginx").await.unwrap();

        assert!(rt.get(&old).await.is_none());
        assert!(rt.get(&new).await.unwrap().is_running());
    }

    #[tokio::test]
    async fn recreate_tolerates_missing_old_container() {
        let rt = MemoryRuntime::new();
        rt.add_image("nginx").await;
        let new = new_identity("svc").unwrap();

        recreate(&rt, "svc-gone", &new, "nginx").await.unwrap();
        assert!(rt.get(&new).await.is_some());
    }

    #[tokio::test]
    async fn delete_stops_then_removes() {
        let rt = MemoryRuntime::new();
        rt.insert_running("web-1", "nginx", "10.0.0.5").await;

        delete(&rt, "web-1").await.unwrap();

        assert_eq!(rt.calls().await, vec!["stop web-1", "rm web-1"]);
        assert!(rt.get("web-1").await.is_none());
    }

    #[tokio::test]
    async fn delete_missing_container_fails() {
        let rt = MemoryRuntime::new();
        assert!(matches!(
            delete(&rt, "ghost").await,
            Err(RuntimeError::NotFound(_))
        ));
    }
}
