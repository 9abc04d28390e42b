//! Control-plane state machine.
//!
//! Answers the two agent requests (check-in and task pull) and turns
//! operator intent (launch a service) into durable tasks. Every store
//! mutation is an independent, idempotent single-key edit; multi-key
//! sequences add the new record before removing the old one so an
//! interrupted sequence leaves a duplicate, never a gap.

use tracing::{debug, info, warn};

use dockyard_runtime::{Action, RUNNING, logical_name, new_identity};

use crate::error::{ClusterError, ClusterResult};
use crate::model::{ClusterModel, ContainerSpec, NODE_REGISTRATION};
use crate::queue::DispatchQueue;
use crate::task::{TaskSpec, new_task_key};

/// Command meaning "nothing to do".
pub const NO_COMMAND: &str = "NoCommand";

/// Job returned when the dispatch queue is empty.
pub const NO_JOB: &str = "nojob";

/// Params returned alongside [`NO_JOB`].
pub const NO_PARAMS: &str = "noparams";

/// Image used to recreate a container whose spec record is gone.
pub const DEFAULT_IMAGE: &str = "nginx:alpine";

/// Answer to a check-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckInReply {
    pub command: String,
    pub params: String,
    /// False when the agent must run `command`.
    pub healthy: bool,
}

impl CheckInReply {
    fn ack(params: String) -> Self {
        Self {
            command: NO_COMMAND.to_string(),
            params,
            healthy: true,
        }
    }
}

/// Answer to a task pull.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReply {
    pub job: String,
    pub params: String,
}

impl TaskReply {
    pub fn no_job() -> Self {
        Self {
            job: NO_JOB.to_string(),
            params: NO_PARAMS.to_string(),
        }
    }

    pub fn is_job(&self) -> bool {
        self.job != NO_JOB
    }
}

/// Shared control-plane handle: the cluster model plus the dispatch queue.
///
/// Cheap to clone; clones share the same store and queue.
#[derive(Clone)]
pub struct ControlPlane {
    model: ClusterModel,
    queue: DispatchQueue,
    default_image: String,
}

impl ControlPlane {
    pub fn new(model: ClusterModel, queue: DispatchQueue) -> Self {
        Self {
            model,
            queue,
            default_image: DEFAULT_IMAGE.to_string(),
        }
    }

    /// Image used when a failed container has no spec record.
    pub fn with_default_image(mut self, image: impl Into<String>) -> Self {
        self.default_image = image.into();
        self
    }

    pub fn model(&self) -> &ClusterModel {
        &self.model
    }

    pub fn queue(&self) -> &DispatchQueue {
        &self.queue
    }

    // ── Check-in ───────────────────────────────────────────────────

    /// Handle one agent report about one container.
    pub fn check_in(&self, node: &str, container: &str, state: &str) -> ClusterResult<CheckInReply> {
        debug!(%node, %container, %state, "check-in");

        if container == NODE_REGISTRATION {
            if self.model.register_node(node)? {
                info!(%node, "node registered");
            }
            return Ok(CheckInReply::ack("Node Registered".to_string()));
        }

        if state == RUNNING {
            if self.model.clear_recreate(container)? {
                debug!(%node, %container, "replacement is running");
            }
            return Ok(CheckInReply::ack(format!("ACK for {node}")));
        }

        let Ok(service) = logical_name(container) else {
            warn!(%node, %container, %state, "ignoring unhealthy container with a foreign name");
            return Ok(CheckInReply::ack(format!("ACK for {node}")));
        };
        let (replacement, spec) = self.replace(node, service, container)?;

        warn!(%node, old = %container, new = %replacement, %state, "container unhealthy, ordering recreate");
        Ok(CheckInReply {
            command: Action::Recreate.to_string(),
            params: format!("{container} {replacement} {}", spec.image),
            healthy: false,
        })
    }

    /// Swap `old` for its replacement in every record that references it.
    ///
    /// The replacement is remembered until it reports running, so a
    /// repeated report about `old` re-issues the same order and re-applies
    /// the same idempotent edits instead of minting a second container.
    fn replace(&self, node: &str, service: &str, old: &str) -> ClusterResult<(String, ContainerSpec)> {
        let (new, spec) = match self.model.recreate_of(old)? {
            Some(pending) => {
                debug!(%node, %old, new = %pending.0, "recreate already ordered");
                pending
            }
            None => (new_identity(service)?, self.recreate_spec(service, old)?),
        };

        self.model.record_recreate(old, &new, &spec)?;
        self.model.record_spec(&new, &spec)?;
        self.model.register_service(service)?;
        self.model.add_member(service, &new)?;
        self.model.assign(node, &new)?;

        self.model.unassign(node, old)?;
        self.model.remove_member(service, old)?;
        self.model.delete_spec(old)?;
        Ok((new, spec))
    }

    /// Spec for the replacement of `old`: its own record, else that of a
    /// surviving member of the service, else the default image.
    fn recreate_spec(&self, service: &str, old: &str) -> ClusterResult<ContainerSpec> {
        if let Some(spec) = self.model.spec(old)? {
            return Ok(spec);
        }
        for member in self.model.members(service)? {
            if member == old {
                continue;
            }
            if let Some(spec) = self.model.spec(&member)? {
                return Ok(spec);
            }
        }
        Ok(ContainerSpec::new(self.default_image.clone(), 1))
    }

    // ── Task pull ──────────────────────────────────────────────────

    /// Hand the oldest queued task to `node`, recording the assignment.
    ///
    /// The task has left the queue once popped, so bookkeeping failures are
    /// logged and the job is still delivered.
    pub async fn pull_task(&self, node: &str) -> TaskReply {
        let Some(task) = self.queue.try_pop().await else {
            debug!(%node, "no task");
            return TaskReply::no_job();
        };

        if let Err(e) = self.record_dispatch(node, &task) {
            warn!(%node, task = %task, error = %e, "failed to record task assignment");
        }
        info!(%node, task = %task, "task dispatched");

        TaskReply {
            job: task.action.to_string(),
            params: task.params(),
        }
    }

    fn record_dispatch(&self, node: &str, task: &TaskSpec) -> ClusterResult<()> {
        let service = task.service();
        self.model.assign(node, &task.target)?;
        self.model.register_service(service)?;
        self.model.add_member(service, &task.target)?;
        self.model
            .record_spec(&task.target, &ContainerSpec::new(task.image.clone(), task.count))?;
        Ok(())
    }

    // ── Operator intent ────────────────────────────────────────────

    /// Register `name` and write one durable `create` task per replica.
    /// Returns the task keys.
    pub fn launch_service(&self, name: &str, image: &str, replicas: u32) -> ClusterResult<Vec<String>> {
        self.model.check_service_name(name)?;
        validate_image(image)?;
        if replicas == 0 {
            return Err(ClusterError::InvalidReplicas(replicas));
        }

        self.model.register_service(name)?;
        let mut keys = Vec::with_capacity(replicas as usize);
        for _ in 0..replicas {
            keys.push(self.enqueue_create(name, image)?);
        }
        info!(service = %name, %image, replicas, "service launched");
        Ok(keys)
    }

    /// Move `container` off `node`: enqueue `replicas` replacement tasks,
    /// then drop every record of the old identity. Returns the task keys.
    pub fn rebalance_container(
        &self,
        node: &str,
        container: &str,
        image: &str,
        replicas: u32,
    ) -> ClusterResult<Vec<String>> {
        let service = logical_name(container)?;
        validate_image(image)?;

        let mut keys = Vec::with_capacity(replicas as usize);
        for _ in 0..replicas {
            keys.push(self.enqueue_create(service, image)?);
        }

        self.model.unassign(node, container)?;
        self.model.remove_member(service, container)?;
        self.model.delete_spec(container)?;
        self.model.clear_recreate(container)?;
        info!(%node, %container, replacements = keys.len(), "container rebalanced");
        Ok(keys)
    }

    /// Rebalance every container assigned to `node`. Containers without a
    /// spec are treated as already gone and only unassigned.
    pub fn evacuate_node(&self, node: &str) -> ClusterResult<Vec<String>> {
        let mut keys = Vec::new();
        for container in self.model.assignments(node)? {
            match self.model.spec(&container)? {
                Some(spec) => {
                    keys.extend(self.rebalance_container(node, &container, &spec.image, spec.replicas)?);
                }
                None => {
                    self.model.unassign(node, &container)?;
                }
            }
        }
        Ok(keys)
    }

    fn enqueue_create(&self, service: &str, image: &str) -> ClusterResult<String> {
        let key = new_task_key();
        let task = TaskSpec::create(new_identity(service)?, image.to_string());
        self.model.store().put(&key, &task.to_string())?;
        debug!(%key, task = %task, "task recorded");
        Ok(key)
    }
}

fn validate_image(image: &str) -> ClusterResult<()> {
    if image.is_empty() || image.chars().any(char::is_whitespace) {
        return Err(ClusterError::InvalidImage(image.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockyard_state::StateStore;

    fn test_control() -> ControlPlane {
        let model = ClusterModel::new(StateStore::open_in_memory().unwrap());
        ControlPlane::new(model, DispatchQueue::new(8))
    }

    #[test]
    fn registration_adds_node_once() {
        let cp = test_control();
        let reply = cp.check_in("n1", NODE_REGISTRATION, RUNNING).unwrap();
        assert_eq!(reply.command, NO_COMMAND);
        assert_eq!(reply.params, "Node Registered");
        assert!(reply.healthy);

        cp.check_in("n1", NODE_REGISTRATION, RUNNING).unwrap();
        assert_eq!(cp.model().nodes().unwrap(), vec!["n1"]);
    }

    #[test]
    fn running_container_is_acknowledged() {
        let cp = test_control();
        let reply = cp.check_in("n1", "web-abcdefghijklmnopqrst", RUNNING).unwrap();
        assert_eq!(reply, CheckInReply::ack("ACK for n1".to_string()));
    }

    #[test]
    fn unhealthy_container_is_recreated() {
        let cp = test_control();
        let old = "svcA-abcdefghijklmnopqrst";
        cp.model().assign("n1", old).unwrap();

        let reply = cp.check_in("n1", old, "exited").unwrap();
        assert_eq!(reply.command, "recreate");
        assert!(!reply.healthy);

        let params: Vec<&str> = reply.params.split(' ').collect();
        assert_eq!(params[0], old);
        assert_ne!(params[1], old);
        assert_eq!(logical_name(params[1]).unwrap(), "svcA");
        assert_eq!(params[2], DEFAULT_IMAGE);

        let assigned = cp.model().assignments("n1").unwrap();
        assert!(!assigned.iter().any(|c| c == old));
        assert!(assigned.iter().any(|c| c == params[1]));
    }

    #[test]
    fn recreate_keeps_image_and_service_membership() {
        let cp = test_control().with_default_image("busybox");
        let old = new_identity("web").unwrap();
        cp.model().register_service("web").unwrap();
        cp.model().add_member("web", &old).unwrap();
        cp.model().assign("n1", &old).unwrap();
        cp.model().record_spec(&old, &ContainerSpec::new("redis:7", 1)).unwrap();

        let reply = cp.check_in("n1", &old, "dead").unwrap();
        let new = reply.params.split(' ').nth(1).unwrap().to_string();
        assert!(reply.params.ends_with(" redis:7"));

        assert_eq!(cp.model().members("web").unwrap(), vec![new.clone()]);
        assert!(cp.model().spec(&old).unwrap().is_none());
        assert_eq!(cp.model().spec(&new).unwrap(), Some(ContainerSpec::new("redis:7", 1)));
    }

    #[test]
    fn recreate_carries_replica_count() {
        let cp = test_control();
        let old = new_identity("web").unwrap();
        cp.model().assign("n1", &old).unwrap();
        cp.model().record_spec(&old, &ContainerSpec::new("redis:7", 3)).unwrap();

        let reply = cp.check_in("n1", &old, "exited").unwrap();
        let new = reply.params.split(' ').nth(1).unwrap().to_string();
        assert_eq!(cp.model().spec(&new).unwrap(), Some(ContainerSpec::new("redis:7", 3)));
    }

    #[test]
    fn recreate_without_spec_uses_surviving_member_image() {
        let cp = test_control();
        let old = new_identity("web").unwrap();
        let sibling = new_identity("web").unwrap();
        cp.model().register_service("web").unwrap();
        cp.model().add_member("web", &sibling).unwrap();
        cp.model().record_spec(&sibling, &ContainerSpec::new("redis:7", 1)).unwrap();
        cp.model().assign("n1", &old).unwrap();

        let reply = cp.check_in("n1", &old, "exited").unwrap();
        assert!(reply.params.ends_with(" redis:7"));
    }

    #[test]
    fn repeated_unhealthy_report_reissues_same_order() {
        let cp = test_control();
        let old = new_identity("web").unwrap();
        cp.model().register_service("web").unwrap();
        cp.model().add_member("web", &old).unwrap();
        cp.model().assign("n1", &old).unwrap();
        cp.model().record_spec(&old, &ContainerSpec::new("redis:7", 1)).unwrap();

        let first = cp.check_in("n1", &old, "exited").unwrap();
        let second = cp.check_in("n1", &old, "exited").unwrap();
        assert_eq!(first, second);

        let new = first.params.split(' ').nth(1).unwrap().to_string();
        assert_eq!(cp.model().assignments("n1").unwrap(), vec![new.clone()]);
        assert_eq!(cp.model().members("web").unwrap(), vec![new.clone()]);

        // Once the replacement runs, the pending record is gone.
        cp.check_in("n1", &new, RUNNING).unwrap();
        assert!(cp.model().recreate_of(&old).unwrap().is_none());
    }

    #[test]
    fn foreign_container_names_are_ignored() {
        let cp = test_control();
        let reply = cp.check_in("n1", "some_sidecar", "exited").unwrap();
        assert!(reply.healthy);
        assert!(cp.model().assignments("n1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn pull_from_empty_queue_returns_nojob() {
        let cp = test_control();
        let reply = cp.pull_task("n1").await;
        assert_eq!(reply.job, NO_JOB);
        assert!(!reply.is_job());
    }

    #[tokio::test]
    async fn pull_records_assignment_idempotently() {
        let cp = test_control();
        let target = new_identity("web").unwrap();
        let task = TaskSpec::create(target.clone(), "nginx".to_string());

        cp.queue().push(task.clone()).await.unwrap();
        let reply = cp.pull_task("n1").await;
        assert_eq!(reply.job, "create");
        assert_eq!(reply.params, format!("{target} nginx 1"));

        // A retried bookkeeping pass must not duplicate anything.
        cp.record_dispatch("n1", &task).unwrap();

        assert_eq!(cp.model().assignments("n1").unwrap(), vec![target.clone()]);
        assert_eq!(cp.model().services().unwrap(), vec!["web"]);
        assert_eq!(cp.model().members("web").unwrap(), vec![target.clone()]);
        assert_eq!(cp.model().spec(&target).unwrap(), Some(ContainerSpec::new("nginx", 1)));
    }

    #[test]
    fn launch_writes_one_task_per_replica() {
        let cp = test_control();
        let keys = cp.launch_service("web", "nginx", 3).unwrap();
        assert_eq!(keys.len(), 3);
        assert_eq!(cp.model().pending_tasks().unwrap().len(), 3);
        assert_eq!(cp.model().services().unwrap(), vec!["web"]);

        for key in keys {
            let raw = cp.model().store().get(&key).unwrap().unwrap();
            let task = TaskSpec::parse(&raw).unwrap();
            assert_eq!(task.action, Action::Create);
            assert_eq!(task.service(), "web");
            assert_eq!(task.count, 1);
        }
    }

    #[test]
    fn launch_rejects_bad_input() {
        let cp = test_control();
        assert!(matches!(cp.launch_service("Nodes", "nginx", 1), Err(ClusterError::InvalidName { .. })));
        assert!(matches!(cp.launch_service("web", "", 1), Err(ClusterError::InvalidImage(_))));
        assert!(matches!(cp.launch_service("web", "nginx", 0), Err(ClusterError::InvalidReplicas(0))));
        assert!(matches!(
            cp.launch_service("web-abcdefghijklmnopqrst", "nginx", 1),
            Err(ClusterError::InvalidName { .. })
        ));
        assert!(cp.model().pending_tasks().unwrap().is_empty());
    }

    #[test]
    fn launch_rejects_node_names() {
        let cp = test_control();
        cp.check_in("web", NODE_REGISTRATION, RUNNING).unwrap();
        assert!(matches!(
            cp.launch_service("web", "nginx", 1),
            Err(ClusterError::NameTaken { .. })
        ));
        assert!(cp.model().services().unwrap().is_empty());
        assert!(cp.model().pending_tasks().unwrap().is_empty());
    }

    #[test]
    fn evacuate_node_requeues_its_containers() {
        let cp = test_control();
        let with_spec = new_identity("web").unwrap();
        let dangling = new_identity("web").unwrap();
        cp.model().add_member("web", &with_spec).unwrap();
        cp.model().assign("n1", &with_spec).unwrap();
        cp.model().assign("n1", &dangling).unwrap();
        cp.model().record_spec(&with_spec, &ContainerSpec::new("nginx", 1)).unwrap();

        let keys = cp.evacuate_node("n1").unwrap();
        assert_eq!(keys.len(), 1);
        assert!(cp.model().assignments("n1").unwrap().is_empty());
        assert!(cp.model().members("web").unwrap().is_empty());
        assert!(cp.model().spec(&with_spec).unwrap().is_none());
    }
}
