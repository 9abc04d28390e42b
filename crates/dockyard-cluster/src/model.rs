//! Cluster state model — the key schema layered on the state store.
//!
//! | Key | Value |
//! |---|---|
//! | `Nodes` | list of registered node ids |
//! | `Services` | list of registered service names |
//! | `<node-id>` | list of container identities assigned to the node |
//! | `<service>` | list of container identities fulfilling the service |
//! | `<container-identity>` | container spec: `<image> <replicas>` |
//! | `Task-<suffix>` | pending task payload |
//! | `Recreate-<new-identity>` | in-flight recreate: `<old-identity> <image> <replicas>` |
//!
//! Every edit is a single-key, idempotent operation (append-if-absent,
//! remove-if-present, put, delete). Sequences of edits are not atomic;
//! callers order them so an interrupted sequence leaves duplicates rather
//! than lost records, and readers treat an assigned container whose spec
//! is missing as already gone.

use std::collections::HashMap;

use tracing::warn;

use dockyard_runtime::command::parse_count;
use dockyard_runtime::identity::is_identity;
use dockyard_runtime::logical_name;
use dockyard_state::StateStore;

use crate::error::{ClusterError, ClusterResult};
use crate::task::{TASK_BASE, TASK_PREFIX};

/// Roster of registered nodes.
pub const NODES_KEY: &str = "Nodes";

/// Roster of registered services.
pub const SERVICES_KEY: &str = "Services";

/// Sentinel container name agents report to register themselves.
pub const NODE_REGISTRATION: &str = "nodereg";

/// Base of the in-flight recreate keys.
pub const RECREATE_BASE: &str = "Recreate";

/// Prefix of in-flight recreate keys.
pub const RECREATE_PREFIX: &str = "Recreate-";

/// Provisioning parameters recorded per container, used to re-derive a
/// task when the container must be recreated elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub image: String,
    pub replicas: u32,
}

impl ContainerSpec {
    pub fn new(image: impl Into<String>, replicas: u32) -> Self {
        Self {
            image: image.into(),
            replicas,
        }
    }

    /// Decode `<image> [replicas]`.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut fields = raw.split_whitespace();
        let image = fields.next()?.to_string();
        let replicas = match fields.next() {
            Some(count) => parse_count(count).ok()?,
            None => 1,
        };
        fields.next().is_none().then_some(Self { image, replicas })
    }

    pub fn encode(&self) -> String {
        format!("{} {}", self.image, self.replicas)
    }
}

/// Typed access to the cluster keyspace.
#[derive(Clone)]
pub struct ClusterModel {
    store: StateStore,
}

impl ClusterModel {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    // ── Rosters ────────────────────────────────────────────────────

    /// Add a node to the roster. Returns true if it was new.
    ///
    /// Node ids and service names share the keyspace, so a name already
    /// registered as a service is refused.
    pub fn register_node(&self, node: &str) -> ClusterResult<bool> {
        validate_name("node", node)?;
        if self.services()?.iter().any(|s| s == node) {
            return Err(ClusterError::NameTaken {
                kind: "node",
                name: node.to_string(),
                owner: "service",
            });
        }
        Ok(self.store.append(NODES_KEY, node)?)
    }

    /// Add a service to the roster. Returns true if it was new.
    pub fn register_service(&self, service: &str) -> ClusterResult<bool> {
        self.check_service_name(service)?;
        Ok(self.store.append(SERVICES_KEY, service)?)
    }

    /// Reject service names that are malformed or already a node id.
    pub fn check_service_name(&self, service: &str) -> ClusterResult<()> {
        validate_service_name(service)?;
        if self.nodes()?.iter().any(|n| n == service) {
            return Err(ClusterError::NameTaken {
                kind: "service",
                name: service.to_string(),
                owner: "node",
            });
        }
        Ok(())
    }

    pub fn nodes(&self) -> ClusterResult<Vec<String>> {
        Ok(self.store.list(NODES_KEY)?)
    }

    pub fn services(&self) -> ClusterResult<Vec<String>> {
        Ok(self.store.list(SERVICES_KEY)?)
    }

    // ── Node assignments ───────────────────────────────────────────

    pub fn assign(&self, node: &str, container: &str) -> ClusterResult<bool> {
        validate_name("node", node)?;
        Ok(self.store.append(node, container)?)
    }

    pub fn unassign(&self, node: &str, container: &str) -> ClusterResult<bool> {
        Ok(self.store.eject(node, container)?)
    }

    pub fn assignments(&self, node: &str) -> ClusterResult<Vec<String>> {
        Ok(self.store.list(node)?)
    }

    /// Map of container identity → hosting node, across all nodes.
    pub fn placements(&self) -> ClusterResult<HashMap<String, String>> {
        let mut placements = HashMap::new();
        for node in self.nodes()? {
            for container in self.assignments(&node)? {
                placements.insert(container, node.clone());
            }
        }
        Ok(placements)
    }

    // ── Service membership ─────────────────────────────────────────

    pub fn add_member(&self, service: &str, container: &str) -> ClusterResult<bool> {
        validate_service_name(service)?;
        Ok(self.store.append(service, container)?)
    }

    pub fn remove_member(&self, service: &str, container: &str) -> ClusterResult<bool> {
        Ok(self.store.eject(service, container)?)
    }

    pub fn members(&self, service: &str) -> ClusterResult<Vec<String>> {
        Ok(self.store.list(service)?)
    }

    /// Number of recorded container specs belonging to `service`.
    pub fn count_replicas(&self, service: &str) -> ClusterResult<usize> {
        let prefix = format!("{service}-");
        let keys = self.store.scan_prefix(&prefix)?;
        Ok(keys
            .iter()
            .filter(|key| logical_name(key).is_ok_and(|name| name == service))
            .count())
    }

    // ── Container specs ────────────────────────────────────────────

    pub fn record_spec(&self, container: &str, spec: &ContainerSpec) -> ClusterResult<()> {
        logical_name(container)?;
        self.store.put(container, &spec.encode())?;
        Ok(())
    }

    /// Spec of `container`; `None` if missing or unreadable.
    pub fn spec(&self, container: &str) -> ClusterResult<Option<ContainerSpec>> {
        let Some(raw) = self.store.get(container)? else {
            return Ok(None);
        };
        let spec = ContainerSpec::parse(&raw);
        if spec.is_none() {
            warn!(%container, %raw, "ignoring malformed container spec");
        }
        Ok(spec)
    }

    pub fn delete_spec(&self, container: &str) -> ClusterResult<bool> {
        Ok(self.store.delete(container)?)
    }

    // ── In-flight recreates ────────────────────────────────────────

    /// Remember that `new` replaces `old`, so a repeated report about
    /// `old` resolves to the same replacement.
    pub fn record_recreate(&self, old: &str, new: &str, spec: &ContainerSpec) -> ClusterResult<()> {
        logical_name(new)?;
        self.store
            .put(&format!("{RECREATE_PREFIX}{new}"), &format!("{old} {}", spec.encode()))?;
        Ok(())
    }

    /// Replacement already chosen for `old`, with the spec it was given.
    pub fn recreate_of(&self, old: &str) -> ClusterResult<Option<(String, ContainerSpec)>> {
        for key in self.store.scan_prefix(RECREATE_PREFIX)? {
            let Some(raw) = self.store.get(&key)? else {
                continue;
            };
            let Some((from, spec)) = raw.split_once(' ') else {
                warn!(%key, %raw, "ignoring malformed recreate record");
                continue;
            };
            if from != old {
                continue;
            }
            match ContainerSpec::parse(spec) {
                Some(spec) => return Ok(Some((key[RECREATE_PREFIX.len()..].to_string(), spec))),
                None => warn!(%key, %raw, "ignoring malformed recreate record"),
            }
        }
        Ok(None)
    }

    /// Forget the in-flight recreate that produced `new`, if any.
    pub fn clear_recreate(&self, new: &str) -> ClusterResult<bool> {
        let key = format!("{RECREATE_PREFIX}{new}");
        if !self.store.has(&key)? {
            return Ok(false);
        }
        Ok(self.store.delete(&key)?)
    }

    // ── Tasks ──────────────────────────────────────────────────────

    /// Keys of durable tasks, in store order.
    pub fn pending_tasks(&self) -> ClusterResult<Vec<String>> {
        Ok(self.store.scan_prefix(TASK_PREFIX)?)
    }
}

/// Names become keys and list values, so they must not contain
/// whitespace or collide with the reserved keys.
pub fn validate_name(kind: &'static str, name: &str) -> ClusterResult<()> {
    let reserved = name == NODES_KEY
        || name == SERVICES_KEY
        || name == NODE_REGISTRATION
        || name == TASK_BASE
        || name.starts_with(TASK_PREFIX)
        || name == RECREATE_BASE
        || name.starts_with(RECREATE_PREFIX);
    if name.is_empty() || reserved || name.chars().any(char::is_whitespace) {
        return Err(ClusterError::InvalidName {
            kind,
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Service names additionally must not look like container identities,
/// which key the spec records, and must be safe as a metrics label.
pub fn validate_service_name(name: &str) -> ClusterResult<()> {
    validate_name("service", name)?;
    if is_identity(name) || name.contains(['"', '\\']) {
        return Err(ClusterError::InvalidName {
            kind: "service",
            name: name.to_string(),
        });
    }
    Ok(())
}
