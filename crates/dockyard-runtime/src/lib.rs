//! dockyard-runtime — the container runtime capability for Dockyard.
//!
//! Both the control plane (node audit, state views) and the node agent
//! (command execution) talk to containers through the
//! [`ContainerRuntime`] trait. Two backends are provided:
//!
//! - [`DockerCli`] shells out to the `docker` binary.
//! - [`MemoryRuntime`] keeps containers in memory, for tests and dry runs.
//!
//! The crate also owns the container identity scheme
//! (`<logical-name>-<20 char suffix>`) and the positional command grammar
//! agents execute (`create`, `recreate`, `delete`).

pub mod command;
pub mod docker;
pub mod error;
pub mod identity;
pub mod memory;
pub mod ops;
pub mod runtime;

pub use command::{Action, Command, CommandError};
pub use docker::DockerCli;
pub use error::{RuntimeError, RuntimeResult};
pub use identity::{IdentityError, logical_name, new_identity};
pub use memory::MemoryRuntime;
pub use ops::execute;
pub use runtime::{ContainerInfo, ContainerRuntime, ListScope, RUNNING};
