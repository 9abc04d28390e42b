//! dockyard-state — embedded key/value state store for Dockyard.
//!
//! Backed by [redb](https://docs.rs/redb), provides the durable flat
//! keyspace the control plane layers its cluster model on: exact-match
//! get/put/delete/has, ordered prefix scans, and list records
//! (space-separated values edited with append-if-absent and
//! remove-if-present semantics).
//!
//! # Architecture
//!
//! Every call runs in its own redb transaction and is durable once it
//! returns. There are no multi-key transactions: callers that touch
//! several keys must keep each step safe to interrupt. A single list edit
//! is read-modify-written inside one write transaction, so concurrent
//! appends to the same record never lose each other.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod list;
pub mod store;
pub mod tables;

pub use error::{StateError, StateResult};
pub use store::StateStore;
