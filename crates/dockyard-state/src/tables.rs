//! redb table definitions for the Dockyard state store.

use redb::TableDefinition;

/// The single flat keyspace. Keys are ordered byte-wise, which is what
/// prefix scans rely on.
pub const KV: TableDefinition<&str, &[u8]> = TableDefinition::new("kv");
