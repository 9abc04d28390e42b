//! StateStore — redb-backed key/value persistence for Dockyard.
//!
//! Keys and values are strings stored as `&str` / `&[u8]` columns of one
//! table. The store supports both on-disk and in-memory backends (the
//! latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::list;
use crate::tables::KV;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(KV).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Single keys ────────────────────────────────────────────────

    /// Get the value stored under `key`.
    pub fn get(&self, key: &str) -> StateResult<Option<String>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(KV).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(decode(key, guard.value())?)),
            None => Ok(None),
        }
    }

    /// Insert or overwrite `key`.
    pub fn put(&self, key: &str, value: &str) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(KV).map_err(map_err!(Table))?;
            table
                .insert(key, value.as_bytes())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, "key stored");
        Ok(())
    }

    /// Delete `key`. Returns true if it existed.
    pub fn delete(&self, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(KV).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, existed, "key deleted");
        Ok(existed)
    }

    /// Check whether `key` exists.
    pub fn has(&self, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(KV).map_err(map_err!(Table))?;
        Ok(table.get(key).map_err(map_err!(Read))?.is_some())
    }

    /// All keys beginning with `prefix`, in store order.
    pub fn scan_prefix(&self, prefix: &str) -> StateResult<Vec<String>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(KV).map_err(map_err!(Table))?;
        let mut keys = Vec::new();
        for entry in table.range(prefix..).map_err(map_err!(Read))? {
            let (key, _) = entry.map_err(map_err!(Read))?;
            let key = key.value();
            if !key.starts_with(prefix) {
                break;
            }
            keys.push(key.to_string());
        }
        Ok(keys)
    }

    // ── List records ───────────────────────────────────────────────

    /// Values of the list record under `key` (empty if absent).
    pub fn list(&self, key: &str) -> StateResult<Vec<String>> {
        Ok(self
            .get(key)?
            .map(|raw| list::split(&raw))
            .unwrap_or_default())
    }

    /// Append `value` to the list under `key` unless already present,
    /// creating the record if needed. Returns true if the record changed.
    pub fn append(&self, key: &str, value: &str) -> StateResult<bool> {
        list::validate_value(value)?;
        self.edit_list(key, |values| list::append_value(values, value))
    }

    /// Remove `value` from the list under `key` if present. An emptied
    /// record is deleted. Returns true if the record changed.
    pub fn eject(&self, key: &str, value: &str) -> StateResult<bool> {
        self.edit_list(key, |values| list::eject_value(values, value))
    }

    /// Read-modify-write one list record inside a single write transaction.
    fn edit_list<F>(&self, key: &str, edit: F) -> StateResult<bool>
    where
        F: FnOnce(&mut Vec<String>) -> bool,
    {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let changed;
        {
            let mut table = txn.open_table(KV).map_err(map_err!(Table))?;
            let current = match table.get(key).map_err(map_err!(Read))? {
                Some(guard) => decode(key, guard.value())?,
                None => String::new(),
            };
            let mut values = list::split(&current);
            changed = edit(&mut values);
            if changed {
                if values.is_empty() {
                    table.remove(key).map_err(map_err!(Write))?;
                } else {
                    let joined = list::join(&values);
                    table
                        .insert(key, joined.as_bytes())
                        .map_err(map_err!(Write))?;
                }
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(changed)
    }
}

fn decode(key: &str, bytes: &[u8]) -> StateResult<String> {
    String::from_utf8(bytes.to_vec()).map_err(|_| StateError::Decode {
        key: key.to_string(),
    })
}
