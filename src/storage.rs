//! Transactional key/value store backing the ledger tables
//!
//! The engine keeps six logical tables (`blocks`, `transactions`, `utxos`,
//! `stxos`, `inputs`, `candidates`) in one ordered key/value store. Every
//! mutation of a public submission happens inside exactly one
//! [`StoreTransaction`], which buffers writes and applies them atomically on
//! commit; a dropped transaction aborts, so a handle released on any exit
//! path leaves the store untouched.

use crate::error::{ChainError, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

/// Pseudo-index under which primary rows are stored. Secondary rows use the
/// caller-supplied subindex (`0` for the per-owner output id lists).
const PRIMARY_INDEX: i64 = -1;

/// (table, index, key) addressing one row.
pub type RowKey = (String, i64, String);

/// Abstraction for storage backends. Implementations provide point reads of
/// committed state and atomic application of a write batch.
pub trait StoreBackend: Send + Sync {
    fn read(&self, table: &str, index: i64, key: &str) -> Result<Option<String>>;

    /// Apply the batch atomically: either every put/erase lands or none do.
    fn apply(&self, batch: Vec<(RowKey, Option<String>)>) -> Result<()>;

    /// Drop every row in the store.
    fn clear(&self) -> Result<()>;
}

/// SQLite-backed store. All rows live in a single relation keyed by
/// (table, index, key); batches commit under one SQL transaction.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| ChainError::DatabaseError(format!("Failed to open database: {}", e)))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| ChainError::DatabaseError(format!("Failed to open database: {}", e)))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS entries (
                tbl TEXT NOT NULL,
                idx INTEGER NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (tbl, idx, key)
            )",
            [],
        )
        .map_err(|e| ChainError::DatabaseError(format!("Failed to create entries table: {}", e)))?;

        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| ChainError::DatabaseError("Mutex poisoned".to_string()))
    }
}

impl StoreBackend for SqliteStore {
    fn read(&self, table: &str, index: i64, key: &str) -> Result<Option<String>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT value FROM entries WHERE tbl = ?1 AND idx = ?2 AND key = ?3",
            params![table, index, key],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| ChainError::DatabaseError(format!("Failed to read entry: {}", e)))
    }

    fn apply(&self, batch: Vec<(RowKey, Option<String>)>) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| ChainError::DatabaseError(format!("Failed to start transaction: {}", e)))?;

        for ((table, index, key), value) in batch {
            match value {
                Some(value) => tx
                    .execute(
                        "INSERT OR REPLACE INTO entries (tbl, idx, key, value)
                         VALUES (?1, ?2, ?3, ?4)",
                        params![table, index, key, value],
                    )
                    .map_err(|e| {
                        ChainError::DatabaseError(format!("Failed to write entry: {}", e))
                    })?,
                None => tx
                    .execute(
                        "DELETE FROM entries WHERE tbl = ?1 AND idx = ?2 AND key = ?3",
                        params![table, index, key],
                    )
                    .map_err(|e| {
                        ChainError::DatabaseError(format!("Failed to erase entry: {}", e))
                    })?,
            };
        }

        tx.commit()
            .map_err(|e| ChainError::DatabaseError(format!("Failed to commit transaction: {}", e)))
    }

    fn clear(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM entries", [])
            .map_err(|e| ChainError::DatabaseError(format!("Failed to clear store: {}", e)))?;
        Ok(())
    }
}

/// Simple in-memory store useful for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryStore {
    rows: RwLock<BTreeMap<RowKey, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full copy of the committed rows, for state comparisons in tests.
    pub fn snapshot(&self) -> BTreeMap<RowKey, String> {
        self.rows.read().map(|rows| rows.clone()).unwrap_or_default()
    }
}

impl StoreBackend for MemoryStore {
    fn read(&self, table: &str, index: i64, key: &str) -> Result<Option<String>> {
        let rows = self
            .rows
            .read()
            .map_err(|_| ChainError::DatabaseError("Lock poisoned".to_string()))?;
        Ok(rows
            .get(&(table.to_string(), index, key.to_string()))
            .cloned())
    }

    fn apply(&self, batch: Vec<(RowKey, Option<String>)>) -> Result<()> {
        let mut rows = self
            .rows
            .write()
            .map_err(|_| ChainError::DatabaseError("Lock poisoned".to_string()))?;
        for (key, value) in batch {
            match value {
                Some(value) => {
                    rows.insert(key, value);
                }
                None => {
                    rows.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut rows = self
            .rows
            .write()
            .map_err(|_| ChainError::DatabaseError("Lock poisoned".to_string()))?;
        rows.clear();
        Ok(())
    }
}

/// Handle to one open store.
#[derive(Clone)]
pub struct Storage {
    backend: Arc<dyn StoreBackend>,
}

impl Storage {
    pub fn new(backend: Arc<dyn StoreBackend>) -> Self {
        Storage { backend }
    }

    /// Open an SQLite-backed store at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Storage::new(Arc::new(SqliteStore::open(path)?)))
    }

    /// Open a fresh in-memory store.
    pub fn in_memory() -> Self {
        Storage::new(Arc::new(MemoryStore::new()))
    }

    pub fn begin(&self) -> StoreTransaction {
        StoreTransaction {
            backend: Arc::clone(&self.backend),
            ops: HashMap::new(),
        }
    }

    pub fn clear(&self) -> Result<()> {
        self.backend.clear()
    }
}

/// A buffered store transaction. Reads see the caller's own uncommitted
/// writes; nothing reaches the backend until `commit`.
pub struct StoreTransaction {
    backend: Arc<dyn StoreBackend>,
    ops: HashMap<RowKey, Option<String>>,
}

impl StoreTransaction {
    fn read(&self, table: &str, index: i64, key: &str) -> Result<Option<String>> {
        let row_key = (table.to_string(), index, key.to_string());
        if let Some(pending) = self.ops.get(&row_key) {
            return Ok(pending.clone());
        }
        self.backend.read(table, index, key)
    }

    fn write(&mut self, table: &str, index: i64, key: &str, value: Option<String>) {
        self.ops
            .insert((table.to_string(), index, key.to_string()), value);
    }

    pub fn commit(self) -> Result<()> {
        self.backend.apply(self.ops.into_iter().collect())
    }

    /// Discard every buffered write. Dropping the transaction has the same
    /// effect; this form states the intent at the call site.
    pub fn abort(self) {}
}

/// A named logical table within the store.
#[derive(Debug, Clone, Copy)]
pub struct Table {
    name: &'static str,
}

impl Table {
    pub fn new(name: &'static str) -> Self {
        Table { name }
    }

    pub fn get(&self, tx: &StoreTransaction, key: &str) -> Result<Option<Value>> {
        self.parse(tx.read(self.name, PRIMARY_INDEX, key)?)
    }

    pub fn get_index(&self, tx: &StoreTransaction, key: &str, index: u32) -> Result<Option<Value>> {
        self.parse(tx.read(self.name, index as i64, key)?)
    }

    pub fn put(&self, tx: &mut StoreTransaction, key: &str, value: &Value) {
        tx.write(self.name, PRIMARY_INDEX, key, Some(value.to_string()));
    }

    pub fn put_index(&self, tx: &mut StoreTransaction, key: &str, value: &Value, index: u32) {
        tx.write(self.name, index as i64, key, Some(value.to_string()));
    }

    pub fn erase(&self, tx: &mut StoreTransaction, key: &str) {
        tx.write(self.name, PRIMARY_INDEX, key, None);
    }

    pub fn erase_index(&self, tx: &mut StoreTransaction, key: &str, index: u32) {
        tx.write(self.name, index as i64, key, None);
    }

    fn parse(&self, raw: Option<String>) -> Result<Option<Value>> {
        match raw {
            Some(text) => serde_json::from_str(&text)
                .map(Some)
                .map_err(|e| ChainError::DatabaseError(format!("Corrupt row: {}", e))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table() -> Table {
        Table::new("utxos")
    }

    #[test]
    fn test_commit_makes_writes_visible() {
        let storage = Storage::in_memory();
        let mut tx = storage.begin();
        table().put(&mut tx, "a", &json!({"value": 1}));
        tx.commit().unwrap();

        let tx = storage.begin();
        assert_eq!(table().get(&tx, "a").unwrap(), Some(json!({"value": 1})));
    }

    #[test]
    fn test_abort_discards_writes() {
        let storage = Storage::in_memory();
        let mut tx = storage.begin();
        table().put(&mut tx, "a", &json!(1));
        tx.abort();

        let tx = storage.begin();
        assert_eq!(table().get(&tx, "a").unwrap(), None);
    }

    #[test]
    fn test_read_your_writes() {
        let storage = Storage::in_memory();
        let mut tx = storage.begin();
        table().put(&mut tx, "a", &json!(1));
        assert_eq!(table().get(&tx, "a").unwrap(), Some(json!(1)));

        table().erase(&mut tx, "a");
        assert_eq!(table().get(&tx, "a").unwrap(), None);
    }

    #[test]
    fn test_subindex_is_a_separate_keyspace() {
        let storage = Storage::in_memory();
        let mut tx = storage.begin();
        table().put(&mut tx, "pk", &json!("primary"));
        table().put_index(&mut tx, "pk", &json!(["id1", "id2"]), 0);
        tx.commit().unwrap();

        let tx = storage.begin();
        assert_eq!(table().get(&tx, "pk").unwrap(), Some(json!("primary")));
        assert_eq!(
            table().get_index(&tx, "pk", 0).unwrap(),
            Some(json!(["id1", "id2"]))
        );
    }

    #[test]
    fn test_tables_do_not_collide() {
        let storage = Storage::in_memory();
        let mut tx = storage.begin();
        Table::new("utxos").put(&mut tx, "k", &json!("u"));
        Table::new("stxos").put(&mut tx, "k", &json!("s"));
        tx.commit().unwrap();

        let tx = storage.begin();
        assert_eq!(Table::new("utxos").get(&tx, "k").unwrap(), Some(json!("u")));
        assert_eq!(Table::new("stxos").get(&tx, "k").unwrap(), Some(json!("s")));
    }

    #[test]
    fn test_clear_empties_the_store() {
        let storage = Storage::in_memory();
        let mut tx = storage.begin();
        table().put(&mut tx, "a", &json!(1));
        tx.commit().unwrap();

        storage.clear().unwrap();
        let tx = storage.begin();
        assert_eq!(table().get(&tx, "a").unwrap(), None);
    }

    #[test]
    fn test_sqlite_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain.db");

        {
            let storage = Storage::open(&path).unwrap();
            let mut tx = storage.begin();
            table().put(&mut tx, "a", &json!({"value": 42}));
            tx.commit().unwrap();
        }

        // Reopen and confirm the row survived the process boundary.
        let storage = Storage::open(&path).unwrap();
        let tx = storage.begin();
        assert_eq!(table().get(&tx, "a").unwrap(), Some(json!({"value": 42})));
    }

    #[test]
    fn test_sqlite_batch_is_atomic() {
        let storage = Storage::new(Arc::new(SqliteStore::open_in_memory().unwrap()));
        let mut tx = storage.begin();
        table().put(&mut tx, "a", &json!(1));
        table().put(&mut tx, "b", &json!(2));
        table().erase(&mut tx, "missing");
        tx.commit().unwrap();

        let tx = storage.begin();
        assert_eq!(table().get(&tx, "a").unwrap(), Some(json!(1)));
        assert_eq!(table().get(&tx, "b").unwrap(), Some(json!(2)));
    }
}
