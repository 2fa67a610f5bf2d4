use async_trait::async_trait;
use cachelink_spec::{Error, Record, Result, StorageBackend, TableName, WriteOp};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

type Table = HashMap<String, Record>;

/// Simple in-memory backend suitable for embedded usage and tests.
///
/// Follows the managed backend's semantics: key operations against a table
/// that was never created fail, absence is not an error.
#[derive(Default)]
pub struct MemoryBackend {
    tables: RwLock<HashMap<TableName, Table>>,
    outage: RwLock<Option<String>>,
    poisoned_keys: RwLock<BTreeSet<String>>,
    batch_calls: AtomicUsize,
    direct_writes: AtomicUsize,
}

impl MemoryBackend {
    /// Construct a new empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with a backend error until cleared with `None`.
    pub fn set_outage(&self, reason: Option<&str>) {
        *self.outage.write() = reason.map(str::to_string);
    }

    /// Fail any write touching `key`, including whole batches containing it.
    pub fn poison_key(&self, key: impl Into<String>) {
        self.poisoned_keys.write().insert(key.into());
    }

    /// Number of `write_batch` round trips served.
    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    /// Number of unbuffered `put`/`delete` calls served.
    pub fn direct_writes(&self) -> usize {
        self.direct_writes.load(Ordering::SeqCst)
    }

    /// Names of the tables that currently exist, sorted.
    pub fn table_names(&self) -> Vec<TableName> {
        let mut names: Vec<TableName> = self.tables.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn check_outage(&self) -> Result<()> {
        match self.outage.read().as_ref() {
            Some(reason) => Err(Error::Backend(reason.clone())),
            None => Ok(()),
        }
    }

    fn check_poisoned(&self, key: &str) -> Result<()> {
        if self.poisoned_keys.read().contains(key) {
            return Err(Error::Backend(format!("write rejected for {key}")));
        }
        Ok(())
    }
}

fn missing_table(table: &TableName) -> Error {
    Error::Backend(format!("requested resource not found: table {table}"))
}

fn apply(table: &mut Table, op: &WriteOp) {
    match op {
        WriteOp::Put { key, record } => {
            table.insert(key.clone(), record.clone());
        }
        WriteOp::Delete { key } => {
            table.remove(key);
        }
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, table: &TableName, key: &str) -> Result<Option<Record>> {
        self.check_outage()?;
        let tables = self.tables.read();
        let entries = tables.get(table).ok_or_else(|| missing_table(table))?;
        Ok(entries.get(key).cloned())
    }

    async fn put(&self, table: &TableName, key: &str, record: &Record) -> Result<()> {
        self.check_outage()?;
        self.check_poisoned(key)?;
        let mut tables = self.tables.write();
        let entries = tables.get_mut(table).ok_or_else(|| missing_table(table))?;
        entries.insert(key.to_string(), record.clone());
        self.direct_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, table: &TableName, key: &str) -> Result<()> {
        self.check_outage()?;
        self.check_poisoned(key)?;
        let mut tables = self.tables.write();
        let entries = tables.get_mut(table).ok_or_else(|| missing_table(table))?;
        entries.remove(key);
        self.direct_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn write_batch(&self, table: &TableName, writes: &[WriteOp]) -> Result<()> {
        self.check_outage()?;
        for op in writes {
            self.check_poisoned(op.key())?;
        }
        let mut tables = self.tables.write();
        let entries = tables.get_mut(table).ok_or_else(|| missing_table(table))?;
        for op in writes {
            apply(entries, op);
        }
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn create_table(&self, table: &TableName) -> Result<()> {
        self.check_outage()?;
        let mut tables = self.tables.write();
        if tables.contains_key(table) {
            return Err(Error::TableExists {
                table: table.to_string(),
            });
        }
        tables.insert(table.clone(), Table::new());
        Ok(())
    }

    async fn delete_table(&self, table: &TableName) -> Result<()> {
        self.check_outage()?;
        match self.tables.write().remove(table) {
            Some(_) => Ok(()),
            None => Err(Error::TableNotFound {
                table: table.to_string(),
            }),
        }
    }

    async fn ping(&self) -> Result<()> {
        self.check_outage()
    }
}
