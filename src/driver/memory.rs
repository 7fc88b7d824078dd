// driver/memory.rs - In-process table store for `mem:<name>` urls
//
// Every `mem:<name>` url names one store that lives as long as its
// driver. Two connections opened on the same name see the same tables,
// like a named in-memory database. Tables must be created through the
// store before rows can be inserted into them.
//
// The driver counts how many connections it opened, which lets tests
// check that an existing connection was reused instead of a new one
// being opened.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::dataset::CellValue;
use crate::driver::{Connection, Credentials, Driver, Session};
use crate::error::{FixtureError, Result};

const BACKEND: &str = "memory";
const URL_PREFIX: &str = "mem:";

#[derive(Debug, Default)]
struct MemoryTable {
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

#[derive(Debug, Default)]
struct MemoryDatabase {
    schemas: BTreeSet<String>,
    // keyed by lowercased `schema.table` / `table`
    tables: BTreeMap<String, MemoryTable>,
}

impl MemoryDatabase {
    fn table_mut(&mut self, table: &str) -> Result<&mut MemoryTable> {
        self.tables
            .get_mut(&table.to_ascii_lowercase())
            .ok_or_else(|| no_such_table(table))
    }

    fn table(&self, table: &str) -> Result<&MemoryTable> {
        self.tables
            .get(&table.to_ascii_lowercase())
            .ok_or_else(|| no_such_table(table))
    }
}

fn no_such_table(table: &str) -> FixtureError {
    FixtureError::driver(
        format!("{BACKEND}: table `{table}`"),
        format!("no such table: {table}"),
    )
}

/// A named in-memory database
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryDatabase>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryDatabase> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn create_schema(&self, schema: &str) {
        self.lock().schemas.insert(schema.to_ascii_lowercase());
    }

    /// Creates (or replaces) an empty table; `name` may be `schema.table`
    pub fn create_table(&self, name: &str, columns: &[&str]) {
        let table = MemoryTable {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        };
        self.lock().tables.insert(name.to_ascii_lowercase(), table);
    }

    pub fn drop_table(&self, name: &str) -> bool {
        self.lock().tables.remove(&name.to_ascii_lowercase()).is_some()
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.lock().tables.contains_key(&name.to_ascii_lowercase())
    }

    /// Inserts a row directly, bypassing any connection
    pub fn insert(&self, name: &str, values: Vec<CellValue>) -> Result<()> {
        let mut db = self.lock();
        let table = db.table_mut(name)?;
        if values.len() != table.columns.len() {
            return Err(FixtureError::driver(
                format!("{BACKEND}: insert into `{name}`"),
                format!("expected {} values, got {}", table.columns.len(), values.len()),
            ));
        }
        table.rows.push(values);
        Ok(())
    }

    pub fn rows(&self, name: &str) -> Result<Vec<Vec<CellValue>>> {
        Ok(self.lock().table(name)?.rows.clone())
    }

    pub fn row_count(&self, name: &str) -> Result<usize> {
        Ok(self.lock().table(name)?.rows.len())
    }
}

/// Driver for `mem:<name>` urls
#[derive(Clone, Debug, Default)]
pub struct MemoryDriver {
    stores: Arc<Mutex<HashMap<String, MemoryStore>>>,
    opened: Arc<AtomicUsize>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// The store behind `mem:<name>`, created on first use.
    /// Accepts either the bare name or the full url.
    pub fn store(&self, name: &str) -> MemoryStore {
        let name = name.strip_prefix(URL_PREFIX).unwrap_or(name);
        self.stores
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    /// Number of connections opened through this driver
    pub fn connections_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    fn accepts(&self, url: &str) -> bool {
        url.starts_with(URL_PREFIX)
    }

    async fn connect(&self, url: &str, credentials: &Credentials) -> Result<Connection> {
        let name = url
            .strip_prefix(URL_PREFIX)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| FixtureError::configuration(format!("`{url}` does not name a memory store")))?;
        if !credentials.is_empty() {
            tracing::debug!(url, "Memory store ignores credentials");
        }
        let store = self.store(name);
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Connection::from_session(MemorySession { store }))
    }
}

/// Session over a `MemoryStore`
#[derive(Debug)]
pub struct MemorySession {
    store: MemoryStore,
}

impl MemorySession {
    pub fn new(store: MemoryStore) -> Self {
        MemorySession { store }
    }
}

#[async_trait]
impl Session for MemorySession {
    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    async fn execute(&mut self, _sql: &str) -> Result<u64> {
        Err(FixtureError::Unsupported {
            backend: BACKEND,
            operation: "raw SQL",
        })
    }

    async fn delete_all(&mut self, table: &str) -> Result<u64> {
        let mut db = self.store.lock();
        let table = db.table_mut(table)?;
        let deleted = table.rows.len() as u64;
        table.rows.clear();
        Ok(deleted)
    }

    async fn insert_row(&mut self, table: &str, columns: &[String], values: &[CellValue]) -> Result<()> {
        let mut db = self.store.lock();
        let target = db.table_mut(table)?;

        let mut row = vec![CellValue::Null; target.columns.len()];
        for (column, value) in columns.iter().zip(values) {
            let index = target
                .columns
                .iter()
                .position(|c| c.eq_ignore_ascii_case(column))
                .ok_or_else(|| {
                    FixtureError::driver(
                        format!("{BACKEND}: insert into `{table}`"),
                        format!("no such column: {column}"),
                    )
                })?;
            row[index] = value.clone();
        }
        target.rows.push(row);
        Ok(())
    }

    async fn row_count(&mut self, table: &str) -> Result<u64> {
        Ok(self.store.lock().table(table)?.rows.len() as u64)
    }

    async fn schema_exists(&mut self, schema: &str) -> Result<bool> {
        Ok(self.store.lock().schemas.contains(&schema.to_ascii_lowercase()))
    }
}
