// driver/mod.rs - The database seam
//
// The lifecycle never talks to a database client directly. It opens
// connections through a `Driver` and manipulates rows through a
// `Session`. Two drivers ship with the crate:
// - `MemoryDriver` for `mem:` urls, an in-process table store
// - `SqlxDriver` (feature `db-tools`) for anything sqlx's Any driver
//   understands, e.g. `postgres://...` or `sqlite::memory:`
//
// `Connection` is the handle test code holds. Clones share the same
// session and the same `ConnectionId`; the id is what the tester
// registry is keyed by.

pub mod memory;
#[cfg(feature = "db-tools")]
pub mod sqlx_driver;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard};

use crate::dataset::CellValue;
use crate::error::{FixtureError, Result};

pub use memory::{MemoryDriver, MemorySession, MemoryStore};
#[cfg(feature = "db-tools")]
pub use sqlx_driver::{SqlxDriver, SqlxSession};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an opened connection
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[cfg(test)]
    pub(crate) fn from_raw(raw: u64) -> Self {
        ConnectionId(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "connection#{}", self.0)
    }
}

/// Username and password used when opening a connection
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Credentials {
    pub fn new(username: Option<String>, password: Option<String>) -> Self {
        Credentials { username, password }
    }

    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.password.is_none()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// An open database session.
///
/// Table names handed to a session are already validated and, when a
/// schema is configured, qualified as `schema.table`.
#[async_trait]
pub trait Session: Send {
    /// Short backend label used in logs and errors
    fn backend_name(&self) -> &'static str;

    /// Runs raw SQL, returning the number of affected rows
    async fn execute(&mut self, sql: &str) -> Result<u64>;

    /// Deletes every row of `table`
    async fn delete_all(&mut self, table: &str) -> Result<u64>;

    /// Inserts one row; `columns` and `values` have the same length
    async fn insert_row(&mut self, table: &str, columns: &[String], values: &[CellValue]) -> Result<()>;

    async fn row_count(&mut self, table: &str) -> Result<u64>;

    async fn schema_exists(&mut self, schema: &str) -> Result<bool>;
}

/// Opens connections for the urls it accepts
#[async_trait]
pub trait Driver: Send + Sync {
    fn accepts(&self, url: &str) -> bool;

    async fn connect(&self, url: &str, credentials: &Credentials) -> Result<Connection>;
}

/// Shared handle to one open session
#[derive(Clone)]
pub struct Connection {
    id: ConnectionId,
    backend: &'static str,
    session: Arc<Mutex<Box<dyn Session>>>,
}

impl Connection {
    pub fn new(session: Box<dyn Session>) -> Self {
        Connection {
            id: ConnectionId::next(),
            backend: session.backend_name(),
            session: Arc::new(Mutex::new(session)),
        }
    }

    pub fn from_session<S: Session + 'static>(session: S) -> Self {
        Self::new(Box::new(session))
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend
    }

    /// Exclusive access to the underlying session
    pub async fn session(&self) -> MutexGuard<'_, Box<dyn Session>> {
        self.session.lock().await
    }

    pub async fn execute(&self, sql: &str) -> Result<u64> {
        self.session().await.execute(sql).await
    }

    /// Row count of `table`, optionally qualified by `schema`
    pub async fn row_count(&self, schema: Option<&str>, table: &str) -> Result<u64> {
        let table = qualify(schema, table)?;
        self.session().await.row_count(&table).await
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Connection {}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("backend", &self.backend)
            .finish()
    }
}

/// Routes a url to the first registered driver that accepts it
#[derive(Clone, Default)]
pub struct DriverManager {
    drivers: Vec<Arc<dyn Driver>>,
}

impl DriverManager {
    /// An empty manager; every connect fails until drivers are registered
    pub fn new() -> Self {
        Self::default()
    }

    /// In-memory driver plus, with `db-tools`, the sqlx driver
    pub fn with_defaults() -> Self {
        Self::with_memory(MemoryDriver::new())
    }

    /// Like `with_defaults`, but with a caller-owned memory driver so the
    /// caller can inspect its stores
    pub fn with_memory(memory: MemoryDriver) -> Self {
        let manager = DriverManager::new().register(memory);
        #[cfg(feature = "db-tools")]
        let manager = manager.register(SqlxDriver::new());
        manager
    }

    pub fn register<D: Driver + 'static>(mut self, driver: D) -> Self {
        self.drivers.push(Arc::new(driver));
        self
    }
}

#[async_trait]
impl Driver for DriverManager {
    fn accepts(&self, url: &str) -> bool {
        self.drivers.iter().any(|d| d.accepts(url))
    }

    async fn connect(&self, url: &str, credentials: &Credentials) -> Result<Connection> {
        let driver = self
            .drivers
            .iter()
            .find(|d| d.accepts(url))
            .ok_or_else(|| FixtureError::configuration(format!("no driver accepts url `{url}`")))?;
        driver.connect(url, credentials).await
    }
}

/// Rejects anything but plain SQL identifiers.
///
/// Names are never quoted, so the database folds their case the same way
/// it does for hand-written SQL.
pub fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(FixtureError::InvalidIdentifier {
            name: name.to_string(),
        })
    }
}

/// `schema.table` or just `table`, both parts validated
pub fn qualify(schema: Option<&str>, table: &str) -> Result<String> {
    validate_identifier(table)?;
    match schema {
        Some(schema) => {
            validate_identifier(schema)?;
            Ok(format!("{schema}.{table}"))
        }
        None => Ok(table.to_string()),
    }
}
