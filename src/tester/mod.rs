// tester/mod.rs - Managed testers and the operations they run
//
// A `ManagedTester` pairs one open connection with one dataset and two
// operations: one run before the test body (setup) and one after it
// (teardown). The factory builds testers, the configurer attaches the
// dataset and fixes the operations.

pub mod configurer;
pub mod factory;

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::dataset::Dataset;
use crate::driver::{qualify, Connection};
use crate::error::Result;

pub use configurer::{ConnectionHook, TesterConfigurer};
pub use factory::TesterFactory;

/// What to do with a dataset against a connection
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DatabaseOperation {
    /// Leave the database alone
    #[default]
    None,
    /// Delete every row of every dataset table, last table first
    DeleteAll,
    /// Insert the dataset rows, first table first
    Insert,
    /// `DeleteAll` followed by `Insert`
    CleanInsert,
}

impl fmt::Display for DatabaseOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseOperation::None => write!(f, "NONE"),
            DatabaseOperation::DeleteAll => write!(f, "DELETE_ALL"),
            DatabaseOperation::Insert => write!(f, "INSERT"),
            DatabaseOperation::CleanInsert => write!(f, "CLEAN_INSERT"),
        }
    }
}

impl DatabaseOperation {
    pub async fn execute(
        self,
        connection: &Connection,
        schema: Option<&str>,
        dataset: &Dataset,
    ) -> Result<()> {
        match self {
            DatabaseOperation::None => Ok(()),
            DatabaseOperation::DeleteAll => delete_all(connection, schema, dataset).await,
            DatabaseOperation::Insert => insert(connection, schema, dataset).await,
            DatabaseOperation::CleanInsert => {
                delete_all(connection, schema, dataset).await?;
                insert(connection, schema, dataset).await
            }
        }
    }
}

async fn delete_all(connection: &Connection, schema: Option<&str>, dataset: &Dataset) -> Result<()> {
    let mut session = connection.session().await;
    for table in dataset.tables().iter().rev() {
        let name = qualify(schema, table.name())?;
        let deleted = session.delete_all(&name).await?;
        tracing::debug!(table = %name, deleted, "Deleted rows");
    }
    Ok(())
}

async fn insert(connection: &Connection, schema: Option<&str>, dataset: &Dataset) -> Result<()> {
    let mut session = connection.session().await;
    for table in dataset.tables() {
        let name = qualify(schema, table.name())?;
        for column in table.columns() {
            crate::driver::validate_identifier(column)?;
        }
        for row in table.rows() {
            session.insert_row(&name, table.columns(), row).await?;
        }
        tracing::debug!(table = %name, rows = table.row_count(), "Inserted rows");
    }
    Ok(())
}

/// One connection, one dataset, a setup and a teardown operation
pub struct ManagedTester {
    connection: Connection,
    schema: Option<String>,
    dataset: Dataset,
    setup_operation: DatabaseOperation,
    teardown_operation: DatabaseOperation,
    setups: AtomicUsize,
    teardowns: AtomicUsize,
}

impl ManagedTester {
    /// New tester with an empty dataset, `CleanInsert` setup and no-op teardown
    pub fn new(connection: Connection, schema: Option<String>) -> Self {
        ManagedTester {
            connection,
            schema,
            dataset: Dataset::empty(),
            setup_operation: DatabaseOperation::CleanInsert,
            teardown_operation: DatabaseOperation::None,
            setups: AtomicUsize::new(0),
            teardowns: AtomicUsize::new(0),
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn set_dataset(&mut self, dataset: Dataset) {
        self.dataset = dataset;
    }

    pub fn setup_operation(&self) -> DatabaseOperation {
        self.setup_operation
    }

    pub fn set_setup_operation(&mut self, operation: DatabaseOperation) {
        self.setup_operation = operation;
    }

    pub fn teardown_operation(&self) -> DatabaseOperation {
        self.teardown_operation
    }

    pub fn set_teardown_operation(&mut self, operation: DatabaseOperation) {
        self.teardown_operation = operation;
    }

    /// Runs the setup operation with the attached dataset
    pub async fn on_setup(&self) -> Result<()> {
        self.setups.fetch_add(1, Ordering::SeqCst);
        self.setup_operation
            .execute(&self.connection, self.schema(), &self.dataset)
            .await
    }

    /// Runs the teardown operation with the attached dataset
    pub async fn on_teardown(&self) -> Result<()> {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
        self.teardown_operation
            .execute(&self.connection, self.schema(), &self.dataset)
            .await
    }

    /// How many times `on_setup` ran
    pub fn setup_invocations(&self) -> usize {
        self.setups.load(Ordering::SeqCst)
    }

    /// How many times `on_teardown` ran
    pub fn teardown_invocations(&self) -> usize {
        self.teardowns.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for ManagedTester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedTester")
            .field("connection", &self.connection)
            .field("schema", &self.schema)
            .field("tables", &self.dataset.table_names().collect::<Vec<_>>())
            .field("setup", &self.setup_operation)
            .field("teardown", &self.teardown_operation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::CellValue;
    use crate::driver::{Credentials, Driver, MemoryDriver};

    const DATASET: &str = r#"{
        "users":  [ { "id": 1, "name": "alice" }, { "id": 2, "name": "bob" } ],
        "orders": [ { "id": 10, "user_id": 1 } ]
    }"#;

    async fn tester_on(driver: &MemoryDriver) -> ManagedTester {
        let store = driver.store("ops");
        store.create_table("users", &["id", "name"]);
        store.create_table("orders", &["id", "user_id"]);
        let conn = driver.connect("mem:ops", &Credentials::default()).await.unwrap();
        let mut tester = ManagedTester::new(conn, None);
        tester.set_dataset(Dataset::from_json_str("ops.json", DATASET).unwrap());
        tester
    }

    #[tokio::test]
    async fn test_clean_insert_replaces_existing_rows() {
        let driver = MemoryDriver::new();
        let tester = tester_on(&driver).await;
        let store = driver.store("ops");
        store
            .insert("users", vec![CellValue::Int(99), CellValue::Text("stale".to_string())])
            .unwrap();

        tester.on_setup().await.unwrap();

        let users = store.rows("users").unwrap();
        assert_eq!(users.len(), 2);
        assert!(!users.iter().any(|row| row[0] == CellValue::Int(99)));
        assert_eq!(store.row_count("orders").unwrap(), 1);
        assert_eq!(tester.setup_invocations(), 1);
    }

    #[tokio::test]
    async fn test_clean_insert_is_repeatable() {
        let driver = MemoryDriver::new();
        let tester = tester_on(&driver).await;

        tester.on_setup().await.unwrap();
        tester.on_setup().await.unwrap();

        assert_eq!(driver.store("ops").row_count("users").unwrap(), 2);
    }

    #[tokio::test]
    async fn test_default_teardown_leaves_rows_in_place() {
        let driver = MemoryDriver::new();
        let tester = tester_on(&driver).await;

        tester.on_setup().await.unwrap();
        tester.on_teardown().await.unwrap();

        assert_eq!(tester.teardown_operation(), DatabaseOperation::None);
        assert_eq!(tester.teardown_invocations(), 1);
        assert_eq!(driver.store("ops").row_count("users").unwrap(), 2);
    }

    #[tokio::test]
    async fn test_delete_all_teardown_empties_tables() {
        let driver = MemoryDriver::new();
        let mut tester = tester_on(&driver).await;
        tester.set_teardown_operation(DatabaseOperation::DeleteAll);

        tester.on_setup().await.unwrap();
        tester.on_teardown().await.unwrap();

        let store = driver.store("ops");
        assert_eq!(store.row_count("users").unwrap(), 0);
        assert_eq!(store.row_count("orders").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_schema_qualifies_tables() {
        let driver = MemoryDriver::new();
        let store = driver.store("schemas");
        store.create_table("app.users", &["id"]);
        let conn = driver.connect("mem:schemas", &Credentials::default()).await.unwrap();

        let mut tester = ManagedTester::new(conn, Some("app".to_string()));
        tester.set_dataset(Dataset::from_json_str("s.json", r#"{ "users": [ { "id": 1 } ] }"#).unwrap());
        tester.on_setup().await.unwrap();

        assert_eq!(store.row_count("app.users").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_bad_column_name_is_rejected_before_insert() {
        let driver = MemoryDriver::new();
        driver.store("bad").create_table("users", &["id"]);
        let conn = driver.connect("mem:bad", &Credentials::default()).await.unwrap();

        let mut tester = ManagedTester::new(conn, None);
        tester.set_dataset(
            Dataset::from_json_str("bad.json", r#"{ "users": [ { "id; DROP": 1 } ] }"#).unwrap(),
        );
        let err = tester.on_setup().await.unwrap_err();
        assert!(matches!(err, crate::error::FixtureError::InvalidIdentifier { .. }));
    }

    #[test]
    fn test_operation_display() {
        assert_eq!(DatabaseOperation::CleanInsert.to_string(), "CLEAN_INSERT");
        assert_eq!(DatabaseOperation::default().to_string(), "NONE");
    }
}
