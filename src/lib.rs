// lib.rs - Root module for the dbfixture library
//
// dbfixture manages database fixtures around a test:
// - a test struct declares which of its fields are fixtures (`fixtures`)
// - before the test body, each field gets a connection or a managed
//   tester whose dataset has been clean-inserted (`rule`, `tester`)
// - after the test body, every tester's teardown runs (`rule`)
//
// Typical use:
//
//   let mut rule = FixtureRule::with_global_cache(Arc::new(DriverManager::with_defaults()));
//   let mut test = UserTests::default();
//   rule.before(&mut test).await?;
//   // ... test body, `rule.get_tester(&conn)` is available here ...
//   rule.after().await?;

pub mod config;
pub mod dataset;
pub mod descriptor;
pub mod driver;
pub mod error;
pub mod fixtures;
pub mod registry;
pub mod rule;
pub mod tester;

pub use config::{init_logging, FixtureConfig};
pub use dataset::{CellValue, Dataset, DatasetResolver, ResourceLocator, Table};
pub use descriptor::{FixtureAttributes, FixtureDescriptor};
pub use driver::{Connection, ConnectionId, Credentials, Driver, DriverManager, MemoryDriver, MemoryStore, Session};
pub use error::{FixtureError, Result, TeardownFailure, TeardownFailures};
pub use fixtures::{introspect, ClassMetadata, ClassMetadataCache, FieldAccess, FieldCapability, FixtureClass, FixtureFields};
pub use registry::TesterRegistry;
pub use rule::{FixtureRule, LifecycleState};
pub use tester::{ConnectionHook, DatabaseOperation, ManagedTester, TesterConfigurer, TesterFactory};
