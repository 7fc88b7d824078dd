// common/mod.rs - Shared helpers for the integration tests
//
// This module provides:
// 1. The location of the dataset resources used by the tests
// 2. A rule wired to a caller-owned memory driver
// 3. Table creation for the datasets in tests/resources

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use dbfixture::{
    ClassMetadataCache, DatasetResolver, FixtureRule, MemoryDriver, MemoryStore, ResourceLocator,
    TesterConfigurer,
};

/// Directory holding the JSON datasets used by the tests
pub fn resources_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/resources")
}

/// Configurer resolving datasets from `resources_dir()`
pub fn test_configurer() -> TesterConfigurer {
    dbfixture::init_logging();
    TesterConfigurer::new(DatasetResolver::new(ResourceLocator::new([resources_dir()])))
}

/// Rule whose connections all go through `driver`
pub fn memory_rule<'c>(cache: &'c ClassMetadataCache, driver: &MemoryDriver) -> FixtureRule<'c> {
    FixtureRule::new_with_configurer(cache, Arc::new(driver.clone()), test_configurer())
}

/// Creates the tables that users.json fills
pub fn create_user_tables(store: &MemoryStore) {
    store.create_table("users", &["id", "name", "email"]);
    store.create_table("orders", &["id", "user_id", "total"]);
}

/// Creates the table that audit.json fills
pub fn create_audit_table(store: &MemoryStore) {
    store.create_table("audit_log", &["id", "message", "ok"]);
}
