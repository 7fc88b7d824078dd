// registry.rs - Which tester manages which connection
//
// Scoped to one lifecycle: filled during `before()`, read by the test
// body, drained during `after()`. Keys are connection identities, so two
// connections to the same database are two entries.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::driver::{Connection, ConnectionId};
use crate::tester::ManagedTester;

#[derive(Debug, Default)]
pub struct TesterRegistry {
    testers: BTreeMap<ConnectionId, Arc<ManagedTester>>,
}

impl TesterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `tester` under its own connection, returning any tester
    /// previously registered for that connection
    pub fn insert(&mut self, tester: Arc<ManagedTester>) -> Option<Arc<ManagedTester>> {
        let id = tester.connection().id();
        let previous = self.testers.insert(id, tester);
        if previous.is_some() {
            tracing::warn!(connection = %id, "Connection already had a tester; replacing it");
        }
        previous
    }

    pub fn get(&self, connection: &Connection) -> Option<&Arc<ManagedTester>> {
        self.get_by_id(connection.id())
    }

    pub fn get_by_id(&self, id: ConnectionId) -> Option<&Arc<ManagedTester>> {
        self.testers.get(&id)
    }

    pub fn contains(&self, connection: &Connection) -> bool {
        self.testers.contains_key(&connection.id())
    }

    pub fn len(&self) -> usize {
        self.testers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.testers.is_empty()
    }

    pub fn connection_ids(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.testers.keys().copied()
    }

    /// Removes every entry, oldest connection first
    pub fn drain(&mut self) -> Vec<(ConnectionId, Arc<ManagedTester>)> {
        std::mem::take(&mut self.testers).into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{Credentials, Driver, MemoryDriver};

    async fn tester(driver: &MemoryDriver) -> Arc<ManagedTester> {
        let conn = driver.connect("mem:registry", &Credentials::default()).await.unwrap();
        Arc::new(ManagedTester::new(conn, None))
    }

    #[tokio::test]
    async fn test_lookup_by_identity() {
        let driver = MemoryDriver::new();
        let mut registry = TesterRegistry::new();
        let first = tester(&driver).await;
        let second = tester(&driver).await;

        registry.insert(first.clone());
        registry.insert(second.clone());
        assert_eq!(registry.len(), 2);

        let found = registry.get(first.connection()).unwrap();
        assert!(Arc::ptr_eq(found, &first));

        let unrelated = driver.connect("mem:registry", &Credentials::default()).await.unwrap();
        assert!(registry.get(&unrelated).is_none());
    }

    #[tokio::test]
    async fn test_same_connection_replaces() {
        let driver = MemoryDriver::new();
        let mut registry = TesterRegistry::new();
        let first = tester(&driver).await;
        let again = Arc::new(ManagedTester::new(first.connection().clone(), None));

        assert!(registry.insert(first.clone()).is_none());
        let replaced = registry.insert(again.clone()).unwrap();
        assert!(Arc::ptr_eq(&replaced, &first));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_drain_empties_oldest_connection_first() {
        let driver = MemoryDriver::new();
        let mut registry = TesterRegistry::new();
        let a = tester(&driver).await;
        let b = tester(&driver).await;
        registry.insert(b.clone());
        registry.insert(a.clone());

        let drained: Vec<ConnectionId> = registry.drain().into_iter().map(|(id, _)| id).collect();
        assert_eq!(drained, vec![a.connection().id(), b.connection().id()]);
        assert!(registry.is_empty());
    }
}
