// tester/factory.rs - Build a ManagedTester from a descriptor
//
// Either wraps a connection the test already holds or opens a new one
// from the descriptor's url and credentials. A tester is only returned
// once its connection is usable; there is no half-built state.

use std::sync::Arc;

use crate::descriptor::FixtureDescriptor;
use crate::driver::{Connection, Credentials, Driver};
use crate::error::{FixtureError, Result};
use crate::tester::ManagedTester;

#[derive(Clone)]
pub struct TesterFactory {
    driver: Arc<dyn Driver>,
}

impl TesterFactory {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        TesterFactory { driver }
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    /// Creates a tester for `descriptor`.
    ///
    /// With `existing`, no connection is opened. Without it the
    /// descriptor must carry a connection url.
    pub async fn create(
        &self,
        descriptor: &FixtureDescriptor,
        existing: Option<Connection>,
    ) -> Result<ManagedTester> {
        let connection = match existing {
            Some(connection) => {
                tracing::debug!(connection = %connection.id(), "Wrapping existing connection");
                connection
            }
            None => {
                if descriptor.connection_url.is_empty() {
                    return Err(FixtureError::configuration(
                        "no connectionUrl value and no existing connection",
                    ));
                }
                let credentials =
                    Credentials::new(descriptor.username.clone(), descriptor.password.clone());
                let connection = self
                    .driver
                    .connect(&descriptor.connection_url, &credentials)
                    .await?;
                tracing::debug!(connection = %connection.id(), backend = connection.backend_name(), "Opened new connection");
                connection
            }
        };

        let schema = descriptor.schema.clone();
        if descriptor.validate_schema {
            if let Some(schema) = &schema {
                let exists = connection.session().await.schema_exists(schema).await?;
                if !exists {
                    return Err(FixtureError::SchemaNotFound {
                        schema: schema.clone(),
                    });
                }
            }
        }

        Ok(ManagedTester::new(connection, schema))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::MemoryDriver;

    fn factory(driver: &MemoryDriver) -> TesterFactory {
        TesterFactory::new(Arc::new(driver.clone()))
    }

    #[tokio::test]
    async fn test_opens_connection_from_url() {
        let driver = MemoryDriver::new();
        let descriptor = FixtureDescriptor::new().connection_url("mem:factory");

        let tester = factory(&driver).create(&descriptor, None).await.unwrap();
        assert_eq!(driver.connections_opened(), 1);
        assert_eq!(tester.connection().backend_name(), "memory");
    }

    #[tokio::test]
    async fn test_existing_connection_is_wrapped_not_reopened() {
        let driver = MemoryDriver::new();
        let existing = driver
            .connect("mem:factory", &Credentials::default())
            .await
            .unwrap();
        let descriptor = FixtureDescriptor::new().connection_url("mem:ignored");

        let tester = factory(&driver)
            .create(&descriptor, Some(existing.clone()))
            .await
            .unwrap();
        assert_eq!(driver.connections_opened(), 1);
        assert_eq!(tester.connection(), &existing);
    }

    #[tokio::test]
    async fn test_missing_url_is_a_configuration_error() {
        let driver = MemoryDriver::new();
        let err = factory(&driver)
            .create(&FixtureDescriptor::new(), None)
            .await
            .unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(driver.connections_opened(), 0);
    }

    #[tokio::test]
    async fn test_missing_url_is_fine_with_existing_connection() {
        let driver = MemoryDriver::new();
        let existing = driver.connect("mem:x", &Credentials::default()).await.unwrap();
        let tester = factory(&driver)
            .create(&FixtureDescriptor::new(), Some(existing))
            .await;
        assert!(tester.is_ok());
    }

    #[tokio::test]
    async fn test_schema_validation() {
        let driver = MemoryDriver::new();
        driver.store("schemas").create_schema("app");

        let ok = FixtureDescriptor::new()
            .connection_url("mem:schemas")
            .schema("app")
            .validate_schema(true);
        let tester = factory(&driver).create(&ok, None).await.unwrap();
        assert_eq!(tester.schema(), Some("app"));

        let missing = FixtureDescriptor::new()
            .connection_url("mem:schemas")
            .schema("nope")
            .validate_schema(true);
        let err = factory(&driver).create(&missing, None).await.unwrap_err();
        assert!(matches!(err, FixtureError::SchemaNotFound { .. }));

        let unchecked = FixtureDescriptor::new()
            .connection_url("mem:schemas")
            .schema("nope");
        assert!(factory(&driver).create(&unchecked, None).await.is_ok());
    }
}
