// tester/configurer.rs - Attach a dataset and fix the tester's operations
//
// Setup is a destructive clean-insert, so whatever an earlier test left
// behind is wiped at the start of the next one. Teardown does nothing:
// the final state stays in the database for inspection.
//
// Callers can install a `ConnectionHook` that runs on every connection
// after its setup operation, e.g. to set a search path or session flags.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::FixtureConfig;
use crate::dataset::{DatasetResolver, ResourceLocator};
use crate::driver::Connection;
use crate::error::Result;
use crate::tester::{DatabaseOperation, ManagedTester};

/// Runs on each connection after setup, before its tester is registered.
/// An error aborts `before()` like any other construction error.
#[async_trait]
pub trait ConnectionHook: Send + Sync {
    async fn configure(&self, connection: &Connection) -> Result<()>;
}

#[async_trait]
impl<F> ConnectionHook for F
where
    F: Fn(&Connection) -> Result<()> + Send + Sync,
{
    async fn configure(&self, connection: &Connection) -> Result<()> {
        self(connection)
    }
}

#[derive(Clone)]
pub struct TesterConfigurer {
    resolver: DatasetResolver,
    setup_operation: DatabaseOperation,
    teardown_operation: DatabaseOperation,
    connection_hook: Option<Arc<dyn ConnectionHook>>,
}

impl TesterConfigurer {
    pub fn new(resolver: DatasetResolver) -> Self {
        TesterConfigurer {
            resolver,
            setup_operation: DatabaseOperation::CleanInsert,
            teardown_operation: DatabaseOperation::None,
            connection_hook: None,
        }
    }

    /// Resolves datasets from the roots in `FixtureConfig::from_env`
    pub fn from_env() -> Self {
        let locator = ResourceLocator::from_config(&FixtureConfig::from_env());
        Self::new(DatasetResolver::new(locator))
    }

    /// Replaces any previously installed hook
    pub fn with_connection_hook<H: ConnectionHook + 'static>(mut self, hook: H) -> Self {
        self.connection_hook = Some(Arc::new(hook));
        self
    }

    /// Replaces the clean-insert / no-op pair
    pub fn with_operations(mut self, setup: DatabaseOperation, teardown: DatabaseOperation) -> Self {
        self.setup_operation = setup;
        self.teardown_operation = teardown;
        self
    }

    pub fn resolver(&self) -> &DatasetResolver {
        &self.resolver
    }

    pub fn configure(&self, tester: &mut ManagedTester, resource_name: Option<&str>) -> Result<()> {
        let dataset = self.resolver.resolve(resource_name)?;
        tester.set_dataset(dataset);
        tester.set_setup_operation(self.setup_operation);
        tester.set_teardown_operation(self.teardown_operation);
        Ok(())
    }

    /// Runs the installed hook, if any, on `connection`
    pub async fn configure_connection(&self, connection: &Connection) -> Result<()> {
        match &self.connection_hook {
            Some(hook) => {
                hook.configure(connection).await?;
                tracing::debug!(connection = %connection.id(), "Connection hook ran");
            }
            None => tracing::trace!(connection = %connection.id(), "No connection hook installed"),
        }
        Ok(())
    }
}

impl fmt::Debug for TesterConfigurer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TesterConfigurer")
            .field("resolver", &self.resolver)
            .field("setup", &self.setup_operation)
            .field("teardown", &self.teardown_operation)
            .field("connection_hook", &self.connection_hook.is_some())
            .finish()
    }
}

impl Default for TesterConfigurer {
    fn default() -> Self {
        Self::new(DatasetResolver::default())
    }
}
