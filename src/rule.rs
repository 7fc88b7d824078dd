// rule.rs - The fixture lifecycle around one test execution
//
// A `FixtureRule` drives one test:
//
//   Idle --before()--> Configuring --> Active --after()--> TearingDown --> Idle
//
// `before()` walks the declared fixture fields of the test struct, builds
// and configures a tester for each, runs its setup operation, writes the
// connection or tester into the field and registers the tester under its
// connection. `after()` runs every registered teardown, collects all
// failures and empties the registry.
//
// If `before()` fails part way, the testers it already registered are
// torn down and the rule goes back to Idle before the error is returned.
// Calling `after()` afterwards is harmless.

use std::fmt;
use std::sync::Arc;

use crate::driver::{Connection, Driver};
use crate::error::{FixtureError, Result, TeardownFailures};
use crate::fixtures::{introspect, ClassMetadataCache, FieldAccess, FixtureClass, FixtureField};
use crate::registry::TesterRegistry;
use crate::tester::{ManagedTester, TesterConfigurer, TesterFactory};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Configuring,
    Active,
    TearingDown,
}

impl LifecycleState {
    fn label(self) -> &'static str {
        match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Configuring => "configuring",
            LifecycleState::Active => "active",
            LifecycleState::TearingDown => "tearing down",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub struct FixtureRule<'c> {
    cache: &'c ClassMetadataCache,
    factory: TesterFactory,
    configurer: TesterConfigurer,
    registry: TesterRegistry,
    state: LifecycleState,
}

impl FixtureRule<'static> {
    /// A rule backed by the process-wide metadata cache
    pub fn with_global_cache(driver: Arc<dyn Driver>) -> Self {
        FixtureRule::new(ClassMetadataCache::global(), driver)
    }
}

impl<'c> FixtureRule<'c> {
    /// Datasets are looked up in the roots from `FixtureConfig::from_env`
    pub fn new(cache: &'c ClassMetadataCache, driver: Arc<dyn Driver>) -> Self {
        Self::new_with_configurer(cache, driver, TesterConfigurer::from_env())
    }

    /// Like `new`, without reading the environment
    pub fn new_with_configurer(
        cache: &'c ClassMetadataCache,
        driver: Arc<dyn Driver>,
        configurer: TesterConfigurer,
    ) -> Self {
        FixtureRule {
            cache,
            factory: TesterFactory::new(driver),
            configurer,
            registry: TesterRegistry::new(),
            state: LifecycleState::Idle,
        }
    }

    pub fn with_configurer(mut self, configurer: TesterConfigurer) -> Self {
        self.configurer = configurer;
        self
    }

    pub fn configurer(&self) -> &TesterConfigurer {
        &self.configurer
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn registry(&self) -> &TesterRegistry {
        &self.registry
    }

    /// The tester managing `connection`, while the test body runs
    pub fn get_tester(&self, connection: &Connection) -> Option<Arc<ManagedTester>> {
        if self.state != LifecycleState::Active {
            return None;
        }
        self.registry.get(connection).cloned()
    }

    /// Sets up every fixture field of `instance`
    pub async fn before<T: FixtureClass>(&mut self, instance: &mut T) -> Result<()> {
        if self.state != LifecycleState::Idle {
            return Err(FixtureError::Lifecycle {
                expected: LifecycleState::Idle.label(),
                actual: self.state.label(),
            });
        }
        self.state = LifecycleState::Configuring;

        let metadata = introspect::<T>(self.cache);
        for field in metadata.fields() {
            if let Err(err) = self.process_field(metadata.class_name(), field, instance).await {
                self.roll_back(field.name()).await;
                return Err(err);
            }
        }

        self.state = LifecycleState::Active;
        tracing::debug!(
            class = metadata.class_name(),
            testers = self.registry.len(),
            "Fixtures active"
        );
        Ok(())
    }

    /// Tears down every registered tester and empties the registry.
    ///
    /// Every teardown runs even when earlier ones fail; all failures are
    /// returned together.
    pub async fn after(&mut self) -> Result<()> {
        self.state = LifecycleState::TearingDown;
        let failures = self.tear_down_all().await;
        self.state = LifecycleState::Idle;
        failures.into_result()
    }

    async fn process_field<T: FixtureClass>(
        &mut self,
        class: &'static str,
        field: &FixtureField<T>,
        instance: &mut T,
    ) -> Result<()> {
        tracing::debug!(class, field = field.name(), capability = ?field.capability(), "Processing fixture field");
        let in_field = |source: FixtureError| FixtureError::InField {
            class,
            field: field.name(),
            source: Box::new(source),
        };

        match field.access() {
            FieldAccess::Connection(access) => {
                let existing = access(instance).clone();
                let tester = self
                    .build_tester(field, existing.clone())
                    .await
                    .map_err(in_field)?;
                self.activate(&tester).await.map_err(in_field)?;
                if existing.is_none() {
                    *access(instance) = Some(tester.connection().clone());
                }
            }
            FieldAccess::Tester(access) => {
                if access(instance).is_some() {
                    return Err(FixtureError::Reinjection { field: field.name() });
                }
                let tester = self.build_tester(field, None).await.map_err(in_field)?;
                self.activate(&tester).await.map_err(in_field)?;
                *access(instance) = Some(tester);
            }
        }
        Ok(())
    }

    async fn build_tester<T>(
        &self,
        field: &FixtureField<T>,
        existing: Option<Connection>,
    ) -> Result<Arc<ManagedTester>> {
        let descriptor = field.descriptor();
        let mut tester = self.factory.create(descriptor, existing).await?;
        self.configurer
            .configure(&mut tester, descriptor.dataset_resource_name())?;
        Ok(Arc::new(tester))
    }

    async fn activate(&mut self, tester: &Arc<ManagedTester>) -> Result<()> {
        tester.on_setup().await?;
        let connection = tester.connection();
        self.configurer.configure_connection(connection).await?;
        self.registry.insert(Arc::clone(tester));
        tracing::info!(
            connection = %connection.id(),
            backend = connection.backend_name(),
            tables = tester.dataset().tables().len(),
            "Registered tester"
        );
        Ok(())
    }

    async fn roll_back(&mut self, failed_field: &'static str) {
        tracing::warn!(
            field = failed_field,
            registered = self.registry.len(),
            "Fixture setup failed; tearing down testers already registered"
        );
        let failures = self.tear_down_all().await;
        if !failures.is_empty() {
            tracing::warn!(%failures, "Rollback teardown also failed");
        }
        self.state = LifecycleState::Idle;
    }

    async fn tear_down_all(&mut self) -> TeardownFailures {
        let mut failures = TeardownFailures::default();
        for (id, tester) in self.registry.drain() {
            match tester.on_teardown().await {
                Ok(()) => tracing::info!(connection = %id, "Tore down tester"),
                Err(err) => {
                    tracing::error!(connection = %id, error = %err, "Teardown failed");
                    failures.push(id, err);
                }
            }
        }
        failures
    }
}
