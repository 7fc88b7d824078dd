// fixtures/mod.rs - Declaring which fields of a test struct are fixtures
//
// A test struct opts in by implementing `FixtureClass`. Its
// `declare_fixtures` lists every field that should be managed, together
// with the descriptor for that field and an accessor into the struct:
//
//   struct UserTests {
//       db: Option<Connection>,
//       tester: Option<Arc<ManagedTester>>,
//   }
//
//   impl FixtureClass for UserTests {
//       fn declare_fixtures(fields: &mut FixtureFields<Self>) {
//           fields
//               .connection("db", FixtureDescriptor::new().connection_url("mem:users"), |t| &mut t.db)
//               .tester("tester", FixtureDescriptor::new().connection_url("mem:audit"), |t| &mut t.tester);
//       }
//   }
//
// The accessor's type decides the field's capability: a connection field
// receives an opened `Connection`, a tester field receives the whole
// `ManagedTester`. Fields that are not declared are never touched.
//
// Declarations are read once per type and cached, see `cache`.

pub mod cache;

use std::fmt;
use std::sync::Arc;

use crate::descriptor::FixtureDescriptor;
use crate::driver::Connection;
use crate::tester::ManagedTester;

pub use cache::ClassMetadataCache;

/// What a fixture field holds
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldCapability {
    /// A raw connection; the lifecycle opens one if the field is empty
    Connection,
    /// A managed tester; the lifecycle always creates it
    Tester,
}

/// Accessor into the field slot of a test struct
pub enum FieldAccess<T> {
    Connection(fn(&mut T) -> &mut Option<Connection>),
    Tester(fn(&mut T) -> &mut Option<Arc<ManagedTester>>),
}

impl<T> FieldAccess<T> {
    pub fn capability(&self) -> FieldCapability {
        match self {
            FieldAccess::Connection(_) => FieldCapability::Connection,
            FieldAccess::Tester(_) => FieldCapability::Tester,
        }
    }
}

impl<T> Clone for FieldAccess<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for FieldAccess<T> {}

/// One declared fixture field
pub struct FixtureField<T> {
    name: &'static str,
    descriptor: FixtureDescriptor,
    access: FieldAccess<T>,
}

impl<T> FixtureField<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn descriptor(&self) -> &FixtureDescriptor {
        &self.descriptor
    }

    pub fn capability(&self) -> FieldCapability {
        self.access.capability()
    }

    pub fn access(&self) -> FieldAccess<T> {
        self.access
    }
}

impl<T> PartialEq for FixtureField<T> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.descriptor == other.descriptor
            && self.capability() == other.capability()
    }
}

impl<T> fmt::Debug for FixtureField<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixtureField")
            .field("name", &self.name)
            .field("capability", &self.capability())
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

/// Collects field declarations for one test type
pub struct FixtureFields<T> {
    fields: Vec<FixtureField<T>>,
}

impl<T> FixtureFields<T> {
    fn new() -> Self {
        FixtureFields { fields: Vec::new() }
    }

    pub fn connection(
        &mut self,
        name: &'static str,
        descriptor: FixtureDescriptor,
        access: fn(&mut T) -> &mut Option<Connection>,
    ) -> &mut Self {
        self.push(name, descriptor, FieldAccess::Connection(access))
    }

    pub fn tester(
        &mut self,
        name: &'static str,
        descriptor: FixtureDescriptor,
        access: fn(&mut T) -> &mut Option<Arc<ManagedTester>>,
    ) -> &mut Self {
        self.push(name, descriptor, FieldAccess::Tester(access))
    }

    fn push(&mut self, name: &'static str, descriptor: FixtureDescriptor, access: FieldAccess<T>) -> &mut Self {
        if self.fields.iter().any(|f| f.name == name) {
            tracing::warn!(field = name, "Fixture field declared twice; keeping both declarations");
        }
        self.fields.push(FixtureField {
            name,
            descriptor,
            access,
        });
        self
    }
}

/// A test type whose fields can be populated by the fixture lifecycle
pub trait FixtureClass: Sized + Send + 'static {
    /// Lists the fixture fields. Called at most once per type per cache.
    fn declare_fixtures(fields: &mut FixtureFields<Self>);
}

/// Every fixture field of one test type, in declaration order
pub struct ClassMetadata<T> {
    class_name: &'static str,
    fields: Vec<FixtureField<T>>,
}

impl<T: FixtureClass> ClassMetadata<T> {
    fn discover() -> Self {
        let mut fields = FixtureFields::new();
        T::declare_fixtures(&mut fields);
        let metadata = ClassMetadata {
            class_name: std::any::type_name::<T>(),
            fields: fields.fields,
        };
        tracing::debug!(
            class = metadata.class_name,
            fields = metadata.fields.len(),
            "Discovered fixture fields"
        );
        metadata
    }
}

impl<T> ClassMetadata<T> {
    pub fn class_name(&self) -> &'static str {
        self.class_name
    }

    pub fn fields(&self) -> &[FixtureField<T>] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<T> PartialEq for ClassMetadata<T> {
    fn eq(&self, other: &Self) -> bool {
        self.class_name == other.class_name && self.fields == other.fields
    }
}

impl<T> fmt::Debug for ClassMetadata<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassMetadata")
            .field("class", &self.class_name)
            .field("fields", &self.fields)
            .finish()
    }
}

/// Fixture fields of `T`, discovered on first use and cached afterwards
pub fn introspect<T: FixtureClass>(cache: &ClassMetadataCache) -> Arc<ClassMetadata<T>> {
    cache.metadata::<T>()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Plain {
        _unrelated: u32,
    }

    impl FixtureClass for Plain {
        fn declare_fixtures(_fields: &mut FixtureFields<Self>) {}
    }

    struct Mixed {
        db: Option<Connection>,
        tester: Option<Arc<ManagedTester>>,
    }

    impl FixtureClass for Mixed {
        fn declare_fixtures(fields: &mut FixtureFields<Self>) {
            fields
                .connection("db", FixtureDescriptor::new().connection_url("mem:a"), |t| &mut t.db)
                .tester(
                    "tester",
                    FixtureDescriptor::new()
                        .connection_url("mem:b")
                        .dataset_resource("b.json"),
                    |t| &mut t.tester,
                );
        }
    }

    #[test]
    fn test_no_declared_fields_is_empty_not_error() {
        let cache = ClassMetadataCache::new();
        let metadata = introspect::<Plain>(&cache);
        assert!(metadata.is_empty());
        assert!(metadata.class_name().ends_with("Plain"));
    }

    #[test]
    fn test_fields_keep_declaration_order_and_capability() {
        let cache = ClassMetadataCache::new();
        let metadata = introspect::<Mixed>(&cache);
        let summary: Vec<(&str, FieldCapability)> = metadata
            .fields()
            .iter()
            .map(|f| (f.name(), f.capability()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("db", FieldCapability::Connection),
                ("tester", FieldCapability::Tester)
            ]
        );
        assert_eq!(
            metadata.fields()[1].descriptor().dataset_resource_name(),
            Some("b.json")
        );
    }

    #[test]
    fn test_accessors_reach_the_right_slot() {
        let cache = ClassMetadataCache::new();
        let metadata = introspect::<Mixed>(&cache);
        let mut instance = Mixed {
            db: None,
            tester: None,
        };
        match metadata.fields()[1].access() {
            FieldAccess::Tester(access) => assert!(access(&mut instance).is_none()),
            FieldAccess::Connection(_) => panic!("expected tester accessor"),
        }
        assert!(instance.db.is_none());
    }
}
