// fixtures/cache.rs - Per-type fixture metadata, shared across tests
//
// Test types can be processed from many threads at once. Lookups of a
// type that is already cached only take the read lock. A type seen for
// the first time is discovered under the write lock, after checking
// again, so every type is discovered once and nobody observes a
// half-built entry.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use crate::fixtures::{ClassMetadata, FixtureClass};

type Entry = Arc<dyn Any + Send + Sync>;

static GLOBAL: OnceLock<ClassMetadataCache> = OnceLock::new();

#[derive(Default)]
pub struct ClassMetadataCache {
    entries: RwLock<HashMap<TypeId, Entry>>,
}

impl ClassMetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache, created on first use and never dropped
    pub fn global() -> &'static ClassMetadataCache {
        GLOBAL.get_or_init(ClassMetadataCache::new)
    }

    /// Metadata for `T`, discovering it if this cache has not seen `T`.
    ///
    /// `T::declare_fixtures` runs while the write lock is held and must
    /// not use this cache itself.
    pub fn metadata<T: FixtureClass>(&self) -> Arc<ClassMetadata<T>> {
        let key = TypeId::of::<T>();

        let cached = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned();
        if let Some(metadata) = cached.and_then(downcast::<T>) {
            return metadata;
        }

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(metadata) = entries.get(&key).cloned().and_then(downcast::<T>) {
            return metadata;
        }
        let metadata = Arc::new(ClassMetadata::<T>::discover());
        entries.insert(key, metadata.clone());
        metadata
    }

    pub fn contains<T: FixtureClass>(&self) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every cached entry; later lookups discover again
    pub fn clear(&self) {
        self.entries.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

fn downcast<T: FixtureClass>(entry: Entry) -> Option<Arc<ClassMetadata<T>>> {
    entry.downcast::<ClassMetadata<T>>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;

    use crate::descriptor::FixtureDescriptor;
    use crate::driver::Connection;
    use crate::fixtures::FixtureFields;

    static SLOW_DISCOVERIES: AtomicUsize = AtomicUsize::new(0);

    struct Slow {
        db: Option<Connection>,
    }

    impl FixtureClass for Slow {
        fn declare_fixtures(fields: &mut FixtureFields<Self>) {
            SLOW_DISCOVERIES.fetch_add(1, Ordering::SeqCst);
            thread::sleep(std::time::Duration::from_millis(20));
            fields.connection("db", FixtureDescriptor::new().connection_url("mem:slow"), |t| &mut t.db);
        }
    }

    struct Other;

    impl FixtureClass for Other {
        fn declare_fixtures(_fields: &mut FixtureFields<Self>) {}
    }

    #[test]
    fn test_concurrent_first_lookups_discover_once() {
        let cache = Arc::new(ClassMetadataCache::new());
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    cache.metadata::<Slow>()
                })
            })
            .collect();

        let results: Vec<Arc<ClassMetadata<Slow>>> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(SLOW_DISCOVERIES.load(Ordering::SeqCst), 1);
        for metadata in &results[1..] {
            assert!(Arc::ptr_eq(&results[0], metadata));
        }
        assert_eq!(results[0].fields().len(), 1);
    }

    #[test]
    fn test_types_are_cached_independently() {
        let cache = ClassMetadataCache::new();
        assert!(cache.is_empty());
        cache.metadata::<Other>();
        assert!(cache.contains::<Other>());
        assert!(!cache.contains::<Slow>());
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_global_cache_is_a_singleton() {
        let a = ClassMetadataCache::global() as *const ClassMetadataCache;
        let b = ClassMetadataCache::global() as *const ClassMetadataCache;
        assert_eq!(a, b);
    }
}
