//! Statement caching for generated SQL.
//!
//! Caches generated SQL strings keyed by a hash so repeated queries with the
//! same shape avoid redundant string building. Entries are never evicted:
//! the set of shapes a program issues is fixed by its source.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Additive, thread-safe cache of generated SQL statements.
///
/// Keyed by a `u64` hash that callers compute from their query structure.
/// The first writer for a key wins; later writers get the stored string.
///
/// # Example
///
/// ```
/// use sqlmapper_query::cache::StatementCache;
///
/// let cache = StatementCache::new();
///
/// let sql = cache.get_or_insert(12345, || "SELECT 1".to_string());
/// assert_eq!(&*sql, "SELECT 1");
///
/// // Second call returns the cached version
/// let called = std::cell::Cell::new(false);
/// let sql2 = cache.get_or_insert(12345, || {
///     called.set(true);
///     "SELECT 1".to_string()
/// });
/// assert_eq!(&*sql2, "SELECT 1");
/// assert!(!called.get());
/// ```
#[derive(Debug, Default)]
pub struct StatementCache {
    entries: RwLock<HashMap<u64, Arc<str>>>,
    builds: AtomicU64,
}

impl StatementCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached statement for `key`.
    pub fn get(&self, key: u64) -> Option<Arc<str>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }

    /// Get a cached statement or build and insert it.
    ///
    /// The `builder` closure is only called on cache miss, without holding
    /// the lock.
    pub fn get_or_insert(&self, key: u64, builder: impl FnOnce() -> String) -> Arc<str> {
        if let Some(sql) = self.get(key) {
            return sql;
        }
        let sql = builder();
        self.insert(key, sql)
    }

    /// Insert a built statement unless one is already cached; returns the
    /// stored statement.
    pub fn insert(&self, key: u64, sql: String) -> Arc<str> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(entries.entry(key).or_insert_with(|| {
            self.builds.fetch_add(1, Ordering::Relaxed);
            Arc::from(sql)
        }))
    }

    /// Check if a statement is cached.
    pub fn contains(&self, key: u64) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&key)
    }

    /// Number of cached statements.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of statements ever stored.
    pub fn builds(&self) -> u64 {
        self.builds.load(Ordering::Relaxed)
    }
}

/// Compute a hash key for caching from any hashable value.
///
/// Useful for creating cache keys from query components.
pub fn cache_key(value: &impl Hash) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}
