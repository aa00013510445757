//! Query Identity cache.
//!
//! Maps a [`QueryIdentity`] to the artefacts compiled for it. Entries are
//! additive; the one removal path is [`QueryCache::delete`], used when a
//! multi-result grid fails to deserialize.

use crate::binder::{ParamBinder, ParamCombiner};
use crate::identity::QueryIdentity;
use sqlmapper_core::Deserializer;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

const SHARDS: usize = 16;

/// Lazily filled artefacts of one query identity.
///
/// Each slot is set at most once. When two callers compile the same slot
/// concurrently, the first stored value wins and both use it.
#[derive(Default)]
pub struct QueryInfo {
    sql: OnceLock<Arc<str>>,
    deserializer: OnceLock<Arc<dyn Any + Send + Sync>>,
    binder: OnceLock<Arc<ParamBinder>>,
    combiner: OnceLock<Arc<ParamCombiner>>,
}

impl std::fmt::Debug for QueryInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryInfo")
            .field("sql", &self.sql.get())
            .field("deserializer", &self.deserializer.get().is_some())
            .field("binder", &self.binder.get())
            .field("combiner", &self.combiner.get())
            .finish()
    }
}

impl QueryInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sql(&self) -> Option<Arc<str>> {
        self.sql.get().cloned()
    }

    /// Store generated SQL; returns the stored text.
    pub fn set_sql(&self, sql: String) -> Arc<str> {
        Arc::clone(self.sql.get_or_init(|| Arc::from(sql)))
    }

    /// The compiled deserializer, if one was stored for `T`.
    pub fn deserializer<T: 'static>(&self) -> Option<Deserializer<T>> {
        self.deserializer
            .get()
            .and_then(|d| d.downcast_ref::<Deserializer<T>>())
            .cloned()
    }

    /// Store a compiled deserializer; returns the stored one.
    pub fn set_deserializer<T: 'static>(&self, deserializer: Deserializer<T>) -> Deserializer<T> {
        let stored = self
            .deserializer
            .get_or_init(|| Arc::new(deserializer.clone()) as Arc<dyn Any + Send + Sync>);
        stored
            .downcast_ref::<Deserializer<T>>()
            .cloned()
            .unwrap_or(deserializer)
    }

    pub fn binder(&self) -> Option<Arc<ParamBinder>> {
        self.binder.get().cloned()
    }

    pub fn set_binder(&self, binder: ParamBinder) -> Arc<ParamBinder> {
        Arc::clone(self.binder.get_or_init(|| Arc::new(binder)))
    }

    pub fn combiner(&self) -> Option<Arc<ParamCombiner>> {
        self.combiner.get().cloned()
    }

    pub fn set_combiner(&self, combiner: ParamCombiner) -> Arc<ParamCombiner> {
        Arc::clone(self.combiner.get_or_init(|| Arc::new(combiner)))
    }
}

type Shard = RwLock<HashMap<QueryIdentity, Arc<QueryInfo>>>;

/// Sharded map of query identities to their [`QueryInfo`].
///
/// The shard is chosen by the identity's precomputed hash, so unrelated
/// queries rarely contend on one lock.
pub struct QueryCache {
    shards: [Shard; SHARDS],
}

impl Default for QueryCache {
    fn default() -> Self {
        Self {
            shards: std::array::from_fn(|_| RwLock::new(HashMap::new())),
        }
    }
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("entries", &self.len())
            .finish()
    }
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn shard(&self, identity: &QueryIdentity) -> &Shard {
        &self.shards[(identity.hash_code() % SHARDS as u64) as usize]
    }

    /// The entry for `identity`, created empty on first use.
    pub fn get_or_create(&self, identity: &QueryIdentity) -> Arc<QueryInfo> {
        let shard = self.shard(identity);
        if let Some(info) = shard
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(identity)
        {
            return Arc::clone(info);
        }
        let mut entries = shard.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            entries
                .entry(identity.clone())
                .or_insert_with(|| Arc::new(QueryInfo::new())),
        )
    }

    pub fn get(&self, identity: &QueryIdentity) -> Option<Arc<QueryInfo>> {
        self.shard(identity)
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(identity)
            .cloned()
    }

    /// Evict an entry so its artefacts are recompiled on next use.
    pub fn delete(&self, identity: &QueryIdentity) -> bool {
        let removed = self
            .shard(identity)
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(identity)
            .is_some();
        if removed {
            tracing::debug!(sql = identity.sql(), grid = identity.grid(), "Evicted query info");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.read().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlmapper_core::{Row, TypeTag, Value};

    fn identity(sql: &str) -> QueryIdentity {
        QueryIdentity::new("conn", sql, Some(TypeTag::of::<i32>()), None)
    }

    #[test]
    fn test_get_or_create_is_stable() {
        let cache = QueryCache::new();
        let a = cache.get_or_create(&identity("select 1"));
        let b = cache.get_or_create(&identity("select 1"));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_delete() {
        let cache = QueryCache::new();
        let a = cache.get_or_create(&identity("select 1"));
        assert!(cache.delete(&identity("select 1")));
        assert!(!cache.delete(&identity("select 1")));
        let b = cache.get_or_create(&identity("select 1"));
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_many_keys_spread_over_shards() {
        let cache = QueryCache::new();
        for i in 0..64 {
            cache.get_or_create(&identity(&format!("select {}", i)));
        }
        assert_eq!(cache.len(), 64);
        assert!(cache.shards.iter().filter(|s| !s.read().unwrap().is_empty()).count() > 1);
    }

    #[test]
    fn test_first_deserializer_wins() {
        let info = QueryInfo::new();
        let first = Deserializer::new(|_: &Row| Ok(1));
        let second = Deserializer::new(|_: &Row| Ok(2));
        info.set_deserializer(first);
        let stored = info.set_deserializer(second);
        let row = Row::new(vec!["a".into()], vec![Value::Int(0)]);
        assert_eq!(stored.deserialize(&row).unwrap(), 1);
        assert_eq!(info.deserializer::<i32>().unwrap().deserialize(&row).unwrap(), 1);
        assert!(info.deserializer::<i64>().is_none());
    }

    #[test]
    fn test_sql_slot() {
        let info = QueryInfo::new();
        assert!(info.sql().is_none());
        assert_eq!(&*info.set_sql("select a".into()), "select a");
        assert_eq!(&*info.set_sql("select b".into()), "select a");
    }
}
