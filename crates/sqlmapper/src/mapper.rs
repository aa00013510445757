//! The mapper service.
//!
//! [`SqlMapper`] owns every cache: type descriptors, query identities,
//! entity maps, table metadata and predicate SQL. Each call resolves a
//! [`QueryInfo`] through its [`QueryIdentity`]; a miss compiles the
//! deserializer or binder, a hit reuses it.

use crate::binder::ParamBinder;
use crate::cache::{QueryCache, QueryInfo};
use crate::identity::QueryIdentity;
use crate::multi::{Grids, MultiResult};
use crate::rows::Rows;
use sqlmapper_core::error::StateErrorKind;
use sqlmapper_core::{
    ColumnInfo, Command, Connection, Deserializer, DynamicRow, Error, FromRow, MAX_NESTING_DEPTH,
    ParamSource, Result, RowReader, ToParams, TypeRegistry, TypeTag,
};
use sqlmapper_query::{EvaluatorRegistry, StatementCache, TableInfoCache};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, RwLock};

/// Reader type produced by commands of connection `C`.
pub type ReaderOf<'c, C> = <<C as Connection>::Command<'c> as Command>::Reader;

/// Process-wide mapper used by [`SqlMapperExt`](crate::SqlMapperExt).
static GLOBAL_MAPPER: OnceLock<SqlMapper> = OnceLock::new();

/// Tunables of a [`SqlMapper`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapperOptions {
    /// Depth at which nested record flattening stops.
    pub max_nesting_depth: usize,
    /// Declared size of string parameters up to this many characters;
    /// longer strings are unbounded (`-1`).
    pub string_size_limit: usize,
}

impl Default for MapperOptions {
    fn default() -> Self {
        Self {
            max_nesting_depth: MAX_NESTING_DEPTH,
            string_size_limit: 4000,
        }
    }
}

impl MapperOptions {
    pub fn max_nesting_depth(mut self, depth: usize) -> Self {
        self.max_nesting_depth = depth;
        self
    }

    pub fn string_size_limit(mut self, limit: usize) -> Self {
        self.string_size_limit = limit;
        self
    }
}

/// Compile counters.
///
/// Every count only grows when a cache misses, so repeated identical calls
/// leave them unchanged.
#[derive(Debug, Default)]
pub struct MapperStats {
    deserializers: AtomicU64,
    binders: AtomicU64,
    combiners: AtomicU64,
    statements: AtomicU64,
}

impl MapperStats {
    pub fn deserializer_compiles(&self) -> u64 {
        self.deserializers.load(Ordering::Relaxed)
    }

    pub fn binder_compiles(&self) -> u64 {
        self.binders.load(Ordering::Relaxed)
    }

    pub fn combiner_compiles(&self) -> u64 {
        self.combiners.load(Ordering::Relaxed)
    }

    /// Generated entity and table-operation statements.
    pub fn statement_builds(&self) -> u64 {
        self.statements.load(Ordering::Relaxed)
    }

    pub(crate) fn count_statement(&self) {
        self.statements.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn count_combiner(&self) {
        self.combiners.fetch_add(1, Ordering::Relaxed);
    }
}

/// The mapping engine and its caches.
pub struct SqlMapper {
    pub(crate) options: MapperOptions,
    pub(crate) types: TypeRegistry,
    pub(crate) queries: QueryCache,
    pub(crate) entities: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
    pub(crate) tables: TableInfoCache,
    pub(crate) predicates: StatementCache,
    pub(crate) evaluators: EvaluatorRegistry,
    pub(crate) stats: MapperStats,
}

impl Default for SqlMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SqlMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlMapper")
            .field("options", &self.options)
            .field("queries", &self.queries)
            .field("types", &self.types.len())
            .field("predicates", &self.predicates.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl SqlMapper {
    pub fn new() -> Self {
        Self::with_options(MapperOptions::default())
    }

    pub fn with_options(options: MapperOptions) -> Self {
        Self {
            options,
            types: TypeRegistry::with_max_depth(options.max_nesting_depth),
            queries: QueryCache::new(),
            entities: RwLock::new(HashMap::new()),
            tables: TableInfoCache::new(),
            predicates: StatementCache::new(),
            evaluators: EvaluatorRegistry::default(),
            stats: MapperStats::default(),
        }
    }

    /// The process-wide mapper, created on first use.
    pub fn global() -> &'static SqlMapper {
        GLOBAL_MAPPER.get_or_init(SqlMapper::new)
    }

    pub fn options(&self) -> &MapperOptions {
        &self.options
    }

    pub fn stats(&self) -> &MapperStats {
        &self.stats
    }

    /// Number of cached query identities.
    pub fn cached_queries(&self) -> usize {
        self.queries.len()
    }

    /// Number of predicate SELECTs generated by `table()` queries.
    pub fn predicate_builds(&self) -> u64 {
        self.predicates.builds()
    }

    /// Run `sql` and map each row of the first grid to `T`.
    #[tracing::instrument(level = "debug", skip(self, conn, params, tx), fields(connection = conn.identity()))]
    pub fn query<'c, T: FromRow, C: Connection>(
        &self,
        conn: &'c C,
        sql: &str,
        params: impl ToParams,
        tx: Option<&C::Transaction<'_>>,
    ) -> Result<Rows<ReaderOf<'c, C>, T>> {
        let identity =
            QueryIdentity::new(conn.identity(), sql, Some(TypeTag::of::<T>()), params.type_tag());
        let (info, cmd) = self.prepare(conn, &identity, sql, &params, tx)?;
        let reader = cmd.execute_reader()?;
        let deserializer = self.deserializer::<T>(&info, &reader.columns())?;
        Ok(Rows::new(reader, deserializer))
    }

    /// Run `sql` and return each row as a [`DynamicRow`].
    pub fn query_dynamic<'c, C: Connection>(
        &self,
        conn: &'c C,
        sql: &str,
        params: impl ToParams,
        tx: Option<&C::Transaction<'_>>,
    ) -> Result<Rows<ReaderOf<'c, C>, DynamicRow>> {
        self.query::<DynamicRow, C>(conn, sql, params, tx)
    }

    /// First column of the only row, `None` when there is no row.
    ///
    /// A second row is an error.
    #[tracing::instrument(level = "debug", skip(self, conn, params, tx), fields(connection = conn.identity()))]
    pub fn scalar<T: FromRow, C: Connection>(
        &self,
        conn: &C,
        sql: &str,
        params: impl ToParams,
        tx: Option<&C::Transaction<'_>>,
    ) -> Result<Option<T>> {
        single(self.query::<T, C>(conn, sql, params, tx)?)
    }

    /// Run `sql` and return the number of affected rows.
    #[tracing::instrument(level = "debug", skip(self, conn, params, tx), fields(connection = conn.identity()))]
    pub fn execute<C: Connection>(
        &self,
        conn: &C,
        sql: &str,
        params: impl ToParams,
        tx: Option<&C::Transaction<'_>>,
    ) -> Result<u64> {
        let identity = QueryIdentity::new(conn.identity(), sql, None, params.type_tag());
        let (_, cmd) = self.prepare(conn, &identity, sql, &params, tx)?;
        cmd.execute_non_query()
    }

    /// Run `sql` and read its grids in order through a [`MultiResult`].
    #[tracing::instrument(level = "debug", skip(self, conn, params, tx), fields(connection = conn.identity()))]
    pub fn query_multi<'m, 'c, C: Connection>(
        &'m self,
        conn: &'c C,
        sql: &str,
        params: impl ToParams,
        tx: Option<&C::Transaction<'_>>,
    ) -> Result<MultiResult<'m, ReaderOf<'c, C>>> {
        let identity = QueryIdentity::new(
            conn.identity(),
            sql,
            Some(TypeTag::of::<Grids>()),
            params.type_tag(),
        );
        let (_, cmd) = self.prepare(conn, &identity, sql, &params, tx)?;
        let reader = cmd.execute_reader()?;
        Ok(MultiResult::new(self, reader, identity))
    }

    /// Create and bind a command through the binder cached on `identity`.
    fn prepare<'c, C: Connection, P: ToParams>(
        &self,
        conn: &'c C,
        identity: &QueryIdentity,
        sql: &str,
        params: &P,
        tx: Option<&C::Transaction<'_>>,
    ) -> Result<(Arc<QueryInfo>, C::Command<'c>)> {
        let info = self.queries.get_or_create(identity);
        let binder = self.binder(&info, params.param_source())?;
        let cmd = self.command(conn, sql, &binder, params.param_source(), tx)?;
        Ok((info, cmd))
    }

    pub(crate) fn command<'c, C: Connection>(
        &self,
        conn: &'c C,
        sql: &str,
        binder: &ParamBinder,
        source: Option<ParamSource<'_>>,
        tx: Option<&C::Transaction<'_>>,
    ) -> Result<C::Command<'c>> {
        let mut cmd = conn.create_command(sql, tx)?;
        binder.bind(&mut cmd, source, self.options.string_size_limit)?;
        tracing::trace!(sql, parameters = cmd.parameters().len(), "Bound command");
        Ok(cmd)
    }

    pub(crate) fn binder(
        &self,
        info: &QueryInfo,
        source: Option<ParamSource<'_>>,
    ) -> Result<Arc<ParamBinder>> {
        if let Some(binder) = info.binder() {
            return Ok(binder);
        }
        let binder = ParamBinder::compile(source)?;
        self.stats.binders.fetch_add(1, Ordering::Relaxed);
        Ok(info.set_binder(binder))
    }

    pub(crate) fn deserializer<T: FromRow>(
        &self,
        info: &QueryInfo,
        columns: &ColumnInfo,
    ) -> Result<Deserializer<T>> {
        if let Some(deserializer) = info.deserializer::<T>() {
            tracing::trace!(ty = std::any::type_name::<T>(), "Reusing deserializer");
            return Ok(deserializer);
        }
        let deserializer = T::deserializer(columns, &self.types)?;
        self.stats.deserializers.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            ty = std::any::type_name::<T>(),
            columns = columns.len(),
            "Compiled deserializer"
        );
        Ok(info.set_deserializer(deserializer))
    }
}

/// SingleOrDefault over a row iterator.
pub(crate) fn single<T>(mut rows: impl Iterator<Item = Result<T>>) -> Result<Option<T>> {
    let Some(first) = rows.next().transpose()? else {
        return Ok(None);
    };
    if rows.next().is_some() {
        return Err(Error::state(
            StateErrorKind::MultipleRows,
            "Sequence contains more than one element",
        ));
    }
    Ok(Some(first))
}
