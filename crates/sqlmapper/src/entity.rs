//! Entity CRUD Mapper.
//!
//! An [`EntityMap`] holds the per-type metadata of a record used as a table
//! row: table name, identity member, ignored members, and the generated
//! CRUD statements. Defaults come from the derive attributes and can be
//! overridden fluently before first use:
//!
//! ```ignore
//! mapper.entity::<Person>().table("People").identity("Id", true)?;
//! ```

use crate::binder::ParamBinder;
use crate::mapper::{ReaderOf, SqlMapper, single};
use crate::rows::Rows;
use sqlmapper_core::row::narrow_decimal;
use sqlmapper_core::{
    Command, Connection, Error, FromRow, MemberInfo, ParamSource, Record, RecordInfo, Result,
    Value, params,
};
use sqlmapper_query::{BuiltQuery, EvaluatorRegistry, Expr, QueryBuilder, Queryable, StatementCache, TableInfo};
use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

#[derive(Debug, Clone)]
struct EntityConfig {
    table: String,
    identity: Option<usize>,
    auto_increment: bool,
    ignored: Vec<&'static str>,
}

impl EntityConfig {
    fn from_info(info: &'static RecordInfo) -> Self {
        let identity = info.identity();
        Self {
            table: info.table_name().to_string(),
            identity: identity.map(|(index, _)| index),
            auto_increment: identity.is_some_and(|(_, m)| m.auto_increment),
            ignored: info
                .members
                .iter()
                .filter(|m| m.ignore)
                .map(|m| m.name)
                .collect(),
        }
    }
}

/// Statements generated for one entity type.
#[derive(Debug)]
pub struct EntitySql {
    pub select_all: String,
    pub select_by_id: Option<String>,
    pub insert: String,
    pub update: Option<String>,
    pub delete: Option<String>,
    identity: Option<(usize, &'static MemberInfo)>,
    auto_increment: bool,
    table: TableInfo,
    insert_binder: ParamBinder,
    update_binder: ParamBinder,
}

impl EntitySql {
    fn build(info: &'static RecordInfo, config: &EntityConfig) -> Result<Self> {
        let columns: Vec<(usize, &'static MemberInfo)> = info
            .members
            .iter()
            .enumerate()
            .filter(|(_, m)| m.kind.is_column() && !config.ignored.contains(&m.name))
            .collect();
        let identity = config.identity.map(|index| (index, &info.members[index]));
        let table = &config.table;

        let names: Vec<&str> = columns.iter().map(|(_, m)| m.name).collect();
        let select_all = format!("select {} from {}", names.join(", "), table);
        let select_by_id = identity.map(|(_, id)| format!("{} where {} = @id", select_all, id.name));

        let insert_members: Vec<(usize, &'static MemberInfo)> = columns
            .iter()
            .copied()
            .filter(|(index, _)| !(config.auto_increment && Some(*index) == config.identity))
            .collect();
        let insert = format!(
            "insert into {} ({}) values ({})",
            table,
            insert_members
                .iter()
                .map(|(_, m)| m.name)
                .collect::<Vec<_>>()
                .join(", "),
            insert_members
                .iter()
                .map(|(_, m)| format!("@{}", m.name))
                .collect::<Vec<_>>()
                .join(", ")
        );

        let update = identity.map(|(id_index, id)| {
            let assignments = columns
                .iter()
                .filter(|(index, _)| *index != id_index)
                .map(|(_, m)| format!("{0} = @{0}", m.name))
                .collect::<Vec<_>>()
                .join(", ");
            format!("update {table} set {assignments} where {id} = @{id}", id = id.name)
        });
        let delete = identity.map(|(_, id)| format!("delete from {} where {} = @id", table, id.name));

        let sql = Self {
            select_all,
            select_by_id,
            insert,
            update,
            delete,
            identity,
            auto_increment: config.auto_increment,
            table: TableInfo::new(
                None,
                table.clone(),
                names.iter().map(|n| (*n).to_string()).collect(),
            ),
            insert_binder: ParamBinder::for_members(insert_members)?,
            update_binder: ParamBinder::for_members(columns)?,
        };
        tracing::debug!(
            entity = info.name,
            table = %config.table,
            select = %sql.select_all,
            insert = %sql.insert,
            "Generated entity SQL"
        );
        Ok(sql)
    }
}

/// Per-type entity metadata and its cached SQL.
pub struct EntityMap<T> {
    info: &'static RecordInfo,
    config: RwLock<EntityConfig>,
    sql: OnceLock<EntitySql>,
    predicates: StatementCache,
    _marker: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for EntityMap<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityMap")
            .field("entity", &self.info.name)
            .field("config", &*self.config.read().unwrap_or_else(PoisonError::into_inner))
            .field("sql", &self.sql.get())
            .finish()
    }
}

impl<T: Record> EntityMap<T> {
    fn new() -> Self {
        let info = T::record_info();
        Self {
            info,
            config: RwLock::new(EntityConfig::from_info(info)),
            sql: OnceLock::new(),
            predicates: StatementCache::new(),
            _marker: PhantomData,
        }
    }

    /// Override the table name.
    pub fn table(&self, name: impl Into<String>) -> &Self {
        let name = name.into();
        self.configure(|config| config.table = name);
        self
    }

    /// Mark `member` as the identity.
    ///
    /// With `auto_increment` the database generates the value: inserts leave
    /// it out and read it back afterwards.
    pub fn identity(&self, member: &str, auto_increment: bool) -> Result<&Self> {
        let Some((index, info)) = self.info.member(member) else {
            return Err(Error::config(format!(
                "{} has no member named {}",
                self.info.name, member
            )));
        };
        if !info.kind.is_column() {
            return Err(Error::config(format!(
                "identity member {}.{} must map to a single column",
                self.info.name, member
            )));
        }
        self.configure(|config| {
            config.identity = Some(index);
            config.auto_increment = auto_increment;
        });
        Ok(self)
    }

    /// Leave `member` out of generated SQL.
    pub fn ignore(&self, member: &str) -> &Self {
        if let Some((_, info)) = self.info.member(member) {
            self.configure(|config| {
                if !config.ignored.contains(&info.name) {
                    config.ignored.push(info.name);
                }
            });
        }
        self
    }

    fn configure(&self, apply: impl FnOnce(&mut EntityConfig)) {
        if self.sql.get().is_some() {
            tracing::warn!(
                entity = self.info.name,
                "Entity configured after first use; generated SQL is unchanged"
            );
        }
        apply(&mut self.config.write().unwrap_or_else(PoisonError::into_inner));
    }

    pub fn table_name(&self) -> String {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .table
            .clone()
    }

    /// Name of the identity member.
    pub fn identity_member(&self) -> Option<&'static str> {
        let config = self.config.read().unwrap_or_else(PoisonError::into_inner);
        config.identity.map(|index| self.info.members[index].name)
    }

    /// The generated statements, built on first use.
    pub fn sql(&self) -> Result<&EntitySql> {
        if let Some(sql) = self.sql.get() {
            return Ok(sql);
        }
        let config = self
            .config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let built = EntitySql::build(self.info, &config)?;
        Ok(self.sql.get_or_init(|| built))
    }

    /// Generate the SELECT of a queryable over this entity's table.
    pub fn build(&self, evaluators: &EvaluatorRegistry, query: &Queryable<T>) -> Result<BuiltQuery> {
        let sql = self.sql()?;
        QueryBuilder::new(evaluators)
            .with_cache(&self.predicates)
            .build(query, &sql.table)
    }

    fn no_identity(&self) -> Error {
        Error::config(format!("{} has no identity member", self.info.name))
    }
}

impl SqlMapper {
    /// The entity map of `T`, created on first use.
    pub fn entity<T: Record>(&self) -> Arc<EntityMap<T>> {
        if let Some(found) = self.existing_entity::<T>() {
            return found;
        }
        let mut entities = self.entities.write().unwrap_or_else(PoisonError::into_inner);
        let entry = entities.entry(TypeId::of::<T>()).or_insert_with(|| {
            tracing::debug!(entity = T::record_info().name, "Registered entity map");
            Arc::new(EntityMap::<T>::new()) as Arc<dyn Any + Send + Sync>
        });
        Arc::clone(entry)
            .downcast::<EntityMap<T>>()
            .unwrap_or_else(|_| Arc::new(EntityMap::new()))
    }

    pub(crate) fn existing_entity<T: Record>(&self) -> Option<Arc<EntityMap<T>>> {
        self.entities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|entry| entry.downcast::<EntityMap<T>>().ok())
    }

    /// All rows of the entity's table.
    pub fn select<'c, T: Record + FromRow, C: Connection>(
        &self,
        conn: &'c C,
        tx: Option<&C::Transaction<'_>>,
    ) -> Result<Rows<ReaderOf<'c, C>, T>> {
        let map = self.entity::<T>();
        let sql = map.sql()?;
        self.query::<T, C>(conn, &sql.select_all, (), tx)
    }

    /// The row whose identity equals `id`.
    pub fn select_by_id<T: Record + FromRow, C: Connection>(
        &self,
        conn: &C,
        id: impl Into<Value>,
        tx: Option<&C::Transaction<'_>>,
    ) -> Result<Option<T>> {
        let map = self.entity::<T>();
        let sql = map.sql()?;
        let by_id = sql.select_by_id.as_deref().ok_or_else(|| map.no_identity())?;
        self.scalar::<T, C>(conn, by_id, params! { "id" => id.into() }, tx)
    }

    /// Rows matching `predicate`.
    pub fn select_where<'c, T: Record + FromRow, C: Connection>(
        &self,
        conn: &'c C,
        predicate: Expr,
        tx: Option<&C::Transaction<'_>>,
    ) -> Result<Rows<ReaderOf<'c, C>, T>> {
        let map = self.entity::<T>();
        let built = map.build(&self.evaluators, &Queryable::new().filter(predicate))?;
        self.query::<T, C>(conn, &built.sql, &built.parameters, tx)
    }

    /// The only row matching `predicate`; more than one is an error.
    pub fn select_single<T: Record + FromRow, C: Connection>(
        &self,
        conn: &C,
        predicate: Expr,
        tx: Option<&C::Transaction<'_>>,
    ) -> Result<Option<T>> {
        single(self.select_where::<T, C>(conn, predicate, tx)?)
    }

    /// Insert `entity`, writing a generated identity back into it.
    pub fn insert<T: Record, C: Connection>(
        &self,
        conn: &C,
        entity: &mut T,
        tx: Option<&C::Transaction<'_>>,
    ) -> Result<u64> {
        let map = self.entity::<T>();
        let sql = map.sql()?;
        let affected = self
            .command(conn, &sql.insert, &sql.insert_binder, Some(ParamSource::Record(&*entity)), tx)?
            .execute_non_query()?;

        if let (Some((index, member)), true) = (sql.identity, sql.auto_increment) {
            let id = self
                .scalar::<Value, C>(conn, conn.dialect().last_identity_sql(), (), tx)?
                .unwrap_or(Value::Null);
            let id = match (id, member.kind.db_type()) {
                (Value::Decimal(d), Some(target)) => narrow_decimal(d, target)?,
                (id, _) => id,
            };
            tracing::trace!(entity = map.info.name, %id, "Assigned generated identity");
            entity.set(index, &id)?;
        }
        Ok(affected)
    }

    /// Update the row of `entity`; returns the affected row count.
    pub fn update<T: Record, C: Connection>(
        &self,
        conn: &C,
        entity: &T,
        tx: Option<&C::Transaction<'_>>,
    ) -> Result<u64> {
        let map = self.entity::<T>();
        let sql = map.sql()?;
        let update = sql.update.as_deref().ok_or_else(|| map.no_identity())?;
        self.command(conn, update, &sql.update_binder, Some(ParamSource::Record(entity)), tx)?
            .execute_non_query()
    }

    /// Delete the row of `entity`.
    ///
    /// Returns `true` when no row was affected.
    pub fn delete<T: Record, C: Connection>(
        &self,
        conn: &C,
        entity: &T,
        tx: Option<&C::Transaction<'_>>,
    ) -> Result<bool> {
        let map = self.entity::<T>();
        let (index, _) = map.sql()?.identity.ok_or_else(|| map.no_identity())?;
        self.delete_by_id::<T, C>(conn, entity.get(index), tx)
    }

    /// Delete the row whose identity equals `id`.
    ///
    /// Returns `true` when no row was affected.
    pub fn delete_by_id<T: Record, C: Connection>(
        &self,
        conn: &C,
        id: impl Into<Value>,
        tx: Option<&C::Transaction<'_>>,
    ) -> Result<bool> {
        let map = self.entity::<T>();
        let sql = map.sql()?;
        let delete = sql.delete.as_deref().ok_or_else(|| map.no_identity())?;
        let affected = self.execute(conn, delete, params! { "id" => id.into() }, tx)?;
        Ok(affected == 0)
    }
}
