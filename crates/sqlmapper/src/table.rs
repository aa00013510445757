//! Predicate queries over a record's table.
//!
//! ```ignore
//! let people: Vec<Person> = mapper
//!     .table::<Person>()
//!     .filter(col("Name").eq("Fabian").or(col("Name").eq("Jurian")))
//!     .query(&conn, None)?
//!     .collect::<Result<_>>()?;
//! ```
//!
//! When an [`EntityMap`](crate::EntityMap) exists for the record, its table
//! and columns are used; otherwise the table is the record's table name in
//! the connection's default schema.

use crate::mapper::{ReaderOf, SqlMapper, single};
use crate::rows::Rows;
use sqlmapper_core::{Connection, Dialect, FromRow, Record, Result};
use sqlmapper_query::{BuiltQuery, Expr, Operator, QueryBuilder, Queryable, TableInfo};
use std::any::TypeId;
use std::fmt;

/// A lazily built SELECT over the table of `T`.
pub struct Table<'m, T> {
    mapper: &'m SqlMapper,
    query: Queryable<T>,
}

impl<T> fmt::Debug for Table<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("record", &std::any::type_name::<T>())
            .finish_non_exhaustive()
    }
}

impl SqlMapper {
    /// Start a predicate query over the table of `T`.
    pub fn table<T: Record + FromRow>(&self) -> Table<'_, T> {
        Table {
            mapper: self,
            query: Queryable::new(),
        }
    }
}

impl<'m, T: Record + FromRow> Table<'m, T> {
    fn with(self, apply: impl FnOnce(Queryable<T>) -> Queryable<T>) -> Self {
        Self {
            mapper: self.mapper,
            query: apply(self.query),
        }
    }

    /// Append any operator; unsupported ones fail when the query is built.
    pub fn push(self, operator: Operator) -> Self {
        self.with(|q| q.push(operator))
    }

    pub fn filter(self, predicate: Expr) -> Self {
        self.with(|q| q.filter(predicate))
    }

    pub fn distinct(self) -> Self {
        self.with(Queryable::distinct)
    }

    pub fn order_by(self, member: impl Into<String>) -> Self {
        self.with(|q| q.order_by(member))
    }

    pub fn order_by_descending(self, member: impl Into<String>) -> Self {
        self.with(|q| q.order_by_descending(member))
    }

    pub fn skip(self, count: usize) -> Self {
        self.with(|q| q.skip(count))
    }

    pub fn take(self, count: usize) -> Self {
        self.with(|q| q.take(count))
    }

    /// Generate the SELECT and its parameters.
    pub fn build(&self, dialect: Dialect) -> Result<BuiltQuery> {
        if let Some(entity) = self.mapper.existing_entity::<T>() {
            return entity.build(&self.mapper.evaluators, &self.query);
        }
        let schema = dialect.default_schema();
        let table = self.mapper.tables.get_or_insert_with(TypeId::of::<T>(), Some(schema), || {
            let descriptor = self.mapper.types.describe(T::record_info());
            TableInfo::from_descriptor(&descriptor, Some(schema))
        });
        QueryBuilder::new(&self.mapper.evaluators)
            .with_cache(&self.mapper.predicates)
            .build(&self.query, &table)
    }

    pub fn to_sql(&self, dialect: Dialect) -> Result<String> {
        Ok(self.build(dialect)?.sql.to_string())
    }

    /// Run the query, mapping each row to `T`.
    pub fn query<'c, C: Connection>(
        &self,
        conn: &'c C,
        tx: Option<&C::Transaction<'_>>,
    ) -> Result<Rows<ReaderOf<'c, C>, T>> {
        let built = self.build(conn.dialect())?;
        self.mapper.query::<T, C>(conn, &built.sql, &built.parameters, tx)
    }

    /// The only matching row; more than one is an error.
    pub fn single<C: Connection>(
        &self,
        conn: &C,
        tx: Option<&C::Transaction<'_>>,
    ) -> Result<Option<T>> {
        single(self.query(conn, tx)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlmapper_core::error::Error;
    use sqlmapper_query::col;

    #[derive(Debug, Default, sqlmapper_macros::Record)]
    struct Person {
        #[sqlmapper(identity)]
        id: i32,
        name: String,
    }

    #[test]
    fn test_table_uses_default_schema() {
        let mapper = SqlMapper::new();
        let sql = mapper
            .table::<Person>()
            .filter(col("name").eq("Fabian"))
            .to_sql(Dialect::Sqlite)
            .unwrap();
        assert_eq!(
            sql,
            "SELECT t.[id], t.[name] FROM [main].[Person] AS t WHERE  ( t.[name] = @p0 ) "
        );
    }

    #[test]
    fn test_entity_table_wins() {
        let mapper = SqlMapper::new();
        mapper.entity::<Person>().table("People");
        let built = mapper
            .table::<Person>()
            .distinct()
            .filter(col("id").gt(3))
            .build(Dialect::SqlServer)
            .unwrap();
        assert_eq!(
            &*built.sql,
            "SELECT DISTINCT t.[id], t.[name] FROM [People] AS t WHERE  ( t.[id] > @p0 ) "
        );
        assert_eq!(built.parameters.len(), 1);
    }

    #[test]
    fn test_rejected_operator() {
        let mapper = SqlMapper::new();
        let err = mapper
            .table::<Person>()
            .order_by("name")
            .build(Dialect::Sqlite)
            .unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
        assert!(err.to_string().contains("OrderBy"));
    }

    #[test]
    fn test_predicate_sql_is_cached() {
        let mapper = SqlMapper::new();
        for name in ["Fabian", "Jurian"] {
            let built = mapper
                .table::<Person>()
                .filter(col("name").eq(name))
                .build(Dialect::Sqlite)
                .unwrap();
            assert_eq!(built.parameters.get("p0").and_then(|v| v.as_str()), Some(name));
        }
        assert_eq!(mapper.predicate_builds(), 1);
    }
}
