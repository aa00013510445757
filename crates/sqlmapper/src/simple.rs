//! Table operations driven by a parameter shape.
//!
//! The member names of the parameter value become the column list:
//!
//! ```ignore
//! mapper.insert_into(&conn, "People", &params! { "Name" => "Fabian" }, None)?;
//! // insert into People (Name) values (@Name)
//! ```
//!
//! Statements are cached under `insert <table>`, `update <table>`,
//! `delete <table>` and `exec <name>` identities, but only for record
//! shapes: a map may carry different keys on every call.

use crate::binder::{ParamBinder, ParamCombiner, shape_names};
use crate::cache::QueryInfo;
use crate::identity::QueryIdentity;
use crate::mapper::{ReaderOf, SqlMapper};
use crate::multi::MultiResult;
use crate::rows::Rows;
use sqlmapper_core::{Command, Connection, FromRow, ParamSource, Result, ToParams};
use std::sync::Arc;

fn is_record(source: Option<ParamSource<'_>>) -> bool {
    matches!(source, Some(ParamSource::Record(_)))
}

fn placeholders(names: &[String]) -> String {
    names
        .iter()
        .map(|n| format!("@{}", n))
        .collect::<Vec<_>>()
        .join(", ")
}

fn assignments(names: &[String], suffix: &str, separator: &str) -> String {
    names
        .iter()
        .map(|n| format!("{0} = @{0}{1}", n, suffix))
        .collect::<Vec<_>>()
        .join(separator)
}

pub(crate) fn insert_sql(table: &str, names: &[String]) -> String {
    format!(
        "insert into {} ({}) values ({})",
        table,
        names.join(", "),
        placeholders(names)
    )
}

pub(crate) fn update_sql(table: &str, set: &[String], filter: &[String]) -> String {
    format!(
        "update {} set {} where {}",
        table,
        assignments(set, "", ", "),
        assignments(filter, "2", " and ")
    )
}

pub(crate) fn delete_sql(table: &str, filter: &[String]) -> String {
    format!("delete from {} where {}", table, assignments(filter, "", " and "))
}

pub(crate) fn procedure_sql(name: &str, params: &[String]) -> String {
    if params.is_empty() {
        format!("exec {}", name)
    } else {
        format!("exec {} {}", name, placeholders(params))
    }
}

impl SqlMapper {
    fn generated_sql(
        &self,
        info: &QueryInfo,
        cacheable: bool,
        build: impl FnOnce() -> Result<String>,
    ) -> Result<Arc<str>> {
        if cacheable {
            if let Some(sql) = info.sql() {
                return Ok(sql);
            }
        }
        let sql = build()?;
        self.stats.count_statement();
        tracing::debug!(sql = %sql, cacheable, "Generated statement");
        Ok(if cacheable {
            info.set_sql(sql)
        } else {
            Arc::from(sql)
        })
    }

    /// `insert into <table> (A, B) values (@A, @B)` from the members of
    /// `values`; returns the affected row count.
    #[tracing::instrument(level = "debug", skip(self, conn, values, tx))]
    pub fn insert_into<C: Connection>(
        &self,
        conn: &C,
        table: &str,
        values: impl ToParams,
        tx: Option<&C::Transaction<'_>>,
    ) -> Result<u64> {
        let source = values.param_source();
        let identity = QueryIdentity::new(
            conn.identity(),
            &format!("insert {}", table),
            None,
            values.type_tag(),
        );
        let info = self.queries.get_or_create(&identity);
        let sql = self.generated_sql(&info, is_record(source), || {
            Ok(insert_sql(table, &shape_names(source)?))
        })?;
        let binder = self.binder(&info, source)?;
        self.command(conn, &sql, &binder, source, tx)?
            .execute_non_query()
    }

    /// [`insert_into`](Self::insert_into), then read the generated identity.
    pub fn insert_into_returning<I: FromRow, C: Connection>(
        &self,
        conn: &C,
        table: &str,
        values: impl ToParams,
        tx: Option<&C::Transaction<'_>>,
    ) -> Result<Option<I>> {
        self.insert_into(conn, table, values, tx)?;
        self.scalar::<I, C>(conn, conn.dialect().last_identity_sql(), (), tx)
    }

    /// `update <table> set A = @A where Id = @Id2`; returns the affected
    /// row count.
    #[tracing::instrument(level = "debug", skip(self, conn, set, filter, tx))]
    pub fn update_where<C: Connection>(
        &self,
        conn: &C,
        table: &str,
        set: impl ToParams,
        filter: impl ToParams,
        tx: Option<&C::Transaction<'_>>,
    ) -> Result<u64> {
        let (set_source, filter_source) = (set.param_source(), filter.param_source());
        let identity = QueryIdentity::with_secondary(
            conn.identity(),
            &format!("update {}", table),
            None,
            set.type_tag(),
            filter.type_tag(),
        );
        let info = self.queries.get_or_create(&identity);
        let sql = self.generated_sql(
            &info,
            is_record(set_source) && is_record(filter_source),
            || {
                Ok(update_sql(
                    table,
                    &shape_names(set_source)?,
                    &shape_names(filter_source)?,
                ))
            },
        )?;
        let combiner = match info.combiner() {
            Some(combiner) => combiner,
            None => {
                let combiner = ParamCombiner::compile(set_source, filter_source)?;
                self.stats.count_combiner();
                info.set_combiner(combiner)
            }
        };
        let combined = combiner.combine(set_source, filter_source)?;
        self.command(conn, &sql, &ParamBinder::Map, combined.param_source(), tx)?
            .execute_non_query()
    }

    /// `delete from <table> where A = @A and B = @B`; returns the affected
    /// row count.
    #[tracing::instrument(level = "debug", skip(self, conn, filter, tx))]
    pub fn delete_where<C: Connection>(
        &self,
        conn: &C,
        table: &str,
        filter: impl ToParams,
        tx: Option<&C::Transaction<'_>>,
    ) -> Result<u64> {
        let source = filter.param_source();
        let identity = QueryIdentity::new(
            conn.identity(),
            &format!("delete {}", table),
            None,
            filter.type_tag(),
        );
        let info = self.queries.get_or_create(&identity);
        let sql = self.generated_sql(&info, is_record(source), || {
            Ok(delete_sql(table, &shape_names(source)?))
        })?;
        let binder = self.binder(&info, source)?;
        self.command(conn, &sql, &binder, source, tx)?
            .execute_non_query()
    }

    fn procedure_text<C: Connection>(
        &self,
        conn: &C,
        name: &str,
        params: &impl ToParams,
    ) -> Result<Arc<str>> {
        let source = params.param_source();
        let identity = QueryIdentity::new(
            conn.identity(),
            &format!("exec {}", name),
            None,
            params.type_tag(),
        );
        let info = self.queries.get_or_create(&identity);
        self.generated_sql(&info, is_record(source), || {
            Ok(procedure_sql(name, &shape_names(source)?))
        })
    }

    /// `exec <name> @A, @B`, mapping the first grid to `T`.
    pub fn stored_procedure<'c, T: FromRow, C: Connection>(
        &self,
        conn: &'c C,
        name: &str,
        params: impl ToParams,
        tx: Option<&C::Transaction<'_>>,
    ) -> Result<Rows<ReaderOf<'c, C>, T>> {
        let sql = self.procedure_text(conn, name, &params)?;
        self.query::<T, C>(conn, &sql, params, tx)
    }

    /// `exec <name> @A, @B`, reading every grid.
    pub fn stored_procedure_multi<'m, 'c, C: Connection>(
        &'m self,
        conn: &'c C,
        name: &str,
        params: impl ToParams,
        tx: Option<&C::Transaction<'_>>,
    ) -> Result<MultiResult<'m, ReaderOf<'c, C>>> {
        let sql = self.procedure_text(conn, name, &params)?;
        self.query_multi(conn, &sql, params, tx)
    }
}
