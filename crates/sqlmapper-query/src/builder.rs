//! SELECT generation from operator chains.

use crate::cache::{StatementCache, cache_key};
use crate::evaluate::EvaluatorRegistry;
use crate::queryable::Queryable;
use crate::state::QueryState;
use sqlmapper_core::{Parameters, Result, TypeDescriptor};
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Table metadata used to generate a SELECT.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableInfo {
    /// Schema qualifier; `None` renders `[table]` alone.
    pub schema: Option<String>,
    pub table: String,
    pub field_names: Vec<String>,
}

impl TableInfo {
    pub fn new(schema: Option<String>, table: impl Into<String>, field_names: Vec<String>) -> Self {
        Self {
            schema,
            table: table.into(),
            field_names,
        }
    }

    /// Table of a record type: its table name and DB-mappable members.
    pub fn from_descriptor(descriptor: &TypeDescriptor, schema: Option<&str>) -> Self {
        let info = descriptor.info();
        Self {
            schema: schema.map(str::to_string),
            table: info.table_name().to_string(),
            field_names: descriptor
                .scalar_members()
                .map(|(_, member)| member.name.to_string())
                .collect(),
        }
    }

    fn from_clause(&self) -> String {
        match &self.schema {
            Some(schema) => format!(" FROM [{}].[{}] AS t ", schema, self.table),
            None => format!(" FROM [{}] AS t ", self.table),
        }
    }
}

/// Per-type cache of [`TableInfo`], keyed by type and schema.
#[derive(Debug, Default)]
pub struct TableInfoCache {
    tables: RwLock<HashMap<(TypeId, Option<String>), Arc<TableInfo>>>,
}

impl TableInfoCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_insert_with(
        &self,
        type_id: TypeId,
        schema: Option<&str>,
        build: impl FnOnce() -> TableInfo,
    ) -> Arc<TableInfo> {
        let key = (type_id, schema.map(str::to_string));
        if let Some(table) = self
            .tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Arc::clone(table);
        }
        let table = Arc::new(build());
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(tables.entry(key).or_insert(table))
    }

    pub fn len(&self) -> usize {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A generated SELECT and its freshly bound parameters.
#[derive(Debug, Clone)]
pub struct BuiltQuery {
    pub sql: Arc<str>,
    pub parameters: Parameters,
    /// The SQL came from the statement cache.
    pub cached: bool,
}

/// Builds SELECT statements from operator chains.
#[derive(Debug)]
pub struct QueryBuilder<'a> {
    evaluators: &'a EvaluatorRegistry,
    cache: Option<&'a StatementCache>,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(evaluators: &'a EvaluatorRegistry) -> Self {
        Self {
            evaluators,
            cache: None,
        }
    }

    /// Cache generated SQL by (target type, table, chain shape).
    pub fn with_cache(mut self, cache: &'a StatementCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Walk the chain outermost-first and generate the SELECT.
    ///
    /// On a cache hit the evaluators still run, in bind-only mode, so
    /// unsupported operators still fail and parameters are always fresh.
    #[allow(clippy::result_large_err)]
    pub fn build<T: 'static>(&self, query: &Queryable<T>, table: &TableInfo) -> Result<BuiltQuery> {
        let key = self.cache.map(|_| {
            cache_key(&(
                TypeId::of::<T>(),
                &table.schema,
                &table.table,
                query.shape(),
            ))
        });
        let cached_sql = match (self.cache, key) {
            (Some(cache), Some(key)) => cache.get(key),
            _ => None,
        };

        let mut state = QueryState::new(cached_sql.is_none());
        for operator in query.outermost_first() {
            self.evaluators
                .process(operator.name())?
                .evaluate(operator, &mut state)?;
        }

        if let Some(sql) = cached_sql {
            tracing::trace!(sql = %sql, "Reusing cached SELECT");
            return Ok(BuiltQuery {
                sql,
                parameters: state.into_parameters(),
                cached: true,
            });
        }

        let sql = select_sql(&state, table);
        tracing::debug!(sql = %sql, table = %table.table, "Generated SELECT");
        let sql = match (self.cache, key) {
            (Some(cache), Some(key)) => cache.insert(key, sql),
            _ => Arc::from(sql),
        };
        Ok(BuiltQuery {
            sql,
            parameters: state.into_parameters(),
            cached: false,
        })
    }
}

fn select_sql(state: &QueryState, table: &TableInfo) -> String {
    let fields = if state.field_names().is_empty() {
        &table.field_names
    } else {
        state.field_names()
    };

    let mut sql = String::from("SELECT ");
    if state.is_distinct() {
        sql.push_str("DISTINCT ");
    }
    sql.push_str(
        &fields
            .iter()
            .map(|f| format!("t.[{}]", f))
            .collect::<Vec<_>>()
            .join(", "),
    );
    sql.push_str(&table.from_clause());
    if let Some(clause) = state.where_clause() {
        sql.push_str("WHERE ");
        sql.push_str(&clause);
    }
    sql
}
