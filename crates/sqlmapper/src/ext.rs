//! Mapper operations as methods on every connection.
//!
//! [`SqlMapperExt`] forwards to [`SqlMapper::global`], so a connection can
//! be used directly:
//!
//! ```ignore
//! use sqlmapper::prelude::*;
//!
//! let names: Vec<String> = conn
//!     .query("select Name from People where Age > @age", params! { "age" => 30 }, None)?
//!     .collect::<Result<_>>()?;
//! ```

use crate::mapper::{ReaderOf, SqlMapper};
use crate::multi::MultiResult;
use crate::rows::Rows;
use crate::table::Table;
use sqlmapper_core::{Connection, DynamicRow, FromRow, Record, Result, ToParams, Value};
use sqlmapper_query::Expr;

/// Extension methods backed by the process-wide [`SqlMapper`].
pub trait SqlMapperExt: Connection + Sized {
    fn query<'c, T: FromRow>(
        &'c self,
        sql: &str,
        params: impl ToParams,
        tx: Option<&Self::Transaction<'_>>,
    ) -> Result<Rows<ReaderOf<'c, Self>, T>> {
        SqlMapper::global().query::<T, Self>(self, sql, params, tx)
    }

    fn query_dynamic<'c>(
        &'c self,
        sql: &str,
        params: impl ToParams,
        tx: Option<&Self::Transaction<'_>>,
    ) -> Result<Rows<ReaderOf<'c, Self>, DynamicRow>> {
        SqlMapper::global().query_dynamic(self, sql, params, tx)
    }

    fn scalar<T: FromRow>(
        &self,
        sql: &str,
        params: impl ToParams,
        tx: Option<&Self::Transaction<'_>>,
    ) -> Result<Option<T>> {
        SqlMapper::global().scalar::<T, Self>(self, sql, params, tx)
    }

    fn execute(
        &self,
        sql: &str,
        params: impl ToParams,
        tx: Option<&Self::Transaction<'_>>,
    ) -> Result<u64> {
        SqlMapper::global().execute(self, sql, params, tx)
    }

    fn query_multi<'c>(
        &'c self,
        sql: &str,
        params: impl ToParams,
        tx: Option<&Self::Transaction<'_>>,
    ) -> Result<MultiResult<'static, ReaderOf<'c, Self>>> {
        SqlMapper::global().query_multi(self, sql, params, tx)
    }

    fn select<'c, T: Record + FromRow>(
        &'c self,
        tx: Option<&Self::Transaction<'_>>,
    ) -> Result<Rows<ReaderOf<'c, Self>, T>> {
        SqlMapper::global().select::<T, Self>(self, tx)
    }

    fn select_by_id<T: Record + FromRow>(
        &self,
        id: impl Into<Value>,
        tx: Option<&Self::Transaction<'_>>,
    ) -> Result<Option<T>> {
        SqlMapper::global().select_by_id::<T, Self>(self, id, tx)
    }

    fn select_where<'c, T: Record + FromRow>(
        &'c self,
        predicate: Expr,
        tx: Option<&Self::Transaction<'_>>,
    ) -> Result<Rows<ReaderOf<'c, Self>, T>> {
        SqlMapper::global().select_where::<T, Self>(self, predicate, tx)
    }

    fn select_single<T: Record + FromRow>(
        &self,
        predicate: Expr,
        tx: Option<&Self::Transaction<'_>>,
    ) -> Result<Option<T>> {
        SqlMapper::global().select_single::<T, Self>(self, predicate, tx)
    }

    fn insert<T: Record>(&self, entity: &mut T, tx: Option<&Self::Transaction<'_>>) -> Result<u64> {
        SqlMapper::global().insert(self, entity, tx)
    }

    fn update<T: Record>(&self, entity: &T, tx: Option<&Self::Transaction<'_>>) -> Result<u64> {
        SqlMapper::global().update(self, entity, tx)
    }

    /// Returns `true` when no row was affected.
    fn delete<T: Record>(&self, entity: &T, tx: Option<&Self::Transaction<'_>>) -> Result<bool> {
        SqlMapper::global().delete(self, entity, tx)
    }

    /// Returns `true` when no row was affected.
    fn delete_by_id<T: Record>(
        &self,
        id: impl Into<Value>,
        tx: Option<&Self::Transaction<'_>>,
    ) -> Result<bool> {
        SqlMapper::global().delete_by_id::<T, Self>(self, id, tx)
    }

    fn insert_into(
        &self,
        table: &str,
        values: impl ToParams,
        tx: Option<&Self::Transaction<'_>>,
    ) -> Result<u64> {
        SqlMapper::global().insert_into(self, table, values, tx)
    }

    fn insert_into_returning<I: FromRow>(
        &self,
        table: &str,
        values: impl ToParams,
        tx: Option<&Self::Transaction<'_>>,
    ) -> Result<Option<I>> {
        SqlMapper::global().insert_into_returning::<I, Self>(self, table, values, tx)
    }

    fn update_where(
        &self,
        table: &str,
        set: impl ToParams,
        filter: impl ToParams,
        tx: Option<&Self::Transaction<'_>>,
    ) -> Result<u64> {
        SqlMapper::global().update_where(self, table, set, filter, tx)
    }

    fn delete_where(
        &self,
        table: &str,
        filter: impl ToParams,
        tx: Option<&Self::Transaction<'_>>,
    ) -> Result<u64> {
        SqlMapper::global().delete_where(self, table, filter, tx)
    }

    fn stored_procedure<'c, T: FromRow>(
        &'c self,
        name: &str,
        params: impl ToParams,
        tx: Option<&Self::Transaction<'_>>,
    ) -> Result<Rows<ReaderOf<'c, Self>, T>> {
        SqlMapper::global().stored_procedure::<T, Self>(self, name, params, tx)
    }

    fn stored_procedure_multi<'c>(
        &'c self,
        name: &str,
        params: impl ToParams,
        tx: Option<&Self::Transaction<'_>>,
    ) -> Result<MultiResult<'static, ReaderOf<'c, Self>>> {
        SqlMapper::global().stored_procedure_multi(self, name, params, tx)
    }

    /// A predicate query over the table of `T`; run it with
    /// [`Table::query`].
    fn table<T: Record + FromRow>(&self) -> Table<'static, T> {
        SqlMapper::global().table::<T>()
    }
}

impl<C: Connection> SqlMapperExt for C {}
