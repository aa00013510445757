//! Database connection boundary.
//!
//! The mapper never talks to a database directly. A driver implements:
//!
//! - [`Connection`] - creates commands and reports its identity and dialect
//! - [`Command`] - parameterized SQL text, executed for rows or a count
//! - [`RowReader`] - forward-only cursor over one or more result grids
//!
//! Placeholders in command text use the `@name` form.

use crate::error::Result;
use crate::row::{ColumnInfo, Row};
use crate::types::{DbType, ParameterDirection};
use crate::value::Value;
use std::sync::Arc;

/// SQL dialect of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    SqlServer,
    Sqlite,
}

impl Dialect {
    /// Scalar query returning the identity generated by the last insert.
    pub const fn last_identity_sql(self) -> &'static str {
        match self {
            Dialect::SqlServer => "select @@identity",
            Dialect::Sqlite => "select last_insert_rowid()",
        }
    }

    /// Schema used when a table is not qualified.
    pub const fn default_schema(self) -> &'static str {
        match self {
            Dialect::SqlServer => "dbo",
            Dialect::Sqlite => "main",
        }
    }
}

/// A parameter as handed to a command.
#[derive(Debug, Clone, PartialEq)]
pub struct DbParameter {
    /// Name without the `@` sigil.
    pub name: String,
    pub value: Value,
    pub db_type: DbType,
    pub direction: ParameterDirection,
    /// Declared size; `-1` means unbounded.
    pub size: Option<i32>,
}

impl DbParameter {
    pub fn new(name: impl Into<String>, value: Value, db_type: DbType) -> Self {
        Self {
            name: name.into(),
            value,
            db_type,
            direction: ParameterDirection::Input,
            size: None,
        }
    }
}

/// An open database connection.
pub trait Connection {
    /// Handle of a transaction opened on this connection.
    type Transaction<'t>
    where
        Self: 't;

    type Command<'c>: Command
    where
        Self: 'c;

    /// Stable identity of this connection, used as a cache-key component.
    fn identity(&self) -> &str;

    fn dialect(&self) -> Dialect;

    /// Create a command for `sql`, optionally enlisted in `transaction`.
    #[allow(clippy::result_large_err)]
    fn create_command<'c>(
        &'c self,
        sql: &str,
        transaction: Option<&Self::Transaction<'_>>,
    ) -> Result<Self::Command<'c>>;
}

/// A parameterized command.
pub trait Command {
    type Reader: RowReader;

    fn command_text(&self) -> &str;

    fn set_command_text(&mut self, sql: String);

    fn add_parameter(&mut self, parameter: DbParameter);

    fn parameters(&self) -> &[DbParameter];

    /// Execute, returning a cursor positioned before the first grid's rows.
    #[allow(clippy::result_large_err)]
    fn execute_reader(self) -> Result<Self::Reader>;

    /// Execute, returning the number of affected rows.
    #[allow(clippy::result_large_err)]
    fn execute_non_query(self) -> Result<u64>;
}

/// A forward-only cursor over result grids.
pub trait RowReader {
    /// Columns of the current grid.
    fn columns(&self) -> Arc<ColumnInfo>;

    /// Fetch the next row of the current grid.
    #[allow(clippy::result_large_err)]
    fn read(&mut self) -> Result<Option<Row>>;

    /// Skip the rest of the current grid and move to the next one.
    ///
    /// Returns `false` when there are no more grids.
    #[allow(clippy::result_large_err)]
    fn next_result(&mut self) -> Result<bool>;
}
