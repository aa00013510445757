//! sqlmapper - a micro-ORM that maps SQL rows and parameters to typed Rust
//! values.
//!
//! sqlmapper sits on top of a raw database connection and provides:
//!
//! - Typed queries: rows mapped to records, scalars, enums or dynamic rows
//! - Parameter binding from records, ordered maps and static lists, with
//!   list expansion for `IN` clauses
//! - Multi-result cursors that read grids in order
//! - Entity CRUD with generated SQL
//! - Predicate queries translated from an expression AST
//!
//! Everything compiled for a query (deserializer, binder, generated SQL) is
//! cached per query identity and reused on every later call.
//!
//! # Quick Start
//!
//! ```
//! use sqlmapper::prelude::*;
//! use sqlmapper_sqlite::SqliteConnection;
//!
//! #[derive(Debug, Default, Record)]
//! #[sqlmapper(table = "People")]
//! struct Person {
//!     #[sqlmapper(identity)]
//!     id: i64,
//!     name: String,
//!     age: Option<i32>,
//! }
//!
//! # fn main() -> Result<()> {
//! let conn = SqliteConnection::open_memory()?;
//! conn.execute_raw("create table People (id integer primary key, name text, age int)")?;
//!
//! let mapper = SqlMapper::new();
//! let mut fabian = Person { name: "Fabian".into(), age: Some(30), ..Default::default() };
//! mapper.insert(&conn, &mut fabian, None)?;
//! assert_eq!(fabian.id, 1);
//!
//! let found: Option<Person> = mapper.select_by_id(&conn, fabian.id, None)?;
//! assert_eq!(found.map(|p| p.name), Some("Fabian".to_string()));
//!
//! let sql = "select name from People where age > @age";
//! let names: Vec<String> = mapper
//!     .query::<String, _>(&conn, sql, params! { "age" => 18 }, None)?
//!     .collect::<Result<_>>()?;
//! assert_eq!(names, ["Fabian"]);
//! # Ok(())
//! # }
//! ```
//!
//! Crates deriving `Record` or `SqlEnum` also depend on `sqlmapper-core`,
//! which the generated code refers to.

pub mod binder;
pub mod cache;
pub mod entity;
pub mod ext;
pub mod identity;
pub mod mapper;
pub mod multi;
pub mod rows;
pub mod simple;
pub mod table;

pub use binder::{BindPlan, ParamBinder, ParamCombiner};
pub use cache::{QueryCache, QueryInfo};
pub use entity::{EntityMap, EntitySql};
pub use ext::SqlMapperExt;
pub use identity::QueryIdentity;
pub use mapper::{MapperOptions, MapperStats, ReaderOf, SqlMapper};
pub use multi::{GridRows, MultiResult};
pub use rows::Rows;
pub use table::Table;

pub use sqlmapper_core::error::{
    ConnectionErrorKind, DataError, QueryErrorKind, StateErrorKind, TypeError,
};
pub use sqlmapper_core::{
    ColumnInfo, Command, Connection, DbParameter, DbType, Dialect, DynamicRow, Error, FieldKind,
    FieldType, FromRow, ParamSource, Parameter, ParameterDirection, Parameters, Params, Record,
    Result, Row, RowReader, SqlEnum, ToParams, TypeTag, Value, params,
};
pub use sqlmapper_macros::{Record, SqlEnum};
pub use sqlmapper_query::{
    BuiltQuery, Expr, Operator, Queryable, StringComparison, col, null, val,
};

/// Common imports.
pub mod prelude {
    pub use crate::{
        DbType, DynamicRow, Error, Expr, MapperOptions, MultiResult, ParameterDirection,
        Parameters, Params, Record, Result, Row, SqlEnum, SqlMapper, SqlMapperExt,
        StringComparison, Value, col, null, params, val,
    };
}
