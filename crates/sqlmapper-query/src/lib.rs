//! Predicate-to-SQL query builder for sqlmapper.
//!
//! `sqlmapper-query` is the **query construction layer**. It turns an explicit
//! predicate AST and a chain of queryable operators into a parameterized
//! SELECT.
//!
//! # Role In The Architecture
//!
//! - **Expression AST**: `Expr` with `col`/`val`/`null` builders.
//! - **Operator chain**: `Queryable<T>` records `filter`, `distinct` and the
//!   operators that are rejected (`order_by`, `skip`, `take`, ...).
//! - **Evaluators**: `EvaluatorRegistry` dispatches operators by name.
//! - **Builder**: `QueryBuilder` emits `SELECT ... FROM [table] AS t WHERE ...`
//!   and caches SQL per predicate shape in a `StatementCache`.
//!
//! Most users reach these through the `sqlmapper` facade's `Table<T>` and
//! `select_where`.

pub mod builder;
pub mod cache;
pub mod evaluate;
pub mod expr;
pub mod queryable;
pub mod state;

pub use builder::{BuiltQuery, QueryBuilder, TableInfo, TableInfoCache};
pub use cache::{StatementCache, cache_key};
pub use evaluate::{Evaluate, EvaluatorRegistry};
pub use expr::{BinaryOp, Expr, StringComparison, StringMethod, col, null, val};
pub use queryable::{Operator, Queryable};
pub use state::QueryState;
