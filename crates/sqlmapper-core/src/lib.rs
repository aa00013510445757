//! Core types and traits for sqlmapper.
//!
//! This crate provides the foundational pieces of the mapping engine:
//!
//! - `Value`, `Row` and `DynamicRow` for provider data
//! - `Record`, `FieldType` and `SqlEnum`, implemented by the derive macros
//! - `TypeRegistry`, the per-type member descriptor cache
//! - `FromRow` and `Deserializer`, the compiled row readers
//! - `Connection`, `Command` and `RowReader`, the driver boundary

// Lets derive output refer to `sqlmapper_core::` inside this crate's tests.
extern crate self as sqlmapper_core;

pub mod connection;
pub mod descriptor;
pub mod deserializer;
pub mod dynamic;
pub mod error;
pub mod field;
pub mod params;
pub mod record;
pub mod row;
pub mod types;
pub mod value;

pub use connection::{Command, Connection, DbParameter, Dialect, RowReader};
pub use descriptor::{MAX_NESTING_DEPTH, MemberPath, TypeDescriptor, TypeRegistry};
pub use deserializer::{Deserializer, FromRow, record_deserializer, scalar_deserializer};
pub use dynamic::DynamicRow;
pub use error::{Error, Result};
pub use field::{FieldType, SqlEnum, enum_from_value};
pub use params::{ParamSource, Parameter, Parameters, Params, ToParams};
pub use record::{MemberInfo, Record, RecordInfo};
pub use row::{ColumnInfo, FromValue, Row};
pub use types::{DbType, FieldKind, ParameterDirection, TypeTag};
pub use value::Value;
