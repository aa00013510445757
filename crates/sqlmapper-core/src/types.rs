//! Semantic database types and member classification.

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Semantic database type of a bound parameter.
///
/// Mirrors the provider-neutral parameter types a command understands; the
/// driver decides how each one is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbType {
    Byte,
    Int16,
    Int32,
    Int64,
    Single,
    Double,
    Decimal,
    Boolean,
    String,
    StringFixedLength,
    Guid,
    DateTime,
    DateTimeOffset,
    Binary,
}

impl DbType {
    /// Integer or floating point types that a decimal value may be narrowed into.
    pub const fn is_numeric(self) -> bool {
        matches!(
            self,
            DbType::Byte
                | DbType::Int16
                | DbType::Int32
                | DbType::Int64
                | DbType::Single
                | DbType::Double
                | DbType::Decimal
        )
    }

    /// Get the type name, as used in diagnostics.
    pub const fn name(self) -> &'static str {
        match self {
            DbType::Byte => "Byte",
            DbType::Int16 => "Int16",
            DbType::Int32 => "Int32",
            DbType::Int64 => "Int64",
            DbType::Single => "Single",
            DbType::Double => "Double",
            DbType::Decimal => "Decimal",
            DbType::Boolean => "Boolean",
            DbType::String => "String",
            DbType::StringFixedLength => "StringFixedLength",
            DbType::Guid => "Guid",
            DbType::DateTime => "DateTime",
            DbType::DateTimeOffset => "DateTimeOffset",
            DbType::Binary => "Binary",
        }
    }
}

impl fmt::Display for DbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a record member is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// A DB-mappable scalar.
    Scalar(DbType),
    /// An enum stored as a 4-byte integer.
    Enum,
    /// A list of scalars, expanded into numbered parameters when bound.
    List(DbType),
    /// A nested record, flattened into dotted member paths.
    Nested,
}

impl FieldKind {
    /// Whether the member maps to a single column.
    pub const fn is_column(self) -> bool {
        matches!(self, FieldKind::Scalar(_) | FieldKind::Enum)
    }

    /// The parameter type for a single value of this kind.
    pub const fn db_type(self) -> Option<DbType> {
        match self {
            FieldKind::Scalar(t) | FieldKind::List(t) => Some(t),
            FieldKind::Enum => Some(DbType::Int32),
            FieldKind::Nested => None,
        }
    }
}

/// Direction of a bound parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParameterDirection {
    #[default]
    Input,
    Output,
    InputOutput,
    ReturnValue,
}

/// A runtime type tag used in cache keys.
///
/// Equality and hashing use only the `TypeId`; the name is kept for logs.
#[derive(Debug, Clone, Copy)]
pub struct TypeTag {
    id: TypeId,
    name: &'static str,
}

impl TypeTag {
    /// Tag for `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeTag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeTag {}

impl Hash for TypeTag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
