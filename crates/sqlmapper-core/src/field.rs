//! Member type classification.
//!
//! [`FieldType`] is the type map: every Rust type that may appear as a
//! record member declares how it is stored and how it converts to and from
//! a provider [`Value`].

use crate::Result;
use crate::error::{Error, TypeError};
use crate::record::{Record, RecordInfo};
use crate::row::{FromValue, mismatch};
use crate::types::{DbType, FieldKind};
use crate::value::Value;
use chrono::{DateTime, FixedOffset, NaiveDateTime};
use rust_decimal::Decimal;
use uuid::Uuid;

/// A type that can be a record member.
pub trait FieldType: Sized + 'static {
    /// Storage classification.
    const KIND: FieldKind;
    /// Whether SQL NULL is representable.
    const NULLABLE: bool = false;
    /// Record description for nested kinds.
    const NESTED: Option<fn() -> &'static RecordInfo> = None;

    /// Parameter value of this member.
    fn to_sql(&self) -> Value;

    /// Convert a non-null column value.
    #[allow(clippy::result_large_err)]
    fn from_sql(value: &Value) -> Result<Self>;

    /// Borrow as a nested record.
    fn as_record_mut(&mut self) -> Option<&mut dyn Record> {
        None
    }

    /// A default-constructed instance, for nested records.
    fn default_instance() -> Option<Self> {
        None
    }
}

macro_rules! scalar_field {
    ($($ty:ty => $db:ident),* $(,)?) => {
        $(
            impl FieldType for $ty {
                const KIND: FieldKind = FieldKind::Scalar(DbType::$db);

                fn to_sql(&self) -> Value {
                    Value::from(self.clone())
                }

                fn from_sql(value: &Value) -> Result<Self> {
                    <$ty as FromValue>::from_value(value)
                }
            }
        )*
    };
}

scalar_field!(
    u8 => Byte,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    f32 => Single,
    f64 => Double,
    Decimal => Decimal,
    bool => Boolean,
    String => String,
    char => StringFixedLength,
    Uuid => Guid,
    NaiveDateTime => DateTime,
    DateTime<FixedOffset> => DateTimeOffset,
    Vec<u8> => Binary,
);

macro_rules! list_field {
    ($($ty:ty => $db:ident),* $(,)?) => {
        $(
            impl FieldType for Vec<$ty> {
                const KIND: FieldKind = FieldKind::List(DbType::$db);

                fn to_sql(&self) -> Value {
                    Value::Array(self.iter().map(FieldType::to_sql).collect())
                }

                fn from_sql(value: &Value) -> Result<Self> {
                    match value {
                        Value::Array(items) => items.iter().map(<$ty as FieldType>::from_sql).collect(),
                        _ => Err(mismatch("list", value)),
                    }
                }
            }
        )*
    };
}

list_field!(
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    f32 => Single,
    f64 => Double,
    Decimal => Decimal,
    bool => Boolean,
    String => String,
    char => StringFixedLength,
    Uuid => Guid,
    NaiveDateTime => DateTime,
    DateTime<FixedOffset> => DateTimeOffset,
);

impl<T: FieldType> FieldType for Option<T> {
    const KIND: FieldKind = T::KIND;
    const NULLABLE: bool = true;
    const NESTED: Option<fn() -> &'static RecordInfo> = T::NESTED;

    fn to_sql(&self) -> Value {
        self.as_ref().map_or(Value::Null, T::to_sql)
    }

    fn from_sql(value: &Value) -> Result<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_sql(value).map(Some)
        }
    }

    fn as_record_mut(&mut self) -> Option<&mut dyn Record> {
        if self.is_none() {
            *self = T::default_instance();
        }
        self.as_mut().and_then(T::as_record_mut)
    }

    fn default_instance() -> Option<Self> {
        Some(None)
    }
}

impl<T: FieldType> FieldType for Box<T> {
    const KIND: FieldKind = T::KIND;
    const NULLABLE: bool = T::NULLABLE;
    const NESTED: Option<fn() -> &'static RecordInfo> = T::NESTED;

    fn to_sql(&self) -> Value {
        T::to_sql(self)
    }

    fn from_sql(value: &Value) -> Result<Self> {
        T::from_sql(value).map(Box::new)
    }

    fn as_record_mut(&mut self) -> Option<&mut dyn Record> {
        T::as_record_mut(self)
    }

    fn default_instance() -> Option<Self> {
        T::default_instance().map(Box::new)
    }
}

/// An enum stored as its 4-byte integer discriminant.
///
/// Implemented by `#[derive(SqlEnum)]`. Column values may be the integer or
/// the variant name in any letter case.
pub trait SqlEnum: Sized + 'static {
    /// Variant names in declaration order.
    const NAMES: &'static [&'static str];

    /// Integer discriminant.
    fn to_i32(&self) -> i32;

    /// Variant for a discriminant. Enums with an `#[sqlmapper(other)]`
    /// variant return it for unknown discriminants.
    fn from_i32(value: i32) -> Option<Self>;

    /// Variant for a name, ignoring case.
    fn from_name(name: &str) -> Option<Self>;
}

/// Convert an integer or a name into an enum.
#[allow(clippy::result_large_err)]
pub fn enum_from_value<E: SqlEnum>(value: &Value) -> Result<E> {
    let undefined = |actual: String| {
        Error::Type(TypeError {
            expected: std::any::type_name::<E>(),
            actual,
            column: None,
            rust_type: Some(std::any::type_name::<E>()),
        })
    };
    match value {
        Value::Text(s) => {
            let name = s.trim();
            if let Some(v) = E::from_name(name) {
                return Ok(v);
            }
            name.parse::<i32>()
                .ok()
                .and_then(E::from_i32)
                .ok_or_else(|| undefined(format!("'{}' is not a defined name", name)))
        }
        Value::Decimal(d) => {
            let narrowed = crate::row::narrow_decimal(*d, DbType::Int32)?;
            enum_from_value(&narrowed)
        }
        other => {
            let raw = other.as_i64().ok_or_else(|| mismatch("enum", other))?;
            i32::try_from(raw)
                .ok()
                .and_then(E::from_i32)
                .ok_or_else(|| undefined(format!("{} is not a defined value", raw)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum Color {
        Red,
        Green,
        Other(i32),
    }

    impl SqlEnum for Color {
        const NAMES: &'static [&'static str] = &["Red", "Green"];

        fn to_i32(&self) -> i32 {
            match self {
                Color::Red => 0,
                Color::Green => 1,
                Color::Other(v) => *v,
            }
        }

        fn from_i32(value: i32) -> Option<Self> {
            Some(match value {
                0 => Color::Red,
                1 => Color::Green,
                v => Color::Other(v),
            })
        }

        fn from_name(name: &str) -> Option<Self> {
            if name.eq_ignore_ascii_case("red") {
                Some(Color::Red)
            } else if name.eq_ignore_ascii_case("green") {
                Some(Color::Green)
            } else {
                None
            }
        }
    }

    #[test]
    fn test_enum_from_int_and_name() {
        assert_eq!(enum_from_value::<Color>(&Value::Int(1)).unwrap(), Color::Green);
        assert_eq!(enum_from_value::<Color>(&Value::from("gREEN")).unwrap(), Color::Green);
        assert_eq!(enum_from_value::<Color>(&Value::from("1")).unwrap(), Color::Green);
        assert_eq!(enum_from_value::<Color>(&Value::BigInt(42)).unwrap(), Color::Other(42));
        assert!(enum_from_value::<Color>(&Value::from("Blue")).is_err());
    }

    #[test]
    fn test_option_field_kinds() {
        assert_eq!(<Option<i32> as FieldType>::KIND, FieldKind::Scalar(DbType::Int32));
        assert!(<Option<i32> as FieldType>::NULLABLE);
        assert_eq!(<Option<i32>>::from_sql(&Value::Null).unwrap(), None);
        assert_eq!(Some(3_i16).to_sql(), Value::SmallInt(3));
    }

    #[test]
    fn test_list_field_to_array() {
        let list = vec![1_i32, 2, 3];
        assert_eq!(<Vec<i32> as FieldType>::KIND, FieldKind::List(DbType::Int32));
        assert_eq!(
            list.to_sql(),
            Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
        assert_eq!(<Vec<u8> as FieldType>::KIND, FieldKind::Scalar(DbType::Binary));
    }
}
