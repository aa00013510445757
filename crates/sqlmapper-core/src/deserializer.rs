//! Row Deserializer Compiler.
//!
//! A [`Deserializer`] is built once per result shape and then applied to
//! every row. Three strategies exist:
//!
//! - dynamic rows ([`DynamicRow`]): one ordered name/value map per row;
//! - records (`#[derive(Record)]`): columns are matched to flattened member
//!   paths at compile time, nested parents are instantiated per row;
//! - scalars: `row[0]` converted to the target type.

use crate::Result;
use crate::descriptor::{MemberPath, TypeDescriptor, TypeRegistry};
use crate::dynamic::DynamicRow;
use crate::error::Error;
use crate::field::FieldType;
use crate::record::Record;
use crate::row::{ColumnInfo, Row, narrow_decimal};
use crate::types::{DbType, FieldKind};
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

type RowFn<T> = dyn Fn(&Row) -> Result<T> + Send + Sync;

/// A compiled row-to-value routine.
pub struct Deserializer<T> {
    func: Arc<RowFn<T>>,
}

impl<T> Clone for Deserializer<T> {
    fn clone(&self) -> Self {
        Self {
            func: Arc::clone(&self.func),
        }
    }
}

impl<T> fmt::Debug for Deserializer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deserializer")
            .field("target", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T> Deserializer<T> {
    pub fn new(func: impl Fn(&Row) -> Result<T> + Send + Sync + 'static) -> Self {
        Self {
            func: Arc::new(func),
        }
    }

    #[allow(clippy::result_large_err)]
    pub fn deserialize(&self, row: &Row) -> Result<T> {
        (self.func)(row)
    }
}

/// A type that rows can be read into.
pub trait FromRow: Sized + 'static {
    /// Compile a deserializer for a result with these columns.
    #[allow(clippy::result_large_err)]
    fn deserializer(columns: &ColumnInfo, registry: &TypeRegistry) -> Result<Deserializer<Self>>;
}

macro_rules! scalar_from_row {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FromRow for $ty {
                fn deserializer(_: &ColumnInfo, _: &TypeRegistry) -> Result<Deserializer<Self>> {
                    Ok(scalar_deserializer::<Self>())
                }
            }
        )*
    };
}

scalar_from_row!(
    u8,
    i16,
    i32,
    i64,
    f32,
    f64,
    rust_decimal::Decimal,
    bool,
    String,
    char,
    uuid::Uuid,
    chrono::NaiveDateTime,
    chrono::DateTime<chrono::FixedOffset>,
    Vec<u8>,
);

impl<T: FieldType> FromRow for Option<T> {
    fn deserializer(_: &ColumnInfo, _: &TypeRegistry) -> Result<Deserializer<Self>> {
        Ok(scalar_deserializer::<Self>())
    }
}

impl FromRow for Value {
    fn deserializer(_: &ColumnInfo, _: &TypeRegistry) -> Result<Deserializer<Self>> {
        Ok(Deserializer::new(|row: &Row| {
            Ok(row.get(0).cloned().unwrap_or(Value::Null))
        }))
    }
}

impl FromRow for DynamicRow {
    fn deserializer(_: &ColumnInfo, _: &TypeRegistry) -> Result<Deserializer<Self>> {
        Ok(Deserializer::new(|row: &Row| Ok(DynamicRow::from_row(row))))
    }
}

/// Deserializer reading the first column into a scalar, enum or `Option`.
pub fn scalar_deserializer<T: FieldType>() -> Deserializer<T> {
    Deserializer::new(|row: &Row| {
        let value = row.get(0).unwrap_or(&Value::Null);
        read_scalar::<T>(value)
            .map_err(|e| Error::casting(value, std::any::type_name::<T>(), e))
    })
}

#[allow(clippy::result_large_err)]
fn read_scalar<T: FieldType>(value: &Value) -> Result<T> {
    if T::NULLABLE && value.is_null() {
        return T::from_sql(value);
    }
    if let FieldKind::Scalar(target) = T::KIND {
        match value {
            // Identity queries may report integer keys as decimals.
            Value::Decimal(d) if target != DbType::Decimal && target.is_numeric() => {
                tracing::trace!(%d, %target, "Narrowing decimal scalar");
                return T::from_sql(&narrow_decimal(*d, target)?);
            }
            Value::Text(s) if target == DbType::StringFixedLength => {
                let first = s
                    .chars()
                    .next()
                    .map(|c| Value::Text(c.to_string()))
                    .unwrap_or_else(|| value.clone());
                return T::from_sql(&first);
            }
            _ => {}
        }
    }
    T::from_sql(value)
}

/// Deserializer for a record type.
#[allow(clippy::result_large_err)]
pub fn record_deserializer<T: Record + Default>(
    columns: &ColumnInfo,
    registry: &TypeRegistry,
) -> Result<Deserializer<T>> {
    let descriptor = registry.describe(T::record_info());
    let plan = RecordPlan::compile(columns, &descriptor);
    tracing::debug!(
        ty = descriptor.info().name,
        columns = columns.len(),
        matched = plan.setters.len(),
        "Compiled record deserializer"
    );
    Ok(Deserializer::new(move |row: &Row| plan.materialize::<T>(row)))
}

#[derive(Debug)]
struct Setter {
    column: usize,
    column_name: String,
    path: Vec<usize>,
}

/// Column-to-member assignments for one result shape.
#[derive(Debug)]
struct RecordPlan {
    setters: Vec<Setter>,
    /// Distinct nested parent paths, in first-use order.
    parents: Vec<Vec<usize>>,
}

impl RecordPlan {
    fn compile(columns: &ColumnInfo, descriptor: &TypeDescriptor) -> Self {
        let mut setters = Vec::new();
        let mut parents: Vec<Vec<usize>> = Vec::new();

        for (column, name) in columns.names().iter().enumerate() {
            let Some(member) = match_member(descriptor.members(), name) else {
                continue;
            };
            let chain = member.parents();
            for depth in 1..=chain.len() {
                let prefix = &chain[..depth];
                if !parents.iter().any(|p| p == prefix) {
                    parents.push(prefix.to_vec());
                }
            }
            setters.push(Setter {
                column,
                column_name: name.clone(),
                path: member.path.clone(),
            });
        }

        Self { setters, parents }
    }

    #[allow(clippy::result_large_err)]
    fn materialize<T: Record + Default>(&self, row: &Row) -> Result<T> {
        let mut target = T::default();

        for parent in &self.parents {
            navigate(&mut target, parent)?;
        }

        for setter in &self.setters {
            let value = row.get(setter.column).unwrap_or(&Value::Null);
            if value.is_null() {
                continue;
            }
            let Some((leaf, chain)) = setter.path.split_last() else {
                continue;
            };
            navigate(&mut target, chain)
                .and_then(|record| record.set(*leaf, value))
                .map_err(|e| Error::parsing_column(&setter.column_name, value, e))?;
        }

        Ok(target)
    }
}

/// Match a column to a member: exact name, then case-insensitive name, then
/// `Name + "ID"` for enum members (exact, then case-insensitive).
fn match_member<'d>(members: &'d [MemberPath], column: &str) -> Option<&'d MemberPath> {
    let enum_id = |m: &MemberPath| -> Option<String> {
        (m.kind == FieldKind::Enum).then(|| format!("{}ID", m.name))
    };
    members
        .iter()
        .find(|m| m.name == column)
        .or_else(|| members.iter().find(|m| m.name.eq_ignore_ascii_case(column)))
        .or_else(|| {
            members
                .iter()
                .find(|m| enum_id(m).is_some_and(|id| id == column))
        })
        .or_else(|| {
            members
                .iter()
                .find(|m| enum_id(m).is_some_and(|id| id.eq_ignore_ascii_case(column)))
        })
}

#[allow(clippy::result_large_err)]
fn navigate<'r>(root: &'r mut dyn Record, chain: &[usize]) -> Result<&'r mut dyn Record> {
    let mut current = root;
    for &index in chain {
        let name = current.info().name;
        current = current.nested_mut(index).ok_or_else(|| {
            Error::config(format!(
                "member {} of {} is not a nested record",
                index, name
            ))
        })?;
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::SqlEnum;
    use rust_decimal::Decimal;
    use sqlmapper_macros::{Record, SqlEnum};

    #[derive(Debug, Default, Clone, PartialEq, Record)]
    struct City {
        name: String,
    }

    #[derive(Debug, Default, Clone, PartialEq, Record)]
    struct Contact {
        email: Option<String>,
        city: Option<City>,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Default, SqlEnum)]
    enum Status {
        #[default]
        Active,
        Retired,
        #[sqlmapper(other)]
        Other(i32),
    }

    #[derive(Debug, Default, Clone, PartialEq, Record)]
    struct Person {
        id: i64,
        name: String,
        initial: Option<char>,
        status: Status,
        contact1: Option<Contact>,
        contact2: Option<Contact>,
    }

    #[derive(Debug, Default, Record)]
    struct Node {
        name: String,
        parent: Option<Box<Node>>,
    }

    fn columns(names: &[&str]) -> Arc<ColumnInfo> {
        Arc::new(ColumnInfo::new(names.iter().map(|s| s.to_string()).collect()))
    }

    fn person_row(names: &[&str], values: Vec<Value>) -> Result<Person> {
        let registry = TypeRegistry::new();
        let cols = columns(names);
        let de = Person::deserializer(&cols, &registry)?;
        de.deserialize(&Row::with_columns(cols, values))
    }

    #[test]
    fn test_case_insensitive_and_unmatched_columns() {
        let p = person_row(
            &["ID", "Name", "extra"],
            vec![Value::Int(4), Value::from("Ann"), Value::from("ignored")],
        )
        .unwrap();
        assert_eq!(p.id, 4);
        assert_eq!(p.name, "Ann");
    }

    #[test]
    fn test_nested_paths_instantiate_only_matched_parents() {
        let p = person_row(
            &[
                "name",
                "contact1.email",
                "contact1.city.name",
                "contact2.email",
            ],
            vec![
                Value::from("Ann"),
                Value::from("a@x"),
                Value::from("Ghent"),
                Value::from("b@x"),
            ],
        )
        .unwrap();
        let c1 = p.contact1.unwrap();
        assert_eq!(c1.email.as_deref(), Some("a@x"));
        assert_eq!(c1.city.unwrap().name, "Ghent");
        assert_eq!(p.contact2.unwrap().email.as_deref(), Some("b@x"));

        let bare = person_row(&["name"], vec![Value::from("Bob")]).unwrap();
        assert!(bare.contact1.is_none());
        assert!(bare.contact2.is_none());
    }

    #[test]
    fn test_parent_instantiated_even_when_values_null() {
        let p = person_row(&["contact1.email"], vec![Value::Null]).unwrap();
        assert_eq!(p.contact1, Some(Contact::default()));
    }

    #[test]
    fn test_enum_column_tiers() {
        for (column, value) in [
            ("status", Value::Int(1)),
            ("Status", Value::from("Retired")),
            ("statusID", Value::from("retired")),
            ("STATUSid", Value::BigInt(1)),
        ] {
            let p = person_row(&[column], vec![value]).unwrap();
            assert_eq!(p.status, Status::Retired, "column {column}");
        }
        let p = person_row(&["status"], vec![Value::Int(42)]).unwrap();
        assert_eq!(p.status, Status::Other(42));
        assert_eq!(p.status.to_i32(), 42);
    }

    #[test]
    fn test_char_member_requires_single_character() {
        let p = person_row(&["initial"], vec![Value::from("Q")]).unwrap();
        assert_eq!(p.initial, Some('Q'));

        let err = person_row(&["initial"], vec![Value::from("QQ")]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Error parsing column: initial = \"QQ\" [TEXT]"
        );
    }

    #[test]
    fn test_null_keeps_default() {
        let p = person_row(&["id", "name"], vec![Value::Null, Value::Null]).unwrap();
        assert_eq!(p, Person::default());
    }

    #[test]
    fn test_scalar_decimal_narrowing() {
        let registry = TypeRegistry::new();
        let cols = columns(&["ID"]);
        let de = i32::deserializer(&cols, &registry).unwrap();
        let row = Row::with_columns(cols, vec![Value::Decimal(Decimal::from(17))]);
        assert_eq!(de.deserialize(&row).unwrap(), 17);
    }

    #[test]
    fn test_scalar_null_and_char_rules() {
        let registry = TypeRegistry::new();
        let cols = columns(&["x"]);
        let opt = Option::<i64>::deserializer(&cols, &registry).unwrap();
        assert_eq!(
            opt.deserialize(&Row::with_columns(Arc::clone(&cols), vec![Value::Null]))
                .unwrap(),
            None
        );

        let strict = i64::deserializer(&cols, &registry).unwrap();
        let err = strict
            .deserialize(&Row::with_columns(Arc::clone(&cols), vec![Value::Null]))
            .unwrap_err();
        assert_eq!(err.to_string(), "Error casting \"\" from [NULL] to [i64]");

        let first = char::deserializer(&cols, &registry).unwrap();
        assert_eq!(
            first
                .deserialize(&Row::with_columns(cols, vec![Value::from("xyz")]))
                .unwrap(),
            'x'
        );
    }

    #[test]
    fn test_scalar_enum_from_name() {
        let registry = TypeRegistry::new();
        let cols = columns(&["s"]);
        let de = Status::deserializer(&cols, &registry).unwrap();
        let row = Row::with_columns(cols, vec![Value::from("RETIRED")]);
        assert_eq!(de.deserialize(&row).unwrap(), Status::Retired);
    }

    #[test]
    fn test_cyclic_type_is_depth_guarded() {
        let registry = TypeRegistry::new();
        let descriptor = registry.describe(Node::record_info());
        let names: Vec<_> = descriptor.members().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["name", "parent"]);
        assert_eq!(descriptor.members()[1].kind, FieldKind::Nested);
    }

    #[test]
    fn test_descriptor_flattens_nested_members() {
        let registry = TypeRegistry::new();
        let descriptor = registry.describe(Person::record_info());
        let names: Vec<_> = descriptor.members().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "id",
                "name",
                "initial",
                "status",
                "contact1.email",
                "contact1.city.name",
                "contact2.email",
                "contact2.city.name",
            ]
        );
        assert_eq!(descriptor.members()[5].path, vec![4, 1, 0]);
        let again = registry.describe(Person::record_info());
        assert!(Arc::ptr_eq(&descriptor, &again));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_dynamic_rows() {
        let registry = TypeRegistry::new();
        let cols = columns(&["a", "b"]);
        let de = DynamicRow::deserializer(&cols, &registry).unwrap();
        let row = de
            .deserialize(&Row::with_columns(cols, vec![Value::Int(1), Value::Null]))
            .unwrap();
        assert_eq!(row.get("a"), Some(&Value::Int(1)));
        assert_eq!(row.get("b"), Some(&Value::Null));
    }
}
