//! Parameter Binder Compiler.
//!
//! A [`ParamBinder`] is compiled once per parameter shape and turns a
//! parameter value into command parameters:
//!
//! - records bind every member as `@Name`;
//! - [`Params`] maps bind every entry, typed from its value;
//! - [`Parameters`] lists bind verbatim.
//!
//! List values expand into one parameter per item and rewrite the command
//! text: `in @ids` becomes `in (@ids1,@ids2,@ids3)`.

use regex::{NoExpand, Regex};
use sqlmapper_core::{
    Command, DbParameter, DbType, Error, FieldKind, MemberInfo, ParamSource, ParameterDirection,
    Params, Result, Value,
};

/// How one record member is bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindPlan {
    Scalar(DbType),
    /// One parameter per item, all of the element type.
    List(DbType),
}

/// A record member with its bind plan.
#[derive(Debug)]
pub struct BoundMember {
    pub index: usize,
    pub name: &'static str,
    pub plan: BindPlan,
    placeholder: Option<Regex>,
}

/// A compiled binding routine for one parameter shape.
#[derive(Debug)]
pub enum ParamBinder {
    Empty,
    Members(Vec<BoundMember>),
    /// Types resolved per value at bind time.
    Map,
    /// Bound verbatim.
    List,
}

impl ParamBinder {
    /// Compile a binder for the shape of `source`.
    pub fn compile(source: Option<ParamSource<'_>>) -> Result<Self> {
        match source {
            None => Ok(Self::Empty),
            Some(ParamSource::Map(_)) => Ok(Self::Map),
            Some(ParamSource::List(_)) => Ok(Self::List),
            Some(ParamSource::Record(record)) => {
                Self::for_members(record.info().members.iter().enumerate())
            }
        }
    }

    /// Compile a binder for a chosen subset of a record's members.
    pub fn for_members(
        members: impl IntoIterator<Item = (usize, &'static MemberInfo)>,
    ) -> Result<Self> {
        let mut bound = Vec::new();
        for (index, member) in members {
            let plan = match member.kind {
                FieldKind::Scalar(db_type) => BindPlan::Scalar(db_type),
                FieldKind::Enum => BindPlan::Scalar(DbType::Int32),
                FieldKind::List(db_type) => BindPlan::List(db_type),
                FieldKind::Nested => {
                    return Err(Error::config(format!(
                        "Type [{}] is not supported",
                        (member.type_name)()
                    )));
                }
            };
            let placeholder = match plan {
                BindPlan::List(_) => Some(placeholder_regex(member.name)?),
                BindPlan::Scalar(_) => None,
            };
            bound.push(BoundMember {
                index,
                name: member.name,
                plan,
                placeholder,
            });
        }
        tracing::debug!(members = bound.len(), "Compiled parameter binder");
        Ok(Self::Members(bound))
    }

    /// Add the parameters of `source` to `cmd`.
    pub fn bind<C: Command>(
        &self,
        cmd: &mut C,
        source: Option<ParamSource<'_>>,
        string_size_limit: usize,
    ) -> Result<()> {
        match (self, source) {
            (Self::Empty, _) | (_, None) => Ok(()),
            (Self::Members(members), Some(ParamSource::Record(record))) => {
                for member in members {
                    let value = record.get(member.index);
                    match member.plan {
                        BindPlan::Scalar(db_type) => cmd.add_parameter(sized_parameter(
                            member.name,
                            value,
                            db_type,
                            string_size_limit,
                        )),
                        BindPlan::List(db_type) => expand_list(
                            cmd,
                            member.name,
                            value,
                            Some(db_type),
                            member.placeholder.as_ref(),
                            string_size_limit,
                        )?,
                    }
                }
                Ok(())
            }
            (Self::Map, Some(ParamSource::Map(params))) => {
                bind_map(cmd, params, string_size_limit)
            }
            (Self::List, Some(ParamSource::List(list))) => {
                for parameter in list {
                    cmd.add_parameter(DbParameter {
                        name: strip_sigil(&parameter.name).to_string(),
                        size: parameter_size(&parameter.value, parameter.db_type, string_size_limit),
                        value: parameter.value.clone(),
                        db_type: parameter.db_type,
                        direction: parameter.direction,
                    });
                }
                Ok(())
            }
            _ => Err(Error::config(
                "parameter shape does not match the compiled binder",
            )),
        }
    }
}

fn bind_map<C: Command>(cmd: &mut C, params: &Params, string_size_limit: usize) -> Result<()> {
    for (name, value) in params.iter() {
        let name = strip_sigil(name);
        match value {
            Value::Array(_) => expand_list(cmd, name, value.clone(), None, None, string_size_limit)?,
            _ => {
                let db_type = value.db_type().unwrap_or(DbType::String);
                cmd.add_parameter(sized_parameter(name, value.clone(), db_type, string_size_limit));
            }
        }
    }
    Ok(())
}

/// Declared size of a text parameter.
///
/// Strings up to the limit declare the limit itself so that statements
/// differing only in text length share one plan; longer ones are unbounded.
pub fn parameter_size(value: &Value, db_type: DbType, string_size_limit: usize) -> Option<i32> {
    let len = value.char_len()?;
    match db_type {
        DbType::String => Some(if len <= string_size_limit {
            i32::try_from(string_size_limit).unwrap_or(i32::MAX)
        } else {
            -1
        }),
        DbType::StringFixedLength => Some(i32::try_from(len).unwrap_or(i32::MAX)),
        _ => None,
    }
}

fn sized_parameter(name: &str, value: Value, db_type: DbType, string_size_limit: usize) -> DbParameter {
    DbParameter {
        name: name.to_string(),
        size: parameter_size(&value, db_type, string_size_limit),
        value,
        db_type,
        direction: ParameterDirection::Input,
    }
}

fn strip_sigil(name: &str) -> &str {
    name.strip_prefix('@').unwrap_or(name)
}

/// `@name` not followed by another identifier character.
fn placeholder_regex(name: &str) -> Result<Regex> {
    Regex::new(&format!(r"@{}\b", regex::escape(name)))
        .map_err(|e| Error::config(format!("invalid parameter name {}: {}", name, e)))
}

fn expand_list<C: Command>(
    cmd: &mut C,
    name: &str,
    value: Value,
    element: Option<DbType>,
    placeholder: Option<&Regex>,
    string_size_limit: usize,
) -> Result<()> {
    let items = match value {
        Value::Null => return Ok(()),
        Value::Array(items) => items,
        single => vec![single],
    };
    let element = element
        .or_else(|| items.first().and_then(Value::db_type))
        .unwrap_or(DbType::String);

    let mut names = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        let item_name = format!("{}{}", name, i + 1);
        names.push(format!("@{}", item_name));
        cmd.add_parameter(sized_parameter(&item_name, item, element, string_size_limit));
    }

    // An empty IN-list is invalid SQL; `(NULL)` matches nothing.
    let replacement = if names.is_empty() {
        "(NULL)".to_string()
    } else {
        format!("({})", names.join(","))
    };

    let compiled;
    let placeholder = match placeholder {
        Some(regex) => regex,
        None => {
            compiled = placeholder_regex(name)?;
            &compiled
        }
    };
    let sql = placeholder
        .replace_all(cmd.command_text(), NoExpand(&replacement))
        .into_owned();
    tracing::trace!(parameter = name, items = names.len(), "Expanded list parameter");
    cmd.set_command_text(sql);
    Ok(())
}

/// Member names of a parameter shape, in binding order.
///
/// Used to generate the column lists of the simple table operations.
pub fn shape_names(source: Option<ParamSource<'_>>) -> Result<Vec<String>> {
    match source {
        None => Ok(Vec::new()),
        Some(ParamSource::Map(params)) => Ok(params.keys().map(|k| strip_sigil(k).to_string()).collect()),
        Some(ParamSource::List(list)) => Ok(list
            .iter()
            .map(|p| strip_sigil(&p.name).to_string())
            .collect()),
        Some(ParamSource::Record(record)) => record
            .info()
            .members
            .iter()
            .map(|m| match m.kind {
                FieldKind::Nested => Err(Error::config(format!(
                    "Type [{}] is not supported",
                    (m.type_name)()
                ))),
                _ => Ok(m.name.to_string()),
            })
            .collect(),
    }
}

#[derive(Debug)]
enum Shape {
    Empty,
    Members(Vec<(usize, &'static str)>),
    Map,
    List,
}

impl Shape {
    fn compile(source: Option<ParamSource<'_>>) -> Result<Self> {
        match source {
            None => Ok(Self::Empty),
            Some(ParamSource::Map(_)) => Ok(Self::Map),
            Some(ParamSource::List(_)) => Ok(Self::List),
            Some(ParamSource::Record(record)) => {
                let mut members = Vec::new();
                for (index, member) in record.info().members.iter().enumerate() {
                    if member.kind == FieldKind::Nested {
                        return Err(Error::config(format!(
                            "Type [{}] is not supported",
                            (member.type_name)()
                        )));
                    }
                    members.push((index, member.name));
                }
                Ok(Self::Members(members))
            }
        }
    }

    fn copy_into(&self, source: Option<ParamSource<'_>>, suffix: &str, out: &mut Params) -> Result<()> {
        match (self, source) {
            (Self::Empty, _) | (_, None) => {}
            (Self::Members(members), Some(ParamSource::Record(record))) => {
                for (index, name) in members {
                    out.insert(format!("{}{}", name, suffix), record.get(*index));
                }
            }
            (Self::Map, Some(ParamSource::Map(params))) => {
                for (name, value) in params.iter() {
                    out.insert(format!("{}{}", strip_sigil(name), suffix), value.clone());
                }
            }
            (Self::List, Some(ParamSource::List(list))) => {
                for p in list {
                    out.insert(format!("{}{}", strip_sigil(&p.name), suffix), p.value.clone());
                }
            }
            _ => {
                return Err(Error::config(
                    "parameter shape does not match the compiled combiner",
                ));
            }
        }
        Ok(())
    }
}

/// Merges a primary and a "where" parameter shape into one [`Params`].
///
/// The "where" names get the suffix `2` (`Id` becomes `Id2`).
#[derive(Debug)]
pub struct ParamCombiner {
    primary: Shape,
    secondary: Shape,
}

impl ParamCombiner {
    pub fn compile(primary: Option<ParamSource<'_>>, secondary: Option<ParamSource<'_>>) -> Result<Self> {
        let combiner = Self {
            primary: Shape::compile(primary)?,
            secondary: Shape::compile(secondary)?,
        };
        tracing::debug!(?combiner, "Compiled parameter combiner");
        Ok(combiner)
    }

    pub fn combine(
        &self,
        primary: Option<ParamSource<'_>>,
        secondary: Option<ParamSource<'_>>,
    ) -> Result<Params> {
        let mut out = Params::new();
        self.primary.copy_into(primary, "", &mut out)?;
        self.secondary.copy_into(secondary, "2", &mut out)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlmapper_core::{Parameters, ToParams, params};

    /// Records added parameters without a database.
    #[derive(Debug, Default)]
    struct Recorder {
        sql: String,
        parameters: Vec<DbParameter>,
    }

    impl Recorder {
        fn new(sql: &str) -> Self {
            Self {
                sql: sql.to_string(),
                parameters: Vec::new(),
            }
        }

        fn param(&self, name: &str) -> &DbParameter {
            self.parameters.iter().find(|p| p.name == name).unwrap()
        }
    }

    struct NoRows;

    impl sqlmapper_core::RowReader for NoRows {
        fn columns(&self) -> std::sync::Arc<sqlmapper_core::ColumnInfo> {
            std::sync::Arc::default()
        }

        fn read(&mut self) -> Result<Option<sqlmapper_core::Row>> {
            Ok(None)
        }

        fn next_result(&mut self) -> Result<bool> {
            Ok(false)
        }
    }

    impl Command for Recorder {
        type Reader = NoRows;

        fn command_text(&self) -> &str {
            &self.sql
        }

        fn set_command_text(&mut self, sql: String) {
            self.sql = sql;
        }

        fn add_parameter(&mut self, parameter: DbParameter) {
            self.parameters.push(parameter);
        }

        fn parameters(&self) -> &[DbParameter] {
            &self.parameters
        }

        fn execute_reader(self) -> Result<NoRows> {
            Ok(NoRows)
        }

        fn execute_non_query(self) -> Result<u64> {
            Ok(0)
        }
    }

    fn bind(sql: &str, params: &impl ToParams) -> Recorder {
        let mut cmd = Recorder::new(sql);
        let binder = ParamBinder::compile(params.param_source()).unwrap();
        binder.bind(&mut cmd, params.param_source(), 4000).unwrap();
        cmd
    }

    #[derive(Debug, Default, sqlmapper_macros::Record)]
    struct Search {
        name: Option<String>,
        initial: char,
        ids: Vec<i32>,
    }

    #[derive(Debug, Default, sqlmapper_macros::Record)]
    struct Inner {
        city: String,
    }

    #[derive(Debug, Default, sqlmapper_macros::Record)]
    struct WithNested {
        id: i32,
        inner: Option<Inner>,
    }

    #[test]
    fn test_string_sizes() {
        let short = "a".repeat(4000);
        let long = "a".repeat(4001);
        let cmd = bind("select @a, @b", &params! { "a" => short, "b" => long });
        assert_eq!(cmd.param("a").size, Some(4000));
        assert_eq!(cmd.param("b").size, Some(-1));
        assert_eq!(cmd.param("a").db_type, DbType::String);
    }

    #[test]
    fn test_record_members() {
        let search = Search {
            name: None,
            initial: 'F',
            ids: vec![1, 2, 3],
        };
        let cmd = bind("select * from t where Name = @name and Id in @ids and x = @idsx", &search);
        assert_eq!(cmd.param("name").value, Value::Null);
        assert_eq!(cmd.param("name").db_type, DbType::String);
        assert_eq!(cmd.param("initial").db_type, DbType::StringFixedLength);
        assert_eq!(cmd.param("initial").size, Some(1));
        assert_eq!(cmd.param("ids2").value, Value::Int(2));
        assert_eq!(cmd.param("ids3").db_type, DbType::Int32);
        assert_eq!(
            cmd.sql,
            "select * from t where Name = @name and Id in (@ids1,@ids2,@ids3) and x = @idsx"
        );
    }

    #[test]
    fn test_empty_list_is_null_in_list() {
        let cmd = bind("select * from t where Id in @ids", &params! { "ids" => Vec::<i32>::new() });
        assert_eq!(cmd.sql, "select * from t where Id in (NULL)");
        assert!(cmd.parameters.is_empty());
    }

    #[test]
    fn test_null_list_is_skipped() {
        let cmd = bind("select * from t where Id in @ids", &params! { "ids" => Value::Null });
        assert_eq!(cmd.sql, "select * from t where Id in @ids");
        assert_eq!(cmd.param("ids").value, Value::Null);
    }

    #[test]
    fn test_map_list_takes_element_type() {
        let cmd = bind("where Name in @names", &params! { "names" => vec!["a", "b"] });
        assert_eq!(cmd.sql, "where Name in (@names1,@names2)");
        assert_eq!(cmd.param("names1").db_type, DbType::String);
        assert_eq!(cmd.param("names1").size, Some(4000));
    }

    #[test]
    fn test_static_list_binds_verbatim() {
        let mut list = Parameters::new();
        list.add_with_type("@code", "AB", DbType::StringFixedLength, ParameterDirection::Input);
        let cmd = bind("select @code", &list);
        assert_eq!(cmd.param("code").db_type, DbType::StringFixedLength);
        assert_eq!(cmd.param("code").size, Some(2));
    }

    #[test]
    fn test_nested_member_is_unsupported() {
        let value = WithNested::default();
        let err = ParamBinder::compile(value.param_source()).unwrap_err();
        assert!(err.to_string().contains("is not supported"));
        assert!(err.to_string().contains("Inner"));
    }

    #[test]
    fn test_shape_names() {
        let search = Search::default();
        assert_eq!(
            shape_names(search.param_source()).unwrap(),
            vec!["name", "initial", "ids"]
        );
        let map = params! { "@a" => 1, "b" => 2 };
        assert_eq!(shape_names(map.param_source()).unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_combiner_suffixes_where_members() {
        let set = params! { "Name" => "Jurian" };
        let filter = params! { "Id" => 7 };
        let combiner = ParamCombiner::compile(set.param_source(), filter.param_source()).unwrap();
        let combined = combiner
            .combine(set.param_source(), filter.param_source())
            .unwrap();
        assert_eq!(combined.keys().collect::<Vec<_>>(), vec!["Name", "Id2"]);
        assert_eq!(combined.get("Id2"), Some(&Value::Int(7)));
    }
}
