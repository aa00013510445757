//! Parameter sources.
//!
//! A parameter value reaches the binder in one of three shapes: a record
//! whose members become `@Name` parameters, an ordered name/value map
//! ([`Params`]), or a statically declared list ([`Parameters`]).

use crate::record::Record;
use crate::types::{DbType, ParameterDirection, TypeTag};
use crate::value::Value;

/// One statically declared parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub value: Value,
    pub db_type: DbType,
    pub direction: ParameterDirection,
}

/// An ordered list of declared parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    items: Vec<Parameter>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an input parameter typed from its value.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let value = value.into();
        let db_type = value.db_type().unwrap_or(DbType::String);
        self.add_with_type(name, value, db_type, ParameterDirection::Input)
    }

    /// Add a parameter with an explicit type and direction.
    pub fn add_with_type(
        &mut self,
        name: impl Into<String>,
        value: impl Into<Value>,
        db_type: DbType,
        direction: ParameterDirection,
    ) -> &mut Self {
        self.items.push(Parameter {
            name: name.into(),
            value: value.into(),
            db_type,
            direction,
        });
        self
    }

    /// Value of a parameter, matched by name ignoring case.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.items
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .map(|p| &p.value)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Parameter> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<'a> IntoIterator for &'a Parameters {
    type Item = &'a Parameter;
    type IntoIter = std::slice::Iter<'a, Parameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// An ordered name/value map of parameters.
///
/// Inserting an existing name overwrites its value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    entries: Vec<(String, Value)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

/// Build a [`Params`] map.
///
/// ```
/// use sqlmapper_core::{params, Value};
///
/// let p = params! { "id" => 1, "name" => "Fabian" };
/// assert_eq!(p.get("id"), Some(&Value::Int(1)));
/// ```
#[macro_export]
macro_rules! params {
    () => { $crate::Params::new() };
    ($($name:expr => $value:expr),+ $(,)?) => {{
        let mut params = $crate::Params::new();
        $( params.insert($name, $value); )+
        params
    }};
}

/// The shape of a parameter value.
#[derive(Clone, Copy)]
pub enum ParamSource<'a> {
    Record(&'a dyn Record),
    Map(&'a Params),
    List(&'a Parameters),
}

/// A value usable as the parameters of a command.
///
/// Implemented for `()`, [`Params`], [`Parameters`], references, and every
/// `#[derive(Record)]` type.
pub trait ToParams {
    /// Type tag used in query identities; `None` when there are no parameters.
    fn type_tag(&self) -> Option<TypeTag>;

    fn param_source(&self) -> Option<ParamSource<'_>>;
}

impl ToParams for () {
    fn type_tag(&self) -> Option<TypeTag> {
        None
    }

    fn param_source(&self) -> Option<ParamSource<'_>> {
        None
    }
}

impl ToParams for Params {
    fn type_tag(&self) -> Option<TypeTag> {
        Some(TypeTag::of::<Params>())
    }

    fn param_source(&self) -> Option<ParamSource<'_>> {
        Some(ParamSource::Map(self))
    }
}

impl ToParams for Parameters {
    fn type_tag(&self) -> Option<TypeTag> {
        Some(TypeTag::of::<Parameters>())
    }

    fn param_source(&self) -> Option<ParamSource<'_>> {
        Some(ParamSource::List(self))
    }
}

impl<P: ToParams + ?Sized> ToParams for &P {
    fn type_tag(&self) -> Option<TypeTag> {
        (**self).type_tag()
    }

    fn param_source(&self) -> Option<ParamSource<'_>> {
        (**self).param_source()
    }
}
