//! Error types for sqlmapper operations.

use std::fmt;

/// The primary error type for all sqlmapper operations.
#[derive(Debug)]
pub enum Error {
    /// Connection-level errors (open, busy)
    Connection(ConnectionError),
    /// Statement errors raised by the provider
    Query(QueryError),
    /// Value conversion errors
    Type(TypeError),
    /// A column value could not be written into its target member
    Data(DataError),
    /// Mapping configuration errors (unsupported member types, bad identity)
    Config(ConfigError),
    /// Query shapes the predicate builder cannot translate
    Unsupported(UnsupportedError),
    /// Cursor state violations
    State(StateError),
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to open the database
    Connect,
    /// Another command still owns the connection
    Busy,
    /// The connection has already been closed
    Closed,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Constraint violation (unique, foreign key, etc.)
    Constraint,
    /// Table or column not found
    NotFound,
    /// Data too large for column
    DataTruncation,
    /// A parameter could not be bound
    Binding,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
    pub rust_type: Option<&'static str>,
}

/// A failure while populating a member from one column.
///
/// The message follows the `Error parsing column: Name = "value" [TYPE]`
/// format; the underlying conversion error is kept as the source.
#[derive(Debug)]
pub struct DataError {
    pub column: Option<String>,
    pub value: Option<String>,
    pub provider_type: String,
    pub message: String,
    pub source: Option<Box<Error>>,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug)]
pub struct UnsupportedError {
    /// The operator or construct that was rejected, e.g. `OrderBy`.
    pub construct: String,
    pub message: String,
}

#[derive(Debug)]
pub struct StateError {
    pub kind: StateErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateErrorKind {
    /// The object was used after being disposed
    Disposed,
    /// A result grid was read a second time
    GridConsumed,
    /// A single-row read found more than one row
    MultipleRows,
}

impl Error {
    /// Build a configuration error from a message.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(ConfigError {
            message: message.into(),
            source: None,
        })
    }

    /// Build a query-shape error naming the rejected construct.
    pub fn unsupported(construct: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Unsupported(UnsupportedError {
            construct: construct.into(),
            message: message.into(),
        })
    }

    /// Build a cursor-state error.
    pub fn state(kind: StateErrorKind, message: impl Into<String>) -> Self {
        Error::State(StateError {
            kind,
            message: message.into(),
        })
    }

    /// Wrap a conversion failure for one column.
    pub fn parsing_column(column: &str, value: &crate::Value, source: Error) -> Self {
        let rendered = if value.is_null() {
            None
        } else {
            Some(value.to_string())
        };
        let message = match &rendered {
            Some(v) => format!(
                "Error parsing column: {} = \"{}\" [{}]",
                column,
                v,
                value.type_name()
            ),
            None => format!("Error parsing column: {} = <null>", column),
        };
        Error::Data(DataError {
            column: Some(column.to_string()),
            value: rendered,
            provider_type: value.type_name().to_string(),
            message,
            source: Some(Box::new(source)),
        })
    }

    /// Wrap a failed single-value cast (scalar reads).
    pub fn casting(value: &crate::Value, target: &'static str, source: Error) -> Self {
        let rendered = if value.is_null() {
            String::new()
        } else {
            value.to_string()
        };
        Error::Data(DataError {
            column: None,
            message: format!(
                "Error casting \"{}\" from [{}] to [{}]",
                rendered,
                value.type_name(),
                target
            ),
            value: Some(rendered),
            provider_type: value.type_name().to_string(),
            source: Some(Box::new(source)),
        })
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }

    /// Is this a data error raised while mapping a row?
    pub fn is_data_error(&self) -> bool {
        matches!(self, Error::Data(_))
    }

    /// The cursor-state kind, if this is a state error.
    pub fn state_kind(&self) -> Option<StateErrorKind> {
        match self {
            Error::State(s) => Some(s.kind),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Query(e) => write!(f, "Query error: {}", e.message),
            Error::Type(e) => {
                if let Some(col) = &e.column {
                    write!(
                        f,
                        "Type error in column '{}': expected {}, found {}",
                        col, e.expected, e.actual
                    )
                } else {
                    write!(f, "Type error: expected {}, found {}", e.expected, e.actual)
                }
            }
            Error::Data(e) => write!(f, "{}", e.message),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Unsupported(e) => write!(f, "{}", e.message),
            Error::State(e) => write!(f, "{}", e.message),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Data(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl fmt::Display for DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<DataError> for Error {
    fn from(err: DataError) -> Self {
        Error::Data(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

/// Result type alias for sqlmapper operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Value;
    use std::error::Error as _;

    #[test]
    fn parsing_column_message_names_value_and_type() {
        let inner = Error::Type(TypeError {
            expected: "i32",
            actual: "TEXT".to_string(),
            column: None,
            rust_type: None,
        });
        let err = Error::parsing_column("Age", &Value::Text("abc".into()), inner);
        assert_eq!(err.to_string(), "Error parsing column: Age = \"abc\" [TEXT]");
        assert!(err.is_data_error());
        assert!(err.source().is_some());
    }

    #[test]
    fn parsing_column_null_value() {
        let inner = Error::Custom("boom".into());
        let err = Error::parsing_column("Age", &Value::Null, inner);
        assert_eq!(err.to_string(), "Error parsing column: Age = <null>");
    }

    #[test]
    fn casting_message() {
        let inner = Error::Custom("overflow".into());
        let err = Error::casting(&Value::BigInt(70_000), "i16", inner);
        assert_eq!(
            err.to_string(),
            "Error casting \"70000\" from [BIGINT] to [i16]"
        );
    }

    #[test]
    fn state_kind_helper() {
        let err = Error::state(StateErrorKind::Disposed, "gone");
        assert_eq!(err.state_kind(), Some(StateErrorKind::Disposed));
        assert_eq!(Error::Custom("x".into()).state_kind(), None);
    }
}
