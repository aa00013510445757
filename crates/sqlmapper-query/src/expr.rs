//! Predicate expressions.
//!
//! Predicates are built as an explicit AST so the builder can walk them
//! without executing anything:
//!
//! ```
//! use sqlmapper_query::expr::col;
//!
//! let p = col("Name").eq("Fabian").or(col("Name").eq("Jurian"));
//! assert_eq!(p.shape(), r#"((t.Name == ?) || (t.Name == ?))"#);
//! ```

use sqlmapper_core::Value;
use std::fmt;

/// A predicate expression over the members of `t`.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Member reference
    Column(String),

    /// Constant value; `Value::Null` is the null constant
    Constant(Value),

    /// Binary operation (comparison, logical, or arithmetic)
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },

    /// Logical negation
    Not(Box<Expr>),

    /// String helper call on a member
    Call {
        method: StringMethod,
        target: Box<Expr>,
        argument: Option<Box<Expr>>,
        comparison: Option<StringComparison>,
    },

    /// `member.HasValue` on a nullable member
    HasValue(Box<Expr>),
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    /// SQL comparison operator, optionally inverted for a pushed-down `NOT`.
    ///
    /// `None` for logical and arithmetic operators.
    pub const fn comparison_sql(self, inverted: bool) -> Option<&'static str> {
        let op = match (self, inverted) {
            (BinaryOp::Eq, false) | (BinaryOp::Ne, true) => "=",
            (BinaryOp::Ne, false) | (BinaryOp::Eq, true) => "!=",
            (BinaryOp::Gt, false) | (BinaryOp::Le, true) => ">",
            (BinaryOp::Lt, false) | (BinaryOp::Ge, true) => "<",
            (BinaryOp::Ge, false) | (BinaryOp::Lt, true) => ">=",
            (BinaryOp::Le, false) | (BinaryOp::Gt, true) => "<=",
            _ => return None,
        };
        Some(op)
    }

    pub const fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    /// Operator symbol in the expression text form.
    pub const fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Gt => ">",
            BinaryOp::Lt => "<",
            BinaryOp::Ge => ">=",
            BinaryOp::Le => "<=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }
}

/// Supported string helper calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StringMethod {
    IsNullOrEmpty,
    Equals,
    StartsWith,
    EndsWith,
    Contains,
}

impl StringMethod {
    pub const fn name(self) -> &'static str {
        match self {
            StringMethod::IsNullOrEmpty => "IsNullOrEmpty",
            StringMethod::Equals => "Equals",
            StringMethod::StartsWith => "StartsWith",
            StringMethod::EndsWith => "EndsWith",
            StringMethod::Contains => "Contains",
        }
    }
}

/// Comparison mode passed to `starts_with`/`ends_with`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StringComparison {
    CurrentCulture,
    CurrentCultureIgnoreCase,
    InvariantCulture,
    InvariantCultureIgnoreCase,
    Ordinal,
    OrdinalIgnoreCase,
}

/// A member reference.
pub fn col(name: impl Into<String>) -> Expr {
    Expr::Column(name.into())
}

/// A constant.
pub fn val(value: impl Into<Value>) -> Expr {
    Expr::Constant(value.into())
}

/// The null constant.
pub fn null() -> Expr {
    Expr::Constant(Value::Null)
}

impl Expr {
    fn binary(self, op: BinaryOp, other: impl Into<Expr>) -> Self {
        Expr::Binary {
            left: Box::new(self),
            op,
            right: Box::new(other.into()),
        }
    }

    fn call(
        self,
        method: StringMethod,
        argument: Option<Expr>,
        comparison: Option<StringComparison>,
    ) -> Self {
        Expr::Call {
            method,
            target: Box::new(self),
            argument: argument.map(Box::new),
            comparison,
        }
    }

    // ==================== Comparison Operators ====================

    pub fn eq(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Eq, other)
    }

    pub fn ne(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Ne, other)
    }

    pub fn gt(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Gt, other)
    }

    pub fn lt(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Lt, other)
    }

    pub fn ge(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Ge, other)
    }

    pub fn le(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Le, other)
    }

    // ==================== Logical Operators ====================

    pub fn and(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::And, other)
    }

    pub fn or(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Or, other)
    }

    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    // ==================== Arithmetic ====================
    // Expressible, but rejected by the `where` evaluator.

    pub fn add(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Add, other)
    }

    pub fn sub(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Sub, other)
    }

    pub fn mul(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Mul, other)
    }

    pub fn div(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Div, other)
    }

    // ==================== String Helpers ====================

    /// `string.IsNullOrEmpty(member)`; translates to `IS NULL`.
    pub fn is_null_or_empty(self) -> Self {
        self.call(StringMethod::IsNullOrEmpty, None, None)
    }

    pub fn equals(self, value: impl Into<Expr>) -> Self {
        self.call(StringMethod::Equals, Some(value.into()), None)
    }

    pub fn starts_with(self, value: impl Into<Expr>) -> Self {
        self.call(StringMethod::StartsWith, Some(value.into()), None)
    }

    /// `starts_with` with an explicit comparison mode. Only
    /// [`StringComparison::OrdinalIgnoreCase`] is translatable.
    pub fn starts_with_comparison(
        self,
        value: impl Into<Expr>,
        comparison: StringComparison,
    ) -> Self {
        self.call(StringMethod::StartsWith, Some(value.into()), Some(comparison))
    }

    pub fn ends_with(self, value: impl Into<Expr>) -> Self {
        self.call(StringMethod::EndsWith, Some(value.into()), None)
    }

    /// `ends_with` with an explicit comparison mode. Only
    /// [`StringComparison::OrdinalIgnoreCase`] is translatable.
    pub fn ends_with_comparison(self, value: impl Into<Expr>, comparison: StringComparison) -> Self {
        self.call(StringMethod::EndsWith, Some(value.into()), Some(comparison))
    }

    pub fn contains(self, value: impl Into<Expr>) -> Self {
        self.call(StringMethod::Contains, Some(value.into()), None)
    }

    // ==================== Nullable ====================

    /// `member.HasValue`; translates to `IS NOT NULL`.
    pub fn has_value(self) -> Self {
        Expr::HasValue(Box::new(self))
    }

    /// Structural text with constants masked as `?` (or `null`).
    ///
    /// Two predicates with the same shape produce the same SQL, so the shape
    /// is the predicate's cache key. Null and non-null constants differ
    /// because they translate differently.
    pub fn shape(&self) -> String {
        let mut out = String::new();
        self.render(&mut out, true);
        out
    }

    fn render(&self, out: &mut String, masked: bool) {
        match self {
            Expr::Column(name) => {
                out.push_str("t.");
                out.push_str(name);
            }
            Expr::Constant(value) => render_constant(out, value, masked),
            Expr::Binary { left, op, right } => {
                out.push('(');
                left.render(out, masked);
                out.push(' ');
                out.push_str(op.symbol());
                out.push(' ');
                right.render(out, masked);
                out.push(')');
            }
            Expr::Not(inner) => {
                out.push('!');
                inner.render(out, masked);
            }
            Expr::Call {
                method,
                target,
                argument,
                comparison,
            } => {
                if *method == StringMethod::IsNullOrEmpty {
                    out.push_str("string.IsNullOrEmpty(");
                    target.render(out, masked);
                    out.push(')');
                    return;
                }
                target.render(out, masked);
                out.push('.');
                out.push_str(method.name());
                out.push('(');
                if let Some(argument) = argument {
                    argument.render(out, masked);
                }
                if let Some(comparison) = comparison {
                    out.push_str(", ");
                    out.push_str(&format!("{:?}", comparison));
                }
                out.push(')');
            }
            Expr::HasValue(target) => {
                target.render(out, masked);
                out.push_str(".HasValue");
            }
        }
    }
}

fn render_constant(out: &mut String, value: &Value, masked: bool) {
    match value {
        Value::Null => out.push_str("null"),
        _ if masked => out.push('?'),
        Value::Text(s) => {
            out.push('"');
            out.push_str(s);
            out.push('"');
        }
        other => out.push_str(&other.to_string()),
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.render(&mut out, false);
        f.write_str(&out)
    }
}

macro_rules! constant_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Expr {
                fn from(value: $ty) -> Self {
                    Expr::Constant(Value::from(value))
                }
            }
        )*
    };
}

constant_from!(
    bool,
    u8,
    i16,
    i32,
    i64,
    f32,
    f64,
    char,
    &str,
    String,
);

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::Constant(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Expr {
    fn from(value: Option<T>) -> Self {
        Expr::Constant(value.map_or(Value::Null, Into::into))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_keeps_constants() {
        let p = col("Name").eq("Fabian").and(col("Age").ge(21));
        assert_eq!(p.to_string(), r#"((t.Name == "Fabian") && (t.Age >= 21))"#);
    }

    #[test]
    fn test_shape_masks_constants_but_not_null() {
        let a = col("Name").eq("Fabian");
        let b = col("Name").eq("Jurian");
        let c = col("Name").eq(null());
        assert_eq!(a.shape(), b.shape());
        assert_ne!(a.shape(), c.shape());
        assert_eq!(c.shape(), "(t.Name == null)");
    }

    #[test]
    fn test_shape_of_calls() {
        let p = col("Name")
            .starts_with_comparison("Fa", StringComparison::OrdinalIgnoreCase)
            .not();
        assert_eq!(p.shape(), "!t.Name.StartsWith(?, OrdinalIgnoreCase)");
        assert_eq!(
            col("Name").is_null_or_empty().shape(),
            "string.IsNullOrEmpty(t.Name)"
        );
        assert_eq!(col("Age").has_value().shape(), "t.Age.HasValue");
    }

    #[test]
    fn test_inverted_comparisons() {
        assert_eq!(BinaryOp::Eq.comparison_sql(true), Some("!="));
        assert_eq!(BinaryOp::Gt.comparison_sql(true), Some("<="));
        assert_eq!(BinaryOp::Lt.comparison_sql(true), Some(">="));
        assert_eq!(BinaryOp::Ge.comparison_sql(false), Some(">="));
        assert_eq!(BinaryOp::And.comparison_sql(false), None);
    }

    #[test]
    fn test_option_constant() {
        assert_eq!(Expr::from(None::<i32>), null());
        assert_eq!(Expr::from(Some(3)), val(3));
    }
}
