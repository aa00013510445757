//! Operator evaluators.
//!
//! The builder dispatches each operator of a chain by name to an
//! [`Evaluate`] implementation from the [`EvaluatorRegistry`]. Only `Where`
//! and `Distinct` translate to SQL; every other operator is registered as
//! not implemented and fails fast.

use crate::expr::{BinaryOp, Expr, StringComparison, StringMethod};
use crate::queryable::Operator;
use crate::state::QueryState;
use sqlmapper_core::{Error, Result, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Translates one operator into query state.
pub trait Evaluate: Send + Sync {
    #[allow(clippy::result_large_err)]
    fn evaluate(&self, operator: &Operator, state: &mut QueryState) -> Result<()>;
}

/// Error for an operator without a translation.
pub fn unsupported_method(name: &str) -> Error {
    Error::unsupported(
        format!("{}()", name),
        format!("sqlmapper does not support the {}() method", name),
    )
}

fn unsupported_expr(expr: &Expr) -> Error {
    Error::unsupported(
        expr.shape(),
        format!("sqlmapper does not support the expression {}", expr),
    )
}

/// Name-to-evaluator dispatch table.
pub struct EvaluatorRegistry {
    evaluators: HashMap<&'static str, Arc<dyn Evaluate>>,
}

/// Operator names that are recognised but never translated.
const NOT_IMPLEMENTED: &[&str] = &[
    "Aggregate",
    "All",
    "Any",
    "Average",
    "Cast",
    "Concat",
    "Contains",
    "Count",
    "DefaultIfEmpty",
    "ElementAt",
    "Except",
    "GroupBy",
    "GroupJoin",
    "Intersect",
    "Join",
    "Last",
    "LongCount",
    "Max",
    "Min",
    "OfType",
    "OrderBy",
    "OrderByDescending",
    "Reverse",
    "Select",
    "SelectMany",
    "Skip",
    "SkipWhile",
    "Sum",
    "Take",
    "TakeWhile",
    "ThenBy",
    "Union",
    "Zip",
];

impl EvaluatorRegistry {
    /// An empty registry: every operator is unsupported.
    pub fn empty() -> Self {
        Self {
            evaluators: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: &'static str, evaluator: Arc<dyn Evaluate>) {
        self.evaluators.insert(name, evaluator);
    }

    /// Look up the evaluator for an operator name.
    #[allow(clippy::result_large_err)]
    pub fn process(&self, name: &str) -> Result<&dyn Evaluate> {
        self.evaluators
            .get(name)
            .map(|e| e.as_ref())
            .ok_or_else(|| unsupported_method(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.evaluators.contains_key(name)
    }
}

impl Default for EvaluatorRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        let not_implemented: Arc<dyn Evaluate> = Arc::new(EvaluateNotImplemented);
        for name in NOT_IMPLEMENTED {
            registry.register(name, Arc::clone(&not_implemented));
        }
        registry.register("Where", Arc::new(EvaluateWhere));
        registry.register("Distinct", Arc::new(EvaluateDistinct));
        registry
    }
}

impl std::fmt::Debug for EvaluatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.evaluators.keys().collect();
        names.sort();
        f.debug_struct("EvaluatorRegistry")
            .field("operators", &names)
            .finish()
    }
}

/// Rejects its operator.
#[derive(Debug)]
pub struct EvaluateNotImplemented;

impl Evaluate for EvaluateNotImplemented {
    fn evaluate(&self, operator: &Operator, _state: &mut QueryState) -> Result<()> {
        Err(unsupported_method(operator.name()))
    }
}

#[derive(Debug)]
pub struct EvaluateDistinct;

impl Evaluate for EvaluateDistinct {
    fn evaluate(&self, _operator: &Operator, state: &mut QueryState) -> Result<()> {
        state.set_distinct();
        Ok(())
    }
}

/// Translates a `where` predicate into a parenthesized SQL condition.
#[derive(Debug)]
pub struct EvaluateWhere;

impl Evaluate for EvaluateWhere {
    fn evaluate(&self, operator: &Operator, state: &mut QueryState) -> Result<()> {
        let Operator::Where(predicate) = operator else {
            return Err(unsupported_method(operator.name()));
        };
        state.begin_where();
        let result = evaluate_expr(predicate, state, false);
        state.end_where();
        result
    }
}

#[allow(clippy::result_large_err)]
fn evaluate_expr(expr: &Expr, state: &mut QueryState, negated: bool) -> Result<()> {
    match expr {
        Expr::Binary { left, op, right } if op.is_logical() => {
            if negated {
                state.push("( NOT ");
            }
            state.push("( ");
            evaluate_expr(left, state, false)?;
            state.push(if *op == BinaryOp::And { " AND " } else { " OR " });
            evaluate_expr(right, state, false)?;
            state.push(" )");
            if negated {
                state.push(" )");
            }
            Ok(())
        }
        Expr::Binary { left, op, right } => comparison(expr, left, *op, right, state, negated),
        Expr::Not(inner) => evaluate_expr(inner, state, !negated),
        Expr::Call {
            method,
            target,
            argument,
            comparison,
        } => method_call(
            expr,
            *method,
            target,
            argument.as_deref(),
            *comparison,
            state,
            negated,
        ),
        Expr::HasValue(target) => {
            let field = column_name(target)?;
            let not = if negated { "" } else { "NOT " };
            state.push(&format!(" ( t.[{}] IS {}NULL ) ", field, not));
            Ok(())
        }
        Expr::Column(_) | Expr::Constant(_) => Err(unsupported_expr(expr)),
    }
}

fn column_name(expr: &Expr) -> Result<&str> {
    match expr {
        Expr::Column(name) => Ok(name),
        other => Err(unsupported_expr(other)),
    }
}

#[allow(clippy::result_large_err)]
fn comparison(
    whole: &Expr,
    left: &Expr,
    op: BinaryOp,
    right: &Expr,
    state: &mut QueryState,
    negated: bool,
) -> Result<()> {
    match (left, right) {
        (Expr::Column(field), Expr::Constant(value)) => {
            field_constant(whole, field, op, value, false, state, negated)
        }
        (Expr::Constant(value), Expr::Column(field)) => {
            field_constant(whole, field, op, value, true, state, negated)
        }
        (Expr::Column(a), Expr::Column(b)) => {
            let sql = op
                .comparison_sql(negated)
                .ok_or_else(|| unsupported_expr(whole))?;
            state.push(&format!(" ( t.[{}] {} t.[{}] ) ", a, sql, b));
            Ok(())
        }
        _ => Err(unsupported_expr(whole)),
    }
}

#[allow(clippy::result_large_err)]
fn field_constant(
    whole: &Expr,
    field: &str,
    op: BinaryOp,
    value: &Value,
    reversed: bool,
    state: &mut QueryState,
    negated: bool,
) -> Result<()> {
    if value.is_null() {
        let equal = match op {
            BinaryOp::Eq => true,
            BinaryOp::Ne => false,
            _ => return Err(unsupported_expr(whole)),
        };
        let is = if equal != negated { "IS" } else { "IS NOT" };
        state.push(&format!(" ( t.[{}] {} NULL ) ", field, is));
        return Ok(());
    }

    let sql = op
        .comparison_sql(negated)
        .ok_or_else(|| unsupported_expr(whole))?;
    let parameter = state.bind(value.clone());
    if reversed {
        state.push(&format!(" ( @{} {} t.[{}] ) ", parameter, sql, field));
    } else {
        state.push(&format!(" ( t.[{}] {} @{} ) ", field, sql, parameter));
    }
    Ok(())
}

/// A non-null text constant argument.
fn text_argument<'e>(whole: &Expr, argument: Option<&'e Expr>) -> Result<&'e str> {
    match argument {
        Some(Expr::Constant(Value::Text(s))) => Ok(s),
        _ => Err(unsupported_expr(whole)),
    }
}

#[allow(clippy::result_large_err)]
fn method_call(
    whole: &Expr,
    method: StringMethod,
    target: &Expr,
    argument: Option<&Expr>,
    comparison: Option<StringComparison>,
    state: &mut QueryState,
    negated: bool,
) -> Result<()> {
    let field = column_name(target)?;
    let not = if negated { "NOT " } else { "" };

    match method {
        StringMethod::IsNullOrEmpty => {
            state.push(&format!(" ( t.[{}] IS {}NULL ) ", field, not));
        }
        StringMethod::Equals => {
            let value = text_argument(whole, argument)?;
            let parameter = state.bind(Value::from(value));
            let op = if negated { "!=" } else { "=" };
            state.push(&format!(" ( t.[{}] {} @{} )", field, op, parameter));
        }
        StringMethod::StartsWith | StringMethod::EndsWith | StringMethod::Contains => {
            if let Some(mode) = comparison {
                if mode != StringComparison::OrdinalIgnoreCase {
                    return Err(Error::unsupported(
                        method.name(),
                        format!(
                            "{} can only be used with StringComparison.OrdinalIgnoreCase",
                            method.name()
                        ),
                    ));
                }
            }
            let value = text_argument(whole, argument)?;
            let pattern = match method {
                StringMethod::StartsWith => format!("{}%", value),
                StringMethod::EndsWith => format!("%{}", value),
                _ => format!("%{}%", value),
            };
            let parameter = state.bind(Value::Text(pattern));
            state.push(&format!(" ( t.[{}] {}LIKE @{} )", field, not, parameter));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{col, null, val};

    fn translate(predicate: Expr) -> Result<(String, QueryState)> {
        let mut state = QueryState::default();
        EvaluateWhere.evaluate(&Operator::Where(predicate), &mut state)?;
        Ok((state.where_clause().unwrap_or_default(), state))
    }

    #[test]
    fn test_field_constant_and_reverse() {
        let (sql, state) = translate(col("Name").eq("Fabian")).unwrap();
        assert_eq!(sql, " ( t.[Name] = @p0 ) ");
        assert_eq!(state.parameters().get("p0"), Some(&Value::from("Fabian")));

        let (sql, _) = translate(val(5).gt(col("Age"))).unwrap();
        assert_eq!(sql, " ( @p0 > t.[Age] ) ");
    }

    #[test]
    fn test_or_group() {
        let (sql, state) =
            translate(col("Name").eq("Fabian").or(col("Name").eq("Jurian"))).unwrap();
        assert_eq!(sql, "(  ( t.[Name] = @p0 )  OR  ( t.[Name] = @p1 )  )");
        assert_eq!(state.parameters().len(), 2);
    }

    #[test]
    fn test_negation_pushdown() {
        let (sql, _) = translate(col("Age").gt(3).not()).unwrap();
        assert_eq!(sql, " ( t.[Age] <= @p0 ) ");

        let (sql, _) = translate(col("A").eq(1).and(col("B").eq(2)).not()).unwrap();
        assert_eq!(sql, "( NOT (  ( t.[A] = @p0 )  AND  ( t.[B] = @p1 )  ) )");
    }

    #[test]
    fn test_null_constants() {
        let (sql, state) = translate(col("Email").eq(null())).unwrap();
        assert_eq!(sql, " ( t.[Email] IS NULL ) ");
        assert!(!state.has_parameters());

        let (sql, _) = translate(col("Email").ne(null())).unwrap();
        assert_eq!(sql, " ( t.[Email] IS NOT NULL ) ");

        let (sql, _) = translate(col("Email").eq(null()).not()).unwrap();
        assert_eq!(sql, " ( t.[Email] IS NOT NULL ) ");

        assert!(translate(col("Age").gt(null())).is_err());
    }

    #[test]
    fn test_field_to_field() {
        let (sql, state) = translate(col("A").le(col("B"))).unwrap();
        assert_eq!(sql, " ( t.[A] <= t.[B] ) ");
        assert!(!state.has_parameters());
    }

    #[test]
    fn test_string_helpers() {
        let (sql, state) = translate(col("Name").starts_with("Fa")).unwrap();
        assert_eq!(sql, " ( t.[Name] LIKE @p0 )");
        assert_eq!(state.parameters().get("p0"), Some(&Value::from("Fa%")));

        let (sql, state) = translate(col("Name").ends_with("an").not()).unwrap();
        assert_eq!(sql, " ( t.[Name] NOT LIKE @p0 )");
        assert_eq!(state.parameters().get("p0"), Some(&Value::from("%an")));

        let (_, state) = translate(col("Name").contains("bi")).unwrap();
        assert_eq!(state.parameters().get("p0"), Some(&Value::from("%bi%")));

        let (sql, _) = translate(col("Name").equals("Fabian")).unwrap();
        assert_eq!(sql, " ( t.[Name] = @p0 )");

        let (sql, _) = translate(col("Name").is_null_or_empty().not()).unwrap();
        assert_eq!(sql, " ( t.[Name] IS NOT NULL ) ");
    }

    #[test]
    fn test_comparison_mode_restriction() {
        assert!(
            translate(col("Name").starts_with_comparison("F", StringComparison::OrdinalIgnoreCase))
                .is_ok()
        );
        let err = translate(col("Name").ends_with_comparison("n", StringComparison::Ordinal))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "EndsWith can only be used with StringComparison.OrdinalIgnoreCase"
        );
    }

    #[test]
    fn test_has_value() {
        let (sql, _) = translate(col("Age").has_value()).unwrap();
        assert_eq!(sql, " ( t.[Age] IS NOT NULL ) ");
        let (sql, _) = translate(col("Age").has_value().not()).unwrap();
        assert_eq!(sql, " ( t.[Age] IS NULL ) ");
    }

    #[test]
    fn test_unsupported_shapes() {
        assert!(translate(col("Active")).is_err());
        assert!(translate(val(1).eq(val(1))).is_err());
        assert!(translate(col("Age").add(1).eq(5)).is_err());
        assert!(translate(col("Name").starts_with(col("Other"))).is_err());
    }

    #[test]
    fn test_registry_rejects_operators() {
        let registry = EvaluatorRegistry::default();
        let err = registry
            .process("OrderBy")
            .and_then(|e| e.evaluate(&Operator::OrderBy("Name".into()), &mut QueryState::default()))
            .unwrap_err();
        assert_eq!(err.to_string(), "sqlmapper does not support the OrderBy() method");

        let err = registry.process("Frobnicate").err().map(|e| e.to_string());
        assert_eq!(
            err.as_deref(),
            Some("sqlmapper does not support the Frobnicate() method")
        );
        assert!(registry.contains("Where"));
    }
}
