//! Queryable operator chains.
//!
//! A [`Queryable`] records the operators applied to a table query, in call
//! order. Nothing is evaluated until the chain is handed to the
//! [`QueryBuilder`](crate::builder::QueryBuilder).

use crate::expr::Expr;
use std::fmt;
use std::marker::PhantomData;

/// One operator applied to a queryable.
#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    Where(Expr),
    Distinct,
    OrderBy(String),
    OrderByDescending(String),
    ThenBy(String),
    Skip(usize),
    Take(usize),
    GroupBy(String),
    Join(String),
    Select(Vec<String>),
    Count,
    Any,
    Reverse,
}

impl Operator {
    /// Operator name used for evaluator dispatch.
    pub const fn name(&self) -> &'static str {
        match self {
            Operator::Where(_) => "Where",
            Operator::Distinct => "Distinct",
            Operator::OrderBy(_) => "OrderBy",
            Operator::OrderByDescending(_) => "OrderByDescending",
            Operator::ThenBy(_) => "ThenBy",
            Operator::Skip(_) => "Skip",
            Operator::Take(_) => "Take",
            Operator::GroupBy(_) => "GroupBy",
            Operator::Join(_) => "Join",
            Operator::Select(_) => "Select",
            Operator::Count => "Count",
            Operator::Any => "Any",
            Operator::Reverse => "Reverse",
        }
    }

    /// Cache-key text of this operator; `Where` contributes its predicate shape.
    pub fn shape(&self) -> String {
        match self {
            Operator::Where(expr) => format!("Where({})", expr.shape()),
            other => format!("{}()", other.name()),
        }
    }
}

/// A typed chain of query operators over the table of `T`.
pub struct Queryable<T> {
    operators: Vec<Operator>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Queryable<T> {
    pub fn new() -> Self {
        Self {
            operators: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Append an operator.
    pub fn push(mut self, operator: Operator) -> Self {
        self.operators.push(operator);
        self
    }

    /// Filter rows by a predicate.
    pub fn filter(self, predicate: Expr) -> Self {
        self.push(Operator::Where(predicate))
    }

    pub fn distinct(self) -> Self {
        self.push(Operator::Distinct)
    }

    pub fn order_by(self, member: impl Into<String>) -> Self {
        self.push(Operator::OrderBy(member.into()))
    }

    pub fn order_by_descending(self, member: impl Into<String>) -> Self {
        self.push(Operator::OrderByDescending(member.into()))
    }

    pub fn then_by(self, member: impl Into<String>) -> Self {
        self.push(Operator::ThenBy(member.into()))
    }

    pub fn skip(self, count: usize) -> Self {
        self.push(Operator::Skip(count))
    }

    pub fn take(self, count: usize) -> Self {
        self.push(Operator::Take(count))
    }

    pub fn group_by(self, member: impl Into<String>) -> Self {
        self.push(Operator::GroupBy(member.into()))
    }

    pub fn join(self, table: impl Into<String>) -> Self {
        self.push(Operator::Join(table.into()))
    }

    pub fn select_fields(self, members: Vec<String>) -> Self {
        self.push(Operator::Select(members))
    }

    pub fn count(self) -> Self {
        self.push(Operator::Count)
    }

    pub fn any(self) -> Self {
        self.push(Operator::Any)
    }

    pub fn reverse(self) -> Self {
        self.push(Operator::Reverse)
    }

    /// Operators from outermost (last applied) to innermost.
    pub fn outermost_first(&self) -> impl Iterator<Item = &Operator> {
        self.operators.iter().rev()
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    /// Cache-key text of the whole chain.
    pub fn shape(&self) -> String {
        self.outermost_first()
            .map(Operator::shape)
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl<T> Default for Queryable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Queryable<T> {
    fn clone(&self) -> Self {
        Self {
            operators: self.operators.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Queryable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queryable")
            .field("target", &std::any::type_name::<T>())
            .field("operators", &self.operators)
            .finish()
    }
}
