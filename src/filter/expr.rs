//! Expression-based filtering over resolved rows
//!
//! This module provides the boolean expression tree used by population
//! filters, derived flags and category predicates, and evaluates it against
//! anything implementing [`VariableLookup`].

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use itertools::Itertools;

use crate::models::{Value, VariableLookup};

/// Comparison operator in a leaf expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    /// `=`
    Eq,
    /// `!=`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
}

impl CmpOp {
    const fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering.is_eq(),
            Self::NotEq => ordering.is_ne(),
            Self::Lt => ordering.is_lt(),
            Self::LtEq => ordering.is_le(),
            Self::Gt => ordering.is_gt(),
            Self::GtEq => ordering.is_ge(),
        }
    }

    const fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
        }
    }
}

/// One side of a comparison
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Reference to a variable
    Var(String),
    /// Literal value
    Literal(Value),
}

impl Operand {
    fn resolve<'a, L: VariableLookup + ?Sized>(&'a self, row: &'a L) -> Option<&'a Value> {
        match self {
            Self::Var(name) => row.lookup(name),
            Self::Literal(value) => Some(value),
        }
    }
}

/// Represents a boolean expression over named variables
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A variable used as a flag
    Var(String),

    /// Binary comparison
    Compare {
        /// Left operand
        left: Operand,
        /// Operator
        op: CmpOp,
        /// Right operand
        right: Operand,
    },

    /// Operand is one of a set of literal values
    In(Operand, Vec<Value>),

    /// Logical AND of expressions
    And(Vec<Expr>),

    /// Logical OR of expressions
    Or(Vec<Expr>),

    /// Logical NOT of an expression
    Not(Box<Expr>),

    /// Always evaluates to true
    AlwaysTrue,
}

impl Expr {
    /// Evaluate the expression against a row
    ///
    /// A missing value makes the comparison or flag it appears in false.
    pub fn evaluate<L: VariableLookup + ?Sized>(&self, row: &L) -> bool {
        match self {
            Self::AlwaysTrue => true,
            Self::Var(name) => row.lookup(name).is_some_and(Value::is_truthy),
            Self::Compare { left, op, right } => {
                match (left.resolve(row), right.resolve(row)) {
                    (Some(l), Some(r)) => l.compare(r).is_some_and(|ord| op.accepts(ord)),
                    _ => false,
                }
            }
            Self::In(operand, values) => operand.resolve(row).is_some_and(|value| {
                values
                    .iter()
                    .any(|candidate| value.compare(candidate).is_some_and(Ordering::is_eq))
            }),
            Self::And(exprs) => exprs.iter().all(|e| e.evaluate(row)),
            Self::Or(exprs) => exprs.iter().any(|e| e.evaluate(row)),
            Self::Not(expr) => !expr.evaluate(row),
        }
    }

    /// Returns the set of variable names this expression reads
    #[must_use]
    pub fn required_variables(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.collect_required_variables(&mut names);
        names
    }

    fn collect_required_variables(&self, names: &mut BTreeSet<String>) {
        match self {
            Self::Var(name) => {
                names.insert(name.clone());
            }
            Self::Compare { left, right, .. } => {
                for operand in [left, right] {
                    if let Operand::Var(name) = operand {
                        names.insert(name.clone());
                    }
                }
            }
            Self::In(operand, _) => {
                if let Operand::Var(name) = operand {
                    names.insert(name.clone());
                }
            }
            Self::And(exprs) | Self::Or(exprs) => {
                for expr in exprs {
                    expr.collect_required_variables(names);
                }
            }
            Self::Not(expr) => expr.collect_required_variables(names),
            Self::AlwaysTrue => {}
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Var(name) => f.write_str(name),
            Self::Literal(value) => fmt_literal(value, f),
        }
    }
}

fn fmt_literal(value: &Value, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match value {
        Value::Str(s) => write!(f, "\"{s}\""),
        Value::Date(d) => write!(f, "\"{}\"", d.format("%Y-%m-%d")),
        Value::Bool(b) => write!(f, "{b}"),
        other => write!(f, "{other}"),
    }
}

/// Fully parenthesised rendering, used in logs to show how an expression was grouped
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlwaysTrue => f.write_str("TRUE"),
            Self::Var(name) => f.write_str(name),
            Self::Compare { left, op, right } => write!(f, "{left} {} {right}", op.symbol()),
            Self::In(operand, values) => {
                write!(f, "{operand} IN (")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    fmt_literal(value, f)?;
                }
                f.write_str(")")
            }
            Self::And(exprs) => write!(f, "({})", exprs.iter().join(" AND ")),
            Self::Or(exprs) => write!(f, "({})", exprs.iter().join(" OR ")),
            Self::Not(expr) => write!(f, "NOT {expr}"),
        }
    }
}

/// Helper to build an equality comparison between a variable and a literal
#[must_use]
pub fn eq_filter(variable: &str, value: impl Into<Value>) -> Expr {
    Expr::Compare {
        left: Operand::Var(variable.to_string()),
        op: CmpOp::Eq,
        right: Operand::Literal(value.into()),
    }
}

/// Helper to build an inclusive numeric range test `low <= variable <= high`
#[must_use]
pub fn range_filter(variable: &str, low: i64, high: i64) -> Expr {
    Expr::And(vec![
        Expr::Compare {
            left: Operand::Var(variable.to_string()),
            op: CmpOp::GtEq,
            right: Operand::Literal(Value::Int(low)),
        },
        Expr::Compare {
            left: Operand::Var(variable.to_string()),
            op: CmpOp::LtEq,
            right: Operand::Literal(Value::Int(high)),
        },
    ])
}
