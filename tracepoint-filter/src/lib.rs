//! Filter expressions for the table service's OData query dialect.
//!
//! Expressions are built as a small tree and rendered in one place, so quoting happens in
//! exactly one function. The same tree can be evaluated in-process against a JSON entity,
//! which is what the in-memory table store does.

use std::cmp::Ordering;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

/// Sorts after every ASCII letter and digit; `field lt 'v~'` closes a prefix range.
pub const PREFIX_SENTINEL: char = '~';

#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Str(String),
    DateTime(DateTime<Utc>),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CompareOp {
    Eq,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    fn keyword(self) -> &'static str {
        match self {
            CompareOp::Eq => "eq",
            CompareOp::Gt => "gt",
            CompareOp::Ge => "ge",
            CompareOp::Lt => "lt",
            CompareOp::Le => "le",
        }
    }

    fn holds(self, ord: Ordering) -> bool {
        match self {
            CompareOp::Eq => ord == Ordering::Equal,
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::Ge => ord != Ordering::Less,
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::Le => ord != Ordering::Greater,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// Prefix match: `field ge 'prefix' and field lt 'prefix~'`.
    Range { field: String, prefix: String },
    Compare {
        field: String,
        op: CompareOp,
        value: Literal,
    },
    And(Vec<Expr>),
}

impl Expr {
    pub fn range(field: impl Into<String>, prefix: impl Into<String>) -> Self {
        Expr::Range {
            field: field.into(),
            prefix: prefix.into(),
        }
    }

    pub fn compare(field: impl Into<String>, op: CompareOp, value: Literal) -> Self {
        Expr::Compare {
            field: field.into(),
            op,
            value,
        }
    }

    pub fn eq_str(field: impl Into<String>, value: impl Into<String>) -> Self {
        Expr::compare(field, CompareOp::Eq, Literal::Str(value.into()))
    }

    /// Conjunction of `exprs`; an empty conjunction matches everything.
    pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Self {
        Expr::And(exprs.into_iter().collect())
    }

    /// True when the expression renders to nothing (matches every entity).
    pub fn is_empty(&self) -> bool {
        match self {
            Expr::And(children) => children.iter().all(Expr::is_empty),
            _ => false,
        }
    }

    /// Render to the table service's `$filter` syntax.
    pub fn render(&self) -> String {
        match self {
            Expr::Range { field, prefix } => {
                let upper = format!("{prefix}{PREFIX_SENTINEL}");
                format!(
                    "{field} ge {} and {field} lt {}",
                    quote(prefix),
                    quote(&upper)
                )
            }
            Expr::Compare { field, op, value } => {
                format!("{field} {} {}", op.keyword(), render_literal(value))
            }
            Expr::And(children) => children
                .iter()
                .filter(|c| !c.is_empty())
                .map(Expr::render)
                .collect::<Vec<_>>()
                .join(" and "),
        }
    }

    /// Evaluate against a raw entity. A missing or mistyped property never matches.
    pub fn matches(&self, entity: &Map<String, Value>) -> bool {
        match self {
            Expr::Range { field, prefix } => {
                let Some(actual) = entity.get(field).and_then(Value::as_str) else {
                    return false;
                };
                let upper = format!("{prefix}{PREFIX_SENTINEL}");
                actual >= prefix.as_str() && actual < upper.as_str()
            }
            Expr::Compare { field, op, value } => {
                let Some(actual) = entity.get(field).and_then(Value::as_str) else {
                    return false;
                };
                match value {
                    Literal::Str(expected) => op.holds(actual.cmp(expected.as_str())),
                    Literal::DateTime(expected) => match DateTime::parse_from_rfc3339(actual) {
                        Ok(actual) => op.holds(actual.with_timezone(&Utc).cmp(expected)),
                        Err(_) => false,
                    },
                }
            }
            Expr::And(children) => children.iter().all(|c| c.matches(entity)),
        }
    }
}

/// Single-quote a string value, doubling embedded quotes.
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn render_literal(value: &Literal) -> String {
    match value {
        Literal::Str(s) => quote(s),
        Literal::DateTime(dt) => {
            format!("datetime'{}'", dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        }
    }
}
