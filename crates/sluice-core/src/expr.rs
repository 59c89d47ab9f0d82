//! Filter expression tree handed to connectors for pushdown.
//!
//! The tree is a closed tagged union. Anything the pushdown layer has no
//! use for collapses into [`FilterExpr::Other`], which extraction skips.
//! DataFusion filters are lowered into this shape by [`FilterExpr::from_df`].

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use datafusion::common::ScalarValue;
use datafusion::logical_expr::expr::{Alias, Between, BinaryExpr, Like, ScalarFunction};
use datafusion::logical_expr::Operator;
use datafusion::prelude::Expr;

/// Names DataFusion uses for the list membership function.
const ARRAY_HAS_NAMES: [&str; 4] = ["array_has", "list_has", "array_contains", "list_contains"];

#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    And(Box<FilterExpr>, Box<FilterExpr>),
    Or(Box<FilterExpr>, Box<FilterExpr>),
    Not(Box<FilterExpr>),
    Compare(Comparison),
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub field: String,
    pub op: CompareOp,
    pub value: FilterLiteral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    /// Substring match for text, membership for lists.
    Contains,
    /// `field IS NULL`; the value is always [`FilterLiteral::Null`].
    IsNull,
}

impl CompareOp {
    /// The operator that keeps the meaning when the operands swap sides.
    pub fn mirrored(self) -> Self {
        match self {
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::LtEq => CompareOp::GtEq,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::GtEq => CompareOp::LtEq,
            other => other,
        }
    }

    fn from_operator(op: &Operator) -> Option<Self> {
        match op {
            Operator::Eq => Some(CompareOp::Eq),
            Operator::NotEq => Some(CompareOp::NotEq),
            Operator::Lt => Some(CompareOp::Lt),
            Operator::LtEq => Some(CompareOp::LtEq),
            Operator::Gt => Some(CompareOp::Gt),
            Operator::GtEq => Some(CompareOp::GtEq),
            _ => None,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "!=",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
            CompareOp::Contains => "contains",
            CompareOp::IsNull => "is null",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterLiteral {
    Text(String),
    Int(i64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    Null,
}

impl FilterLiteral {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FilterLiteral::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            FilterLiteral::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    /// Convert a DataFusion literal. Nulls and unsupported types yield `None`.
    pub fn from_scalar(value: &ScalarValue) -> Option<Self> {
        match value {
            ScalarValue::Utf8(Some(s))
            | ScalarValue::LargeUtf8(Some(s))
            | ScalarValue::Utf8View(Some(s)) => Some(FilterLiteral::Text(s.clone())),
            ScalarValue::Boolean(Some(b)) => Some(FilterLiteral::Bool(*b)),
            ScalarValue::Int8(Some(v)) => Some(FilterLiteral::Int(i64::from(*v))),
            ScalarValue::Int16(Some(v)) => Some(FilterLiteral::Int(i64::from(*v))),
            ScalarValue::Int32(Some(v)) => Some(FilterLiteral::Int(i64::from(*v))),
            ScalarValue::Int64(Some(v)) => Some(FilterLiteral::Int(*v)),
            ScalarValue::UInt8(Some(v)) => Some(FilterLiteral::Int(i64::from(*v))),
            ScalarValue::UInt16(Some(v)) => Some(FilterLiteral::Int(i64::from(*v))),
            ScalarValue::UInt32(Some(v)) => Some(FilterLiteral::Int(i64::from(*v))),
            ScalarValue::UInt64(Some(v)) => i64::try_from(*v).ok().map(FilterLiteral::Int),
            ScalarValue::TimestampSecond(Some(v), _) => timestamp(Utc.timestamp_opt(*v, 0).single()),
            ScalarValue::TimestampMillisecond(Some(v), _) => {
                timestamp(Utc.timestamp_millis_opt(*v).single())
            }
            ScalarValue::TimestampMicrosecond(Some(v), _) => timestamp(DateTime::from_timestamp_micros(*v)),
            ScalarValue::TimestampNanosecond(Some(v), _) => {
                Some(FilterLiteral::Timestamp(DateTime::from_timestamp_nanos(*v)))
            }
            ScalarValue::Date32(Some(days)) => {
                timestamp(Utc.timestamp_opt(i64::from(*days) * 86_400, 0).single())
            }
            ScalarValue::Date64(Some(ms)) => timestamp(Utc.timestamp_millis_opt(*ms).single()),
            _ => None,
        }
    }
}

fn timestamp(ts: Option<DateTime<Utc>>) -> Option<FilterLiteral> {
    ts.map(FilterLiteral::Timestamp)
}

impl fmt::Display for FilterLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterLiteral::Text(s) => write!(f, "'{}'", s),
            FilterLiteral::Int(v) => write!(f, "{}", v),
            FilterLiteral::Bool(v) => write!(f, "{}", v),
            FilterLiteral::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
            FilterLiteral::Null => write!(f, "NULL"),
        }
    }
}

impl FilterExpr {
    pub fn compare(field: impl Into<String>, op: CompareOp, value: FilterLiteral) -> Self {
        FilterExpr::Compare(Comparison {
            field: field.into(),
            op,
            value,
        })
    }

    pub fn and(self, other: FilterExpr) -> Self {
        FilterExpr::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: FilterExpr) -> Self {
        FilterExpr::Or(Box::new(self), Box::new(other))
    }

    pub fn negate(self) -> Self {
        FilterExpr::Not(Box::new(self))
    }

    /// Fold a list of filters into one conjunction. An empty list becomes `Other`.
    pub fn conjunction(filters: impl IntoIterator<Item = FilterExpr>) -> Self {
        filters
            .into_iter()
            .reduce(FilterExpr::and)
            .unwrap_or(FilterExpr::Other)
    }

    /// Lower a DataFusion filter into the pushdown tree.
    pub fn from_df(expr: &Expr) -> Self {
        match expr {
            Expr::Alias(Alias { expr, .. }) => FilterExpr::from_df(expr),
            Expr::BinaryExpr(BinaryExpr { left, op, right }) => match op {
                Operator::And => FilterExpr::from_df(left).and(FilterExpr::from_df(right)),
                Operator::Or => FilterExpr::from_df(left).or(FilterExpr::from_df(right)),
                _ => lower_comparison(left, op, right),
            },
            Expr::Not(inner) => FilterExpr::from_df(inner).negate(),
            Expr::Between(Between {
                expr,
                negated: false,
                low,
                high,
            }) => {
                let low = lower_comparison(expr, &Operator::GtEq, low);
                let high = lower_comparison(expr, &Operator::LtEq, high);
                low.and(high)
            }
            Expr::Like(like) => lower_like(like),
            Expr::IsNull(inner) => match column_name(inner) {
                Some(field) => FilterExpr::compare(field, CompareOp::IsNull, FilterLiteral::Null),
                None => FilterExpr::Other,
            },
            Expr::ScalarFunction(ScalarFunction { func, args })
                if ARRAY_HAS_NAMES.contains(&func.name()) && args.len() == 2 =>
            {
                match (column_name(&args[0]), literal(&args[1])) {
                    (Some(field), Some(value)) => {
                        FilterExpr::compare(field, CompareOp::Contains, value)
                    }
                    _ => FilterExpr::Other,
                }
            }
            _ => FilterExpr::Other,
        }
    }

    /// Lower the filters DataFusion hands to a scan; they are implicitly ANDed.
    pub fn from_df_filters(filters: &[Expr]) -> Self {
        FilterExpr::conjunction(filters.iter().map(FilterExpr::from_df))
    }
}

fn lower_comparison(left: &Expr, op: &Operator, right: &Expr) -> FilterExpr {
    let Some(op) = CompareOp::from_operator(op) else {
        return FilterExpr::Other;
    };
    if let (Some(field), Some(value)) = (column_name(left), literal(right)) {
        return FilterExpr::compare(field, op, value);
    }
    if let (Some(value), Some(field)) = (literal(left), column_name(right)) {
        return FilterExpr::compare(field, op.mirrored(), value);
    }
    FilterExpr::Other
}

/// `col LIKE '%text%'` becomes a contains test and a wildcard-free pattern an
/// equality. Any other pattern shape is left to the host, including any
/// pattern with a `\` in it: that is DataFusion's default escape character.
fn lower_like(like: &Like) -> FilterExpr {
    if like.negated || like.case_insensitive || like.escape_char.is_some() {
        return FilterExpr::Other;
    }
    let (Some(field), Some(FilterLiteral::Text(pattern))) =
        (column_name(&like.expr), literal(&like.pattern))
    else {
        return FilterExpr::Other;
    };
    if pattern.contains('\\') {
        return FilterExpr::Other;
    }

    let has_wildcard = |s: &str| s.contains('%') || s.contains('_');
    if !has_wildcard(&pattern) {
        return FilterExpr::compare(field, CompareOp::Eq, FilterLiteral::Text(pattern));
    }
    match pattern
        .strip_prefix('%')
        .and_then(|p| p.strip_suffix('%'))
    {
        Some(inner) if !inner.is_empty() && !has_wildcard(inner) => {
            FilterExpr::compare(field, CompareOp::Contains, FilterLiteral::Text(inner.to_string()))
        }
        _ => FilterExpr::Other,
    }
}

fn column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Column(col) => Some(col.name.clone()),
        Expr::Alias(Alias { expr, .. }) => column_name(expr),
        _ => None,
    }
}

fn literal(expr: &Expr) -> Option<FilterLiteral> {
    match expr {
        Expr::Literal(value) => FilterLiteral::from_scalar(value),
        Expr::Alias(Alias { expr, .. }) => literal(expr),
        _ => None,
    }
}
