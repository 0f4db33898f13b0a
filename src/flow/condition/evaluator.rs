// SPDX-License-Identifier: MIT

//! Condition evaluation
//!
//! Expressions see exactly one variable: the node's incoming value. A path
//! that leads nowhere reads as null.

use serde_json::Value;

use super::ast::{CompareOp, Expression};

/// Evaluate a parsed expression against the incoming value
pub fn evaluate(expr: &Expression, input: &Value) -> bool {
    match expr {
        Expression::Constant(b) => *b,
        Expression::Truthy(operand) => operand.resolve(input).is_some_and(is_truthy),
        Expression::Compare { left, op, right } => {
            let left = operand_value(left.resolve(input));
            compare(left, *op, right)
        }
        Expression::Not(inner) => !evaluate(inner, input),
        Expression::All(clauses) => clauses.iter().all(|c| evaluate(c, input)),
        Expression::Any(clauses) => clauses.iter().any(|c| evaluate(c, input)),
    }
}

/// JavaScript-style truthiness
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

static NULL: Value = Value::Null;

fn operand_value(resolved: Option<&Value>) -> &Value {
    resolved.unwrap_or(&NULL)
}

fn compare(left: &Value, op: CompareOp, right: &Value) -> bool {
    match op {
        CompareOp::Eq => loosely_equal(left, right),
        CompareOp::NotEq => !loosely_equal(left, right),
        CompareOp::Gt => numeric(left, right).is_some_and(|(l, r)| l > r),
        CompareOp::Gte => numeric(left, right).is_some_and(|(l, r)| l >= r),
        CompareOp::Lt => numeric(left, right).is_some_and(|(l, r)| l < r),
        CompareOp::Lte => numeric(left, right).is_some_and(|(l, r)| l <= r),
        CompareOp::Contains => contains(left, right),
    }
}

/// Numeric view of a value; numeric strings count
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn numeric(left: &Value, right: &Value) -> Option<(f64, f64)> {
    Some((as_number(left)?, right.as_f64()?))
}

/// Equality with numbers compared by value (`1 == 1.0`)
fn loosely_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => l.as_f64() == r.as_f64(),
        _ => left == right,
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match (haystack, needle) {
        (Value::String(s), Value::String(sub)) => s.contains(sub.as_str()),
        (Value::Array(items), needle) => items.iter().any(|item| loosely_equal(item, needle)),
        (Value::Object(map), Value::String(key)) => map.contains_key(key),
        _ => false,
    }
}
