// SPDX-License-Identifier: MIT

//! Parsed form of a condition expression

use serde_json::Value;

use crate::flow::path::{self, Segment};

/// A place inside the incoming value.
///
/// `value.order.total`, `input.order.total` and `order.total` all address
/// the same place; the optional `value`/`input` root is dropped at parse time.
#[derive(Debug, Clone, PartialEq)]
pub struct Operand {
    pub segments: Vec<Segment>,
}

impl Operand {
    /// The incoming value itself
    pub fn root() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    pub fn resolve<'a>(&self, input: &'a Value) -> Option<&'a Value> {
        path::walk(input, &self.segments)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Substring, array element or object key
    Contains,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// `true` / `false`
    Constant(bool),
    Compare {
        left: Operand,
        op: CompareOp,
        /// Literal right-hand side (string, number, boolean or null)
        right: Value,
    },
    /// Bare operand, true when the resolved value is truthy
    Truthy(Operand),
    Not(Box<Expression>),
    /// Every clause holds
    All(Vec<Expression>),
    /// At least one clause holds
    Any(Vec<Expression>),
}
