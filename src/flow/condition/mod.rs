// SPDX-License-Identifier: MIT

//! Condition evaluation for condition nodes
//!
//! A condition node asks a `Predicate` whether its incoming value passes.
//! The default predicate compiles a small expression language:
//! - `value > 10`
//! - `value.status == 'done'`
//! - `intent == 'bug' and (priority > 3 or urgent)`
//!
//! Expressions can only read the incoming value; there is no access to
//! anything else in the process.

mod ast;
mod evaluator;
mod parser;

pub use ast::{CompareOp, Expression, Operand};
pub use evaluator::{evaluate, is_truthy};
pub use parser::parse;

use serde_json::Value;

use crate::error::Result;

/// A boolean test over one input value
pub trait Predicate: Send + Sync {
    fn evaluate(&self, input: &Value) -> bool;
}

/// Predicate backed by a parsed expression
#[derive(Debug, Clone)]
pub struct ExpressionPredicate {
    expr: Expression,
}

impl ExpressionPredicate {
    /// Parse an expression string
    pub fn compile(source: &str) -> Result<Self> {
        Ok(Self {
            expr: parse(source)?,
        })
    }
}

impl Predicate for ExpressionPredicate {
    fn evaluate(&self, input: &Value) -> bool {
        evaluate(&self.expr, input)
    }
}

/// Compiles condition strings into predicates.
///
/// Condition nodes go through this seam so another expression language can
/// be plugged in without touching the node handler.
pub trait PredicateCompiler: Send + Sync {
    fn compile(&self, source: &str) -> Result<Box<dyn Predicate>>;
}

/// Default compiler for the built-in expression language
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpressionCompiler;

impl PredicateCompiler for ExpressionCompiler {
    fn compile(&self, source: &str) -> Result<Box<dyn Predicate>> {
        Ok(Box::new(ExpressionPredicate::compile(source)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_expression_predicate() {
        let p = ExpressionPredicate::compile("value > 10").unwrap();
        assert!(p.evaluate(&json!(20)));
        assert!(!p.evaluate(&json!(5)));
    }

    #[test]
    fn test_compiler_rejects_garbage() {
        assert!(ExpressionCompiler.compile("value >").is_err());
    }
}
