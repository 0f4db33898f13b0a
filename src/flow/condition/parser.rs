// SPDX-License-Identifier: MIT

//! Condition expression parser
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! any     := all ( ("or" | "||") all )*
//! all     := unary ( ("and" | "&&") unary )*
//! unary   := ("not" | "!") unary | "(" any ")" | compare
//! compare := operand op literal | operand | "true" | "false"
//! ```
//!
//! Operators also accept the JavaScript spellings `===` and `!==`.

use serde_json::{Number, Value};

use super::ast::{CompareOp, Expression, Operand};
use crate::error::{FlowError, Result};
use crate::flow::path::{self, Segment};

const COMPARISONS: &[(&str, CompareOp)] = &[
    ("===", CompareOp::Eq),
    ("!==", CompareOp::NotEq),
    ("!=", CompareOp::NotEq),
    (">=", CompareOp::Gte),
    ("<=", CompareOp::Lte),
    ("==", CompareOp::Eq),
    (">", CompareOp::Gt),
    ("<", CompareOp::Lt),
    (" contains ", CompareOp::Contains),
];

fn error(message: impl Into<String>) -> FlowError {
    FlowError::Condition(message.into())
}

/// Parse a condition expression string
pub fn parse(source: &str) -> Result<Expression> {
    let source = source.trim();
    if source.is_empty() {
        return Err(error("empty condition"));
    }
    check_balanced(source)?;
    parse_any(source)
}

fn parse_any(input: &str) -> Result<Expression> {
    let clauses = split_top_level(input, &[" or ", "||"]);
    if clauses.len() == 1 {
        return parse_all(clauses[0]);
    }
    let clauses = clauses
        .into_iter()
        .map(parse_all)
        .collect::<Result<Vec<_>>>()?;
    Ok(Expression::Any(clauses))
}

fn parse_all(input: &str) -> Result<Expression> {
    let clauses = split_top_level(input, &[" and ", "&&"]);
    if clauses.len() == 1 {
        return parse_unary(clauses[0]);
    }
    let clauses = clauses
        .into_iter()
        .map(parse_unary)
        .collect::<Result<Vec<_>>>()?;
    Ok(Expression::All(clauses))
}

fn parse_unary(input: &str) -> Result<Expression> {
    let input = input.trim();
    if input.is_empty() {
        return Err(error("missing operand"));
    }

    if let Some(rest) = input.strip_prefix("not ") {
        return Ok(Expression::Not(Box::new(parse_unary(rest)?)));
    }
    if let Some(rest) = input.strip_prefix('!').filter(|r| !r.starts_with('=')) {
        return Ok(Expression::Not(Box::new(parse_unary(rest)?)));
    }
    if input.starts_with('(') && closing_paren(input) == Some(input.len() - 1) {
        return parse_any(&input[1..input.len() - 1]);
    }

    parse_compare(input)
}

fn parse_compare(input: &str) -> Result<Expression> {
    match input {
        "true" => return Ok(Expression::Constant(true)),
        "false" => return Ok(Expression::Constant(false)),
        _ => {}
    }

    for (symbol, op) in COMPARISONS {
        let parts = split_top_level(input, &[*symbol]);
        if parts.len() < 2 {
            continue;
        }
        // Everything after the first top-level operator is the literal
        let left = parts[0];
        let right = &input[left.len() + symbol.len()..];
        return Ok(Expression::Compare {
            left: parse_operand(left)
                .ok_or_else(|| error(format!("invalid left operand '{}' in: {}", left.trim(), input)))?,
            op: *op,
            right: parse_literal(right)?,
        });
    }

    parse_operand(input)
        .map(Expression::Truthy)
        .ok_or_else(|| error(format!("could not parse condition: {}", input)))
}

/// Identifier path such as `value`, `value.items[0]` or `status`
fn parse_operand(input: &str) -> Option<Operand> {
    let input = input.trim();
    let mut chars = input.chars();
    if !chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
    {
        return None;
    }
    if !chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '$' | '.' | '[' | ']')) {
        return None;
    }

    let mut segments = path::parse(input).ok()?;
    if matches!(segments.first(), Some(Segment::Key(root)) if root == "value" || root == "input") {
        segments.remove(0);
    }
    Some(Operand { segments })
}

fn parse_literal(input: &str) -> Result<Value> {
    let input = input.trim();
    match input {
        "null" | "undefined" => return Ok(Value::Null),
        "true" => return Ok(Value::Bool(true)),
        "false" => return Ok(Value::Bool(false)),
        _ => {}
    }

    for quote in ['\'', '"'] {
        if input.len() >= 2 && input.starts_with(quote) && input.ends_with(quote) {
            return Ok(Value::String(input[1..input.len() - 1].to_string()));
        }
    }

    input
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| error(format!("could not parse literal: {}", input)))
}

/// Call `visit` with the byte index of every character outside quotes and
/// parentheses
fn scan_top_level(input: &str, mut visit: impl FnMut(usize)) {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    for (i, c) in input.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => depth -= 1,
            (None, _) if depth == 0 => visit(i),
            _ => {}
        }
    }
}

/// Split on every top-level occurrence of any separator
fn split_top_level<'a>(input: &'a str, separators: &[&str]) -> Vec<&'a str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut skip_until = 0;
    scan_top_level(input, |i| {
        if i < skip_until {
            return;
        }
        if let Some(sep) = separators.iter().find(|s| input[i..].starts_with(**s)) {
            parts.push(&input[start..i]);
            start = i + sep.len();
            skip_until = start;
        }
    });
    parts.push(&input[start..]);
    parts
}

fn check_balanced(input: &str) -> Result<()> {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    for c in input.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => {
                depth -= 1;
                if depth < 0 {
                    return Err(error(format!("unbalanced ')' in: {}", input)));
                }
            }
            _ => {}
        }
    }
    if quote.is_some() {
        return Err(error(format!("unterminated string in: {}", input)));
    }
    if depth != 0 {
        return Err(error(format!("unbalanced '(' in: {}", input)));
    }
    Ok(())
}

/// Byte index of the ')' matching the '(' at index 0
fn closing_paren(input: &str) -> Option<usize> {
    let mut depth = 0;
    let mut quote: Option<char> = None;
    for (i, c) in input.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn operand(path: &str) -> Operand {
        parse_operand(path).unwrap()
    }

    fn compare(left: &str, op: CompareOp, right: Value) -> Expression {
        Expression::Compare {
            left: operand(left),
            op,
            right,
        }
    }

    #[test]
    fn test_operand_drops_value_root() {
        assert_eq!(operand("value"), Operand::root());
        assert_eq!(operand("input.a"), operand("a"));
        assert_eq!(operand("value.items[0]").segments.len(), 2);
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(parse("value > 10").unwrap(), compare("value", CompareOp::Gt, json!(10.0)));
        assert_eq!(parse("score >= 5").unwrap(), compare("score", CompareOp::Gte, json!(5.0)));
        assert_eq!(parse("count <= 1").unwrap(), compare("count", CompareOp::Lte, json!(1.0)));
        assert_eq!(
            parse("status != 'done'").unwrap(),
            compare("status", CompareOp::NotEq, json!("done"))
        );
        assert_eq!(
            parse("tags contains 'bug'").unwrap(),
            compare("tags", CompareOp::Contains, json!("bug"))
        );
    }

    #[test]
    fn test_js_spellings() {
        assert_eq!(
            parse("value.kind === 'a'").unwrap(),
            compare("kind", CompareOp::Eq, json!("a"))
        );
        assert_eq!(
            parse("value !== null").unwrap(),
            compare("value", CompareOp::NotEq, Value::Null)
        );
        assert!(matches!(parse("a > 1 && b < 2").unwrap(), Expression::All(c) if c.len() == 2));
        assert!(matches!(parse("a > 1 || b < 2").unwrap(), Expression::Any(c) if c.len() == 2));
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        match parse("a == 1 and b == 2 or c == 3").unwrap() {
            Expression::Any(clauses) => {
                assert!(matches!(&clauses[0], Expression::All(c) if c.len() == 2));
                assert_eq!(clauses[1], compare("c", CompareOp::Eq, json!(3.0)));
            }
            other => panic!("Expected Any, got {:?}", other),
        }
    }

    #[test]
    fn test_chains_flatten() {
        assert!(matches!(parse("a or b or c").unwrap(), Expression::Any(c) if c.len() == 3));
    }

    #[test]
    fn test_parentheses() {
        match parse("a == 1 and (b == 2 or c == 3)").unwrap() {
            Expression::All(clauses) => assert!(matches!(clauses[1], Expression::Any(_))),
            other => panic!("Expected All, got {:?}", other),
        }
        assert_eq!(parse("((value > 1))").unwrap(), compare("value", CompareOp::Gt, json!(1.0)));
    }

    #[test]
    fn test_not() {
        assert_eq!(
            parse("not value").unwrap(),
            Expression::Not(Box::new(Expression::Truthy(Operand::root())))
        );
        assert_eq!(
            parse("!(value > 2)").unwrap(),
            Expression::Not(Box::new(compare("value", CompareOp::Gt, json!(2.0))))
        );
    }

    #[test]
    fn test_constants() {
        assert_eq!(parse("true").unwrap(), Expression::Constant(true));
        assert_eq!(parse(" false ").unwrap(), Expression::Constant(false));
    }

    #[test]
    fn test_quoted_text_is_opaque() {
        assert_eq!(
            parse(r#"name == "привет""#).unwrap(),
            compare("name", CompareOp::Eq, json!("привет"))
        );
        assert_eq!(
            parse("msg == 'a > b or c'").unwrap(),
            compare("msg", CompareOp::Eq, json!("a > b or c"))
        );
    }

    #[test]
    fn test_invalid() {
        assert!(parse("this is not valid").is_err());
        assert!(parse("").is_err());
        assert!(parse("(value > 1").is_err());
        assert!(parse("value > 'open").is_err());
        assert!(parse("value > other").is_err());
        assert!(parse("1 + 2 > 3").is_err());
        assert!(parse("value >").is_err());
        assert!(parse("a and").is_err());
    }
}
