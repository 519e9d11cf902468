//! Evaluation of a parsed [`Expr`] against a data context.
//!
//! Evaluation is pure: it reads the context, allocates the result and
//! nothing else. Semantics follow JSON Logic (truthiness, loose equality,
//! numeric coercion) with two tightenings: arithmetic on non-numeric
//! operands, division by zero and non-finite results are errors.

use std::cmp::Ordering;

use serde_json::{Number, Value};

use crate::ast::{Expr, Operator};
use crate::error::EvalError;

/// JSON Logic truthiness: `false`, `null`, `0`, `""` and `[]` are falsy.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
    }
}

/// Resolve a dotted path inside `data`. Numeric segments index arrays.
pub fn lookup<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(data);
    }
    path.split('.').try_fold(data, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Null => Some(0.0),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Some(0.0)
            } else {
                trimmed.parse::<f64>().ok().filter(|f| f.is_finite())
            }
        }
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn require_number(value: &Value, op: Operator) -> Result<f64, EvalError> {
    to_number(value).ok_or_else(|| {
        EvalError::TypeError(format!("operator '{}' expects numeric operands", op))
    })
}

/// Integral results come back as JSON integers so `18 + 0` stays `18`.
pub fn number_value(f: f64) -> Result<Value, EvalError> {
    if !f.is_finite() {
        return Err(EvalError::NonFinite);
    }
    if f.fract() == 0.0 && f.abs() < 9.007_199_254_740_992e15 {
        return Ok(Value::Number(Number::from(f as i64)));
    }
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or(EvalError::NonFinite)
}

fn text(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(text).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}

fn numbers_equal(a: &Number, b: &Number) -> bool {
    match (a.as_i64(), b.as_i64()) {
        (Some(x), Some(y)) => x == y,
        _ => a.as_f64() == b.as_f64(),
    }
}

pub fn strict_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => numbers_equal(x, y),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| strict_equals(l, r))
        }
        _ => a == b,
    }
}

pub fn loose_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Number(_), Value::Number(_)) => strict_equals(a, b),
        (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => {
            strict_equals(a, b)
        }
        (Value::Array(_), Value::String(s)) | (Value::String(s), Value::Array(_)) => {
            let joined = if a.is_array() { text(a) } else { text(b) };
            &joined == s
        }
        (Value::Object(_), _) | (_, Value::Object(_)) => false,
        _ => match (to_number(a), to_number(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    if a.is_null() || b.is_null() {
        return None;
    }
    if let (Value::String(x), Value::String(y)) = (a, b) {
        return Some(x.cmp(y));
    }
    let x = to_number(a)?;
    let y = to_number(b)?;
    x.partial_cmp(&y)
}

/// Evaluate a parsed expression against `data`.
pub fn evaluate(expr: &Expr, data: &Value) -> Result<Value, EvalError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Array(items) => items
            .iter()
            .map(|item| evaluate(item, data))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Expr::Var { path, default, .. } => match lookup(data, path) {
            Some(value) if !value.is_null() => Ok(value.clone()),
            _ => match default {
                Some(default) => evaluate(default, data),
                None => Ok(Value::Null),
            },
        },
        Expr::Op { op, args } => apply(*op, args, data),
    }
}

fn eval_all(args: &[Expr], data: &Value) -> Result<Vec<Value>, EvalError> {
    args.iter().map(|arg| evaluate(arg, data)).collect()
}

fn apply(op: Operator, args: &[Expr], data: &Value) -> Result<Value, EvalError> {
    match op {
        Operator::And => {
            let mut last = Value::Bool(true);
            for arg in args {
                last = evaluate(arg, data)?;
                if !truthy(&last) {
                    break;
                }
            }
            Ok(last)
        }
        Operator::Or => {
            let mut last = Value::Bool(false);
            for arg in args {
                last = evaluate(arg, data)?;
                if truthy(&last) {
                    break;
                }
            }
            Ok(last)
        }
        Operator::If => {
            let mut rest = args;
            while rest.len() >= 2 {
                if truthy(&evaluate(&rest[0], data)?) {
                    return evaluate(&rest[1], data);
                }
                rest = &rest[2..];
            }
            match rest.first() {
                Some(otherwise) => evaluate(otherwise, data),
                None => Ok(Value::Null),
            }
        }
        Operator::Not => Ok(Value::Bool(!truthy(&evaluate(&args[0], data)?))),
        Operator::Truthy => Ok(Value::Bool(truthy(&evaluate(&args[0], data)?))),
        Operator::Eq | Operator::Ne | Operator::StrictEq | Operator::StrictNe => {
            let a = evaluate(&args[0], data)?;
            let b = evaluate(&args[1], data)?;
            let equal = match op {
                Operator::Eq | Operator::Ne => loose_equals(&a, &b),
                _ => strict_equals(&a, &b),
            };
            let negate = matches!(op, Operator::Ne | Operator::StrictNe);
            Ok(Value::Bool(equal != negate))
        }
        Operator::Gt | Operator::Ge | Operator::Lt | Operator::Le => {
            let values = eval_all(args, data)?;
            let holds = |ord: Option<Ordering>| match (op, ord) {
                (_, None) => false,
                (Operator::Gt, Some(o)) => o == Ordering::Greater,
                (Operator::Ge, Some(o)) => o != Ordering::Less,
                (Operator::Lt, Some(o)) => o == Ordering::Less,
                (_, Some(o)) => o != Ordering::Greater,
            };
            // `{"<": [a, b, c]}` is the between form a < b < c.
            let result = values
                .windows(2)
                .all(|pair| holds(compare(&pair[0], &pair[1])));
            Ok(Value::Bool(result))
        }
        Operator::In => {
            let needle = evaluate(&args[0], data)?;
            let haystack = evaluate(&args[1], data)?;
            let found = match (&needle, &haystack) {
                (_, Value::Array(items)) => items.iter().any(|item| strict_equals(item, &needle)),
                (Value::String(n), Value::String(h)) => h.contains(n.as_str()),
                _ => false,
            };
            Ok(Value::Bool(found))
        }
        Operator::Add | Operator::Mul => {
            let values = eval_all(args, data)?;
            let mut acc = if op == Operator::Add { 0.0 } else { 1.0 };
            for value in &values {
                let n = require_number(value, op)?;
                acc = if op == Operator::Add { acc + n } else { acc * n };
            }
            number_value(acc)
        }
        Operator::Sub => {
            let values = eval_all(args, data)?;
            let first = require_number(&values[0], op)?;
            match values.get(1) {
                Some(second) => number_value(first - require_number(second, op)?),
                None => number_value(-first),
            }
        }
        Operator::Div | Operator::Mod => {
            let a = require_number(&evaluate(&args[0], data)?, op)?;
            let b = require_number(&evaluate(&args[1], data)?, op)?;
            if b == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            number_value(if op == Operator::Div { a / b } else { a % b })
        }
        Operator::Min | Operator::Max => {
            let values = eval_all(args, data)?;
            let mut numbers = values.iter().map(|v| require_number(v, op));
            let first = numbers
                .next()
                .ok_or_else(|| EvalError::Malformed(format!("'{}' needs an operand", op)))??;
            let best = numbers.try_fold(first, |acc, n| {
                let n = n?;
                Ok::<f64, EvalError>(if op == Operator::Min { acc.min(n) } else { acc.max(n) })
            })?;
            number_value(best)
        }
        Operator::Cat => {
            let values = eval_all(args, data)?;
            Ok(Value::String(values.iter().map(text).collect()))
        }
        Operator::Merge => {
            let mut merged = Vec::new();
            for value in eval_all(args, data)? {
                match value {
                    Value::Array(items) => merged.extend(items),
                    other => merged.push(other),
                }
            }
            Ok(Value::Array(merged))
        }
        Operator::Missing => {
            let values = eval_all(args, data)?;
            let paths: Vec<Value> = match values.as_slice() {
                [Value::Array(items), ..] => items.clone(),
                _ => values,
            };
            let missing = paths
                .into_iter()
                .filter(|path| {
                    let key = match path {
                        Value::String(s) => s.clone(),
                        other => text(other),
                    };
                    match lookup(data, &key) {
                        None | Some(Value::Null) => true,
                        Some(Value::String(s)) => s.is_empty(),
                        Some(_) => false,
                    }
                })
                .collect();
            Ok(Value::Array(missing))
        }
        Operator::All | Operator::Some | Operator::None => {
            let items = match evaluate(&args[0], data)? {
                Value::Array(items) => items,
                Value::Null => Vec::new(),
                _ => {
                    return Err(EvalError::TypeError(format!(
                        "operator '{}' expects an array",
                        op
                    )))
                }
            };
            let predicate = &args[1];
            let mut matched = 0usize;
            for item in &items {
                if truthy(&evaluate(predicate, item)?) {
                    matched += 1;
                }
            }
            let result = match op {
                // `all` over an empty array is false in JSON Logic.
                Operator::All => !items.is_empty() && matched == items.len(),
                Operator::Some => matched > 0,
                _ => matched == 0,
            };
            Ok(Value::Bool(result))
        }
    }
}
