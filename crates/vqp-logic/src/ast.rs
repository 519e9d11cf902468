//! Expression syntax tree and the sanitizing parser.
//!
//! Every expression is parsed into an [`Expr`] before it can be evaluated.
//! Parsing rejects denylisted keys and `var` path segments at any depth,
//! unknown operators, and multi-key operator objects, so nothing reaches the
//! evaluator that was not explicitly recognised.

use serde_json::Value;
use std::fmt;

use crate::error::EvalError;

/// Keys that are never accepted as operators or path segments.
pub const DENYLIST: &[&str] = &[
    "eval",
    "function",
    "constructor",
    "__proto__",
    "prototype",
    "require",
    "import",
    "process",
    "global",
    "globalthis",
    "this",
    "new",
    "settimeout",
    "setinterval",
    "exec",
    "__definegetter__",
    "__definesetter__",
    "__lookupgetter__",
    "__lookupsetter__",
];

/// Default maximum nesting depth.
pub const DEFAULT_MAX_DEPTH: usize = 64;

pub fn is_denylisted(key: &str) -> bool {
    let lowered = key.trim().to_ascii_lowercase();
    DENYLIST.contains(&lowered.as_str())
}

/// Supported operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Missing,
    Eq,
    StrictEq,
    Ne,
    StrictNe,
    Gt,
    Ge,
    Lt,
    Le,
    Not,
    Truthy,
    And,
    Or,
    If,
    In,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Min,
    Max,
    Cat,
    Merge,
    All,
    Some,
    None,
}

impl Operator {
    pub fn from_key(key: &str) -> Option<Self> {
        let op = match key {
            "missing" => Self::Missing,
            "==" => Self::Eq,
            "===" => Self::StrictEq,
            "!=" => Self::Ne,
            "!==" => Self::StrictNe,
            ">" => Self::Gt,
            ">=" => Self::Ge,
            "<" => Self::Lt,
            "<=" => Self::Le,
            "!" => Self::Not,
            "!!" => Self::Truthy,
            "and" => Self::And,
            "or" => Self::Or,
            "if" | "?:" => Self::If,
            "in" => Self::In,
            "+" => Self::Add,
            "-" => Self::Sub,
            "*" => Self::Mul,
            "/" => Self::Div,
            "%" => Self::Mod,
            "min" => Self::Min,
            "max" => Self::Max,
            "cat" => Self::Cat,
            "merge" => Self::Merge,
            "all" => Self::All,
            "some" => Self::Some,
            "none" => Self::None,
            _ => return None,
        };
        Some(op)
    }

    pub fn key(&self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Eq => "==",
            Self::StrictEq => "===",
            Self::Ne => "!=",
            Self::StrictNe => "!==",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Not => "!",
            Self::Truthy => "!!",
            Self::And => "and",
            Self::Or => "or",
            Self::If => "if",
            Self::In => "in",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Min => "min",
            Self::Max => "max",
            Self::Cat => "cat",
            Self::Merge => "merge",
            Self::All => "all",
            Self::Some => "some",
            Self::None => "none",
        }
    }

    /// Operators whose second argument is evaluated once per array element.
    pub fn is_iterating(&self) -> bool {
        matches!(self, Self::All | Self::Some | Self::None)
    }

    fn check_arity(&self, count: usize) -> Result<(), EvalError> {
        let ok = match self {
            Self::Not | Self::Truthy => count == 1,
            Self::Eq | Self::StrictEq | Self::Ne | Self::StrictNe | Self::Gt | Self::Ge => {
                count == 2
            }
            Self::Lt | Self::Le => count == 2 || count == 3,
            Self::In | Self::Div | Self::Mod | Self::All | Self::Some | Self::None => count == 2,
            Self::Sub => count == 1 || count == 2,
            Self::If
            | Self::And
            | Self::Or
            | Self::Add
            | Self::Mul
            | Self::Min
            | Self::Max
            | Self::Cat
            | Self::Merge
            | Self::Missing => count >= 1,
        };
        if ok {
            Ok(())
        } else {
            Err(EvalError::Malformed(format!(
                "operator '{}' does not accept {} argument(s)",
                self.key(),
                count
            )))
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Scalar literal.
    Literal(Value),
    /// Array whose elements may themselves be expressions.
    Array(Vec<Expr>),
    /// Data reference. An empty path refers to the current element inside
    /// `all` / `some` / `none` predicates.
    Var {
        path: String,
        default: Option<Box<Expr>>,
        scoped: bool,
    },
    Op {
        op: Operator,
        args: Vec<Expr>,
    },
}

struct Parser {
    max_depth: usize,
}

impl Expr {
    /// Parse with the default depth limit.
    pub fn parse(value: &Value) -> Result<Self, EvalError> {
        Self::parse_with_depth(value, DEFAULT_MAX_DEPTH)
    }

    pub fn parse_with_depth(value: &Value, max_depth: usize) -> Result<Self, EvalError> {
        Parser { max_depth }.parse(value, 0, false)
    }

    /// Referenced data paths in first-occurrence order, without duplicates.
    pub fn variables(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables(&self, out: &mut Vec<String>) {
        fn push(path: &str, out: &mut Vec<String>) {
            if !path.is_empty() && !out.iter().any(|p| p == path) {
                out.push(path.to_string());
            }
        }
        match self {
            Expr::Literal(_) => {}
            Expr::Array(items) => items.iter().for_each(|e| e.collect_variables(out)),
            Expr::Var {
                path,
                default,
                scoped,
            } => {
                if !scoped {
                    push(path, out);
                }
                if let Some(default) = default {
                    default.collect_variables(out);
                }
            }
            Expr::Op { op, args } if op.is_iterating() => {
                if let Some(source) = args.first() {
                    source.collect_variables(out);
                }
            }
            Expr::Op {
                op: Operator::Missing,
                args,
            } => {
                for arg in args {
                    match arg {
                        Expr::Literal(Value::String(path)) => push(path, out),
                        Expr::Array(items) => {
                            for item in items {
                                if let Expr::Literal(Value::String(path)) = item {
                                    push(path, out);
                                } else {
                                    item.collect_variables(out);
                                }
                            }
                        }
                        other => other.collect_variables(out),
                    }
                }
            }
            Expr::Op { args, .. } => args.iter().for_each(|e| e.collect_variables(out)),
        }
    }
}

impl Parser {
    fn parse(&self, value: &Value, depth: usize, scoped: bool) -> Result<Expr, EvalError> {
        if depth > self.max_depth {
            return Err(EvalError::TooDeep(self.max_depth));
        }
        match value {
            Value::Object(map) => {
                // Every key is screened before the single-key rule so that a
                // denylisted key is reported even when smuggled next to another.
                if let Some(key) = map.keys().find(|k| is_denylisted(k)) {
                    return Err(EvalError::DangerousOperator(key.clone()));
                }
                let mut entries = map.iter();
                let (key, raw_args) = match (entries.next(), entries.next()) {
                    (Some(entry), None) => entry,
                    _ => {
                        return Err(EvalError::Malformed(
                            "operator objects must have exactly one key".into(),
                        ))
                    }
                };
                if key == "var" {
                    return self.parse_var(raw_args, depth, scoped);
                }
                let op = Operator::from_key(key)
                    .ok_or_else(|| EvalError::UnknownOperator(key.clone()))?;

                let raw: Vec<&Value> = match raw_args {
                    Value::Array(items) => items.iter().collect(),
                    single => vec![single],
                };
                op.check_arity(raw.len())?;

                let args = raw
                    .into_iter()
                    .enumerate()
                    .map(|(i, arg)| {
                        let element_scope = scoped || (op.is_iterating() && i == 1);
                        self.parse(arg, depth + 1, element_scope)
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Expr::Op { op, args })
            }
            Value::Array(items) => Ok(Expr::Array(
                items
                    .iter()
                    .map(|item| self.parse(item, depth + 1, scoped))
                    .collect::<Result<Vec<_>, _>>()?,
            )),
            scalar => Ok(Expr::Literal(scalar.clone())),
        }
    }

    fn parse_var(&self, raw: &Value, depth: usize, scoped: bool) -> Result<Expr, EvalError> {
        let (path_value, default) = match raw {
            Value::Array(items) => match items.as_slice() {
                [path] => (path, None),
                [path, default] => (path, Some(default)),
                _ => {
                    return Err(EvalError::Malformed(
                        "var takes a path and an optional default".into(),
                    ))
                }
            },
            single => (single, None),
        };

        let path = match path_value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Null => String::new(),
            _ => {
                return Err(EvalError::Malformed(
                    "var path must be a literal string or number".into(),
                ))
            }
        };

        if path.is_empty() && !scoped {
            return Err(EvalError::Malformed(
                "empty var path is only allowed inside all/some/none".into(),
            ));
        }
        if let Some(segment) = path.split('.').find(|s| is_denylisted(s)) {
            return Err(EvalError::DangerousOperator(segment.to_string()));
        }

        let default = default
            .map(|d| self.parse(d, depth + 1, scoped).map(Box::new))
            .transpose()?;
        Ok(Expr::Var {
            path,
            default,
            scoped,
        })
    }
}
