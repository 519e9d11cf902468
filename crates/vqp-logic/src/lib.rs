//! VQP Logic: The sandboxed expression evaluator.
//!
//! Query expressions are untrusted JSON Logic. They are parsed into an
//! explicit AST (rejecting denylisted keys, unknown operators and overly
//! deep trees) and only then evaluated against the resolved data context.

pub mod ast;
pub mod error;
pub mod eval;

pub use ast::{Expr, Operator, DEFAULT_MAX_DEPTH, DENYLIST};
pub use error::EvalError;
pub use eval::{lookup, truthy};

use serde_json::Value;

/// Entry point used by the engine: sanitize, then evaluate.
#[derive(Debug, Clone)]
pub struct ExpressionEvaluator {
    max_depth: usize,
}

impl Default for ExpressionEvaluator {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl ExpressionEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        Self { max_depth }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Parse and sanitize an expression.
    pub fn parse(&self, expr: &Value) -> Result<Expr, EvalError> {
        Expr::parse_with_depth(expr, self.max_depth)
    }

    /// Evaluate `expr` against `context`.
    ///
    /// The expression is fully validated before any part of it runs, so a
    /// rejected expression never reads the context.
    pub fn evaluate(&self, expr: &Value, context: &Value) -> Result<Value, EvalError> {
        let parsed = self.parse(expr).inspect_err(|e| {
            tracing::warn!(error = %e, "expression rejected");
        })?;
        self.evaluate_parsed(&parsed, context)
    }

    pub fn evaluate_parsed(&self, expr: &Expr, context: &Value) -> Result<Value, EvalError> {
        let result = eval::evaluate(expr, context)?;
        tracing::debug!(result = %result, "expression evaluated");
        Ok(result)
    }

    /// Field paths the expression reads, in first-occurrence order.
    pub fn extract_variables(&self, expr: &Value) -> Result<Vec<String>, EvalError> {
        Ok(self.parse(expr)?.variables())
    }

    pub fn is_valid(&self, expr: &Value) -> bool {
        self.parse(expr).is_ok()
    }
}
