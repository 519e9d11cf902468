//! Mapping an expression onto a provable circuit.
//!
//! Two shapes are recognised:
//! `{cmp: [{"var": f}, n]}` (either operand order) proves a threshold
//! comparison, and `{"in": [{"var": f}, [literals]]}` proves membership in
//! a literal set.

use std::collections::BTreeMap;

use serde_json::{json, Value};
use vqp_crypto::circuits::{RANGE_THRESHOLD, SET_MEMBERSHIP};
use vqp_logic::{lookup, Expr, Operator};

use crate::error::ProofError;

/// Inputs for one proving call.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitPlan {
    pub circuit: &'static str,
    pub private_inputs: Value,
    pub public_inputs: BTreeMap<String, Value>,
}

fn comparator(op: Operator) -> Option<&'static str> {
    match op {
        Operator::Gt => Some(">"),
        Operator::Ge => Some(">="),
        Operator::Lt => Some("<"),
        Operator::Le => Some("<="),
        _ => None,
    }
}

/// `n < x` is `x > n`.
fn mirrored(cmp: &'static str) -> &'static str {
    match cmp {
        ">" => "<",
        ">=" => "<=",
        "<" => ">",
        _ => ">=",
    }
}

fn witness(context: &Value, path: &str) -> Result<Value, ProofError> {
    lookup(context, path)
        .filter(|v| !v.is_null())
        .cloned()
        .ok_or_else(|| ProofError::Witness(format!("no value for '{}'", path)))
}

/// Choose a circuit for `expr` whose answer was `result`.
pub fn select_circuit(
    expr: &Value,
    result: &Value,
    context: &Value,
) -> Result<CircuitPlan, ProofError> {
    let parsed = Expr::parse(expr).map_err(|e| ProofError::NoCircuit(e.to_string()))?;
    let Expr::Op { op, args } = &parsed else {
        return Err(ProofError::NoCircuit("expression is not an operator".into()));
    };
    let answer = result
        .as_bool()
        .ok_or_else(|| ProofError::NoCircuit("circuits prove boolean answers only".into()))?;

    if let Some(cmp) = comparator(*op) {
        let (path, threshold, cmp) = match args.as_slice() {
            [Expr::Var { path, .. }, Expr::Literal(n)] => (path, n, cmp),
            [Expr::Literal(n), Expr::Var { path, .. }] => (path, n, mirrored(cmp)),
            _ => {
                return Err(ProofError::NoCircuit(
                    "comparison must be between a field and a constant".into(),
                ))
            }
        };
        let threshold = threshold
            .as_i64()
            .ok_or_else(|| ProofError::NoCircuit("threshold must be an integer".into()))?;
        let value = witness(context, path)?;
        if value.as_i64().is_none() {
            return Err(ProofError::Witness(format!("'{}' is not an integer", path)));
        }
        let public_inputs = BTreeMap::from([
            ("comparator".to_string(), json!(cmp)),
            ("field".to_string(), json!(path)),
            ("threshold".to_string(), json!(threshold)),
            ("result".to_string(), json!(answer)),
        ]);
        return Ok(CircuitPlan {
            circuit: RANGE_THRESHOLD,
            private_inputs: json!({ "value": value }),
            public_inputs,
        });
    }

    if *op == Operator::In {
        if let [Expr::Var { path, .. }, Expr::Array(items)] = args.as_slice() {
            let set = items
                .iter()
                .map(|item| match item {
                    Expr::Literal(v) => Ok(v.clone()),
                    _ => Err(ProofError::NoCircuit("set members must be literals".into())),
                })
                .collect::<Result<Vec<_>, _>>()?;
            let value = witness(context, path)?;
            let public_inputs = BTreeMap::from([
                ("field".to_string(), json!(path)),
                ("set".to_string(), Value::Array(set)),
                ("result".to_string(), json!(answer)),
            ]);
            return Ok(CircuitPlan {
                circuit: SET_MEMBERSHIP,
                private_inputs: json!({ "value": value }),
                public_inputs,
            });
        }
    }

    Err(ProofError::NoCircuit(format!(
        "operator '{}' has no circuit",
        op
    )))
}
