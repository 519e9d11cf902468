use vqp_core::VqpError;

/// Expression parsing and evaluation errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("malformed expression: {0}")]
    Malformed(String),

    #[error("forbidden operator or path segment: {0}")]
    DangerousOperator(String),

    #[error("unknown operator: {0}")]
    UnknownOperator(String),

    #[error("expression nesting exceeds {0} levels")]
    TooDeep(usize),

    #[error("type error: {0}")]
    TypeError(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("arithmetic produced a non-finite number")]
    NonFinite,
}

impl EvalError {
    fn reason(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed",
            Self::DangerousOperator(_) => "dangerous_operator",
            Self::UnknownOperator(_) => "unknown_operator",
            Self::TooDeep(_) => "too_deep",
            Self::TypeError(_) => "type_error",
            Self::DivisionByZero => "division_by_zero",
            Self::NonFinite => "non_finite",
        }
    }
}

impl From<EvalError> for VqpError {
    fn from(err: EvalError) -> Self {
        VqpError::evaluation(err.to_string())
            .with_details(serde_json::json!({ "reason": err.reason() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vqp_core::ErrorKind;

    #[test]
    fn test_into_vqp_error() {
        let err: VqpError = EvalError::DangerousOperator("eval".into()).into();
        assert_eq!(err.kind(), ErrorKind::EvaluationError);
        assert_eq!(err.details.unwrap()["reason"], "dangerous_operator");
    }
}
