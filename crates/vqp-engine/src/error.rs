use vqp_core::VqpError;

/// Errors raised inside the reference collaborators.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("vault decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid access policy: {0}")]
    InvalidPolicy(String),
}

impl From<EngineError> for VqpError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::InvalidPolicy(msg) => VqpError::configuration(msg),
            // Backend detail stays in the log; callers only learn the class.
            other => {
                tracing::warn!(error = %other, "vault read failed");
                VqpError::evaluation("data access failed")
                    .with_details(serde_json::json!({ "reason": "storage" }))
            }
        }
    }
}
