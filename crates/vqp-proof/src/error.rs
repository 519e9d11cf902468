use vqp_core::VqpError;

/// Proof construction errors.
#[derive(Debug, thiserror::Error)]
pub enum ProofError {
    #[error("payload encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("no zero-knowledge circuit matches the expression: {0}")]
    NoCircuit(String),

    #[error("invalid circuit witness: {0}")]
    Witness(String),

    #[error("collected {collected} of {threshold} required signatures")]
    BelowThreshold { threshold: usize, collected: usize },

    #[error("invalid proof scheme: {0}")]
    InvalidScheme(String),
}

impl From<ProofError> for VqpError {
    fn from(err: ProofError) -> Self {
        match err {
            ProofError::Encoding(e) => VqpError::crypto(format!("payload encoding failed: {}", e)),
            ProofError::NoCircuit(_) | ProofError::Witness(_) => VqpError::evaluation(err.to_string())
                .with_details(serde_json::json!({ "backend": "zk" })),
            ProofError::BelowThreshold {
                threshold,
                collected,
            } => VqpError::signature_failed(err.to_string()).with_details(serde_json::json!({
                "threshold": threshold,
                "collected": collected,
            })),
            ProofError::InvalidScheme(msg) => VqpError::configuration(msg),
        }
    }
}
