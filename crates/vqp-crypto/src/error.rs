use vqp_core::VqpError;

/// Cryptographic operation errors.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("signature verification failed")]
    SignatureVerificationFailed,

    #[error("unknown key: {0}")]
    UnknownKey(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("zero-knowledge proof error: {0}")]
    ZkpError(String),
}

impl From<CryptoError> for VqpError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::UnknownKey(_) => VqpError::signature_failed(err.to_string()),
            CryptoError::ZkpError(_) => VqpError::evaluation(err.to_string())
                .with_details(serde_json::json!({ "backend": "zk" })),
            _ => VqpError::crypto(err.to_string()),
        }
    }
}
