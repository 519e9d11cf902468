use vqp_core::VqpError;

/// Vocabulary resolution errors.
#[derive(Debug, thiserror::Error)]
pub enum VocabularyError {
    #[error("vocabulary not found: {0}")]
    NotFound(String),

    #[error("invalid vocabulary schema: {0}")]
    InvalidSchema(String),

    #[error("schema source error: {0}")]
    Source(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("schema decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<VocabularyError> for VqpError {
    fn from(err: VocabularyError) -> Self {
        match err {
            VocabularyError::NotFound(uri) => VqpError::vocabulary_not_found(&uri),
            VocabularyError::InvalidSchema(msg) => VqpError::configuration(msg),
            other => VqpError::new(vqp_core::ErrorKind::VocabularyNotFound, other.to_string()),
        }
    }
}
