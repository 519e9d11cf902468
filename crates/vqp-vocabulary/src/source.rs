use async_trait::async_trait;
use std::path::{Path, PathBuf};

use vqp_core::VocabularySchema;

use crate::error::VocabularyError;
use crate::mapping::canonical_vocabulary;

/// Somewhere vocabulary schemas can be fetched from on a registry miss.
#[async_trait]
pub trait SchemaSource: Send + Sync {
    /// Fetch the schema for `uri`; `Ok(None)` when the source does not have it.
    async fn fetch(&self, uri: &str) -> Result<Option<VocabularySchema>, VocabularyError>;
}

/// Loads `<dir>/<sanitized-uri>.json`.
#[derive(Debug, Clone)]
pub struct DirectorySchemaSource {
    dir: PathBuf,
}

impl DirectorySchemaSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name a schema for `uri` is stored under.
    pub fn file_name(uri: &str) -> String {
        let stem: String = canonical_vocabulary(uri)
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}.json", stem)
    }

    pub fn path_for(&self, uri: &str) -> PathBuf {
        self.dir.join(Self::file_name(uri))
    }
}

#[async_trait]
impl SchemaSource for DirectorySchemaSource {
    async fn fetch(&self, uri: &str) -> Result<Option<VocabularySchema>, VocabularyError> {
        let path = self.path_for(uri);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let schema: VocabularySchema = serde_json::from_slice(&bytes)?;
        if canonical_vocabulary(&schema.uri) != canonical_vocabulary(uri) {
            return Err(VocabularyError::InvalidSchema(format!(
                "{} declares uri {}",
                path.display(),
                schema.uri
            )));
        }
        tracing::debug!(uri, path = %path.display(), "schema loaded from directory");
        Ok(Some(schema))
    }
}
