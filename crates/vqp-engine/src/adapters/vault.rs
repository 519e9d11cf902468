use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

use vqp_core::{DataAccessPort, VqpError};

use crate::error::EngineError;

/// Grants a requester (or `*`) read access to dotted path prefixes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessRule {
    pub requester: String,
    pub allowed_paths: Vec<String>,
}

impl AccessRule {
    pub fn new<I, S>(requester: impl Into<String>, allowed_paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            requester: requester.into(),
            allowed_paths: allowed_paths.into_iter().map(Into::into).collect(),
        }
    }

    fn applies_to(&self, requester: &str) -> bool {
        self.requester == "*" || self.requester == requester
    }

    fn covers(&self, path: &str) -> bool {
        self.allowed_paths.iter().any(|prefix| {
            prefix == "*"
                || path == prefix
                || path
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.starts_with('.'))
        })
    }
}

/// Per-requester read policy. An empty policy allows everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccessPolicy {
    #[serde(default)]
    pub rules: Vec<AccessRule>,
}

impl AccessPolicy {
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, rule: AccessRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        for rule in &self.rules {
            if rule.requester.is_empty() {
                return Err(EngineError::InvalidPolicy("rule without requester".into()));
            }
            if rule.allowed_paths.iter().any(|p| p.is_empty()) {
                return Err(EngineError::InvalidPolicy(format!(
                    "empty path in rule for {}",
                    rule.requester
                )));
            }
        }
        Ok(())
    }

    pub fn allows(&self, path: &[String], requester: &str) -> bool {
        if self.rules.is_empty() {
            return true;
        }
        let joined = path.join(".");
        self.rules
            .iter()
            .any(|rule| rule.applies_to(requester) && rule.covers(&joined))
    }
}

fn walk(document: &Value, path: &[String]) -> Option<Value> {
    path.iter()
        .try_fold(document, |node, segment| match node {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
        .filter(|v| !v.is_null())
        .cloned()
}

/// Vault over an in-memory JSON document.
#[derive(Debug, Clone)]
pub struct MemoryVault {
    document: Value,
    policy: AccessPolicy,
}

impl MemoryVault {
    pub fn new(document: Value) -> Self {
        Self {
            document,
            policy: AccessPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: AccessPolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[async_trait]
impl DataAccessPort for MemoryVault {
    async fn get_data(&self, path: &[String]) -> Result<Option<Value>, VqpError> {
        Ok(walk(&self.document, path))
    }

    async fn validate_data_access(&self, path: &[String], requester: &str) -> bool {
        self.policy.allows(path, requester)
    }
}

/// Vault backed by a JSON file, re-read on every access.
#[derive(Debug, Clone)]
pub struct FileVault {
    path: PathBuf,
    policy: AccessPolicy,
}

impl FileVault {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            policy: AccessPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: AccessPolicy) -> Self {
        self.policy = policy;
        self
    }

    async fn load(&self) -> Result<Value, EngineError> {
        let bytes = tokio::fs::read(&self.path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl DataAccessPort for FileVault {
    async fn get_data(&self, path: &[String]) -> Result<Option<Value>, VqpError> {
        let document = self.load().await?;
        Ok(walk(&document, path))
    }

    async fn validate_data_access(&self, path: &[String], requester: &str) -> bool {
        self.policy.allows(path, requester)
    }
}
