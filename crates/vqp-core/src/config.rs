use serde::{Deserialize, Serialize};

use crate::error::VqpError;
use crate::types::{Did, SUPPORTED_VERSIONS};

/// Configuration for the protocol engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// DID the engine answers as.
    #[serde(default = "default_responder")]
    pub responder: String,
    /// Maximum accepted query age, in seconds.
    #[serde(default = "default_freshness_window_secs")]
    pub freshness_window_secs: u64,
    /// Tolerated clock skew for timestamps in the future, in seconds.
    #[serde(default = "default_clock_skew_secs")]
    pub clock_skew_secs: u64,
    /// Accepted protocol versions.
    #[serde(default = "default_supported_versions")]
    pub supported_versions: Vec<String>,
}

fn default_responder() -> String {
    "did:web:vqp.local".into()
}
fn default_freshness_window_secs() -> u64 {
    24 * 60 * 60
}
fn default_clock_skew_secs() -> u64 {
    5 * 60
}
fn default_supported_versions() -> Vec<String> {
    SUPPORTED_VERSIONS.iter().map(|v| v.to_string()).collect()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            responder: default_responder(),
            freshness_window_secs: default_freshness_window_secs(),
            clock_skew_secs: default_clock_skew_secs(),
            supported_versions: default_supported_versions(),
        }
    }
}

impl EngineConfig {
    pub fn with_responder(mut self, responder: impl Into<String>) -> Self {
        self.responder = responder.into();
        self
    }

    pub fn freshness_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.freshness_window_secs as i64)
    }

    pub fn clock_skew(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.clock_skew_secs as i64)
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), VqpError> {
        Did::new(self.responder.clone())
            .map_err(|e| VqpError::configuration(format!("invalid responder: {}", e.message)))?;
        if self.supported_versions.is_empty() {
            return Err(VqpError::configuration(
                "at least one protocol version must be supported",
            ));
        }
        if self.freshness_window_secs == 0 {
            return Err(VqpError::configuration(
                "freshness window must be greater than zero",
            ));
        }
        Ok(())
    }
}
