//! Node configuration loading and management.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use vqp_core::{EngineConfig, SUPPORTED_VERSIONS};
use vqp_engine::adapters::{AccessRule, DEFAULT_AUDIT_CAPACITY};

/// Full configuration for the VQP node.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VqpConfig {
    /// Identity of this responder.
    #[serde(default)]
    pub node: NodeConfig,

    /// Query validation settings.
    #[serde(default)]
    pub engine: EngineSection,

    /// Vocabulary resolution settings.
    #[serde(default)]
    pub vocabulary: VocabularyConfig,

    /// Data vault settings.
    #[serde(default)]
    pub vault: VaultConfig,

    /// Proof scheme settings.
    #[serde(default)]
    pub proof: ProofConfig,

    /// Signing keys.
    #[serde(default)]
    pub keys: KeysConfig,

    /// Consent rules for consensual mode.
    #[serde(default)]
    pub consent: ConsentConfig,

    /// Trusted issuers for reciprocal mode.
    #[serde(default)]
    pub mutual: MutualConfig,

    /// Audit log settings.
    #[serde(default)]
    pub audit: AuditConfig,

    /// API server settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// DID this node answers as.
    #[serde(default = "default_responder")]
    pub responder: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSection {
    /// Maximum accepted query age, in seconds.
    #[serde(default = "default_freshness_window_secs")]
    pub freshness_window_secs: u64,
    /// Tolerated future clock skew, in seconds.
    #[serde(default = "default_clock_skew_secs")]
    pub clock_skew_secs: u64,
    /// Accepted protocol versions.
    #[serde(default = "default_supported_versions")]
    pub supported_versions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocabularyConfig {
    /// Vocabularies queries may target. Empty allows all.
    #[serde(default)]
    pub allowed: Vec<String>,
    /// Lifetime of schemas loaded from `schema_dir`, in seconds.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Directory of additional schema files.
    #[serde(default)]
    pub schema_dir: Option<PathBuf>,
    /// Field mapping (standard, flat).
    #[serde(default = "default_mapping")]
    pub mapping: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Path to the JSON vault document.
    #[serde(default = "default_vault_path")]
    pub path: PathBuf,
    /// Access rules. Empty allows every requester to read every path.
    #[serde(default)]
    pub rules: Vec<AccessRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofConfig {
    /// Proof scheme (signature, zk, multisig).
    #[serde(default = "default_scheme")]
    pub scheme: String,
    /// Signatures required by the multisig scheme.
    #[serde(default = "default_threshold")]
    pub threshold: usize,
    /// Keys that co-sign under the multisig scheme.
    #[serde(default)]
    pub key_ids: Vec<String>,
    /// Hex public keys whose signatures verify. Empty trusts only keys this node holds.
    #[serde(default)]
    pub trusted_signers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeysConfig {
    /// Key used for single-signature proofs.
    #[serde(default = "default_key_id")]
    pub default_key: String,
    /// Key id to hex-encoded 32-byte seed. Missing keys are generated per run.
    #[serde(default)]
    pub seeds: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConsentConfig {
    /// Grant every consent request.
    #[serde(default)]
    pub grant_all: bool,
    /// Requesters granted disclosure.
    #[serde(default)]
    pub granted_requesters: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MutualConfig {
    /// Issuer DID to hex public key.
    #[serde(default)]
    pub trusted_issuers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Entries kept in memory for `GET /vqp/audit`.
    #[serde(default = "default_audit_capacity")]
    pub capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API listen address.
    #[serde(default = "default_api_addr")]
    pub listen_addr: String,
    /// API port.
    #[serde(default = "default_api_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (text, json).
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
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
fn default_cache_ttl_secs() -> u64 {
    3600
}
fn default_mapping() -> String {
    "standard".into()
}
fn default_vault_path() -> PathBuf {
    PathBuf::from("./vault.json")
}
fn default_scheme() -> String {
    "signature".into()
}
fn default_threshold() -> usize {
    1
}
fn default_key_id() -> String {
    "responder".into()
}
fn default_audit_capacity() -> usize {
    DEFAULT_AUDIT_CAPACITY
}
fn default_api_addr() -> String {
    "127.0.0.1".into()
}
fn default_api_port() -> u16 {
    8080
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "text".into()
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            responder: default_responder(),
        }
    }
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            freshness_window_secs: default_freshness_window_secs(),
            clock_skew_secs: default_clock_skew_secs(),
            supported_versions: default_supported_versions(),
        }
    }
}

impl Default for VocabularyConfig {
    fn default() -> Self {
        Self {
            allowed: Vec::new(),
            cache_ttl_secs: default_cache_ttl_secs(),
            schema_dir: None,
            mapping: default_mapping(),
        }
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            path: default_vault_path(),
            rules: Vec::new(),
        }
    }
}

impl Default for ProofConfig {
    fn default() -> Self {
        Self {
            scheme: default_scheme(),
            threshold: default_threshold(),
            key_ids: Vec::new(),
            trusted_signers: Vec::new(),
        }
    }
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            default_key: default_key_id(),
            seeds: BTreeMap::new(),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            capacity: default_audit_capacity(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_api_addr(),
            port: default_api_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl VqpConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let config: VqpConfig = toml::from_str(&contents)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save the current config to a TOML file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// The engine configuration these settings describe.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            responder: self.node.responder.clone(),
            freshness_window_secs: self.engine.freshness_window_secs,
            clock_skew_secs: self.engine.clock_skew_secs,
            supported_versions: self.engine.supported_versions.clone(),
        }
    }

    /// `listen_addr:port` of the HTTP API.
    pub fn api_addr(&self) -> String {
        format!("{}:{}", self.api.listen_addr, self.api.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = VqpConfig::default();
        assert_eq!(config.api.port, 8080);
        assert_eq!(config.node.responder, "did:web:vqp.local");
        assert_eq!(config.proof.scheme, "signature");
        assert_eq!(config.audit.capacity, 1000);
        assert_eq!(config.logging.format, "text");
        assert!(config.vault.rules.is_empty());
    }

    #[test]
    fn test_engine_config_matches_core_defaults() {
        let engine = VqpConfig::default().engine_config();
        let core = EngineConfig::default();
        assert_eq!(engine.freshness_window_secs, core.freshness_window_secs);
        assert_eq!(engine.clock_skew_secs, core.clock_skew_secs);
        assert_eq!(engine.supported_versions, core.supported_versions);
        assert!(engine.validate().is_ok());
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let mut config = VqpConfig::default();
        config
            .vault
            .rules
            .push(AccessRule::new("did:web:bank", ["financial"]));
        config.keys.seeds.insert("responder".into(), "00".repeat(32));
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let decoded: VqpConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(decoded.vault.rules, config.vault.rules);
        assert_eq!(decoded.keys.seeds, config.keys.seeds);
    }

    #[test]
    fn test_config_load_nonexistent_uses_defaults() {
        let config = VqpConfig::load(Path::new("/nonexistent/vqp.toml")).unwrap();
        assert_eq!(config.api.port, 8080);
    }

    #[test]
    fn test_config_from_toml_partial() {
        let toml_str = r#"
[node]
responder = "did:web:holder.example"

[proof]
scheme = "multisig"
threshold = 2
key_ids = ["a", "b", "c"]

[[vault.rules]]
requester = "*"
allowedPaths = ["personal.age"]

[mutual.trusted_issuers]
"did:web:regulator" = "abcd"
"#;
        let config: VqpConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.node.responder, "did:web:holder.example");
        assert_eq!(config.proof.threshold, 2);
        assert_eq!(config.vault.rules[0].allowed_paths, vec!["personal.age"]);
        assert_eq!(config.mutual.trusted_issuers["did:web:regulator"], "abcd");
        // Defaults for unspecified
        assert_eq!(config.api.port, 8080);
        assert_eq!(config.vocabulary.mapping, "standard");
    }

    #[test]
    fn test_save_then_load() {
        let dir = std::env::temp_dir().join(format!("vqp-config-test-{}", rand::random::<u64>()));
        let path = dir.join("vqp.toml");
        let mut config = VqpConfig::default();
        config.api.port = 9100;
        config.save(&path).unwrap();
        let loaded = VqpConfig::load(&path).unwrap();
        assert_eq!(loaded.api.port, 9100);
        std::fs::remove_dir_all(&dir).ok();
    }
}
