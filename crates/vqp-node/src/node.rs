//! Assembly of the query service from configuration.

use anyhow::{bail, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use vqp_crypto::{KeyPair, KeyringCrypto};
use vqp_engine::adapters::{
    AccessPolicy, ConsentPolicy, FileVault, MemoryAuditLog, StandardObfuscator,
    TrustedClaimsVerifier,
};
use vqp_engine::{ModeEngine, VqpService};
use vqp_proof::ProofScheme;
use vqp_vocabulary::{DirectorySchemaSource, VocabularyMapper, VocabularyRegistry};

use crate::api::AppState;
use crate::config::VqpConfig;

/// A responder node: one query service plus its HTTP binding.
pub struct VqpNode {
    config: VqpConfig,
    service: Arc<VqpService>,
    audit: Arc<MemoryAuditLog>,
    keyring: Arc<KeyringCrypto>,
}

impl VqpNode {
    /// Build every collaborator described by `config`.
    pub fn new(config: VqpConfig) -> Result<Self> {
        let keyring = Arc::new(Self::build_keyring(&config)?);
        let scheme = Self::build_scheme(&config)?;
        let mapper = VocabularyMapper::from_name(&config.vocabulary.mapping).ok_or_else(|| {
            anyhow::anyhow!("unknown vocabulary mapping: {}", config.vocabulary.mapping)
        })?;

        let policy = AccessPolicy {
            rules: config.vault.rules.clone(),
        };
        policy.validate()?;
        let vault = FileVault::new(&config.vault.path).with_policy(policy);

        let audit = Arc::new(MemoryAuditLog::with_capacity(config.audit.capacity));

        let consent = if config.consent.grant_all {
            ConsentPolicy::grant_all()
        } else {
            ConsentPolicy::granting(config.consent.granted_requesters.iter().cloned())
        };
        let mutual = TrustedClaimsVerifier::new(keyring.clone());
        for (did, public_key) in &config.mutual.trusted_issuers {
            mutual.add_trusted_issuer(did.clone(), public_key.clone());
        }
        let modes = ModeEngine::new()
            .with_consent(Arc::new(consent))
            .with_mutual_verifier(Arc::new(mutual))
            .with_obfuscator(Arc::new(StandardObfuscator::new()));

        let service = VqpService::builder()
            .config(config.engine_config())
            .data(Arc::new(vault))
            .crypto(keyring.clone())
            .vocabulary(Arc::new(Self::build_vocabulary(&config)))
            .audit(audit.clone())
            .mapper(mapper)
            .modes(modes)
            .proof_scheme(scheme)
            .trusted_signers(config.proof.trusted_signers.iter().cloned())
            .build()?;

        tracing::info!(
            responder = %config.node.responder,
            vault = %config.vault.path.display(),
            "VQP node created"
        );

        Ok(Self {
            config,
            service: Arc::new(service),
            audit,
            keyring,
        })
    }

    fn build_keyring(config: &VqpConfig) -> Result<KeyringCrypto> {
        let keys = &config.keys;
        let default_pair = match keys.seeds.get(&keys.default_key) {
            Some(seed) => KeyPair::from_hex(seed)?,
            None => {
                tracing::info!(key_id = %keys.default_key, "generating ephemeral signing key");
                KeyPair::generate()
            }
        };
        let keyring = KeyringCrypto::new(keys.default_key.clone(), default_pair);
        for (id, seed) in keys.seeds.iter().filter(|(id, _)| **id != keys.default_key) {
            keyring.add_key(id.clone(), KeyPair::from_hex(seed)?);
        }
        for id in &config.proof.key_ids {
            if keyring.public_key(id).is_none() {
                tracing::info!(key_id = %id, "generating ephemeral co-signer key");
                keyring.add_key(id.clone(), KeyPair::generate());
            }
        }
        Ok(keyring)
    }

    fn build_scheme(config: &VqpConfig) -> Result<ProofScheme> {
        let proof = &config.proof;
        let scheme = match proof.scheme.as_str() {
            "signature" => ProofScheme::signature(),
            "zk" | "zero-knowledge" => ProofScheme::ZeroKnowledge,
            "multisig" => ProofScheme::multi_signature(proof.threshold, proof.key_ids.clone()),
            other => bail!("unknown proof scheme: {}", other),
        };
        scheme.validate()?;
        Ok(scheme)
    }

    fn build_vocabulary(config: &VqpConfig) -> VocabularyRegistry {
        let vocab = &config.vocabulary;
        let mut registry = VocabularyRegistry::new()
            .with_cache_ttl(Duration::from_secs(vocab.cache_ttl_secs));
        if !vocab.allowed.is_empty() {
            registry = registry.with_allowed(&vocab.allowed);
        }
        if let Some(dir) = &vocab.schema_dir {
            registry = registry.with_source(Arc::new(DirectorySchemaSource::new(dir)));
        }
        registry
    }

    pub fn service(&self) -> Arc<VqpService> {
        self.service.clone()
    }

    pub fn audit(&self) -> Arc<MemoryAuditLog> {
        self.audit.clone()
    }

    /// Hex public key of the default signing key.
    pub fn public_key(&self) -> Option<String> {
        self.keyring.default_public_key().map(|pk| pk.to_hex())
    }

    pub fn app_state(&self) -> Arc<AppState> {
        Arc::new(AppState {
            service: self.service(),
            audit: self.audit(),
            responder: self.config.node.responder.clone(),
            public_key: self.public_key(),
        })
    }

    /// Serve the HTTP API until the server stops.
    pub async fn run(&self) -> Result<()> {
        let addr: SocketAddr = self.config.api_addr().parse()?;
        crate::api::start_api_server(addr, self.app_state()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_from_defaults() {
        let node = VqpNode::new(VqpConfig::default()).unwrap();
        assert_eq!(node.public_key().unwrap().len(), 64);
        assert_eq!(node.service().config().responder, "did:web:vqp.local");
    }

    #[test]
    fn test_seeded_key_is_stable() {
        let mut config = VqpConfig::default();
        config.keys.seeds.insert("responder".into(), "07".repeat(32));
        let a = VqpNode::new(config.clone()).unwrap().public_key();
        let b = VqpNode::new(config).unwrap().public_key();
        assert_eq!(a, b);
    }

    #[test]
    fn test_multisig_generates_missing_cosigners() {
        let mut config = VqpConfig::default();
        config.proof.scheme = "multisig".into();
        config.proof.threshold = 2;
        config.proof.key_ids = vec!["a".into(), "b".into()];
        let keyring = VqpNode::build_keyring(&config).unwrap();
        assert!(keyring.public_key("a").is_some());
        assert!(keyring.public_key("b").is_some());
        assert!(VqpNode::new(config).is_ok());
    }

    #[test]
    fn test_rejects_bad_settings() {
        let mut config = VqpConfig::default();
        config.proof.scheme = "carrier-pigeon".into();
        assert!(VqpNode::new(config).is_err());

        let mut config = VqpConfig::default();
        config.vocabulary.mapping = "hierarchical".into();
        assert!(VqpNode::new(config).is_err());

        let mut config = VqpConfig::default();
        config.proof.scheme = "multisig".into();
        config.proof.threshold = 3;
        config.proof.key_ids = vec!["a".into()];
        assert!(VqpNode::new(config).is_err());

        let mut config = VqpConfig::default();
        config.keys.seeds.insert("responder".into(), "zz".into());
        assert!(VqpNode::new(config).is_err());
    }
}
