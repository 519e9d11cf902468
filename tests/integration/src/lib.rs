//! Fixtures shared by the end-to-end scenarios.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use vqp_core::{DataAccessPort, Query, VqpError};
use vqp_crypto::{KeyPair, KeyringCrypto};
use vqp_engine::adapters::{AuditOutcome, MemoryAuditLog, MemoryVault};
use vqp_engine::{ModeEngine, VqpService};
use vqp_proof::ProofScheme;

pub const REQUESTER: &str = "did:web:verifier.example";
pub const RESPONDER: &str = "did:web:holder.example";

/// A holder aged 28 earning 72500.
pub fn vault_document() -> Value {
    json!({
        "personal": {"age": 28, "citizenship": "US", "residency": "DE"},
        "financial": {"annual_income": 72500, "credit_score": 710},
        "health": {"lab": {"ldl": 118, "hdl": 61}}
    })
}

pub fn identity_query(expr: Value) -> Query {
    Query::new(REQUESTER, "vqp:identity:v1", expr)
}

pub fn financial_query(expr: Value) -> Query {
    Query::new(REQUESTER, "vqp:financial:v1", expr)
}

/// A keyring with a default key `responder` and co-signers `k1`..`k3`.
pub fn keyring() -> Arc<KeyringCrypto> {
    let keyring = KeyringCrypto::new("responder", KeyPair::from_seed(&[1u8; 32]));
    for (i, id) in ["k1", "k2", "k3"].iter().enumerate() {
        keyring.add_key(*id, KeyPair::from_seed(&[10 + i as u8; 32]));
    }
    Arc::new(keyring)
}

/// Counts data fetches made through the wrapped vault.
pub struct CountingVault {
    inner: MemoryVault,
    fetches: AtomicUsize,
}

impl CountingVault {
    pub fn new(inner: MemoryVault) -> Self {
        Self {
            inner,
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataAccessPort for CountingVault {
    async fn get_data(&self, path: &[String]) -> Result<Option<Value>, VqpError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.inner.get_data(path).await
    }

    async fn validate_data_access(&self, path: &[String], requester: &str) -> bool {
        self.inner.validate_data_access(path, requester).await
    }
}

/// A service wired to in-memory collaborators.
pub struct Harness {
    pub service: VqpService,
    pub audit: Arc<MemoryAuditLog>,
    pub vault: Arc<CountingVault>,
    pub keyring: Arc<KeyringCrypto>,
}

impl Harness {
    pub fn new(vault: MemoryVault, scheme: ProofScheme, modes: ModeEngine) -> Self {
        let audit = Arc::new(MemoryAuditLog::new());
        let vault = Arc::new(CountingVault::new(vault));
        let keyring = keyring();
        let service = VqpService::builder()
            .config(vqp_core::EngineConfig::default().with_responder(RESPONDER))
            .data(vault.clone())
            .crypto(keyring.clone())
            .audit(audit.clone())
            .modes(modes)
            .proof_scheme(scheme)
            .build()
            .expect("service configuration is valid");
        Self {
            service,
            audit,
            vault,
            keyring,
        }
    }

    /// Signature proofs, no optional mode collaborators.
    pub fn strict() -> Self {
        Self::new(
            MemoryVault::new(vault_document()),
            ProofScheme::signature(),
            ModeEngine::new(),
        )
    }

    /// Stage of the most recent audited failure, or `None` after a success.
    pub async fn last_failed_stage(&self) -> Option<String> {
        let recent = self.audit.recent(1).await;
        match &recent.first()?.outcome {
            AuditOutcome::Error { stage, .. } => Some(stage.clone()),
            AuditOutcome::Success { .. } => None,
        }
    }
}
