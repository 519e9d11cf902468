use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use vqp_core::{
    CryptographicPort, MutualVerification, MutualVerificationPort, OfferedProof, VqpError,
};
use vqp_logic::truthy;
use vqp_proof::canonical_json;

/// Signed claim naming the DID the claims were issued to.
pub const SUBJECT_CLAIM: &str = "subject";

/// Result of checking an offered proof.
#[derive(Debug, Clone)]
pub struct VerificationResult {
    /// Whether every check passed.
    pub valid: bool,
    /// Individual check results.
    pub checks: Vec<VerificationCheck>,
    /// Required claims the proof establishes.
    pub verified_claims: Vec<String>,
}

impl VerificationResult {
    /// First failing check, if any.
    pub fn first_failure(&self) -> Option<&VerificationCheck> {
        self.checks.iter().find(|c| !c.passed)
    }
}

/// An individual verification check.
#[derive(Debug, Clone)]
pub struct VerificationCheck {
    /// Name of the check.
    pub name: String,
    /// Whether the check passed.
    pub passed: bool,
    /// Optional detail message.
    pub detail: Option<String>,
}

impl VerificationCheck {
    fn new(name: &str, passed: bool, failure: impl FnOnce() -> String) -> Self {
        Self {
            name: name.to_string(),
            passed,
            detail: (!passed).then(failure),
        }
    }
}

/// Verifies requester claims signed by trusted issuers.
pub struct TrustedClaimsVerifier {
    crypto: Arc<dyn CryptographicPort>,
    /// Trusted issuer DIDs to hex public keys.
    trusted_issuers: DashMap<String, String>,
}

impl TrustedClaimsVerifier {
    pub fn new(crypto: Arc<dyn CryptographicPort>) -> Self {
        Self {
            crypto,
            trusted_issuers: DashMap::new(),
        }
    }

    pub fn add_trusted_issuer(&self, did: impl Into<String>, public_key_hex: impl Into<String>) {
        let did = did.into();
        tracing::debug!(issuer = %did, "trusted issuer added");
        self.trusted_issuers.insert(did, public_key_hex.into());
    }

    pub fn remove_trusted_issuer(&self, did: &str) -> bool {
        self.trusted_issuers.remove(did).is_some()
    }

    pub fn is_trusted_issuer(&self, did: &str) -> bool {
        self.trusted_issuers.contains_key(did)
    }

    pub fn trusted_issuer_count(&self) -> usize {
        self.trusted_issuers.len()
    }

    /// Run every check against `offered`, presented by `requester`.
    pub async fn check(
        &self,
        requester: &str,
        offered: &OfferedProof,
        required_claims: &[String],
    ) -> VerificationResult {
        let mut checks = Vec::new();

        let trusted_key = self
            .trusted_issuers
            .get(&offered.issuer)
            .map(|entry| entry.value().clone());
        checks.push(VerificationCheck::new(
            "issuer_trusted",
            trusted_key.is_some(),
            || format!("issuer {} is not trusted", offered.issuer),
        ));

        let key_matches = trusted_key
            .as_deref()
            .is_some_and(|key| key.eq_ignore_ascii_case(&offered.signature.public_key));
        checks.push(VerificationCheck::new("issuer_key", key_matches, || {
            "proof was not signed with the issuer's key".to_string()
        }));

        let sig_valid = match (&trusted_key, key_matches) {
            (Some(key), true) => match canonical_json(&serde_json::Value::Object(offered.claims.clone())) {
                Ok(payload) => self.crypto.verify(&offered.signature, &payload, key).await,
                Err(_) => false,
            },
            _ => false,
        };
        checks.push(VerificationCheck::new("signature_valid", sig_valid, || {
            "signature verification failed".to_string()
        }));

        let subject = offered.claims.get(SUBJECT_CLAIM).and_then(|v| v.as_str());
        let subject_matches = sig_valid && subject == Some(requester);
        checks.push(VerificationCheck::new("subject_matches", subject_matches, || {
            format!(
                "claims were issued to {}, not {}",
                subject.unwrap_or("no subject"),
                requester
            )
        }));

        let verified_claims: Vec<String> = if subject_matches {
            required_claims
                .iter()
                .filter(|claim| offered.claims.get(claim.as_str()).is_some_and(truthy))
                .cloned()
                .collect()
        } else {
            Vec::new()
        };
        let claims_present = subject_matches && verified_claims.len() == required_claims.len();
        checks.push(VerificationCheck::new("claims_present", claims_present, || {
            let missing: Vec<&str> = required_claims
                .iter()
                .filter(|c| !verified_claims.contains(c))
                .map(String::as_str)
                .collect();
            format!("missing claims: {}", missing.join(", "))
        }));

        let valid = checks.iter().all(|c| c.passed);
        VerificationResult {
            valid,
            checks,
            verified_claims,
        }
    }
}

#[async_trait]
impl MutualVerificationPort for TrustedClaimsVerifier {
    async fn verify_requester(
        &self,
        requester: &str,
        offered: &OfferedProof,
        required_claims: &[String],
    ) -> Result<MutualVerification, VqpError> {
        let result = self.check(requester, offered, required_claims).await;
        let reason = result.first_failure().and_then(|c| c.detail.clone());
        if result.valid {
            tracing::info!(requester, issuer = %offered.issuer, "requester verified");
        } else {
            tracing::warn!(
                requester,
                issuer = %offered.issuer,
                reason = reason.as_deref().unwrap_or("unknown"),
                "requester verification failed"
            );
        }
        Ok(MutualVerification {
            verified: result.valid,
            verified_claims: result.verified_claims,
            reason,
        })
    }
}
