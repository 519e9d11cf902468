//! Response modes: what, beyond the raw result, a response may disclose.

use std::sync::Arc;

use serde_json::Value;
use vqp_core::{
    now_rfc3339, ConsensualConfig, ConsentPort, ConsentProof, ConsentRequest, ErrorKind,
    MutualProof, MutualVerificationPort, ObfuscationApplied, ObfuscationConfig, ObfuscationPort,
    Query, ReciprocalConfig, ResponseMode, VqpError,
};
use vqp_logic::lookup;

/// Response fields produced by a mode.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModeOutcome {
    pub result: Value,
    pub value: Option<Value>,
    pub consent_proof: Option<ConsentProof>,
    pub mutual_proof: Option<MutualProof>,
    pub obfuscation_applied: Option<ObfuscationApplied>,
}

impl ModeOutcome {
    fn strict(result: Value) -> Self {
        Self {
            result,
            ..Default::default()
        }
    }
}

/// What the evaluation produced, as seen by the modes.
pub struct Evaluated<'a> {
    pub query: &'a Query,
    pub raw: &'a Value,
    /// Evaluation context keyed by protocol field names.
    pub context: &'a Value,
    /// Referenced fields in first-occurrence order.
    pub fields: &'a [String],
}

impl Evaluated<'_> {
    /// The value a disclosing mode reveals: a numeric result itself,
    /// otherwise the first referenced field.
    pub fn disclosure_target(&self) -> Value {
        if self.raw.is_number() {
            return self.raw.clone();
        }
        self.fields
            .first()
            .and_then(|field| lookup(self.context, field))
            .cloned()
            .unwrap_or(Value::Null)
    }
}

/// Applies the requested [`ResponseMode`] using the configured collaborators.
#[derive(Clone, Default)]
pub struct ModeEngine {
    consent: Option<Arc<dyn ConsentPort>>,
    mutual: Option<Arc<dyn MutualVerificationPort>>,
    obfuscator: Option<Arc<dyn ObfuscationPort>>,
}

impl ModeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_consent(mut self, port: Arc<dyn ConsentPort>) -> Self {
        self.consent = Some(port);
        self
    }

    pub fn with_mutual_verifier(mut self, port: Arc<dyn MutualVerificationPort>) -> Self {
        self.mutual = Some(port);
        self
    }

    pub fn with_obfuscator(mut self, port: Arc<dyn ObfuscationPort>) -> Self {
        self.obfuscator = Some(port);
        self
    }

    pub async fn apply(
        &self,
        mode: &ResponseMode,
        evaluated: &Evaluated<'_>,
    ) -> Result<ModeOutcome, VqpError> {
        if evaluated.raw.is_array() || evaluated.raw.is_object() {
            return Err(VqpError::evaluation(
                "expression must evaluate to a scalar or null",
            ));
        }
        match mode {
            ResponseMode::Strict => Ok(ModeOutcome::strict(evaluated.raw.clone())),
            ResponseMode::Consensual(config) => self.consensual(config, evaluated).await,
            ResponseMode::Reciprocal(config) => self.reciprocal(config, evaluated).await,
            ResponseMode::Obfuscated(config) => self.obfuscated(config, evaluated).await,
        }
    }

    async fn consensual(
        &self,
        config: &ConsensualConfig,
        evaluated: &Evaluated<'_>,
    ) -> Result<ModeOutcome, VqpError> {
        let port = self
            .consent
            .as_ref()
            .ok_or_else(|| VqpError::configuration("consensual mode requires a consent handler"))?;
        let request = ConsentRequest {
            query_id: evaluated.query.id.clone(),
            requester: evaluated.query.requester.clone(),
            fields: evaluated.fields.to_vec(),
            justification: config.justification.clone(),
            timeout_secs: config.consent_timeout,
        };
        let decision = port.request_consent(&request).await?;
        tracing::debug!(
            query_id = %request.query_id,
            granted = decision.granted,
            "consent decided"
        );

        let consent_proof = ConsentProof {
            granted: decision.granted,
            timestamp: decision.decided_at.to_rfc3339(),
            justification: config.justification.clone(),
        };
        Ok(ModeOutcome {
            result: evaluated.raw.clone(),
            value: decision.granted.then(|| evaluated.disclosure_target()),
            consent_proof: Some(consent_proof),
            ..Default::default()
        })
    }

    async fn reciprocal(
        &self,
        config: &ReciprocalConfig,
        evaluated: &Evaluated<'_>,
    ) -> Result<ModeOutcome, VqpError> {
        let port = self.mutual.as_ref().ok_or_else(|| {
            VqpError::configuration("reciprocal mode requires a mutual verifier")
        })?;
        let offered = config
            .requester_proof
            .as_ref()
            .ok_or_else(|| VqpError::reciprocal_failed("requester offered no proof"))?;

        let requester = &evaluated.query.requester;
        let verification = port
            .verify_requester(requester, offered, &config.required_claims)
            .await
            .map_err(|e| {
                if e.kind() == ErrorKind::ReciprocalVerificationFailed {
                    e
                } else {
                    VqpError::reciprocal_failed(format!("requester verification failed: {}", e))
                }
            })?;

        let missing: Vec<&String> = config
            .required_claims
            .iter()
            .filter(|claim| !verification.verified_claims.contains(claim))
            .collect();
        if !verification.verified || !missing.is_empty() {
            let reason = verification
                .reason
                .unwrap_or_else(|| "required claims not verified".to_string());
            return Err(VqpError::reciprocal_failed(reason)
                .with_details(serde_json::json!({ "missingClaims": missing })));
        }

        Ok(ModeOutcome {
            result: evaluated.raw.clone(),
            value: Some(evaluated.disclosure_target()),
            mutual_proof: Some(MutualProof {
                requester: requester.clone(),
                verified_claims: verification.verified_claims,
                timestamp: now_rfc3339(),
            }),
            ..Default::default()
        })
    }

    async fn obfuscated(
        &self,
        config: &ObfuscationConfig,
        evaluated: &Evaluated<'_>,
    ) -> Result<ModeOutcome, VqpError> {
        let port = self.obfuscator.as_ref().ok_or_else(|| {
            VqpError::configuration("obfuscated mode requires an obfuscation backend")
        })?;
        let target = evaluated.disclosure_target();
        if !target.is_number() {
            return Err(VqpError::obfuscation(format!(
                "{} cannot be applied to a non-numeric value",
                config.method
            )));
        }
        let obfuscated = port.obfuscate(&target, config).await.map_err(|e| {
            if e.kind() == ErrorKind::ObfuscationError {
                e
            } else {
                VqpError::obfuscation(e.message)
            }
        })?;

        // A numeric result is itself the disclosed value, so it is replaced.
        let result = if evaluated.raw.is_number() {
            obfuscated.scalar
        } else {
            evaluated.raw.clone()
        };
        Ok(ModeOutcome {
            result,
            value: Some(obfuscated.value),
            obfuscation_applied: Some(obfuscated.applied),
            ..Default::default()
        })
    }
}
