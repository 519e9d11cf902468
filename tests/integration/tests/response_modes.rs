//! Integration test: consensual, reciprocal and obfuscated disclosure
//! through the full pipeline.

use std::sync::Arc;

use serde_json::json;
use vqp_core::{
    ConsensualConfig, ErrorKind, ObfuscationConfig, ObfuscationMethod, OfferedProof,
    ReciprocalConfig, ResponseMode, ResponseModeKind,
};
use vqp_crypto::{sign_proof, KeyPair};
use vqp_engine::adapters::{
    ConsentPolicy, MemoryVault, StandardObfuscator, TrustedClaimsVerifier, SUBJECT_CLAIM,
};
use vqp_engine::ModeEngine;
use vqp_integration_tests::{
    financial_query, identity_query, keyring, vault_document, Harness, REQUESTER,
};
use vqp_proof::{canonical_json, ProofScheme};

const REGULATOR: &str = "did:web:regulator.example";

fn harness(modes: ModeEngine) -> Harness {
    Harness::new(MemoryVault::new(vault_document()), ProofScheme::signature(), modes)
}

// =========================================================================
// Consensual
// =========================================================================

#[tokio::test]
async fn test_consent_granted_discloses_value() {
    let h = harness(ModeEngine::new().with_consent(Arc::new(ConsentPolicy::granting([REQUESTER]))));
    let query = identity_query(json!({">=": [{"var": "age"}, 18]})).with_response_mode(
        ResponseMode::Consensual(ConsensualConfig {
            justification: Some("age-restricted purchase".into()),
            consent_timeout: Some(30),
        }),
    );
    let response = h.service.process_query(&query, None).await.unwrap();

    assert_eq!(response.mode, ResponseModeKind::Consensual);
    assert_eq!(response.result, json!(true));
    assert_eq!(response.value, Some(json!(28)));
    let consent = response.consent_proof.as_ref().unwrap();
    assert!(consent.granted);
    assert_eq!(consent.justification.as_deref(), Some("age-restricted purchase"));
    assert!(h.service.verify_response(&response).await);
}

#[tokio::test]
async fn test_consent_denied_withholds_value() {
    let h = harness(ModeEngine::new().with_consent(Arc::new(ConsentPolicy::granting(["did:web:someone-else"]))));
    let query = identity_query(json!({">=": [{"var": "age"}, 18]}))
        .with_response_mode(ResponseMode::Consensual(ConsensualConfig::default()));
    let response = h.service.process_query(&query, None).await.unwrap();

    assert_eq!(response.result, json!(true));
    assert!(response.value.is_none());
    assert!(!response.consent_proof.unwrap().granted);
}

#[tokio::test]
async fn test_consensual_without_handler_is_configuration_error() {
    let h = Harness::strict();
    let query = identity_query(json!({">=": [{"var": "age"}, 18]}))
        .with_response_mode(ResponseMode::Consensual(ConsensualConfig::default()));
    let err = h.service.process_query(&query, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConfigurationError);
    assert_eq!(h.last_failed_stage().await.as_deref(), Some("mode"));
}

// =========================================================================
// Reciprocal
// =========================================================================

fn regulator_key() -> KeyPair {
    KeyPair::from_seed(&[42u8; 32])
}

/// Claims the regulator issued to `subject`.
fn offer_to(subject: &str, claims: serde_json::Value) -> OfferedProof {
    let mut claims = claims.as_object().unwrap().clone();
    claims.insert(SUBJECT_CLAIM.into(), json!(subject));
    let payload = canonical_json(&serde_json::Value::Object(claims.clone())).unwrap();
    OfferedProof {
        issuer: REGULATOR.into(),
        claims,
        signature: sign_proof(&payload, &regulator_key()),
    }
}

fn offer(claims: serde_json::Value) -> OfferedProof {
    offer_to(REQUESTER, claims)
}

fn reciprocal_harness() -> Harness {
    let verifier = TrustedClaimsVerifier::new(keyring());
    verifier.add_trusted_issuer(REGULATOR, regulator_key().public_key().to_hex());
    harness(ModeEngine::new().with_mutual_verifier(Arc::new(verifier)))
}

fn reciprocal_query(offered: Option<OfferedProof>) -> vqp_core::Query {
    financial_query(json!({">": [{"var": "annual_income"}, 50000]})).with_response_mode(
        ResponseMode::Reciprocal(ReciprocalConfig {
            required_claims: vec!["licensed_lender".into()],
            requester_proof: offered,
        }),
    )
}

#[tokio::test]
async fn test_reciprocal_verified_requester() {
    let h = reciprocal_harness();
    let query = reciprocal_query(Some(offer(json!({"licensed_lender": true, "region": "EU"}))));
    let response = h.service.process_query(&query, None).await.unwrap();

    assert_eq!(response.result, json!(true));
    assert_eq!(response.value, Some(json!(72500)));
    let mutual = response.mutual_proof.as_ref().unwrap();
    assert_eq!(mutual.requester, REQUESTER);
    assert_eq!(mutual.verified_claims, vec!["licensed_lender".to_string()]);
    assert!(h.service.verify_response(&response).await);
}

#[tokio::test]
async fn test_reciprocal_missing_claim() {
    let h = reciprocal_harness();
    let query = reciprocal_query(Some(offer(json!({"licensed_lender": false}))));
    let err = h.service.process_query(&query, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReciprocalVerificationFailed);
    assert_eq!(err.details.unwrap()["missingClaims"], json!(["licensed_lender"]));
    assert_eq!(h.last_failed_stage().await.as_deref(), Some("mode"));
}

#[tokio::test]
async fn test_reciprocal_forged_offer() {
    let h = reciprocal_harness();
    let mut forged = offer(json!({"licensed_lender": true}));
    forged
        .claims
        .insert("licensed_lender".into(), json!("definitely"));
    forged.claims.insert("extra".into(), json!(1));
    let err = h
        .service
        .process_query(&reciprocal_query(Some(forged)), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReciprocalVerificationFailed);
}

#[tokio::test]
async fn test_reciprocal_offer_issued_to_someone_else() {
    let h = reciprocal_harness();
    let borrowed = offer_to("did:web:licensed-lender.example", json!({"licensed_lender": true}));
    let err = h
        .service
        .process_query(&reciprocal_query(Some(borrowed)), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReciprocalVerificationFailed);
    assert!(err.message.contains(REQUESTER));
    assert_eq!(h.vault.fetches(), 1, "the field was read but never disclosed");
}

#[tokio::test]
async fn test_reciprocal_without_offer() {
    let h = reciprocal_harness();
    let err = h
        .service
        .process_query(&reciprocal_query(None), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReciprocalVerificationFailed);
}

// =========================================================================
// Obfuscated
// =========================================================================

fn obfuscating() -> Harness {
    harness(ModeEngine::new().with_obfuscator(Arc::new(StandardObfuscator)))
}

#[tokio::test]
async fn test_range_obfuscation_of_income() {
    let h = obfuscating();
    let query = financial_query(json!({"var": "annual_income"})).with_response_mode(
        ResponseMode::Obfuscated(
            ObfuscationConfig::new(ObfuscationMethod::Range).with_precision(10000.0),
        ),
    );
    let response = h.service.process_query(&query, None).await.unwrap();

    assert_eq!(response.result, json!("70000..80000"));
    let value = response.value.as_ref().unwrap();
    assert_eq!(value["min"].as_f64(), Some(70000.0));
    assert_eq!(value["max"].as_f64(), Some(80000.0));
    let applied = response.obfuscation_applied.as_ref().unwrap();
    assert_eq!(applied.method, ObfuscationMethod::Range);
    assert_eq!(applied.precision, Some(10000.0));
    assert!(
        h.service.verify_response(&response).await,
        "the proof covers the obfuscated result"
    );
}

#[tokio::test]
async fn test_rounding_obfuscation() {
    let h = obfuscating();
    let query = financial_query(json!({"var": "annual_income"})).with_response_mode(
        ResponseMode::Obfuscated(
            ObfuscationConfig::new(ObfuscationMethod::Rounding).with_precision(2.0),
        ),
    );
    let response = h.service.process_query(&query, None).await.unwrap();
    assert_eq!(response.result.as_f64(), Some(73000.0));
}

#[tokio::test]
async fn test_boolean_result_keeps_answer_and_obfuscates_field() {
    let h = obfuscating();
    let query = financial_query(json!({">": [{"var": "annual_income"}, 50000]})).with_response_mode(
        ResponseMode::Obfuscated(
            ObfuscationConfig::new(ObfuscationMethod::Range).with_precision(10000.0),
        ),
    );
    let response = h.service.process_query(&query, None).await.unwrap();
    assert_eq!(response.result, json!(true));
    assert_eq!(response.value.unwrap()["min"].as_f64(), Some(70000.0));
}

#[tokio::test]
async fn test_noise_over_budget() {
    let h = obfuscating();
    let query = financial_query(json!({"var": "annual_income"})).with_response_mode(
        ResponseMode::Obfuscated(
            ObfuscationConfig::new(ObfuscationMethod::Noise)
                .with_noise_level(0.5)
                .with_privacy_budget(1.0),
        ),
    );
    let err = h.service.process_query(&query, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ObfuscationError);
    assert_eq!(h.last_failed_stage().await.as_deref(), Some("mode"));
}

#[tokio::test]
async fn test_obfuscating_non_numeric_field() {
    let h = obfuscating();
    let query = identity_query(json!({"==": [{"var": "citizenship"}, "US"]})).with_response_mode(
        ResponseMode::Obfuscated(ObfuscationConfig::new(ObfuscationMethod::Rounding)),
    );
    let err = h.service.process_query(&query, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ObfuscationError);
}
