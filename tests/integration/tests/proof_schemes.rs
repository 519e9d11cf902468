//! Integration test: zero-knowledge and multi-signature proofs attached by
//! the pipeline, verified independently of the producing service.

use serde_json::json;
use vqp_core::{ErrorKind, Proof};
use vqp_engine::adapters::MemoryVault;
use vqp_engine::ModeEngine;
use vqp_integration_tests::{identity_query, vault_document, Harness};
use vqp_proof::{ProofOrchestrator, ProofScheme};

fn zk_harness(document: serde_json::Value) -> Harness {
    Harness::new(
        MemoryVault::new(document),
        ProofScheme::ZeroKnowledge,
        ModeEngine::new(),
    )
}

// =========================================================================
// Zero-knowledge
// =========================================================================

#[tokio::test]
async fn test_zk_threshold_true() {
    let h = zk_harness(vault_document());
    let query = identity_query(json!({">=": [{"var": "age"}, 18]}));
    let response = h.service.process_query(&query, None).await.unwrap();

    assert_eq!(response.result, json!(true));
    let Proof::ZkProof(zk) = &response.proof else {
        panic!("expected a zero-knowledge proof, got {}", response.proof);
    };
    assert_eq!(zk.circuit, "range_threshold");
    assert_eq!(zk.public_inputs["threshold"], 18);
    assert!(
        zk.public_inputs.values().all(|v| v != &json!(28)),
        "the witness never appears in public inputs"
    );
    assert!(!zk.public_inputs.contains_key("value"));
    assert!(h.service.verify_response(&response).await);
}

#[tokio::test]
async fn test_zk_threshold_false() {
    let h = zk_harness(json!({"personal": {"age": 15}}));
    let query = identity_query(json!({">=": [{"var": "age"}, 18]}));
    let response = h.service.process_query(&query, None).await.unwrap();
    assert_eq!(response.result, json!(false));
    assert!(h.service.verify_response(&response).await);

    let mut flipped = response.clone();
    flipped.result = json!(true);
    assert!(!h.service.verify_response(&flipped).await);
}

#[tokio::test]
async fn test_zk_mirrored_comparison() {
    let h = zk_harness(vault_document());
    let query = identity_query(json!({"<": [65, {"var": "age"}]}));
    let response = h.service.process_query(&query, None).await.unwrap();
    assert_eq!(response.result, json!(false));
    assert!(h.service.verify_response(&response).await);
}

#[tokio::test]
async fn test_zk_set_membership() {
    let h = zk_harness(vault_document());
    let query = identity_query(json!({"in": [{"var": "citizenship"}, ["US", "CA", "MX"]]}));
    let response = h.service.process_query(&query, None).await.unwrap();
    assert_eq!(response.result, json!(true));
    let Proof::ZkProof(zk) = &response.proof else {
        panic!("expected a zero-knowledge proof");
    };
    assert_eq!(zk.circuit, "set_membership");
    assert!(h.service.verify_response(&response).await);
}

#[tokio::test]
async fn test_zk_unprovable_expression() {
    let h = zk_harness(vault_document());
    let query = identity_query(json!({"and": [
        {">=": [{"var": "age"}, 18]},
        {"==": [{"var": "citizenship"}, "US"]}
    ]}));
    let err = h.service.process_query(&query, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EvaluationError);
    assert_eq!(err.details.unwrap()["backend"], "zk");
    assert_eq!(h.last_failed_stage().await.as_deref(), Some("proof"));
}

// =========================================================================
// Multi-signature
// =========================================================================

#[tokio::test]
async fn test_multisig_threshold_met() {
    let h = Harness::new(
        MemoryVault::new(vault_document()),
        ProofScheme::multi_signature(2, ["k1", "k2", "k3"]),
        ModeEngine::new(),
    );
    let query = identity_query(json!({">=": [{"var": "age"}, 18]}));
    let response = h.service.process_query(&query, None).await.unwrap();

    let Proof::MultiSignature(multi) = &response.proof else {
        panic!("expected a multi-signature proof");
    };
    assert_eq!(multi.threshold, 2);
    assert_eq!(multi.signatures.len(), 2);
    assert!(h.service.verify_response(&response).await);

    // A verifier that only has the public keys reaches the same verdict.
    let verifier = ProofOrchestrator::new(h.keyring.clone(), ProofScheme::signature())
        .unwrap()
        .with_trusted_signers(
            ["k1", "k2", "k3"]
                .iter()
                .filter_map(|id| h.keyring.public_key(id))
                .map(|pk| pk.to_hex()),
        );
    assert!(verifier.verify_response(&response).await);
}

#[tokio::test]
async fn test_multisig_below_threshold_fails_verification() {
    let h = Harness::new(
        MemoryVault::new(vault_document()),
        ProofScheme::multi_signature(2, ["k1", "k2"]),
        ModeEngine::new(),
    );
    let query = identity_query(json!({">=": [{"var": "age"}, 18]}));
    let response = h.service.process_query(&query, None).await.unwrap();

    let mut stripped = response.clone();
    if let Proof::MultiSignature(multi) = &mut stripped.proof {
        multi.signatures.truncate(1);
    }
    assert!(!h.service.verify_response(&stripped).await);

    let mut duplicated = response.clone();
    if let Proof::MultiSignature(multi) = &mut duplicated.proof {
        let first = multi.signatures[0].clone();
        multi.signatures = vec![first.clone(), first];
    }
    assert!(
        !h.service.verify_response(&duplicated).await,
        "one signer counted twice does not meet the threshold"
    );
}

#[tokio::test]
async fn test_multisig_missing_signer_fails_proof() {
    let h = Harness::new(
        MemoryVault::new(vault_document()),
        ProofScheme::multi_signature(2, ["k1", "unknown"]),
        ModeEngine::new(),
    );
    let query = identity_query(json!({">=": [{"var": "age"}, 18]}));
    let err = h.service.process_query(&query, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SignatureFailed);
}
