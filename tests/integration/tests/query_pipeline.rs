//! Integration test: the query pipeline end to end.
//!
//! Validation, vocabulary allow-listing, access control, evaluation and
//! auditing across vqp-core, vqp-vocabulary, vqp-engine and vqp-proof.

use std::collections::HashSet;

use chrono::{Duration, SecondsFormat, Utc};
use serde_json::json;
use vqp_core::{ErrorKind, Proof};
use vqp_engine::adapters::{AccessPolicy, AccessRule, MemoryVault};
use vqp_engine::ModeEngine;
use vqp_integration_tests::{
    financial_query, identity_query, vault_document, Harness, REQUESTER, RESPONDER,
};
use vqp_proof::ProofScheme;

// =========================================================================
// Strict answers
// =========================================================================

#[tokio::test]
async fn test_adult_age_check() {
    let h = Harness::strict();
    let query = identity_query(json!({">=": [{"var": "age"}, 18]}));
    let response = h.service.process_query(&query, None).await.unwrap();

    assert_eq!(response.result, json!(true));
    assert_eq!(response.query_id, query.id);
    assert_eq!(response.responder, RESPONDER);
    assert!(response.value.is_none(), "strict mode never discloses");
    assert!(matches!(response.proof, Proof::Signature(_)));
    assert!(h.service.verify_response(&response).await);
    assert_eq!(h.last_failed_stage().await, None);
}

#[tokio::test]
async fn test_minor_answer_is_false_not_error() {
    let h = Harness::new(
        MemoryVault::new(json!({"personal": {"age": 15}})),
        ProofScheme::signature(),
        ModeEngine::new(),
    );
    let query = identity_query(json!({">=": [{"var": "age"}, 18]}));
    let response = h.service.process_query(&query, None).await.unwrap();
    assert_eq!(response.result, json!(false));
    assert!(h.service.verify_response(&response).await);
}

#[tokio::test]
async fn test_compound_expression_and_missing_field_default() {
    let h = Harness::strict();
    let query = identity_query(json!({"and": [
        {">=": [{"var": "age"}, 21]},
        {"in": [{"var": "citizenship"}, ["US", "CA"]]},
        {"!": [{"var": ["has_drivers_license", false]}]}
    ]}));
    let response = h.service.process_query(&query, None).await.unwrap();
    assert_eq!(response.result, json!(true));
}

#[tokio::test]
async fn test_wire_round_trip_through_raw_json() {
    let h = Harness::strict();
    let query = financial_query(json!({">": [{"var": "annual_income"}, 50000]}));
    let raw = serde_json::to_value(&query).unwrap();
    let response = h.service.process_raw(&raw, None).await.unwrap();

    let wire = serde_json::to_value(&response).unwrap();
    assert_eq!(wire["queryId"], query.id);
    assert_eq!(wire["result"], true);
    assert_eq!(wire["mode"], "strict");
    assert_eq!(wire["proof"]["type"], "signature");

    let decoded = serde_json::from_value(wire).unwrap();
    assert!(h.service.verify_response(&decoded).await);
}

#[tokio::test]
async fn test_parent_and_child_fields_in_one_query() {
    let h = Harness::new(
        MemoryVault::new(json!({"supply_chain": {"certifications": ["ISO", "FairTrade"]}})),
        ProofScheme::signature(),
        ModeEngine::new(),
    );
    let query = vqp_core::Query::new(
        REQUESTER,
        "vqp:supply-chain:v1",
        json!({"and": [
            {"==": [{"var": "certifications.0"}, "ISO"]},
            {"in": ["FairTrade", {"var": "certifications"}]}
        ]}),
    );
    let response = h.service.process_query(&query, None).await.unwrap();
    assert_eq!(response.result, json!(true));
}

// =========================================================================
// Validation
// =========================================================================

#[tokio::test]
async fn test_stale_query_rejected_before_data_access() {
    let h = Harness::strict();
    let stale = (Utc::now() - Duration::hours(25)).to_rfc3339_opts(SecondsFormat::Millis, true);
    let query = identity_query(json!({">=": [{"var": "age"}, 18]})).with_timestamp(stale);

    let err = h.service.process_query(&query, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EvaluationError);
    assert_eq!(err.details.unwrap()["field"], "timestamp");
    assert_eq!(h.vault.fetches(), 0);
    assert_eq!(h.last_failed_stage().await.as_deref(), Some("validate"));
}

#[tokio::test]
async fn test_unknown_response_mode_rejected() {
    let h = Harness::strict();
    let mut raw = serde_json::to_value(identity_query(json!({">=": [{"var": "age"}, 18]}))).unwrap();
    raw["responseMode"] = json!({"type": "verbose"});

    let err = h.service.process_raw(&raw, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedResponseMode);
    assert_eq!(h.vault.fetches(), 0);

    let entry = &h.audit.recent(1).await[0];
    assert!(entry.is_error());
    assert_eq!(entry.requester.as_deref(), Some(REQUESTER));
}

#[tokio::test]
async fn test_dangerous_operator_rejected() {
    let h = Harness::strict();
    for expr in [
        json!({"eval": ["1+1"]}),
        json!({"var": "__proto__.polluted"}),
        json!({"and": [true, {"Constructor": []}]}),
    ] {
        let err = h
            .service
            .process_query(&identity_query(expr.clone()), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EvaluationError, "{}", expr);
    }
    assert_eq!(h.vault.fetches(), 0);
}

#[tokio::test]
async fn test_field_outside_vocabulary() {
    let h = Harness::strict();
    let query = identity_query(json!({">": [{"var": "credit_score"}, 600]}));
    let err = h.service.process_query(&query, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidQuery);
    assert_eq!(h.last_failed_stage().await.as_deref(), Some("schema"));
}

#[tokio::test]
async fn test_unknown_vocabulary() {
    let h = Harness::strict();
    let query = vqp_core::Query::new(REQUESTER, "vqp:astrology:v1", json!({"var": "sign"}));
    let err = h.service.process_query(&query, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::VocabularyNotFound);
}

// =========================================================================
// Authorization
// =========================================================================

#[tokio::test]
async fn test_access_denial_fetches_nothing() {
    let policy = AccessPolicy::default()
        .with_rule(AccessRule::new(REQUESTER, ["personal.age"]))
        .with_rule(AccessRule::new("did:web:bank", ["financial"]));
    let h = Harness::new(
        MemoryVault::new(vault_document()).with_policy(policy),
        ProofScheme::signature(),
        ModeEngine::new(),
    );
    let query = identity_query(json!({"and": [
        {">=": [{"var": "age"}, 18]},
        {"==": [{"var": "residency"}, "DE"]}
    ]}));

    let err = h.service.process_query(&query, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    assert_eq!(err.details.unwrap()["field"], "residency");
    assert_eq!(h.vault.fetches(), 0, "no field is fetched when any is denied");
    assert_eq!(h.last_failed_stage().await.as_deref(), Some("access"));

    let allowed = identity_query(json!({">=": [{"var": "age"}, 18]}));
    assert!(h.service.process_query(&allowed, None).await.is_ok());
    assert_eq!(h.vault.fetches(), 1);
}

#[tokio::test]
async fn test_per_call_vocabulary_allow_list() {
    let h = Harness::strict();
    let query = financial_query(json!({">": [{"var": "annual_income"}, 50000]}));

    let identity_only: HashSet<String> = ["vqp:identity:v1".to_string()].into();
    let err = h
        .service
        .process_query(&query, Some(&identity_only))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    assert_eq!(h.last_failed_stage().await.as_deref(), Some("vocabulary"));

    let financial: HashSet<String> = ["https://vqp.dev/vocab/financial/v1".to_string()].into();
    assert!(h.service.process_query(&query, Some(&financial)).await.is_ok());
}

#[tokio::test]
async fn test_every_failure_is_audited() {
    let h = Harness::strict();
    let _ = h
        .service
        .process_raw(&json!({"not": "a query"}), None)
        .await;
    let _ = h
        .service
        .process_query(&identity_query(json!({"/": [{"var": "age"}, 0]})), None)
        .await;
    let _ = h
        .service
        .process_query(&identity_query(json!({">=": [{"var": "age"}, 18]})), None)
        .await;

    let entries = h.audit.entries().await;
    assert_eq!(entries.len(), 3);
    assert!(entries[0].is_error());
    assert!(entries[1].is_error());
    assert!(!entries[2].is_error());
}
