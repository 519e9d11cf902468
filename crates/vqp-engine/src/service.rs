//! The query pipeline.
//!
//! `validate -> vocabulary -> expression -> schema -> map -> access ->
//! fetch -> evaluate -> mode -> proof -> audit`. Each stage short-circuits;
//! every failure is audited with the stage it happened in before it is
//! returned to the caller.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Map, Value};

use vqp_core::{
    now_rfc3339, AuditContext, AuditPort, CryptographicPort, DataAccessPort, EngineConfig,
    ErrorKind, Query, QueryValidator, Response, VocabularyPort, VqpError, PROTOCOL_VERSION,
};
use vqp_logic::{Expr, ExpressionEvaluator, DEFAULT_MAX_DEPTH};
use vqp_proof::{PayloadFields, ProofOrchestrator, ProofScheme};
use vqp_vocabulary::{canonical_vocabulary, VocabularyMapper, VocabularyRegistry};

use crate::adapters::TracingAuditLog;
use crate::modes::{Evaluated, ModeEngine};

pub const STAGE_VALIDATE: &str = "validate";
pub const STAGE_VOCABULARY: &str = "vocabulary";
pub const STAGE_EXPRESSION: &str = "expression";
pub const STAGE_SCHEMA: &str = "schema";
pub const STAGE_ACCESS: &str = "access";
pub const STAGE_FETCH: &str = "fetch";
pub const STAGE_EVALUATE: &str = "evaluate";
pub const STAGE_MODE: &str = "mode";
pub const STAGE_PROOF: &str = "proof";

/// A pipeline failure and where it happened.
struct StageError {
    stage: &'static str,
    error: VqpError,
}

trait AtStage<T> {
    fn at(self, stage: &'static str) -> Result<T, StageError>;
}

impl<T, E: Into<VqpError>> AtStage<T> for Result<T, E> {
    fn at(self, stage: &'static str) -> Result<T, StageError> {
        self.map_err(|e| StageError {
            stage,
            error: e.into(),
        })
    }
}

/// Keep `error` when its kind is one `expected` at this stage, otherwise
/// re-wrap it as `fallback` and record the original code as the cause.
pub fn wrap_internal(error: VqpError, expected: &[ErrorKind], fallback: ErrorKind) -> VqpError {
    if error.kind() == fallback || expected.contains(&error.kind()) {
        return error;
    }
    let mut details = json!({ "cause": error.code.code() });
    if let (Some(extra), Some(obj)) = (error.details, details.as_object_mut()) {
        obj.insert("causeDetails".into(), extra);
    }
    VqpError::new(fallback, error.message).with_details(details)
}

/// Place `value` at the dotted `field` inside `context`.
///
/// A field nested under one already present as a scalar or array is left
/// out; the evaluator reads it through the parent. Callers insert parents
/// before their children.
fn insert_field(context: &mut Map<String, Value>, field: &str, value: Value) {
    let mut segments = field.split('.').peekable();
    let mut node = context;
    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            node.entry(segment.to_string()).or_insert(value);
            return;
        }
        let child = node
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        match child {
            Value::Object(map) => node = map,
            _ => return,
        }
    }
}

/// Assemble the evaluation context, shallowest fields first.
fn build_context(mut fetched: Vec<(&String, Value)>) -> Map<String, Value> {
    fetched.sort_by_key(|(field, _)| field.split('.').count());
    let mut context = Map::new();
    for (field, value) in fetched {
        insert_field(&mut context, field, value);
    }
    context
}

/// Builder for [`VqpService`].
pub struct VqpServiceBuilder {
    config: EngineConfig,
    data: Option<Arc<dyn DataAccessPort>>,
    crypto: Option<Arc<dyn CryptographicPort>>,
    vocabulary: Option<Arc<dyn VocabularyPort>>,
    audit: Option<Arc<dyn AuditPort>>,
    mapper: VocabularyMapper,
    modes: ModeEngine,
    scheme: ProofScheme,
    trusted_signers: Vec<String>,
    max_depth: usize,
}

impl VqpServiceBuilder {
    fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            data: None,
            crypto: None,
            vocabulary: None,
            audit: None,
            mapper: VocabularyMapper::default(),
            modes: ModeEngine::default(),
            scheme: ProofScheme::default(),
            trusted_signers: Vec::new(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn data(mut self, data: Arc<dyn DataAccessPort>) -> Self {
        self.data = Some(data);
        self
    }

    pub fn crypto(mut self, crypto: Arc<dyn CryptographicPort>) -> Self {
        self.crypto = Some(crypto);
        self
    }

    /// Defaults to a [`VocabularyRegistry`] with the built-in vocabularies.
    pub fn vocabulary(mut self, vocabulary: Arc<dyn VocabularyPort>) -> Self {
        self.vocabulary = Some(vocabulary);
        self
    }

    /// Defaults to [`TracingAuditLog`].
    pub fn audit(mut self, audit: Arc<dyn AuditPort>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn mapper(mut self, mapper: VocabularyMapper) -> Self {
        self.mapper = mapper;
        self
    }

    pub fn modes(mut self, modes: ModeEngine) -> Self {
        self.modes = modes;
        self
    }

    pub fn proof_scheme(mut self, scheme: ProofScheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn trusted_signers<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.trusted_signers = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn build(self) -> Result<VqpService, VqpError> {
        self.config.validate()?;
        let data = self
            .data
            .ok_or_else(|| VqpError::configuration("a data access collaborator is required"))?;
        let crypto = self
            .crypto
            .ok_or_else(|| VqpError::configuration("a cryptographic collaborator is required"))?;
        let proofs =
            ProofOrchestrator::new(crypto, self.scheme)?.with_trusted_signers(&self.trusted_signers);

        tracing::info!(
            responder = %self.config.responder,
            scheme = %proofs.scheme(),
            mapper = ?self.mapper,
            "query service ready"
        );
        Ok(VqpService {
            validator: QueryValidator::new(self.config.clone()),
            config: self.config,
            evaluator: ExpressionEvaluator::with_max_depth(self.max_depth),
            data,
            vocabulary: self
                .vocabulary
                .unwrap_or_else(|| Arc::new(VocabularyRegistry::new())),
            audit: self.audit.unwrap_or_else(|| Arc::new(TracingAuditLog)),
            mapper: self.mapper,
            modes: self.modes,
            proofs,
        })
    }
}

/// Answers queries with proved responses.
///
/// Holds no per-query state; share it behind an `Arc`.
pub struct VqpService {
    config: EngineConfig,
    validator: QueryValidator,
    evaluator: ExpressionEvaluator,
    data: Arc<dyn DataAccessPort>,
    vocabulary: Arc<dyn VocabularyPort>,
    audit: Arc<dyn AuditPort>,
    mapper: VocabularyMapper,
    modes: ModeEngine,
    proofs: ProofOrchestrator,
}

impl VqpService {
    pub fn builder() -> VqpServiceBuilder {
        VqpServiceBuilder::new()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Process a decoded query. `allowed_vocabularies`, when given, further
    /// restricts the vocabularies this call may target.
    pub async fn process_query(
        &self,
        query: &Query,
        allowed_vocabularies: Option<&HashSet<String>>,
    ) -> Result<Response, VqpError> {
        let outcome = match self.validator.validate(query, Utc::now()).at(STAGE_VALIDATE) {
            Ok(()) => self.execute(query, allowed_vocabularies).await,
            Err(e) => Err(e),
        };
        self.finish(query, outcome).await
    }

    /// Decode, validate and process a raw JSON query.
    pub async fn process_raw(
        &self,
        raw: &Value,
        allowed_vocabularies: Option<&HashSet<String>>,
    ) -> Result<Response, VqpError> {
        let query = match self.validator.parse(raw, Utc::now()) {
            Ok(query) => query,
            Err(error) => {
                let context = AuditContext {
                    query_id: raw.get("id").and_then(Value::as_str).map(str::to_string),
                    requester: raw
                        .get("requester")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    stage: STAGE_VALIDATE.to_string(),
                };
                tracing::warn!(code = %error.code, "query rejected: {}", error.message);
                self.audit.log_error(&error, &context).await;
                return Err(error);
            }
        };
        let outcome = self.execute(&query, allowed_vocabularies).await;
        self.finish(&query, outcome).await
    }

    /// Recompute the canonical payload of `response` and check its proof.
    pub async fn verify_response(&self, response: &Response) -> bool {
        let valid = self.proofs.verify_response(response).await;
        tracing::debug!(query_id = %response.query_id, valid, "response verified");
        valid
    }

    async fn finish(
        &self,
        query: &Query,
        outcome: Result<Response, StageError>,
    ) -> Result<Response, VqpError> {
        match outcome {
            Ok(response) => {
                self.audit.log_query(query, &response).await;
                tracing::info!(
                    query_id = %query.id,
                    requester = %query.requester,
                    mode = %response.mode,
                    proof = %response.proof,
                    "query answered"
                );
                Ok(response)
            }
            Err(StageError { stage, error }) => {
                tracing::warn!(
                    query_id = %query.id,
                    requester = %query.requester,
                    stage,
                    code = %error.code,
                    "query failed: {}",
                    error.message
                );
                self.audit
                    .log_error(&error, &AuditContext::for_query(query, stage))
                    .await;
                Err(error)
            }
        }
    }

    async fn check_vocabulary_allowed(
        &self,
        vocab: &str,
        allowed_vocabularies: Option<&HashSet<String>>,
    ) -> Result<(), VqpError> {
        let canonical = canonical_vocabulary(vocab);
        let per_call = allowed_vocabularies.is_none_or(|set| {
            set.contains(vocab) || set.iter().any(|uri| canonical_vocabulary(uri) == canonical)
        });
        if per_call && self.vocabulary.is_vocabulary_allowed(vocab).await {
            Ok(())
        } else {
            Err(VqpError::unauthorized(format!("vocabulary not allowed: {}", vocab))
                .with_details(json!({ "vocabulary": vocab })))
        }
    }

    async fn execute(
        &self,
        query: &Query,
        allowed_vocabularies: Option<&HashSet<String>>,
    ) -> Result<Response, StageError> {
        let vocab = query.query.vocab.as_str();
        let requester = query.requester.as_str();

        self.check_vocabulary_allowed(vocab, allowed_vocabularies)
            .await
            .at(STAGE_VOCABULARY)?;
        let schema = self
            .vocabulary
            .resolve_vocabulary(vocab)
            .await
            .map_err(|e| wrap_internal(e, &[], ErrorKind::VocabularyNotFound))
            .at(STAGE_VOCABULARY)?;
        tracing::debug!(query_id = %query.id, vocab = %schema.uri, "vocabulary resolved");

        let parsed: Expr = self.evaluator.parse(&query.query.expr).at(STAGE_EXPRESSION)?;
        let fields = parsed.variables();

        if !self
            .vocabulary
            .validate_against_vocabulary(&query.query.expr, &schema)
            .await
        {
            let undeclared: Vec<&String> =
                fields.iter().filter(|f| !schema.declares(f)).collect();
            return Err(VqpError::invalid_query(format!(
                "expression references fields outside {}",
                schema.uri
            ))
            .with_details(json!({ "vocabulary": schema.uri, "fields": undeclared })))
            .at(STAGE_SCHEMA);
        }

        let paths = self.mapper.map_fields(&fields, vocab);
        tracing::debug!(query_id = %query.id, fields = ?fields, "fields mapped");

        for (field, path) in fields.iter().zip(&paths) {
            if !self.data.validate_data_access(path, requester).await {
                return Err(
                    VqpError::unauthorized(format!("access denied for field '{}'", field))
                        .with_details(json!({ "field": field })),
                )
                .at(STAGE_ACCESS);
            }
        }

        let mut fetched = Vec::with_capacity(fields.len());
        for (field, path) in fields.iter().zip(&paths) {
            let value = self
                .data
                .get_data(path)
                .await
                .map_err(|e| {
                    wrap_internal(e, &[ErrorKind::Unauthorized], ErrorKind::EvaluationError)
                })
                .at(STAGE_FETCH)?;
            if let Some(value) = value {
                fetched.push((field, value));
            }
        }
        let context = Value::Object(build_context(fetched));
        tracing::debug!(query_id = %query.id, fetched = fields.len(), "data fetched");

        let raw = self
            .evaluator
            .evaluate_parsed(&parsed, &context)
            .at(STAGE_EVALUATE)?;

        let evaluated = Evaluated {
            query,
            raw: &raw,
            context: &context,
            fields: &fields,
        };
        let outcome = self
            .modes
            .apply(&query.mode(), &evaluated)
            .await
            .at(STAGE_MODE)?;

        let timestamp = now_rfc3339();
        let payload = PayloadFields::new(
            query.id.clone(),
            self.config.responder.clone(),
            outcome.result.clone(),
            timestamp.clone(),
        );
        let proof = self
            .proofs
            .prove(&payload, &query.query.expr, &context)
            .await
            .at(STAGE_PROOF)?;

        Ok(Response {
            query_id: query.id.clone(),
            version: PROTOCOL_VERSION.to_string(),
            timestamp,
            responder: self.config.responder.clone(),
            mode: query.mode().kind(),
            result: outcome.result,
            value: outcome.value,
            proof,
            consent_proof: outcome.consent_proof,
            mutual_proof: outcome.mutual_proof,
            obfuscation_applied: outcome.obfuscation_applied,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{AccessPolicy, AccessRule, AuditOutcome, MemoryAuditLog, MemoryVault};
    use vqp_crypto::KeyringCrypto;

    fn vault() -> MemoryVault {
        MemoryVault::new(json!({
            "personal": {"age": 28, "citizenship": "US"},
            "financial": {"annual_income": 72500}
        }))
    }

    fn service(data: MemoryVault, audit: Arc<MemoryAuditLog>) -> VqpService {
        VqpService::builder()
            .data(Arc::new(data))
            .crypto(Arc::new(KeyringCrypto::generate("responder")))
            .audit(audit)
            .build()
            .unwrap()
    }

    fn age_query(threshold: i64) -> Query {
        Query::new(
            "did:web:verifier.example",
            "vqp:identity:v1",
            json!({">=": [{"var": "age"}, threshold]}),
        )
    }

    async fn last_stage(audit: &MemoryAuditLog) -> String {
        match &audit.recent(1).await[0].outcome {
            AuditOutcome::Error { stage, .. } => stage.clone(),
            AuditOutcome::Success { .. } => "success".into(),
        }
    }

    #[test]
    fn test_insert_field_nests() {
        let mut ctx = Map::new();
        insert_field(&mut ctx, "lab.ldl", json!(120));
        insert_field(&mut ctx, "lab.hdl", json!(60));
        insert_field(&mut ctx, "age", json!(28));
        assert_eq!(
            Value::Object(ctx),
            json!({"lab": {"ldl": 120, "hdl": 60}, "age": 28})
        );
    }

    #[test]
    fn test_context_keeps_parent_over_child() {
        let child = "certifications.0".to_string();
        let parent = "certifications".to_string();
        let ctx = build_context(vec![
            (&child, json!("ISO")),
            (&parent, json!(["ISO", "FairTrade"])),
        ]);
        assert_eq!(
            Value::Object(ctx),
            json!({"certifications": ["ISO", "FairTrade"]})
        );
    }

    #[test]
    fn test_wrap_internal() {
        let kept = wrap_internal(
            VqpError::unauthorized("no"),
            &[ErrorKind::Unauthorized],
            ErrorKind::EvaluationError,
        );
        assert_eq!(kept.kind(), ErrorKind::Unauthorized);

        let wrapped = wrap_internal(
            VqpError::crypto("disk on fire"),
            &[],
            ErrorKind::EvaluationError,
        );
        assert_eq!(wrapped.kind(), ErrorKind::EvaluationError);
        assert_eq!(wrapped.details.unwrap()["cause"], "CRYPTO_ERROR");
    }

    #[test]
    fn test_builder_requires_collaborators() {
        let err = VqpService::builder().build().err().unwrap();
        assert_eq!(err.kind(), ErrorKind::ConfigurationError);
    }

    #[tokio::test]
    async fn test_strict_query_answered_and_verifiable() {
        let audit = Arc::new(MemoryAuditLog::new());
        let svc = service(vault(), audit.clone());
        let response = svc.process_query(&age_query(18), None).await.unwrap();
        assert_eq!(response.result, json!(true));
        assert!(response.value.is_none());
        assert!(svc.verify_response(&response).await);

        let mut tampered = response.clone();
        tampered.result = json!(false);
        assert!(!svc.verify_response(&tampered).await);
        assert_eq!(last_stage(&audit).await, "success");
    }

    #[tokio::test]
    async fn test_unknown_field_is_invalid_query() {
        let audit = Arc::new(MemoryAuditLog::new());
        let svc = service(vault(), audit.clone());
        let query = Query::new(
            "did:web:verifier.example",
            "vqp:identity:v1",
            json!({"==": [{"var": "annual_income"}, 1]}),
        );
        let err = svc.process_query(&query, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidQuery);
        assert_eq!(err.details.unwrap()["fields"], json!(["annual_income"]));
        assert_eq!(last_stage(&audit).await, STAGE_SCHEMA);
    }

    #[tokio::test]
    async fn test_denied_field_stops_before_fetch() {
        let audit = Arc::new(MemoryAuditLog::new());
        let policy = AccessPolicy::default()
            .with_rule(AccessRule::new("did:web:verifier.example", ["personal.age"]));
        let svc = service(vault().with_policy(policy), audit.clone());
        let query = Query::new(
            "did:web:verifier.example",
            "vqp:identity:v1",
            json!({"and": [
                {">=": [{"var": "age"}, 18]},
                {"==": [{"var": "citizenship"}, "US"]}
            ]}),
        );
        let err = svc.process_query(&query, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert_eq!(err.details.unwrap()["field"], "citizenship");
        assert_eq!(last_stage(&audit).await, STAGE_ACCESS);
    }

    #[tokio::test]
    async fn test_per_call_allow_list() {
        let audit = Arc::new(MemoryAuditLog::new());
        let svc = service(vault(), audit.clone());
        let allowed: HashSet<String> = ["vqp:financial:v1".to_string()].into();
        let err = svc
            .process_query(&age_query(18), Some(&allowed))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert_eq!(last_stage(&audit).await, STAGE_VOCABULARY);

        let allowed: HashSet<String> = ["https://vqp.dev/vocab/identity/v1".to_string()]
            .into_iter()
            .map(|u| canonical_vocabulary(&u))
            .collect();
        assert!(svc.process_query(&age_query(18), Some(&allowed)).await.is_ok());
    }

    #[tokio::test]
    async fn test_raw_rejection_is_audited_with_raw_ids() {
        let audit = Arc::new(MemoryAuditLog::new());
        let svc = service(vault(), audit.clone());
        let raw = json!({"id": "not-a-uuid", "requester": "did:web:x"});
        let err = svc.process_raw(&raw, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EvaluationError);

        let entry = &audit.recent(1).await[0];
        assert_eq!(entry.query_id.as_deref(), Some("not-a-uuid"));
        assert_eq!(entry.requester.as_deref(), Some("did:web:x"));
        assert_eq!(last_stage(&audit).await, STAGE_VALIDATE);
    }

    #[tokio::test]
    async fn test_dangerous_expression_never_reads_data() {
        let audit = Arc::new(MemoryAuditLog::new());
        let svc = service(vault(), audit.clone());
        let query = Query::new(
            "did:web:verifier.example",
            "vqp:identity:v1",
            json!({"constructor": [{"var": "age"}]}),
        );
        let err = svc.process_query(&query, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EvaluationError);
        assert_eq!(last_stage(&audit).await, STAGE_EXPRESSION);
    }
}
