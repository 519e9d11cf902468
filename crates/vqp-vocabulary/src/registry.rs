use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use vqp_core::{FieldDefinition, VocabularyPort, VocabularySchema, VqpError};
use vqp_logic::ExpressionEvaluator;

use crate::error::VocabularyError;
use crate::mapping::canonical_vocabulary;
use crate::source::SchemaSource;

/// Default lifetime of a fetched schema.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

struct CachedSchema {
    schema: VocabularySchema,
    fetched_at: Instant,
}

/// Registry of vocabulary schemas.
///
/// Registered schemas (including the built-in standard vocabularies) never
/// expire. Schemas fetched from the optional [`SchemaSource`] are cached for
/// the configured TTL.
pub struct VocabularyRegistry {
    schemas: DashMap<String, VocabularySchema>,
    cache: DashMap<String, CachedSchema>,
    allowed: Option<HashSet<String>>,
    source: Option<Arc<dyn SchemaSource>>,
    cache_ttl: Duration,
    evaluator: ExpressionEvaluator,
}

impl VocabularyRegistry {
    /// Create a registry holding the built-in vocabularies.
    pub fn new() -> Self {
        let registry = Self::empty();
        registry.register_builtins();
        registry
    }

    /// Create a registry without any schemas.
    pub fn empty() -> Self {
        Self {
            schemas: DashMap::new(),
            cache: DashMap::new(),
            allowed: None,
            source: None,
            cache_ttl: DEFAULT_CACHE_TTL,
            evaluator: ExpressionEvaluator::new(),
        }
    }

    /// Restrict the vocabularies queries may target.
    pub fn with_allowed<I, S>(mut self, uris: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allowed = Some(
            uris.into_iter()
                .map(|u| canonical_vocabulary(u.as_ref()))
                .collect(),
        );
        self
    }

    pub fn with_source(mut self, source: Arc<dyn SchemaSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    fn register_builtins(&self) {
        let builtins: [(&str, &str, &[(&str, &str, &str)]); 6] = [
            (
                "vqp:identity:v1",
                "Identity",
                &[
                    ("age", "integer", "Age in whole years"),
                    ("citizenship", "string", "Country of citizenship (ISO 3166-1 alpha-2)"),
                    ("residency", "string", "Country of residence"),
                    ("has_drivers_license", "boolean", "Holds a valid driver's license"),
                    ("email_verified", "boolean", "Email address has been verified"),
                    ("phone_verified", "boolean", "Phone number has been verified"),
                ],
            ),
            (
                "vqp:financial:v1",
                "Financial",
                &[
                    ("annual_income", "number", "Gross annual income"),
                    ("employment_status", "string", "employed, self_employed, unemployed, retired"),
                    ("credit_score", "integer", "Credit score"),
                    ("debt_to_income_ratio", "number", "Monthly debt over monthly income"),
                    ("net_worth", "number", "Total assets minus liabilities"),
                    ("account_balance", "number", "Current account balance"),
                ],
            ),
            (
                "vqp:health:v1",
                "Health",
                &[
                    ("vaccinations", "array", "Completed vaccinations"),
                    ("blood_type", "string", "ABO blood group"),
                    ("bmi", "number", "Body mass index"),
                    ("chronic_conditions", "array", "Diagnosed chronic conditions"),
                    ("allergies", "array", "Known allergies"),
                    ("lab", "object", "Recent laboratory results"),
                ],
            ),
            (
                "vqp:metrics:v1",
                "System Metrics",
                &[
                    ("uptime_percentage_24h", "number", "Uptime over the last 24 hours"),
                    ("response_time_p95", "number", "95th percentile response time in ms"),
                    ("error_rate", "number", "Errors per request"),
                    ("cpu_usage", "number", "CPU utilisation percentage"),
                    ("memory_usage", "number", "Memory utilisation percentage"),
                    ("processed_events_last_hour", "integer", "Events processed in the last hour"),
                ],
            ),
            (
                "vqp:academic:v1",
                "Academic",
                &[
                    ("degree", "string", "Highest degree obtained"),
                    ("gpa", "number", "Grade point average"),
                    ("graduation_year", "integer", "Year of graduation"),
                    ("institution", "string", "Awarding institution"),
                    ("certifications", "array", "Professional certifications"),
                    ("enrolled", "boolean", "Currently enrolled"),
                ],
            ),
            (
                "vqp:supply-chain:v1",
                "Supply Chain",
                &[
                    ("origin_country", "string", "Country of origin"),
                    ("certifications", "array", "Product certifications"),
                    ("carbon_footprint_kg", "number", "Carbon footprint in kilograms CO2e"),
                    ("organic", "boolean", "Certified organic"),
                    ("batch_id", "string", "Production batch identifier"),
                    ("temperature_compliant", "boolean", "Cold chain stayed within bounds"),
                ],
            ),
        ];

        for (uri, name, fields) in builtins {
            self.schemas.insert(
                uri.to_string(),
                VocabularySchema {
                    uri: uri.to_string(),
                    name: name.to_string(),
                    version: "1.0.0".to_string(),
                    fields: fields
                        .iter()
                        .map(|(field, ty, description)| FieldDefinition {
                            name: field.to_string(),
                            field_type: ty.to_string(),
                            description: Some(description.to_string()),
                        })
                        .collect(),
                },
            );
        }
    }

    /// Register a custom schema.
    pub fn register(&self, schema: VocabularySchema) -> Result<(), VocabularyError> {
        if schema.fields.is_empty() {
            return Err(VocabularyError::InvalidSchema(
                "schema must declare at least one field".into(),
            ));
        }
        let uri = canonical_vocabulary(&schema.uri);
        tracing::info!(uri = %uri, fields = schema.fields.len(), "vocabulary registered");
        self.schemas.insert(uri, schema);
        Ok(())
    }

    /// Get a registered schema by URI (either form of a standard URI).
    pub fn get(&self, uri: &str) -> Option<VocabularySchema> {
        self.schemas
            .get(&canonical_vocabulary(uri))
            .map(|entry| entry.clone())
    }

    /// List registered schema URIs, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut uris: Vec<String> = self.schemas.iter().map(|e| e.key().clone()).collect();
        uris.sort();
        uris
    }

    /// Number of registered schemas.
    pub fn count(&self) -> usize {
        self.schemas.len()
    }

    /// Number of fetched schemas currently cached.
    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }

    pub fn is_allowed(&self, uri: &str) -> bool {
        match &self.allowed {
            None => true,
            Some(allowed) => allowed.contains(&canonical_vocabulary(uri)),
        }
    }

    /// Resolve a schema: registered first, then the cache, then the source.
    pub async fn resolve(&self, uri: &str) -> Result<VocabularySchema, VocabularyError> {
        let key = canonical_vocabulary(uri);
        if let Some(schema) = self.schemas.get(&key) {
            return Ok(schema.clone());
        }

        if let Some(entry) = self.cache.get(&key) {
            if entry.fetched_at.elapsed() < self.cache_ttl {
                tracing::trace!(uri = %key, "vocabulary cache hit");
                return Ok(entry.schema.clone());
            }
        }
        self.cache.remove(&key);

        let source = self
            .source
            .as_ref()
            .ok_or_else(|| VocabularyError::NotFound(uri.to_string()))?;
        let schema = source
            .fetch(&key)
            .await?
            .ok_or_else(|| VocabularyError::NotFound(uri.to_string()))?;

        tracing::debug!(uri = %key, "vocabulary fetched");
        self.cache.insert(
            key,
            CachedSchema {
                schema: schema.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(schema)
    }
}

impl Default for VocabularyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VocabularyPort for VocabularyRegistry {
    async fn resolve_vocabulary(&self, uri: &str) -> Result<VocabularySchema, VqpError> {
        self.resolve(uri).await.map_err(|e| {
            tracing::warn!(uri, error = %e, "vocabulary resolution failed");
            VqpError::vocabulary_not_found(uri)
                .with_details(serde_json::json!({ "vocabulary": uri, "reason": e.to_string() }))
        })
    }

    async fn is_vocabulary_allowed(&self, uri: &str) -> bool {
        self.is_allowed(uri)
    }

    async fn validate_against_vocabulary(
        &self,
        expr: &serde_json::Value,
        schema: &VocabularySchema,
    ) -> bool {
        match self.evaluator.extract_variables(expr) {
            Ok(fields) => fields.iter().all(|field| schema.declares(field)),
            Err(_) => false,
        }
    }
}
