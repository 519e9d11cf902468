//! Structural and temporal validation of inbound queries.
//!
//! Validation is pure: it never touches the vault or any collaborator, so a
//! rejected query cannot cause a data access.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::VqpError;
use crate::mode::KNOWN_MODE_TAGS;
use crate::types::{Query, QUERY_LANG};

/// Fields every query must carry, in the order they are checked.
const REQUIRED_FIELDS: &[&[&str]] = &[
    &["id"],
    &["version"],
    &["timestamp"],
    &["requester"],
    &["query", "lang"],
    &["query", "vocab"],
    &["query", "expr"],
];

/// Validates queries against the engine configuration.
#[derive(Debug, Clone)]
pub struct QueryValidator {
    config: EngineConfig,
}

impl QueryValidator {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Decode and validate a raw JSON query.
    ///
    /// Checks run in order and stop at the first violation: required fields,
    /// response mode tag, typed decoding, then [`QueryValidator::validate`].
    pub fn parse(&self, raw: &serde_json::Value, now: DateTime<Utc>) -> Result<Query, VqpError> {
        if !raw.is_object() {
            return Err(VqpError::validation("query", "query must be a JSON object"));
        }

        for path in REQUIRED_FIELDS {
            let present = lookup(raw, path).is_some_and(|v| !v.is_null());
            if !present {
                let field = path.join(".");
                return Err(VqpError::validation(
                    &field,
                    format!("missing required field: {}", field),
                ));
            }
        }

        let mut raw = raw.clone();
        normalize_response_mode(&mut raw)?;

        let query: Query = serde_json::from_value(raw).map_err(|e| {
            VqpError::validation("query", format!("malformed query: {}", e))
        })?;

        self.validate(&query, now)?;
        Ok(query)
    }

    /// Validate an already-decoded query at time `now`.
    pub fn validate(&self, query: &Query, now: DateTime<Utc>) -> Result<(), VqpError> {
        let required: [(&str, &str); 6] = [
            ("id", &query.id),
            ("version", &query.version),
            ("timestamp", &query.timestamp),
            ("requester", &query.requester),
            ("query.lang", &query.query.lang),
            ("query.vocab", &query.query.vocab),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(VqpError::validation(
                    field,
                    format!("missing required field: {}", field),
                ));
            }
        }
        if query.query.expr.is_null() {
            return Err(VqpError::validation(
                "query.expr",
                "missing required field: query.expr",
            ));
        }

        if !is_uuid_v4(&query.id) {
            return Err(VqpError::validation(
                "id",
                format!("id must be a UUIDv4, got: {}", query.id),
            ));
        }

        if !self
            .config
            .supported_versions
            .iter()
            .any(|v| v == &query.version)
        {
            return Err(VqpError::validation(
                "version",
                format!("unsupported protocol version: {}", query.version),
            ));
        }

        let issued = DateTime::parse_from_rfc3339(&query.timestamp)
            .map_err(|e| {
                VqpError::validation("timestamp", format!("invalid timestamp: {}", e))
            })?
            .with_timezone(&Utc);
        let age = now.signed_duration_since(issued);
        if age > self.config.freshness_window() {
            return Err(VqpError::validation(
                "timestamp",
                format!(
                    "query timestamp is outside the freshness window ({}s old, max {}s)",
                    age.num_seconds(),
                    self.config.freshness_window_secs
                ),
            ));
        }
        if -age > self.config.clock_skew() {
            return Err(VqpError::validation(
                "timestamp",
                "query timestamp is in the future",
            ));
        }

        if query.query.lang != QUERY_LANG {
            return Err(VqpError::validation(
                "query.lang",
                format!(
                    "unsupported query language: {} (expected {})",
                    query.query.lang, QUERY_LANG
                ),
            ));
        }

        tracing::debug!(query_id = %query.id, requester = %query.requester, "query validated");
        Ok(())
    }
}

fn lookup<'a>(value: &'a serde_json::Value, path: &[&str]) -> Option<&'a serde_json::Value> {
    path.iter().try_fold(value, |current, key| current.get(*key))
}

/// Reject unknown mode tags and give config-less modes an empty config so
/// that `{"type": "consensual"}` decodes.
fn normalize_response_mode(raw: &mut serde_json::Value) -> Result<(), VqpError> {
    let Some(mode) = raw.get_mut("responseMode") else {
        return Ok(());
    };
    if mode.is_null() {
        return Ok(());
    }
    let tag = mode
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or_else(|| VqpError::unsupported_mode("<missing>"))?
        .to_string();
    if !KNOWN_MODE_TAGS.contains(&tag.as_str()) {
        return Err(VqpError::unsupported_mode(&tag));
    }
    if tag == "strict" {
        if let Some(obj) = mode.as_object_mut() {
            obj.remove("config");
        }
    } else if mode.get("config").is_none_or(|c| c.is_null()) {
        if let Some(obj) = mode.as_object_mut() {
            obj.insert("config".into(), serde_json::json!({}));
        }
    }
    Ok(())
}

/// Whether `id` is a hyphenated RFC 4122 version-4 UUID.
pub fn is_uuid_v4(id: &str) -> bool {
    if id.len() != 36 {
        return false;
    }
    match Uuid::parse_str(id) {
        Ok(uuid) => uuid.get_version_num() == 4 && uuid.get_variant() == uuid::Variant::RFC4122,
        Err(_) => false,
    }
}
