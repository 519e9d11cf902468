use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::Mutex;

use vqp_core::{AuditContext, AuditPort, Query, Response, ResponseModeKind, VqpError};

/// Default number of entries kept by [`MemoryAuditLog`].
pub const DEFAULT_AUDIT_CAPACITY: usize = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum AuditOutcome {
    Success {
        mode: ResponseModeKind,
        result: serde_json::Value,
        proof: String,
    },
    Error {
        code: String,
        message: String,
        stage: String,
    },
}

/// One audited query or failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub recorded_at: DateTime<Utc>,
    pub query_id: Option<String>,
    pub requester: Option<String>,
    #[serde(flatten)]
    pub outcome: AuditOutcome,
}

impl AuditEntry {
    pub fn is_error(&self) -> bool {
        matches!(self.outcome, AuditOutcome::Error { .. })
    }
}

/// Bounded in-memory ring buffer; the oldest entry is dropped when full.
pub struct MemoryAuditLog {
    entries: Mutex<VecDeque<AuditEntry>>,
    capacity: usize,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_AUDIT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_AUDIT_CAPACITY))),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    async fn push(&self, entry: AuditEntry) {
        let mut entries = self.entries.lock().await;
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Entries, oldest first.
    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().await.iter().cloned().collect()
    }

    /// The most recent `n` entries, oldest first.
    pub async fn recent(&self, n: usize) -> Vec<AuditEntry> {
        let entries = self.entries.lock().await;
        let skip = entries.len().saturating_sub(n);
        entries.iter().skip(skip).cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

impl Default for MemoryAuditLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditPort for MemoryAuditLog {
    async fn log_query(&self, query: &Query, response: &Response) {
        self.push(AuditEntry {
            recorded_at: Utc::now(),
            query_id: Some(query.id.clone()),
            requester: Some(query.requester.clone()),
            outcome: AuditOutcome::Success {
                mode: response.mode,
                result: response.result.clone(),
                proof: response.proof.proof_type().to_string(),
            },
        })
        .await;
    }

    async fn log_error(&self, error: &VqpError, context: &AuditContext) {
        self.push(AuditEntry {
            recorded_at: Utc::now(),
            query_id: context.query_id.clone(),
            requester: context.requester.clone(),
            outcome: AuditOutcome::Error {
                code: error.code.code().to_string(),
                message: error.message.clone(),
                stage: context.stage.clone(),
            },
        })
        .await;
    }
}

/// Writes audit records as structured log events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditLog;

#[async_trait]
impl AuditPort for TracingAuditLog {
    async fn log_query(&self, query: &Query, response: &Response) {
        tracing::info!(
            target: "vqp::audit",
            query_id = %query.id,
            requester = %query.requester,
            mode = %response.mode,
            result = %response.result,
            proof = %response.proof,
            "query answered"
        );
    }

    async fn log_error(&self, error: &VqpError, context: &AuditContext) {
        tracing::warn!(
            target: "vqp::audit",
            query_id = context.query_id.as_deref().unwrap_or("-"),
            requester = context.requester.as_deref().unwrap_or("-"),
            stage = %context.stage,
            code = %error.code,
            "query failed: {}",
            error.message
        );
    }
}
