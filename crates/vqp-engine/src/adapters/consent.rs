use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;

use vqp_core::{ConsentDecision, ConsentPort, ConsentRequest, VqpError};

/// Static consent rules: grant for listed requesters, or for everyone.
#[derive(Debug, Clone, Default)]
pub struct ConsentPolicy {
    grant_all: bool,
    granted: HashSet<String>,
}

impl ConsentPolicy {
    pub fn grant_all() -> Self {
        Self {
            grant_all: true,
            granted: HashSet::new(),
        }
    }

    pub fn deny_all() -> Self {
        Self::default()
    }

    pub fn granting<I, S>(requesters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            grant_all: false,
            granted: requesters.into_iter().map(Into::into).collect(),
        }
    }

    pub fn grants(&self, requester: &str) -> bool {
        self.grant_all || self.granted.contains(requester)
    }
}

#[async_trait]
impl ConsentPort for ConsentPolicy {
    async fn request_consent(&self, request: &ConsentRequest) -> Result<ConsentDecision, VqpError> {
        let granted = self.grants(&request.requester);
        tracing::info!(
            query_id = %request.query_id,
            requester = %request.requester,
            fields = ?request.fields,
            granted,
            "consent requested"
        );
        Ok(ConsentDecision {
            granted,
            decided_at: Utc::now(),
            reason: (!granted).then(|| format!("{} is not granted disclosure", request.requester)),
        })
    }
}
