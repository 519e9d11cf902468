//! Canonical encoding of the signed response fields.
//!
//! Verification recomputes the payload independently, so any two parties
//! holding logically identical fields must produce identical bytes: object
//! keys are sorted at every level and the output is compact.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use vqp_core::Response;

use crate::error::ProofError;

/// The response fields covered by a proof.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadFields {
    pub query_id: String,
    pub responder: String,
    pub result: Value,
    pub timestamp: String,
}

impl PayloadFields {
    pub fn new(
        query_id: impl Into<String>,
        responder: impl Into<String>,
        result: Value,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            query_id: query_id.into(),
            responder: responder.into(),
            result,
            timestamp: timestamp.into(),
        }
    }

    pub fn from_response(response: &Response) -> Self {
        Self {
            query_id: response.query_id.clone(),
            responder: response.responder.clone(),
            result: response.result.clone(),
            timestamp: response.timestamp.clone(),
        }
    }
}

/// Sorted-key compact JSON.
pub fn canonical_json(value: &Value) -> Result<Vec<u8>, ProofError> {
    let mut out = Vec::new();
    write_canonical(value, &mut out)?;
    Ok(out)
}

fn write_canonical(value: &Value, out: &mut Vec<u8>) -> Result<(), ProofError> {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push(b'{');
            for (i, (key, value)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                serde_json::to_writer(&mut *out, key)?;
                out.push(b':');
                write_canonical(value, out)?;
            }
            out.push(b'}');
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out)?;
            }
            out.push(b']');
        }
        scalar => serde_json::to_writer(&mut *out, scalar)?,
    }
    Ok(())
}

/// Bytes a proof is computed over.
pub fn build_canonical_payload(fields: &PayloadFields) -> Result<Vec<u8>, ProofError> {
    canonical_json(&serde_json::to_value(fields)?)
}
