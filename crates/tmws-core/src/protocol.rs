use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TmwsError;

/// A tool invocation sent by a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WireRequest {
    pub id: u64,
    pub tool: String,
    #[serde(default)]
    pub params: Value,
}

/// Error payload inside a response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

/// Reply to one request, echoing its `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireResponse {
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<WireError>,
}

impl WireResponse {
    pub fn ok(id: u64, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn fail(id: u64, err: &TmwsError) -> Self {
        Self {
            id,
            result: None,
            error: Some(WireError {
                code: err.wire_code().to_string(),
                message: err.wire_message(),
                retry_after: err.retry_after(),
            }),
        }
    }
}

/// Server-initiated message; same frame shape as a request, without `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireNotification {
    pub tool: String,
    #[serde(default)]
    pub params: Value,
}
