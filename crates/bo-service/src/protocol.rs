//! Newline-delimited JSON wire protocol.
//!
//! Each request is one line, `{"value": 1.25}` or `{}` for the kickoff. Each
//! reply is one line, `{"next": [0.5]}` on success or `{"error": "..."}` when
//! the service declines to continue.

use bo_types::QueryVector;
use serde::{Deserialize, Serialize};

use crate::service::{CallError, CallResult, ObservationRequest, ServiceResponse};

/// One reply line as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireReply {
    Next { next: QueryVector },
    Error { error: String },
}

impl From<&CallResult<ServiceResponse>> for WireReply {
    fn from(result: &CallResult<ServiceResponse>) -> Self {
        match result {
            Ok(response) => WireReply::Next {
                next: response.next.clone(),
            },
            Err(e) => WireReply::Error {
                error: e.to_string(),
            },
        }
    }
}

pub fn encode_request(request: &ObservationRequest) -> CallResult<String> {
    let mut line = serde_json::to_string(request).map_err(|e| CallError::Malformed {
        message: e.to_string(),
    })?;
    line.push('\n');
    Ok(line)
}

pub fn decode_request(line: &str) -> CallResult<ObservationRequest> {
    serde_json::from_str(line.trim()).map_err(|e| CallError::Malformed {
        message: format!("bad request {:?}: {e}", line.trim()),
    })
}

pub fn encode_reply(reply: &CallResult<ServiceResponse>) -> serde_json::Result<String> {
    let mut line = serde_json::to_string(&WireReply::from(reply))?;
    line.push('\n');
    Ok(line)
}

/// Decode a reply line. An `error` reply becomes [`CallError::Rejected`].
pub fn decode_reply(line: &str) -> CallResult<ServiceResponse> {
    let reply: WireReply =
        serde_json::from_str(line.trim()).map_err(|e| CallError::Malformed {
            message: format!("bad reply {:?}: {e}", line.trim()),
        })?;
    match reply {
        WireReply::Next { next } => Ok(ServiceResponse { next }),
        WireReply::Error { error } => Err(CallError::Rejected { message: error }),
    }
}
