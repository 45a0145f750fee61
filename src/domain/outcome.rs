//! Classification of a single basket API call.
//!
//! The engine never looks at status codes or transport errors directly. Every call
//! result is folded into an [`Outcome`] first:
//!
//! ```text
//! 2xx ──────────────> Success(payload)        204 / empty body => Value::Null
//! 409 ──────────────> Conflict(basket id?)    from {"data":{"basketId":..}}
//! other status ─────> Failure(status, body)
//! transport error ──> Failure(0, message)
//! ```

use serde::{Deserialize, Serialize};

use super::basket::{BasketId, basket_id_from_conflict};
use crate::error::Result;
use crate::http::HttpResponse;

/// HTTP status the basket service uses to signal an existing session basket.
pub const CONFLICT_STATUS: u16 = 409;

/// Status reported for calls that never got a response.
pub const TRANSPORT_FAILURE_STATUS: u16 = 0;

/// Classified result of one API call.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// 2xx. The payload is the parsed body, `Null` when there was none, or the raw
    /// text as a JSON string when the body was not JSON.
    Success(serde_json::Value),
    /// 409, with the live basket id when the body carried one.
    Conflict(Option<BasketId>),
    /// Any other status, or status 0 when no response was obtained.
    Failure { status: u16, message: String },
}

impl Outcome {
    /// Fold a transport result into an outcome.
    pub fn from_response(result: Result<HttpResponse>) -> Self {
        match result {
            Ok(response) => Self::classify(response),
            Err(e) => Outcome::Failure {
                status: TRANSPORT_FAILURE_STATUS,
                message: e.to_string(),
            },
        }
    }

    fn classify(response: HttpResponse) -> Self {
        match response.status {
            CONFLICT_STATUS => Outcome::Conflict(basket_id_from_conflict(&response.body)),
            200..=299 => {
                if response.status == 204 || response.body.trim().is_empty() {
                    return Outcome::Success(serde_json::Value::Null);
                }
                let payload = serde_json::from_str(&response.body)
                    .unwrap_or(serde_json::Value::String(response.body));
                Outcome::Success(payload)
            }
            status => Outcome::Failure {
                status,
                message: response.body,
            },
        }
    }
}

/// Why a line item (or its discount) did not go through.
///
/// Mirrors the taxonomy operators see in the run report: conflicts that could not
/// be recovered, errors returned by the service, and calls that never got an answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum ItemFailure {
    /// 409 that could not be resolved: no basket id in the body, or a second conflict
    /// after the recovery retry.
    Conflict {
        recovered_basket_id: Option<BasketId>,
        retried: bool,
    },

    /// The service answered with a non-2xx, non-409 status.
    RemoteFailure { status: u16, body: String },

    /// No response was obtained (connectivity, TLS, timeout).
    TransportFailure { error: String },

    /// The item was added but no basket id is known to address its discount.
    NoBasket,
}

impl ItemFailure {
    /// Failure for a non-success, non-conflict outcome.
    pub fn from_failure(status: u16, message: String) -> Self {
        if status == TRANSPORT_FAILURE_STATUS {
            ItemFailure::TransportFailure { error: message }
        } else {
            ItemFailure::RemoteFailure {
                status,
                body: message,
            }
        }
    }

    /// Status to show next to the failure, 0 when there was no response.
    pub fn status(&self) -> u16 {
        match self {
            ItemFailure::Conflict { .. } => CONFLICT_STATUS,
            ItemFailure::RemoteFailure { status, .. } => *status,
            ItemFailure::TransportFailure { .. } | ItemFailure::NoBasket => {
                TRANSPORT_FAILURE_STATUS
            }
        }
    }

    /// Returns a human-readable error message for this failure.
    pub fn to_error_message(&self) -> String {
        match self {
            ItemFailure::Conflict {
                recovered_basket_id: None,
                ..
            } => "Unrecoverable conflict (409 without basket id)".to_string(),
            ItemFailure::Conflict {
                recovered_basket_id: Some(id),
                retried,
            } => {
                if *retried {
                    format!("Unrecoverable conflict (409 again after retry on basket ...{})", id.short())
                } else {
                    format!("Unrecoverable conflict (409 on basket ...{})", id.short())
                }
            }
            ItemFailure::RemoteFailure { status, body } => {
                if body.trim().is_empty() {
                    format!("Status {}", status)
                } else {
                    format!("Status {} - {}", status, body.trim())
                }
            }
            ItemFailure::TransportFailure { error } => format!("Network error: {}", error),
            ItemFailure::NoBasket => "No basket id known to address the discount".to_string(),
        }
    }
}
