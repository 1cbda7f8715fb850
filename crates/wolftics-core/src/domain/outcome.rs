//! Outcome model: what the endpoint said about a batch, and how we classify it.
//!
//! This module is transport-agnostic. It only defines the shape of replies and
//! the mapping from reply (or transport error) to a delivery outcome.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::errors::{FailureKind, TransportError};

/// Why the endpoint declined a single event of a batch.
///
/// Only `PUBLISH_FAILED` is retry-eligible; every other reason means the
/// server has recorded or definitively rejected the event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RejectionReason {
    PublishFailed,
    Invalid,
    Other(String),
}

impl RejectionReason {
    pub fn as_str(&self) -> &str {
        match self {
            RejectionReason::PublishFailed => "PUBLISH_FAILED",
            RejectionReason::Invalid => "INVALID",
            RejectionReason::Other(s) => s,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, RejectionReason::PublishFailed)
    }
}

impl From<String> for RejectionReason {
    fn from(s: String) -> Self {
        match s.as_str() {
            "PUBLISH_FAILED" => RejectionReason::PublishFailed,
            "INVALID" => RejectionReason::Invalid,
            _ => RejectionReason::Other(s),
        }
    }
}

impl Serialize for RejectionReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RejectionReason {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(RejectionReason::from)
    }
}

/// A server-reported rejection, referencing an in-batch position.
///
/// `index` is signed so that out-of-range values from a misbehaving server
/// still parse and are then ignored by bounds checking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub index: i64,
    pub reason: RejectionReason,
}

impl Rejection {
    pub fn new(index: i64, reason: RejectionReason) -> Self {
        Self { index, reason }
    }

    /// In-batch position, if it addresses one of `batch_len` events.
    pub fn position(&self, batch_len: usize) -> Option<usize> {
        usize::try_from(self.index)
            .ok()
            .filter(|idx| *idx < batch_len)
    }
}

/// What a transport got back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportReply {
    /// The endpoint answered with an HTTP-style status.
    Acknowledged {
        status: u16,
        rejections: Vec<Rejection>,
    },

    /// A best-effort send was handed off; completion is never observed.
    Dispatched,
}

impl TransportReply {
    pub fn status(status: u16) -> Self {
        TransportReply::Acknowledged {
            status,
            rejections: Vec::new(),
        }
    }

    pub fn ok() -> Self {
        Self::status(200)
    }

    pub fn with_rejections(rejections: Vec<Rejection>) -> Self {
        TransportReply::Acknowledged {
            status: 200,
            rejections,
        }
    }
}

/// Classified result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Success,
    Partial(Vec<Rejection>),
    Transient { reason: String },
    Permanent { status: u16 },
}

impl DeliveryOutcome {
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            DeliveryOutcome::Success => None,
            DeliveryOutcome::Partial(_) => Some(FailureKind::Partial),
            DeliveryOutcome::Transient { .. } => Some(FailureKind::Transient),
            DeliveryOutcome::Permanent { .. } => Some(FailureKind::Permanent),
        }
    }
}

/// Overload, timeout or server-side trouble: worth retrying.
pub fn is_transient_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500..=599)
}

pub fn classify(result: &Result<TransportReply, TransportError>) -> DeliveryOutcome {
    match result {
        Ok(TransportReply::Dispatched) => DeliveryOutcome::Success,
        Ok(TransportReply::Acknowledged { status, rejections }) => {
            if (200..300).contains(status) {
                if rejections.is_empty() {
                    DeliveryOutcome::Success
                } else {
                    DeliveryOutcome::Partial(rejections.clone())
                }
            } else if is_transient_status(*status) {
                DeliveryOutcome::Transient {
                    reason: format!("HTTP {status}"),
                }
            } else {
                DeliveryOutcome::Permanent { status: *status }
            }
        }
        Err(err) => DeliveryOutcome::Transient {
            reason: err.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::time::Duration;

    #[rstest]
    #[case(200, None)]
    #[case(204, None)]
    #[case(408, Some(FailureKind::Transient))]
    #[case(429, Some(FailureKind::Transient))]
    #[case(500, Some(FailureKind::Transient))]
    #[case(503, Some(FailureKind::Transient))]
    #[case(599, Some(FailureKind::Transient))]
    #[case(400, Some(FailureKind::Permanent))]
    #[case(404, Some(FailureKind::Permanent))]
    #[case(416, Some(FailureKind::Permanent))]
    #[case(301, Some(FailureKind::Permanent))]
    fn status_codes_are_classified(#[case] status: u16, #[case] expected: Option<FailureKind>) {
        let outcome = classify(&Ok(TransportReply::status(status)));
        assert_eq!(outcome.failure_kind(), expected);
    }

    #[test]
    fn rejections_on_success_are_partial() {
        let rejection = Rejection::new(3, RejectionReason::PublishFailed);
        let outcome = classify(&Ok(TransportReply::with_rejections(vec![rejection.clone()])));
        assert_eq!(outcome, DeliveryOutcome::Partial(vec![rejection]));
    }

    #[test]
    fn dispatched_beacon_counts_as_success() {
        assert_eq!(
            classify(&Ok(TransportReply::Dispatched)),
            DeliveryOutcome::Success
        );
    }

    #[test]
    fn transport_errors_are_transient() {
        let outcome = classify(&Err(TransportError::Timeout(Duration::from_secs(8))));
        assert_eq!(outcome.failure_kind(), Some(FailureKind::Transient));

        let outcome = classify(&Err(TransportError::Decode("eof".into())));
        assert_eq!(outcome.failure_kind(), Some(FailureKind::Transient));
    }

    #[test]
    fn reasons_parse_from_wire_strings() {
        let r: Rejection =
            serde_json::from_value(serde_json::json!({"index": 3, "reason": "PUBLISH_FAILED"}))
                .unwrap();
        assert!(r.reason.is_retryable());

        let r: Rejection =
            serde_json::from_value(serde_json::json!({"index": 7, "reason": "INVALID"})).unwrap();
        assert_eq!(r.reason, RejectionReason::Invalid);
        assert!(!r.reason.is_retryable());

        let r: Rejection =
            serde_json::from_value(serde_json::json!({"index": 1, "reason": "QUOTA"})).unwrap();
        assert_eq!(r.reason.as_str(), "QUOTA");
    }

    #[test]
    fn position_is_bounds_checked() {
        assert_eq!(Rejection::new(2, RejectionReason::Invalid).position(3), Some(2));
        assert_eq!(Rejection::new(3, RejectionReason::Invalid).position(3), None);
        assert_eq!(Rejection::new(-1, RejectionReason::Invalid).position(3), None);
    }
}
