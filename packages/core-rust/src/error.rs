//! Error kinds surfaced by the relay's submit and dispense endpoints.
//!
//! `RelayError` doubles as the wire form of an RPC fault: it serializes as a
//! map whose `code` field names the variant (e.g. `"no_servicer"`), so a
//! fault produced by the relay decodes back into the same variant on the
//! servicer side.

use serde::{Deserialize, Serialize};

/// Every failure the relay can report for a call or a dispense request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum RelayError {
    /// The tag is already tracked by this relay; nothing was queued.
    #[error("can't accept call with tag already in use: {tag}")]
    DuplicateTag { tag: String },

    /// Nobody pulled the call before the collect timeout.
    #[error("no servicer collected call {tag} (relay timeout {timeout_secs}s)")]
    NoServicer { tag: String, timeout_secs: u64 },

    /// The call was pulled but no result arrived before the result timeout.
    #[error("no servicer response for call {tag} (relay timeout {timeout_secs}s)")]
    NoResponse { tag: String, timeout_secs: u64 },

    /// A result was posted for a tag that is not currently dispensed.
    #[error("result posted for phantom tag {tag}")]
    PhantomTag { tag: String },

    /// The dispense-side caller is not on the host recorded for the call.
    #[error("host mismatch: {actual} != {expected}")]
    HostMismatch { expected: String, actual: String },

    /// The transport could not say where the caller is, and it must.
    #[error("can't determine caller host")]
    MissingHost,

    /// The servicer ran the call and it failed.
    #[error("{message}")]
    Remote { message: String },

    /// The RPC parameters had the wrong shape.
    #[error("bad request: {reason}")]
    BadRequest { reason: String },

    /// The dispense namespace has no such method.
    #[error("unknown dispenser method: {method}")]
    UnknownMethod { method: String },

    /// The relay could not be reached, or answered with something other
    /// than an RPC response.
    #[error("relay unreachable: {reason}")]
    Transport { reason: String },
}

impl RelayError {
    /// Stable wire code of this error, matching its serialized `code` field.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::DuplicateTag { .. } => "duplicate_tag",
            Self::NoServicer { .. } => "no_servicer",
            Self::NoResponse { .. } => "no_response",
            Self::PhantomTag { .. } => "phantom_tag",
            Self::HostMismatch { .. } => "host_mismatch",
            Self::MissingHost => "missing_host",
            Self::Remote { .. } => "remote",
            Self::BadRequest { .. } => "bad_request",
            Self::UnknownMethod { .. } => "unknown_method",
            Self::Transport { .. } => "transport",
        }
    }

    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self::BadRequest {
            reason: reason.into(),
        }
    }

    pub fn transport(reason: impl std::fmt::Display) -> Self {
        Self::Transport {
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn serialized_code_matches_code_method() {
        let errors = [
            RelayError::DuplicateTag { tag: "t".into() },
            RelayError::NoServicer {
                tag: "t".into(),
                timeout_secs: 10,
            },
            RelayError::NoResponse {
                tag: "t".into(),
                timeout_secs: 600,
            },
            RelayError::PhantomTag { tag: "t".into() },
            RelayError::HostMismatch {
                expected: "a".into(),
                actual: "b".into(),
            },
            RelayError::MissingHost,
            RelayError::Remote {
                message: "boom".into(),
            },
            RelayError::bad_request("x"),
            RelayError::UnknownMethod { method: "m".into() },
            RelayError::transport("refused"),
        ];
        for error in errors {
            let encoded = serde_json::to_value(&error).unwrap();
            assert_eq!(encoded["code"], error.code());
            let decoded: RelayError = serde_json::from_value(encoded).unwrap();
            assert_eq!(decoded, error);
        }
    }

    #[test]
    fn remote_error_message_passes_through_verbatim() {
        let error = RelayError::Remote {
            message: "java.lang.IllegalStateException: nope".into(),
        };
        assert_eq!(error.to_string(), "java.lang.IllegalStateException: nope");
    }

    #[test]
    fn unknown_code_fails_to_decode() {
        let result = serde_json::from_value::<RelayError>(json!({"code": "exploded"}));
        assert!(result.is_err());
    }

    #[test]
    fn display_includes_timeouts() {
        let error = RelayError::NoServicer {
            tag: "tls:x".into(),
            timeout_secs: 10,
        };
        assert_eq!(
            error.to_string(),
            "no servicer collected call tls:x (relay timeout 10s)"
        );
    }
}
