//! Call and result records exchanged between submitter, relay, and servicer.
//!
//! Parameters and return values are opaque JSON values: the relay never
//! inspects them, it only stores and forwards them.

use serde::{Deserialize, Serialize};

/// Opaque payload value carried by calls and results.
pub type Value = serde_json::Value;

/// A single remote call, as stored by the relay and handed to the servicer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Call {
    /// Correlation token, unique among the calls a relay currently tracks.
    pub tag: String,
    /// Name of the operation the servicer should run.
    pub operation: String,
    /// Ordered operation parameters.
    #[serde(default)]
    pub params: Vec<Value>,
    /// Network origin of the submitter, when the relay recorded one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_host: Option<String>,
    /// `Referer` header presented by the submitter, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,
}

impl Call {
    /// Creates a call with no origin metadata attached.
    #[must_use]
    pub fn new(tag: impl Into<String>, operation: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            tag: tag.into(),
            operation: operation.into(),
            params,
            origin_host: None,
            referer: None,
        }
    }

    /// Short human-readable label used in log lines: `"<operation> <tag>"`.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} {}", self.operation, self.tag)
    }
}

/// Outcome of executing a call: exactly one of a value or an error message.
///
/// Serializes as a single-key map, `{"value": ...}` or `{"error": "..."}`.
/// Maps carrying both keys, or neither, are rejected on decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallResult {
    /// The operation succeeded and returned this value.
    Value(Value),
    /// The operation failed; the message is passed through verbatim.
    Error(String),
}

impl CallResult {
    /// Builds a success result.
    #[must_use]
    pub fn success(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }

    /// Builds a failure result.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Value(_))
    }
}

/// Per-request metadata supplied by the hosting transport.
///
/// Both fields are opaque to the relay core and handed to the origin policy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerContext {
    /// Remote network origin (address or host name) of the caller.
    pub host: Option<String>,
    /// Value of the caller's `Referer` header.
    pub referer: Option<String>,
}

impl CallerContext {
    /// Context for a caller at the given host with no referer.
    #[must_use]
    pub fn from_host(host: impl Into<String>) -> Self {
        Self {
            host: Some(host.into()),
            referer: None,
        }
    }

    #[must_use]
    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }
}
