//! JSON-RPC style envelopes carried between submitters, servicers, and the
//! relay's HTTP endpoint.
//!
//! A request names a method and carries an ordered parameter list. Methods
//! under [`DISPENSE_PREFIX`] address the dispense endpoint; every other method
//! name is a call submitted for relaying. Responses carry exactly one of a
//! `result` or a `fault`.

use serde::{Deserialize, Serialize};

use crate::call::{Call, CallResult, Value};
use crate::error::RelayError;

/// Namespace shared by all dispense-endpoint methods.
pub const DISPENSE_PREFIX: &str = "relay.dispense.";

/// Fully-qualified dispense method names.
pub mod dispense_methods {
    pub const PING: &str = "relay.dispense.ping";
    pub const PULL_CALL: &str = "relay.dispense.pullCall";
    pub const POST_RESULT: &str = "relay.dispense.postResult";
}

/// An RPC request as posted to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcRequest {
    pub method: String,
    #[serde(default)]
    pub params: Vec<Value>,
    /// Submitter-chosen call tag. Only meaningful for submitted calls; when
    /// absent the relay issues one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl RpcRequest {
    #[must_use]
    pub fn new(method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            method: method.into(),
            params,
            tag: None,
        }
    }

    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    #[must_use]
    pub fn ping() -> Self {
        Self::new(dispense_methods::PING, Vec::new())
    }

    /// `pullCall(tag, timeoutSec)`; the timeout travels as a decimal string.
    #[must_use]
    pub fn pull_call(tag: &str, timeout_secs: u64) -> Self {
        Self::new(
            dispense_methods::PULL_CALL,
            vec![
                Value::String(tag.to_string()),
                Value::String(timeout_secs.to_string()),
            ],
        )
    }

    #[must_use]
    pub fn post_result(tag: &str, result: &CallResult) -> Self {
        // A CallResult always serializes to a single-key map.
        let result = serde_json::to_value(result).unwrap_or(Value::Null);
        Self::new(
            dispense_methods::POST_RESULT,
            vec![Value::String(tag.to_string()), result],
        )
    }

    #[must_use]
    pub fn is_dispense(&self) -> bool {
        self.method.starts_with(DISPENSE_PREFIX)
    }
}

/// Wire form of a failed RPC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fault {
    /// Human-readable rendering of `error`.
    #[serde(rename = "faultString")]
    pub description: String,
    #[serde(flatten)]
    pub error: RelayError,
}

impl From<RelayError> for Fault {
    fn from(error: RelayError) -> Self {
        Self {
            description: error.to_string(),
            error,
        }
    }
}

/// An RPC response: `{"result": ...}` or `{"fault": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RpcResponse {
    Result(Value),
    Fault(Fault),
}

impl RpcResponse {
    /// Converts the response back into the outcome it encodes.
    ///
    /// # Errors
    ///
    /// Returns the carried [`RelayError`] for a fault response.
    pub fn into_result(self) -> Result<Value, RelayError> {
        match self {
            Self::Result(value) => Ok(value),
            Self::Fault(fault) => Err(fault.error),
        }
    }
}

impl From<Result<Value, RelayError>> for RpcResponse {
    fn from(outcome: Result<Value, RelayError>) -> Self {
        match outcome {
            Ok(value) => Self::Result(value),
            Err(error) => Self::Fault(error.into()),
        }
    }
}

/// A decoded dispense-endpoint request.
#[derive(Debug, Clone, PartialEq)]
pub enum DispenseRequest {
    Ping,
    PullCall { tag: String, timeout_secs: u64 },
    PostResult { tag: String, result: CallResult },
}

impl DispenseRequest {
    /// Validates the method name and parameter shapes of a dispense request.
    ///
    /// # Errors
    ///
    /// `UnknownMethod` for names outside the dispense namespace or not
    /// defined in it; `BadRequest` for wrongly-shaped parameters.
    pub fn parse(request: &RpcRequest) -> Result<Self, RelayError> {
        let unknown = || RelayError::UnknownMethod {
            method: request.method.clone(),
        };
        let name = request
            .method
            .strip_prefix(DISPENSE_PREFIX)
            .ok_or_else(unknown)?;

        match name {
            "ping" => Ok(Self::Ping),
            "pullCall" => match request.params.as_slice() {
                [Value::String(tag), Value::String(timeout)] => {
                    let timeout_secs = timeout.trim().parse::<u64>().map_err(|_| {
                        RelayError::bad_request(format!("timeoutSec not an integer: {timeout}"))
                    })?;
                    Ok(Self::PullCall {
                        tag: tag.clone(),
                        timeout_secs,
                    })
                }
                _ => Err(RelayError::bad_request(format!(
                    "wrong params for {}(string callTag, string timeoutSec)",
                    request.method
                ))),
            },
            "postResult" => match request.params.as_slice() {
                [Value::String(tag), result @ Value::Object(_)] => {
                    let result = serde_json::from_value::<CallResult>(result.clone())
                        .map_err(|e| RelayError::bad_request(format!("malformed result: {e}")))?;
                    Ok(Self::PostResult {
                        tag: tag.clone(),
                        result,
                    })
                }
                _ => Err(RelayError::bad_request(format!(
                    "wrong params for {}(string callTag, map result)",
                    request.method
                ))),
            },
            _ => Err(unknown()),
        }
    }
}

/// Encodes the outcome of `pullCall`: the call map, or an empty string when
/// nothing arrived in time.
#[must_use]
pub fn encode_pulled(call: Option<&Call>) -> Value {
    call.and_then(|call| serde_json::to_value(call).ok())
        .unwrap_or_else(|| Value::String(String::new()))
}

/// Decodes a `pullCall` result produced by [`encode_pulled`].
///
/// # Errors
///
/// Returns `Transport` if the value is neither an empty marker nor a call.
pub fn decode_pulled(value: Value) -> Result<Option<Call>, RelayError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) if s.is_empty() => Ok(None),
        Value::Object(ref map) if map.is_empty() => Ok(None),
        other => serde_json::from_value(other)
            .map(Some)
            .map_err(|e| RelayError::transport(format!("pulled call was not a call map: {e}"))),
    }
}
