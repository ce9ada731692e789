//! Transports through which a servicer reaches a relay's dispense endpoint.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use callrelay_core::messages::decode_pulled;
use callrelay_core::{Call, CallResult, CallerContext, RelayError, RpcRequest, RpcResponse, Value};

use crate::relay::Relay;

/// Slack added to a pull's own timeout before the HTTP request gives up.
const PULL_GRACE: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Dispenser trait
// ---------------------------------------------------------------------------

/// Dispense endpoint of the relay found at `relay`.
///
/// `relay` is an opaque address; its meaning depends on the implementation.
#[async_trait]
pub trait Dispenser: Send + Sync + 'static {
    async fn ping(&self, relay: &str) -> Result<(), RelayError>;

    /// Claims the call tagged `tag`, waiting up to `wait` for it to appear.
    async fn pull_call(
        &self,
        relay: &str,
        tag: &str,
        wait: Duration,
    ) -> Result<Option<Call>, RelayError>;

    async fn post_result(
        &self,
        relay: &str,
        tag: &str,
        result: &CallResult,
    ) -> Result<(), RelayError>;
}

// ---------------------------------------------------------------------------
// HttpDispenser
// ---------------------------------------------------------------------------

/// Reaches relays over HTTP. The address is the URL of the relay's RPC
/// endpoint, e.g. `http://127.0.0.1:8080/relay`.
#[derive(Debug, Clone)]
pub struct HttpDispenser {
    client: reqwest::Client,
    request_timeout: Duration,
}

impl HttpDispenser {
    /// Creates a dispenser whose non-pull requests give up after
    /// `request_timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built, e.g. when no
    /// TLS backend can be initialised.
    pub fn new(request_timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout + PULL_GRACE)
            .build()?;
        Ok(Self {
            client,
            request_timeout,
        })
    }

    async fn invoke(
        &self,
        relay: &str,
        request: &RpcRequest,
        timeout: Duration,
    ) -> Result<Value, RelayError> {
        let response = self
            .client
            .post(relay)
            .json(request)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| RelayError::transport(format!("{} to {relay} failed: {e}", request.method)))?;

        if !response.status().is_success() {
            return Err(RelayError::transport(format!(
                "{relay} returned status {}",
                response.status()
            )));
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| RelayError::transport(format!("unreadable response from {relay}: {e}")))?;
        body.into_result()
    }
}

/// Whole seconds sent as a pull's `timeoutSec`, rounded up so a
/// sub-second wait does not become an immediate pull.
fn wire_timeout_secs(wait: Duration) -> u64 {
    wait.as_secs() + u64::from(wait.subsec_nanos() > 0)
}

#[async_trait]
impl Dispenser for HttpDispenser {
    async fn ping(&self, relay: &str) -> Result<(), RelayError> {
        self.invoke(relay, &RpcRequest::ping(), self.request_timeout)
            .await
            .map(|_| ())
    }

    async fn pull_call(
        &self,
        relay: &str,
        tag: &str,
        wait: Duration,
    ) -> Result<Option<Call>, RelayError> {
        let wire_secs = wire_timeout_secs(wait);
        let request = RpcRequest::pull_call(tag, wire_secs);
        let http_timeout = Duration::from_secs(wire_secs).saturating_add(PULL_GRACE);
        let value = self.invoke(relay, &request, http_timeout).await?;
        decode_pulled(value)
    }

    async fn post_result(
        &self,
        relay: &str,
        tag: &str,
        result: &CallResult,
    ) -> Result<(), RelayError> {
        let request = RpcRequest::post_result(tag, result);
        self.invoke(relay, &request, self.request_timeout)
            .await
            .map(|_| ())
    }
}

// ---------------------------------------------------------------------------
// LocalDispenser
// ---------------------------------------------------------------------------

/// Talks to an in-process [`Relay`], presenting a fixed caller context.
/// The relay address is ignored.
#[derive(Debug, Clone)]
pub struct LocalDispenser {
    relay: Arc<Relay>,
    ctx: CallerContext,
}

impl LocalDispenser {
    #[must_use]
    pub fn new(relay: Arc<Relay>, ctx: CallerContext) -> Self {
        Self { relay, ctx }
    }
}

#[async_trait]
impl Dispenser for LocalDispenser {
    async fn ping(&self, _relay: &str) -> Result<(), RelayError> {
        self.relay.ping();
        Ok(())
    }

    async fn pull_call(
        &self,
        _relay: &str,
        tag: &str,
        wait: Duration,
    ) -> Result<Option<Call>, RelayError> {
        self.relay.pull_call(tag, wait, &self.ctx).await
    }

    async fn post_result(
        &self,
        _relay: &str,
        tag: &str,
        result: &CallResult,
    ) -> Result<(), RelayError> {
        self.relay.post_result(tag, result.clone(), &self.ctx)
    }
}
