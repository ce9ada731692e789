//! Submit side of the relay: park a call and wait for its outcome.

use std::sync::Arc;

use callrelay_core::{Call, CallResult, CallerContext, RelayError, Value};
use dashmap::mapref::entry::Entry;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::{CallRecord, Relay};

/// Owns a tag reservation for the lifetime of one submission.
///
/// While armed, dropping it also removes the call from both indices, so
/// cancelling the waiting future cannot leak entries. The reservation itself
/// is always released on drop.
struct Registration {
    relay: Arc<Relay>,
    tag: String,
    armed: bool,
}

impl Registration {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if self.armed {
            debug!(tag = %self.tag, "pending call dropped, forgetting tag");
            self.relay.forget(&self.tag);
        }
        self.relay.live.remove(&self.tag);
    }
}

/// A call accepted by [`Relay::enqueue`] whose outcome has not been
/// collected yet.
///
/// Dropping it before [`PendingCall::wait`] completes withdraws the call.
pub struct PendingCall {
    registration: Registration,
    reply: oneshot::Receiver<Result<CallResult, RelayError>>,
}

impl PendingCall {
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.registration.tag
    }

    /// Waits for a servicer to pull the call and post its result.
    ///
    /// # Errors
    ///
    /// - `NoServicer` if nobody pulled the call within the collect timeout.
    /// - `NoResponse` if the pulled call got no result within the result
    ///   timeout.
    /// - `Remote` carrying the servicer's message if the call failed there.
    /// - `HostMismatch` if the puller was on the wrong host.
    pub async fn wait(self) -> Result<Value, RelayError> {
        let Self {
            mut registration,
            reply,
        } = self;
        let relay = Arc::clone(&registration.relay);
        let config = relay.config();
        let tag = registration.tag.clone();

        if relay
            .store
            .remove_untaken(tag.as_str(), config.collect_timeout)
            .await
        {
            registration.disarm();
            metrics::counter!("callrelay_calls_failed_total", "reason" => "no_servicer")
                .increment(1);
            warn!(%tag, "call not collected by any servicer");
            return Err(RelayError::NoServicer {
                tag,
                timeout_secs: config.collect_timeout.as_secs(),
            });
        }

        let outcome = tokio::time::timeout(config.result_timeout, reply).await;
        let outcome = match outcome {
            Ok(Ok(delivered)) => delivered,
            Ok(Err(_)) | Err(_) => {
                relay.dispensed.remove(&tag);
                registration.disarm();
                metrics::counter!("callrelay_calls_failed_total", "reason" => "no_response")
                    .increment(1);
                warn!(%tag, "no result posted for dispensed call");
                return Err(RelayError::NoResponse {
                    tag,
                    timeout_secs: config.result_timeout.as_secs(),
                });
            }
        };
        registration.disarm();

        match outcome {
            Ok(CallResult::Value(value)) => {
                metrics::counter!("callrelay_calls_completed_total").increment(1);
                info!(%tag, "call completed");
                Ok(value)
            }
            Ok(CallResult::Error(message)) => {
                metrics::counter!("callrelay_calls_failed_total", "reason" => "remote")
                    .increment(1);
                info!(%tag, %message, "call failed at servicer");
                Err(RelayError::Remote { message })
            }
            Err(error) => {
                metrics::counter!("callrelay_calls_failed_total", "reason" => error.code())
                    .increment(1);
                warn!(%tag, %error, "call rejected while dispensing");
                Err(error)
            }
        }
    }
}

impl std::fmt::Debug for PendingCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingCall")
            .field("tag", &self.registration.tag)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Relay submit operations
// ---------------------------------------------------------------------------

impl Relay {
    /// Registers a call under `tag` without waiting for it.
    ///
    /// The call becomes visible to `pull_call` as soon as this returns.
    ///
    /// # Errors
    ///
    /// `DuplicateTag` if another submission still owns `tag`, and
    /// `MissingHost` if the origin policy needs a host `ctx` lacks. Nothing
    /// is queued in either case.
    pub fn enqueue(
        self: &Arc<Self>,
        tag: String,
        operation: String,
        params: Vec<Value>,
        ctx: &CallerContext,
    ) -> Result<PendingCall, RelayError> {
        let origin_host = self.policy.caller_host(ctx)?;
        match self.live.entry(tag.clone()) {
            Entry::Occupied(_) => {
                metrics::counter!("callrelay_calls_failed_total", "reason" => "duplicate_tag")
                    .increment(1);
                return Err(RelayError::DuplicateTag { tag });
            }
            Entry::Vacant(slot) => {
                slot.insert(());
            }
        }

        let call = Call {
            tag: tag.clone(),
            operation,
            params,
            origin_host,
            referer: ctx.referer.clone(),
        };
        let label = call.label();
        let (reply, rx) = oneshot::channel();
        if !self.store.put_new(tag.clone(), CallRecord { call, reply }) {
            // Unreachable while every store insert goes through a reservation.
            self.live.remove(&tag);
            return Err(RelayError::DuplicateTag { tag });
        }

        metrics::counter!("callrelay_calls_submitted_total").increment(1);
        debug!(call = %label, "call queued");
        Ok(PendingCall {
            registration: Registration {
                relay: Arc::clone(self),
                tag,
                armed: true,
            },
            reply: rx,
        })
    }

    /// Submits a call under a caller-chosen tag and waits for its outcome.
    ///
    /// # Errors
    ///
    /// Any error from [`Relay::enqueue`] or [`PendingCall::wait`].
    pub async fn submit_tagged(
        self: &Arc<Self>,
        tag: String,
        operation: String,
        params: Vec<Value>,
        ctx: &CallerContext,
    ) -> Result<Value, RelayError> {
        self.enqueue(tag, operation, params, ctx)?.wait().await
    }

    /// Submits a call under a freshly issued tag and waits for its outcome.
    ///
    /// # Errors
    ///
    /// Any error from [`Relay::enqueue`] or [`PendingCall::wait`].
    pub async fn submit(
        self: &Arc<Self>,
        operation: String,
        params: Vec<Value>,
        ctx: &CallerContext,
    ) -> Result<Value, RelayError> {
        let tag = self.new_tag();
        self.submit_tagged(tag, operation, params, ctx).await
    }
}
