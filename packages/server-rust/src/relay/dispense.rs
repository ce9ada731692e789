//! Dispense side of the relay: hand calls to servicers and accept results.

use std::time::Duration;

use callrelay_core::messages::encode_pulled;
use callrelay_core::{Call, CallResult, CallerContext, DispenseRequest, RelayError, Value};
use dashmap::mapref::entry::Entry;
use tracing::{debug, info, warn};

use super::{DispensedCall, Relay};

impl Relay {
    /// Liveness probe for servicers.
    pub fn ping(&self) {
        debug!("dispenser pinged");
    }

    /// Waits up to `wait`, capped at the configured `max_pull_wait`, for the
    /// call tagged `tag` to be submitted, then claims it for the caller.
    ///
    /// `Ok(None)` means nothing arrived in time; the caller should try
    /// again later.
    ///
    /// # Errors
    ///
    /// `MissingHost` if the policy needs a caller host `ctx` lacks, and
    /// `HostMismatch` if the caller is not on the submitter's host. A
    /// mismatch also fails the submitter with the same error.
    pub async fn pull_call(
        &self,
        tag: &str,
        wait: Duration,
        ctx: &CallerContext,
    ) -> Result<Option<Call>, RelayError> {
        let puller_host = self.policy.caller_host(ctx)?;
        let wait = wait.min(self.config.max_pull_wait);
        let Some(record) = self.store.take(tag, wait).await else {
            debug!(%tag, "pull timed out");
            return Ok(None);
        };

        if let Err(error) = self
            .policy
            .check(record.call.origin_host.as_deref(), puller_host.as_deref())
        {
            metrics::counter!("callrelay_pull_rejected_total").increment(1);
            warn!(%tag, %error, "pull rejected by origin policy");
            let _ = record.reply.send(Err(error.clone()));
            return Err(error);
        }

        let call = record.call;
        match self.dispensed.entry(call.tag.clone()) {
            Entry::Occupied(_) => {
                let error = RelayError::DuplicateTag {
                    tag: call.tag.clone(),
                };
                warn!(%tag, "pulled call collides with a dispensed one");
                let _ = record.reply.send(Err(error.clone()));
                return Err(error);
            }
            Entry::Vacant(slot) => {
                slot.insert(DispensedCall {
                    host: puller_host,
                    reply: record.reply,
                });
            }
        }
        metrics::counter!("callrelay_calls_dispensed_total").increment(1);
        info!(call = %call.label(), "call dispensed");
        Ok(Some(call))
    }

    /// Delivers the result of a dispensed call to its submitter.
    ///
    /// # Errors
    ///
    /// `PhantomTag` if `tag` is not currently dispensed, and `HostMismatch`
    /// if the caller is not the host that pulled it. A rejected result
    /// leaves the call dispensed.
    pub fn post_result(
        &self,
        tag: &str,
        result: CallResult,
        ctx: &CallerContext,
    ) -> Result<(), RelayError> {
        let Entry::Occupied(entry) = self.dispensed.entry(tag.to_string()) else {
            metrics::counter!("callrelay_phantom_results_total").increment(1);
            warn!(%tag, "result posted for phantom tag");
            return Err(RelayError::PhantomTag {
                tag: tag.to_string(),
            });
        };

        let poster_host = self.policy.caller_host(ctx)?;
        self.policy
            .check(entry.get().host.as_deref(), poster_host.as_deref())?;

        let (_, dispensed) = entry.remove_entry();
        if dispensed.reply.send(Ok(result)).is_err() {
            debug!(%tag, "submitter stopped waiting before the result arrived");
        }
        info!(%tag, "result posted");
        Ok(())
    }

    /// Executes one decoded dispense request and encodes its wire result.
    ///
    /// # Errors
    ///
    /// Whatever the underlying operation reports.
    pub async fn dispense(
        &self,
        request: DispenseRequest,
        ctx: &CallerContext,
    ) -> Result<Value, RelayError> {
        match request {
            DispenseRequest::Ping => {
                self.ping();
                Ok(Value::Bool(true))
            }
            DispenseRequest::PullCall { tag, timeout_secs } => {
                let pulled = self
                    .pull_call(&tag, Duration::from_secs(timeout_secs), ctx)
                    .await?;
                Ok(encode_pulled(pulled.as_ref()))
            }
            DispenseRequest::PostResult { tag, result } => {
                self.post_result(&tag, result, ctx)?;
                Ok(Value::Bool(true))
            }
        }
    }
}
