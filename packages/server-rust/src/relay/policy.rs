//! Origin policies deciding whether the two sides of a call may be paired.
//!
//! The only fact the relay can observe directly about its callers is their
//! network origin. Under [`HostAffinity`] the submitter, the servicer that
//! pulls the call, and the servicer that answers it must all share one
//! origin; [`AnyOrigin`] pairs anybody.

use callrelay_core::{CallerContext, RelayError};

/// Strategy injected into a [`Relay`](super::Relay) to vet caller origins.
pub trait OriginPolicy: Send + Sync {
    /// Short name for log lines.
    fn name(&self) -> &'static str;

    /// Host to record for a caller.
    ///
    /// # Errors
    ///
    /// `MissingHost` if the policy needs an origin and the transport
    /// supplied none.
    fn caller_host(&self, ctx: &CallerContext) -> Result<Option<String>, RelayError>;

    /// Checks a dispense-side caller against the host recorded earlier.
    ///
    /// # Errors
    ///
    /// `HostMismatch` when the hosts differ, `MissingHost` when either is
    /// unknown.
    fn check(&self, recorded: Option<&str>, caller: Option<&str>) -> Result<(), RelayError>;
}

/// Requires every participant of a call to share one network origin.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostAffinity;

impl OriginPolicy for HostAffinity {
    fn name(&self) -> &'static str {
        "host-affinity"
    }

    fn caller_host(&self, ctx: &CallerContext) -> Result<Option<String>, RelayError> {
        match ctx.host.as_deref().map(str::trim) {
            Some(host) if !host.is_empty() => Ok(Some(host.to_string())),
            _ => Err(RelayError::MissingHost),
        }
    }

    fn check(&self, recorded: Option<&str>, caller: Option<&str>) -> Result<(), RelayError> {
        match (recorded, caller) {
            (Some(recorded), Some(caller)) if recorded == caller => Ok(()),
            (Some(recorded), Some(caller)) => Err(RelayError::HostMismatch {
                expected: recorded.to_string(),
                actual: caller.to_string(),
            }),
            _ => Err(RelayError::MissingHost),
        }
    }
}

/// Accepts callers from anywhere; the origin is recorded when known.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyOrigin;

impl OriginPolicy for AnyOrigin {
    fn name(&self) -> &'static str {
        "any-origin"
    }

    fn caller_host(&self, ctx: &CallerContext) -> Result<Option<String>, RelayError> {
        Ok(ctx.host.clone())
    }

    fn check(&self, _recorded: Option<&str>, _caller: Option<&str>) -> Result<(), RelayError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_affinity_requires_a_host() {
        let policy = HostAffinity;
        assert_eq!(
            policy.caller_host(&CallerContext::default()),
            Err(RelayError::MissingHost)
        );
        assert_eq!(
            policy.caller_host(&CallerContext::from_host("  ")),
            Err(RelayError::MissingHost)
        );
        assert_eq!(
            policy.caller_host(&CallerContext::from_host("10.1.1.1")),
            Ok(Some("10.1.1.1".to_string()))
        );
    }

    #[test]
    fn host_affinity_compares_hosts() {
        let policy = HostAffinity;
        assert!(policy.check(Some("a"), Some("a")).is_ok());
        assert_eq!(
            policy.check(Some("a"), Some("b")),
            Err(RelayError::HostMismatch {
                expected: "a".into(),
                actual: "b".into()
            })
        );
        assert_eq!(policy.check(None, Some("b")), Err(RelayError::MissingHost));
    }

    #[test]
    fn any_origin_accepts_everything() {
        let policy = AnyOrigin;
        assert_eq!(policy.caller_host(&CallerContext::default()), Ok(None));
        assert!(policy.check(Some("a"), Some("b")).is_ok());
        assert!(policy.check(None, None).is_ok());
    }
}
