//! The call relay: correlates submitted calls with servicer pulls and results.
//!
//! A [`Relay`] owns one [`BlockingStore`] of submitted-but-unclaimed calls and
//! a secondary index of dispensed calls awaiting a result. The submit side
//! ([`submit`]) parks each call in the store and waits; the dispense side
//! ([`dispense`]) hands calls to servicers and routes their results back to
//! the waiting submitter. A tag stays reserved from `enqueue` until its
//! submitter stops waiting, whichever index the call is in at the time.
//!
//! Call lifecycle: `Submitted` (in the store) -> `Dispensed` (in the index)
//! -> `Completed` (result delivered) -> removed. A call nobody pulls before
//! the collect timeout is abandoned; a pulled call with no result before the
//! result timeout is orphaned. Both are cleaned out of every index when the
//! submitter stops waiting.

pub mod config;
pub mod dispense;
pub mod policy;
pub mod submit;

pub use config::RelayConfig;
pub use policy::{AnyOrigin, HostAffinity, OriginPolicy};
pub use submit::PendingCall;

use std::sync::Arc;

use callrelay_core::{BlockingStore, Call, CallResult, RelayError, TagGenerator};
use dashmap::DashMap;
use tokio::sync::oneshot;

/// Channel on which a submitter waits for the outcome of its call.
type ReplySender = oneshot::Sender<Result<CallResult, RelayError>>;

/// A submitted call still waiting in the store to be pulled.
struct CallRecord {
    call: Call,
    reply: ReplySender,
}

/// A pulled call waiting for its result.
struct DispensedCall {
    /// Host of the servicer that pulled the call, as seen by the policy.
    host: Option<String>,
    reply: ReplySender,
}

/// Correlates calls between submitters and servicers.
///
/// Shared behind an `Arc`: submissions hold a reference for as long as they
/// wait so they can clean up after themselves.
pub struct Relay {
    config: RelayConfig,
    store: BlockingStore<String, CallRecord>,
    dispensed: DashMap<String, DispensedCall>,
    /// Tags owned by a submission that has not finished waiting.
    live: DashMap<String, ()>,
    policy: Arc<dyn OriginPolicy>,
    tags: TagGenerator,
}

impl Relay {
    /// Creates a relay whose origin policy follows `config.check_hosts`.
    #[must_use]
    pub fn new(config: RelayConfig) -> Self {
        let policy: Arc<dyn OriginPolicy> = if config.check_hosts {
            Arc::new(HostAffinity)
        } else {
            Arc::new(AnyOrigin)
        };
        Self::with_policy(config, policy)
    }

    /// Creates a relay with an explicitly supplied origin policy.
    #[must_use]
    pub fn with_policy(config: RelayConfig, policy: Arc<dyn OriginPolicy>) -> Self {
        let tags = TagGenerator::new(config.tag_prefix.clone(), config.tag_length);
        Self {
            config,
            store: BlockingStore::new(),
            dispensed: DashMap::new(),
            live: DashMap::new(),
            policy,
            tags,
        }
    }

    #[must_use]
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Name of the active origin policy.
    #[must_use]
    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// Issues a fresh, unguessable call tag.
    #[must_use]
    pub fn new_tag(&self) -> String {
        self.tags.next_tag()
    }

    /// Whether `tag` belongs to a submission that is still waiting.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.live.contains_key(tag)
    }

    /// Number of submitted calls not yet pulled.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.store.len()
    }

    /// Number of pulled calls awaiting a result.
    #[must_use]
    pub fn dispensed_count(&self) -> usize {
        self.dispensed.len()
    }

    /// Drops every trace of `tag` from both indices.
    fn forget(&self, tag: &str) {
        self.store.remove(tag);
        self.dispensed.remove(tag);
    }
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("config", &self.config)
            .field("policy", &self.policy.name())
            .field("pending", &self.store.len())
            .field("dispensed", &self.dispensed.len())
            .finish_non_exhaustive()
    }
}
