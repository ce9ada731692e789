//! Relay timeouts and origin checking configuration.

use std::time::Duration;

use callrelay_core::tag::{DEFAULT_TAG_LENGTH, DEFAULT_TAG_PREFIX};

/// Configuration for a [`Relay`](super::Relay) instance.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// How long a submitted call waits to be pulled by a servicer.
    pub collect_timeout: Duration,
    /// How long a pulled call waits for the servicer's result.
    pub result_timeout: Duration,
    /// Upper bound on how long a single pull may wait for its call.
    pub max_pull_wait: Duration,
    /// Require that submitter and servicer of a call share a network origin.
    pub check_hosts: bool,
    /// Namespace prefix of relay-issued tags.
    pub tag_prefix: String,
    /// Number of random characters in relay-issued tags.
    pub tag_length: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            collect_timeout: Duration::from_secs(10),
            result_timeout: Duration::from_secs(600),
            max_pull_wait: Duration::from_secs(60),
            check_hosts: true,
            tag_prefix: DEFAULT_TAG_PREFIX.to_string(),
            tag_length: DEFAULT_TAG_LENGTH,
        }
    }
}

impl RelayConfig {
    /// Longest time a submitter can be kept waiting for one call.
    #[must_use]
    pub fn max_submit_wait(&self) -> Duration {
        self.collect_timeout + self.result_timeout
    }
}
