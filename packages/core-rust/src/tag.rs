//! Unguessable call tags.

use rand::distr::Alphanumeric;
use rand::Rng;

/// Default namespace prefix for relay-issued tags.
pub const DEFAULT_TAG_PREFIX: &str = "tls:";

/// Default number of random characters following the prefix.
pub const DEFAULT_TAG_LENGTH: usize = 24;

/// Issues call tags of a fixed shape: a namespace prefix followed by
/// random alphanumeric characters drawn from the thread-local CSPRNG.
///
/// 24 alphanumeric characters give roughly 142 bits of entropy, so
/// collisions between live tags are not a practical concern.
#[derive(Debug, Clone)]
pub struct TagGenerator {
    prefix: String,
    length: usize,
}

impl TagGenerator {
    #[must_use]
    pub fn new(prefix: impl Into<String>, length: usize) -> Self {
        Self {
            prefix: prefix.into(),
            length,
        }
    }

    /// Returns a fresh tag.
    #[must_use]
    pub fn next_tag(&self) -> String {
        let body: String = rand::rng()
            .sample_iter(Alphanumeric)
            .take(self.length)
            .map(char::from)
            .collect();
        format!("{}{body}", self.prefix)
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl Default for TagGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_TAG_PREFIX, DEFAULT_TAG_LENGTH)
    }
}
