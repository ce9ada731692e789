//! Listener configuration for the relay and nudge HTTP surfaces.

use std::path::PathBuf;
use std::time::Duration;

/// Loopback port on which a servicer listens for nudges.
pub const DEFAULT_NUDGE_PORT: u16 = 21013;

/// Configuration of one HTTP listener.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Bind address.
    pub host: String,
    /// Port to listen on. 0 means OS-assigned.
    pub port: u16,
    pub tls: Option<TlsConfig>,
    /// Allowed CORS origins; `"*"` allows any.
    pub cors_origins: Vec<String>,
    /// Maximum time to wait for a request to complete. For the relay
    /// listener this must exceed the longest submit wait.
    pub request_timeout: Duration,
    /// How long shutdown waits for in-flight requests.
    pub drain_timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
            tls: None,
            cors_origins: vec!["*".to_string()],
            request_timeout: Duration::from_secs(15 * 60),
            drain_timeout: Duration::from_secs(30),
        }
    }
}

impl NetworkConfig {
    /// Loopback-only listener for the servicer's nudge endpoint.
    #[must_use]
    pub fn nudge_listener() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_NUDGE_PORT,
            request_timeout: Duration::from_secs(30),
            drain_timeout: Duration::from_secs(5),
            ..Self::default()
        }
    }
}

/// TLS certificate configuration.
///
/// No `Default` impl because certificate paths have no sensible defaults.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// PEM certificate chain.
    pub cert_path: PathBuf,
    /// PEM private key.
    pub key_path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_config_defaults() {
        let config = NetworkConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 0);
        assert!(config.tls.is_none());
        assert_eq!(config.cors_origins, vec!["*"]);
        assert_eq!(config.request_timeout, Duration::from_secs(900));
        assert_eq!(config.drain_timeout, Duration::from_secs(30));
    }

    #[test]
    fn request_timeout_outlasts_longest_submit() {
        let relay = crate::relay::RelayConfig::default();
        assert!(NetworkConfig::default().request_timeout > relay.max_submit_wait());
    }

    #[test]
    fn nudge_listener_is_loopback() {
        let config = NetworkConfig::nudge_listener();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 21013);
        assert!(config.tls.is_none());
    }
}
