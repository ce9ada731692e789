//! Command-line configuration for the `callrelay` binary.
//!
//! Every option can also be set through a `CALLRELAY_*` environment
//! variable. The parsed arguments convert into the plain config structs the
//! library modules take.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::network::{NetworkConfig, TlsConfig, DEFAULT_NUDGE_PORT};
use crate::poller::PollerConfig;
use crate::relay::RelayConfig;

#[derive(Debug, Parser)]
#[command(name = "callrelay", version)]
#[command(about = "Relay calls between submitters and servicers that cannot reach each other")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text, env = "CALLRELAY_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Serve Prometheus metrics on this address
    #[arg(long, global = true, env = "CALLRELAY_METRICS_ADDR")]
    pub metrics_addr: Option<SocketAddr>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a relay accepting submitted calls and dispensing them to servicers
    Relay(RelayArgs),
    /// Run a servicer that collects and executes calls when nudged
    Servicer(ServicerArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Args)]
pub struct RelayArgs {
    /// Bind address
    #[arg(long, default_value = "0.0.0.0", env = "CALLRELAY_HOST")]
    pub host: String,

    /// Listen port
    #[arg(long, default_value_t = 8080, env = "CALLRELAY_PORT")]
    pub port: u16,

    /// Seconds a submitted call waits to be pulled
    #[arg(long, default_value_t = 10, env = "CALLRELAY_COLLECT_TIMEOUT")]
    pub collect_timeout_secs: u64,

    /// Seconds a pulled call waits for its result
    #[arg(long, default_value_t = 600, env = "CALLRELAY_RESULT_TIMEOUT")]
    pub result_timeout_secs: u64,

    /// Longest a single servicer pull may wait at the relay, in seconds
    #[arg(long, default_value_t = 60, env = "CALLRELAY_MAX_PULL_WAIT")]
    pub max_pull_wait_secs: u64,

    /// Let any host pull and answer any call
    #[arg(long, env = "CALLRELAY_NO_HOST_CHECK")]
    pub no_host_check: bool,

    /// Allowed CORS origin; repeat for several
    #[arg(long = "cors-origin", default_value = "*")]
    pub cors_origins: Vec<String>,

    /// PEM certificate chain; enables TLS together with --tls-key
    #[arg(long, requires = "tls_key", env = "CALLRELAY_TLS_CERT")]
    pub tls_cert: Option<PathBuf>,

    /// PEM private key
    #[arg(long, requires = "tls_cert", env = "CALLRELAY_TLS_KEY")]
    pub tls_key: Option<PathBuf>,
}

impl RelayArgs {
    #[must_use]
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            collect_timeout: Duration::from_secs(self.collect_timeout_secs),
            result_timeout: Duration::from_secs(self.result_timeout_secs),
            max_pull_wait: Duration::from_secs(self.max_pull_wait_secs),
            check_hosts: !self.no_host_check,
            ..RelayConfig::default()
        }
    }

    /// Listener settings. The request timeout is stretched when needed so
    /// the HTTP layer never cuts a submission short.
    #[must_use]
    pub fn network_config(&self) -> NetworkConfig {
        let defaults = NetworkConfig::default();
        let longest_submit = self.relay_config().max_submit_wait() + Duration::from_secs(60);
        NetworkConfig {
            host: self.host.clone(),
            port: self.port,
            tls: match (&self.tls_cert, &self.tls_key) {
                (Some(cert_path), Some(key_path)) => Some(TlsConfig {
                    cert_path: cert_path.clone(),
                    key_path: key_path.clone(),
                }),
                _ => None,
            },
            cors_origins: self.cors_origins.clone(),
            request_timeout: defaults.request_timeout.max(longest_submit),
            ..defaults
        }
    }
}

#[derive(Debug, Args)]
pub struct ServicerArgs {
    /// Loopback port for nudges
    #[arg(long, default_value_t = DEFAULT_NUDGE_PORT, env = "CALLRELAY_NUDGE_PORT")]
    pub nudge_port: u16,

    /// Seconds polling continues after the latest nudge
    #[arg(long, default_value_t = 10, env = "CALLRELAY_LAG_WINDOW")]
    pub lag_window_secs: u64,

    /// Seconds each pull waits at the relay
    #[arg(long, default_value_t = 10, env = "CALLRELAY_POLL_TIMEOUT")]
    pub poll_timeout_secs: u64,

    /// Relay URL to probe at startup
    #[arg(long, env = "CALLRELAY_RELAY_URL")]
    pub relay: Option<String>,
}

impl ServicerArgs {
    #[must_use]
    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            lag_window: Duration::from_secs(self.lag_window_secs),
            poll_timeout: Duration::from_secs(self.poll_timeout_secs),
        }
    }

    #[must_use]
    pub fn network_config(&self) -> NetworkConfig {
        NetworkConfig {
            port: self.nudge_port,
            ..NetworkConfig::nudge_listener()
        }
    }
}
