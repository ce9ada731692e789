//! `callrelay` binary: runs a relay or a servicer.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use callrelay_server::config::{Cli, Command, LogFormat, RelayArgs, ServicerArgs};
use callrelay_server::network::{build_nudge_router, build_relay_router, NetworkModule, RELAY_PATH};
use callrelay_server::poller::{HandlerRegistry, HttpDispenser, Poller};
use callrelay_server::relay::Relay;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    if let Some(addr) = cli.metrics_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to start Prometheus exporter")?;
        info!(%addr, "serving metrics");
    }

    match cli.command {
        Command::Relay(args) => run_relay(&args).await,
        Command::Servicer(args) => run_servicer(&args).await,
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

async fn run_relay(args: &RelayArgs) -> Result<()> {
    let relay_config = args.relay_config();
    let network_config = args.network_config();
    let scheme = if network_config.tls.is_some() { "https" } else { "http" };

    let relay = Arc::new(Relay::new(relay_config));
    let mut module = NetworkModule::new(network_config);
    let port = module.start().await.context("failed to bind relay listener")?;
    let router = build_relay_router(
        Arc::clone(&relay),
        module.shutdown_controller(),
        module.config(),
    );

    info!(
        url = %format!("{scheme}://{}:{port}{RELAY_PATH}", module.config().host),
        policy = relay.policy_name(),
        "relay ready"
    );
    module.serve(router, shutdown_signal()).await
}

async fn run_servicer(args: &ServicerArgs) -> Result<()> {
    let poller_config = args.poller_config();
    let dispenser =
        HttpDispenser::new(Duration::from_secs(30)).context("failed to build HTTP client")?;
    let poller = Arc::new(Poller::new(
        poller_config,
        Arc::new(dispenser),
        Arc::new(HandlerRegistry::with_builtins()),
    ));

    if let Some(relay) = &args.relay {
        match poller.probe(relay).await {
            Ok(()) => info!(%relay, "relay reachable"),
            Err(error) => warn!(%relay, %error, "relay not reachable yet"),
        }
    }

    let mut module = NetworkModule::new(args.network_config());
    let port = module.start().await.context("failed to bind nudge listener")?;
    let router = build_nudge_router(Arc::clone(&poller), module.config());

    info!(port, "servicer waiting for nudges");
    module.serve(router, shutdown_signal()).await
}
