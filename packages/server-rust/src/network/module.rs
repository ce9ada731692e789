//! Listener lifecycle with deferred startup.
//!
//! `new()` allocates shared state, `start()` binds the TCP listener, and
//! `serve()` accepts connections until shutdown. Binding early lets the
//! caller learn the actual port (e.g. to print the relay URL) before any
//! request is served.

use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{info, warn};

use super::config::{NetworkConfig, TlsConfig};
use super::handlers::{
    health_handler, liveness_handler, nudge_handler, readiness_handler, relay_info_handler,
    relay_rpc_handler, NudgeState, RelayState,
};
use super::middleware::build_http_layers;
use super::shutdown::ShutdownController;
use crate::poller::Poller;
use crate::relay::Relay;

/// Path of the relay's RPC endpoint.
pub const RELAY_PATH: &str = "/relay";

/// Path of the servicer's nudge endpoint.
pub const NUDGE_PATH: &str = "/nudge";

/// Routes of the relay listener:
/// - `POST /relay` RPC endpoint, `GET /relay` notice
/// - `GET /health`, `/health/live`, `/health/ready`
pub fn build_relay_router(
    relay: Arc<Relay>,
    shutdown: Arc<ShutdownController>,
    config: &NetworkConfig,
) -> Router {
    let state = RelayState {
        relay,
        shutdown,
        start_time: Instant::now(),
    };

    Router::new()
        .route(RELAY_PATH, get(relay_info_handler).post(relay_rpc_handler))
        .route("/health", get(health_handler))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler))
        .layer(build_http_layers(config))
        .with_state(state)
}

/// Routes of the servicer's nudge listener: `GET /nudge`.
pub fn build_nudge_router(poller: Arc<Poller>, config: &NetworkConfig) -> Router {
    Router::new()
        .route(NUDGE_PATH, get(nudge_handler))
        .layer(build_http_layers(config))
        .with_state(NudgeState { poller })
}

/// Owns one HTTP listener from bind to drain.
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    shutdown: Arc<ShutdownController>,
}

impl NetworkModule {
    /// Creates the module without binding any port.
    #[must_use]
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            config,
            listener: None,
            shutdown: Arc::new(ShutdownController::new()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Shared controller; hand it to the router so handlers see the
    /// listener's health state.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Binds the TCP listener and returns the bound port, which differs
    /// from the configured one when port 0 is used.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!(host = %self.config.host, port, "TCP listener bound");

        self.listener = Some(listener);
        Ok(port)
    }

    /// Address the listener is bound to, once `start()` has run.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Serves `router` until `shutdown` resolves, then drains.
    ///
    /// After the signal the listener moves to Draining, stops accepting
    /// submissions, and gives in-flight requests the configured drain
    /// timeout to finish. Connections still open when it expires are
    /// abandoned and `serve` returns anyway.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called first, the TLS
    /// material cannot be loaded, or the server hits a fatal I/O error.
    pub async fn serve(
        self,
        router: Router,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let Some(listener) = self.listener else {
            anyhow::bail!("start() must be called before serve()");
        };
        let controller = self.shutdown;
        let config = self.config;
        let drain_timeout = config.drain_timeout;

        controller.set_ready();

        let signalled_at = Arc::new(OnceLock::new());
        let shutdown = {
            let controller = Arc::clone(&controller);
            let signalled_at = Arc::clone(&signalled_at);
            async move {
                shutdown.await;
                info!(?drain_timeout, "shutdown signalled, draining");
                let _ = signalled_at.set(tokio::time::Instant::now());
                controller.trigger_shutdown();
            }
        };

        if let Some(ref tls) = config.tls {
            serve_tls(listener, router, tls, shutdown, drain_timeout).await?;
        } else {
            serve_plain(listener, router, shutdown, drain_timeout).await?;
        }

        let remaining = signalled_at
            .get()
            .map_or(drain_timeout, |at| drain_timeout.saturating_sub(at.elapsed()));
        if controller.wait_for_drain(remaining).await {
            info!("all requests drained");
        } else {
            warn!(
                in_flight = controller.in_flight_count(),
                "drain timeout expired with requests in flight"
            );
        }
        Ok(())
    }
}

/// Serves plain HTTP. Once `shutdown` fires, open connections get
/// `drain_timeout` to close before the server is dropped.
async fn serve_plain(
    listener: TcpListener,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
    drain_timeout: Duration,
) -> anyhow::Result<()> {
    info!("serving plain HTTP");

    let (fired_tx, fired_rx) = oneshot::channel::<()>();
    let shutdown = async move {
        shutdown.await;
        let _ = fired_tx.send(());
    };
    let server = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .into_future();
    let expired = async move {
        if fired_rx.await.is_ok() {
            tokio::time::sleep(drain_timeout).await;
        } else {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        result = server => result?,
        () = expired => warn!("drain timeout expired, abandoning open connections"),
    }
    Ok(())
}

/// Serves TLS using `axum-server` with rustls, reusing the pre-bound
/// listener. Connections still open `drain_timeout` after `shutdown` fires
/// are closed by `axum-server`.
async fn serve_tls(
    listener: TcpListener,
    router: Router,
    tls: &TlsConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
    drain_timeout: Duration,
) -> anyhow::Result<()> {
    use axum_server::tls_rustls::RustlsConfig;

    let rustls_config = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load TLS certificates: {e}"))?;

    let addr = listener.local_addr()?;
    let std_listener = listener.into_std()?;
    let handle = axum_server::Handle::new();
    let shutdown_handle = handle.clone();

    tokio::spawn(async move {
        shutdown.await;
        shutdown_handle.graceful_shutdown(Some(drain_timeout));
    });

    info!(%addr, "serving TLS");

    axum_server::from_tcp_rustls(std_listener, rustls_config)
        .handle(handle)
        .serve(router.into_make_service_with_connect_info::<SocketAddr>())
        .await?;
    Ok(())
}
