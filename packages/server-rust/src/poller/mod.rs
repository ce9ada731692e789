//! Servicer-side poller: collects calls from relays when nudged.
//!
//! Each relay address has its own single-flight state machine,
//! `Idle -> Polling -> Idle`. A nudge queues a tag and starts a poll loop
//! unless one is already running for that address. The loop starts a pull
//! for each queued tag as soon as it sees it, without waiting for earlier
//! pulls, and stops once no pull is in flight, no tag is queued and no
//! nudge arrived within the lag window.

pub mod dispenser;
pub mod handler;

pub use dispenser::{Dispenser, HttpDispenser, LocalDispenser};
pub use handler::{CallHandler, EchoHandler, HandlerRegistry, OperationHandler};

use std::sync::Arc;
use std::time::Duration;

use callrelay_core::{Call, CallResult, RelayError};
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// PollerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// How long polling continues after the most recent nudge.
    pub lag_window: Duration,
    /// Longest a single pull waits at the relay.
    pub poll_timeout: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            lag_window: Duration::from_secs(10),
            poll_timeout: Duration::from_secs(10),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-address state
// ---------------------------------------------------------------------------

struct PollState {
    last_nudge: Instant,
    /// Set while a poll loop runs for the address.
    active: bool,
    queued: Vec<String>,
}

struct PollTarget {
    state: Mutex<PollState>,
    wake: Notify,
}

impl PollTarget {
    fn new() -> Self {
        Self {
            state: Mutex::new(PollState {
                last_nudge: Instant::now(),
                active: false,
                queued: Vec::new(),
            }),
            wake: Notify::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Poller
// ---------------------------------------------------------------------------

/// Pulls calls from relays on demand and runs them through a [`CallHandler`].
pub struct Poller {
    config: PollerConfig,
    dispenser: Arc<dyn Dispenser>,
    handler: Arc<dyn CallHandler>,
    targets: DashMap<String, Arc<PollTarget>>,
}

impl Poller {
    #[must_use]
    pub fn new(
        config: PollerConfig,
        dispenser: Arc<dyn Dispenser>,
        handler: Arc<dyn CallHandler>,
    ) -> Self {
        Self {
            config,
            dispenser,
            handler,
            targets: DashMap::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Signals that a call tagged `tag` is about to be submitted to `relay`.
    ///
    /// Starts a poll loop for `relay` unless one is already running, in
    /// which case the tag is queued for it.
    pub fn nudge(self: &Arc<Self>, relay: &str, tag: String) {
        let target = Arc::clone(
            self.targets
                .entry(relay.to_string())
                .or_insert_with(|| Arc::new(PollTarget::new()))
                .value(),
        );

        let start = {
            let mut state = target.state.lock();
            state.last_nudge = Instant::now();
            if !state.queued.contains(&tag) {
                state.queued.push(tag);
            }
            !std::mem::replace(&mut state.active, true)
        };

        metrics::counter!("callrelay_nudges_total").increment(1);
        if start {
            info!(%relay, "polling started");
            tokio::spawn(Arc::clone(self).poll_loop(relay.to_string(), target));
        } else {
            target.wake.notify_one();
        }
    }

    /// Whether a poll loop is running for `relay`.
    #[must_use]
    pub fn is_polling(&self, relay: &str) -> bool {
        self.targets
            .get(relay)
            .is_some_and(|target| target.state.lock().active)
    }

    /// Checks that `relay` answers on its dispense endpoint.
    ///
    /// # Errors
    ///
    /// Whatever the dispenser reports, typically `Transport`.
    pub async fn probe(&self, relay: &str) -> Result<(), RelayError> {
        self.dispenser.ping(relay).await
    }

    async fn poll_loop(self: Arc<Self>, relay: String, target: Arc<PollTarget>) {
        let mut pulls = JoinSet::new();
        loop {
            let tags = std::mem::take(&mut target.state.lock().queued);
            if !tags.is_empty() {
                metrics::counter!("callrelay_poll_rounds_total").increment(1);
                debug!(%relay, count = tags.len(), in_flight = pulls.len(), "pulling queued tags");
            }
            for tag in tags {
                let this = Arc::clone(&self);
                let relay = relay.clone();
                pulls.spawn(async move { this.pull_one(&relay, tag).await });
            }

            if pulls.is_empty() {
                let _ = tokio::time::timeout(self.config.poll_timeout, target.wake.notified()).await;
            } else {
                tokio::select! {
                    () = target.wake.notified() => {}
                    Some(finished) = pulls.join_next() => {
                        if let Err(error) = finished {
                            warn!(%relay, %error, "pull task did not complete");
                        }
                    }
                }
            }

            let mut state = target.state.lock();
            if pulls.is_empty()
                && state.queued.is_empty()
                && state.last_nudge.elapsed() >= self.config.lag_window
            {
                state.active = false;
                break;
            }
        }
        info!(%relay, "polling stopped");
    }

    async fn pull_one(self: &Arc<Self>, relay: &str, tag: String) {
        metrics::counter!("callrelay_pulls_total").increment(1);
        match self
            .dispenser
            .pull_call(relay, &tag, self.config.poll_timeout)
            .await
        {
            Ok(Some(call)) if call.tag != tag => {
                warn!(%relay, requested = %tag, received = %call.tag, "relay returned wrong call");
            }
            Ok(Some(call)) => {
                let this = Arc::clone(self);
                let relay = relay.to_string();
                tokio::spawn(async move { this.dispatch(&relay, call).await });
            }
            Ok(None) => debug!(%relay, %tag, "no call collected"),
            Err(error) => {
                metrics::counter!("callrelay_pull_failures_total").increment(1);
                warn!(%relay, %tag, %error, "failed to collect call");
            }
        }
    }

    /// Runs `call` through the handler and posts the result back.
    async fn dispatch(&self, relay: &str, call: Call) {
        let tag = call.tag.clone();
        let label = call.label();
        info!(%relay, call = %label, "handling call");

        let handler = Arc::clone(&self.handler);
        let result = match tokio::spawn(async move { handler.handle(call).await }).await {
            Ok(result) => result,
            Err(join_error) => {
                warn!(call = %label, error = %join_error, "call handler did not complete");
                CallResult::failure(format!("handler for {label} failed: {join_error}"))
            }
        };

        if let Err(error) = self.dispenser.post_result(relay, &tag, &result).await {
            warn!(%relay, call = %label, %error, "failed to post result");
        }
    }
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("config", &self.config)
            .field("targets", &self.targets.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use callrelay_core::{CallerContext, Value};
    use serde_json::json;

    use super::*;
    use crate::relay::{Relay, RelayConfig};

    /// Dispenser whose pulls never find a call; counts and times them.
    #[derive(Default)]
    struct Recording {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        pulls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Dispenser for Recording {
        async fn ping(&self, _relay: &str) -> Result<(), RelayError> {
            Ok(())
        }

        async fn pull_call(
            &self,
            _relay: &str,
            _tag: &str,
            wait: Duration,
        ) -> Result<Option<Call>, RelayError> {
            self.pulls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(wait).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if self.fail {
                Err(RelayError::transport("connection refused"))
            } else {
                Ok(None)
            }
        }

        async fn post_result(
            &self,
            _relay: &str,
            _tag: &str,
            _result: &CallResult,
        ) -> Result<(), RelayError> {
            Ok(())
        }
    }

    struct Panics;

    #[async_trait]
    impl OperationHandler for Panics {
        async fn invoke(&self, _params: Vec<Value>) -> Result<Value, String> {
            panic!("handler bug")
        }
    }

    fn poller(dispenser: Arc<dyn Dispenser>) -> Arc<Poller> {
        Arc::new(Poller::new(
            PollerConfig::default(),
            dispenser,
            Arc::new(HandlerRegistry::with_builtins()),
        ))
    }

    #[test]
    fn poller_config_defaults() {
        let config = PollerConfig::default();
        assert_eq!(config.lag_window, Duration::from_secs(10));
        assert_eq!(config.poll_timeout, Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_nudges_share_one_loop() {
        let recording = Arc::new(Recording::default());
        let poller = poller(recording.clone());
        for _ in 0..5 {
            poller.nudge("relay-a", "t1".into());
        }
        assert!(poller.is_polling("relay-a"));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(recording.pulls.load(Ordering::SeqCst), 1);
        assert_eq!(recording.max_in_flight.load(Ordering::SeqCst), 1);
        assert!(!poller.is_polling("relay-a"));
    }

    #[tokio::test(start_paused = true)]
    async fn polling_stops_after_lag_window() {
        let recording = Arc::new(Recording::default());
        let poller = poller(recording.clone());
        poller.nudge("relay-a", "t1".into());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(poller.is_polling("relay-a"));
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(!poller.is_polling("relay-a"));
    }

    #[tokio::test(start_paused = true)]
    async fn nudge_during_pull_starts_another_pull() {
        let recording = Arc::new(Recording::default());
        let poller = poller(recording.clone());
        poller.nudge("relay-a", "t1".into());

        tokio::time::sleep(Duration::from_secs(8)).await;
        poller.nudge("relay-a", "t2".into());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(recording.pulls.load(Ordering::SeqCst), 2);
        assert_eq!(recording.max_in_flight.load(Ordering::SeqCst), 2);

        // The second pull runs until 18s and keeps the loop alive.
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(poller.is_polling("relay-a"));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!poller.is_polling("relay-a"));
    }

    #[tokio::test(start_paused = true)]
    async fn addresses_poll_independently() {
        let recording = Arc::new(Recording::default());
        let poller = poller(recording.clone());
        poller.nudge("relay-a", "t1".into());
        poller.nudge("relay-b", "t1".into());
        assert!(poller.is_polling("relay-a"));
        assert!(poller.is_polling("relay-b"));
        assert!(!poller.is_polling("relay-c"));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(recording.max_in_flight.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_is_not_fatal() {
        let recording = Arc::new(Recording {
            fail: true,
            ..Recording::default()
        });
        let poller = poller(recording.clone());
        poller.nudge("relay-a", "t1".into());
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(!poller.is_polling("relay-a"));

        poller.nudge("relay-a", "t2".into());
        assert!(poller.is_polling("relay-a"));
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(recording.pulls.load(Ordering::SeqCst), 2);
    }

    fn local_pair() -> (Arc<Relay>, Arc<Poller>, Arc<HandlerRegistry>) {
        local_pair_with(RelayConfig::default())
    }

    fn local_pair_with(config: RelayConfig) -> (Arc<Relay>, Arc<Poller>, Arc<HandlerRegistry>) {
        let relay = Arc::new(Relay::new(config));
        let ctx = CallerContext::from_host("127.0.0.1");
        let dispenser = Arc::new(LocalDispenser::new(Arc::clone(&relay), ctx));
        let registry = Arc::new(HandlerRegistry::with_builtins());
        let poller = Arc::new(Poller::new(
            PollerConfig::default(),
            dispenser,
            registry.clone(),
        ));
        (relay, poller, registry)
    }

    #[tokio::test(start_paused = true)]
    async fn nudged_call_is_executed_end_to_end() {
        let (relay, poller, _) = local_pair();
        let ctx = CallerContext::from_host("127.0.0.1");

        poller.nudge("local", "tls:e2e".into());
        let outcome = relay
            .submit_tagged("tls:e2e".into(), "echo".into(), vec![json!("hi")], &ctx)
            .await;
        assert_eq!(outcome, Ok(json!("hi")));
        assert_eq!(relay.dispensed_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_nudge_does_not_delay_later_calls() {
        let (relay, poller, _) = local_pair_with(RelayConfig {
            collect_timeout: Duration::from_secs(5),
            ..RelayConfig::default()
        });
        let ctx = CallerContext::from_host("127.0.0.1");

        // Nobody ever submits this one, so its pull waits the full poll timeout.
        poller.nudge("local", "tls:abandoned".into());
        tokio::time::sleep(Duration::from_millis(100)).await;

        let started = Instant::now();
        poller.nudge("local", "tls:next".into());
        let outcome = relay
            .submit_tagged("tls:next".into(), "echo".into(), vec![json!(7)], &ctx)
            .await;
        assert_eq!(outcome, Ok(json!(7)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_operation_reaches_submitter_as_remote_error() {
        let (relay, poller, _) = local_pair();
        let ctx = CallerContext::from_host("127.0.0.1");

        poller.nudge("local", "tls:x".into());
        let outcome = relay
            .submit_tagged("tls:x".into(), "launch".into(), Vec::new(), &ctx)
            .await;
        assert_eq!(
            outcome,
            Err(RelayError::Remote {
                message: "Unknown method launch".into()
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_handler_becomes_error_result() {
        let (relay, poller, registry) = local_pair();
        registry.register("crash", Panics);
        let ctx = CallerContext::from_host("127.0.0.1");

        poller.nudge("local", "tls:p".into());
        let outcome = relay
            .submit_tagged("tls:p".into(), "crash".into(), Vec::new(), &ctx)
            .await;
        assert!(matches!(outcome, Err(RelayError::Remote { message }) if message.contains("crash")));
    }

    #[tokio::test]
    async fn probe_uses_dispenser_ping() {
        let poller = poller(Arc::new(Recording::default()));
        assert_eq!(poller.probe("relay-a").await, Ok(()));
    }
}
