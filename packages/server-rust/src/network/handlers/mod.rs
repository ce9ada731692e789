//! HTTP handler definitions for the relay and nudge listeners.
//!
//! Each listener has its own state type carried through axum's `State`
//! extractor; both hold only `Arc`s so cloning is cheap.

pub mod health;
pub mod nudge;
pub mod relay;

pub use health::{health_handler, liveness_handler, readiness_handler};
pub use nudge::nudge_handler;
pub use relay::{relay_info_handler, relay_rpc_handler};

use std::sync::Arc;
use std::time::Instant;

use super::ShutdownController;
use crate::poller::Poller;
use crate::relay::Relay;

/// State shared by the relay listener's handlers.
#[derive(Clone)]
pub struct RelayState {
    pub relay: Arc<Relay>,
    /// Health state and in-flight tracking for the listener.
    pub shutdown: Arc<ShutdownController>,
    /// Used for uptime reporting.
    pub start_time: Instant,
}

/// State of the servicer's nudge listener.
#[derive(Clone)]
pub struct NudgeState {
    pub poller: Arc<Poller>,
}
