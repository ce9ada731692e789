//! Health, liveness, and readiness endpoint handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use super::RelayState;
use crate::network::HealthState;

/// Returns relay health as JSON.
///
/// Always 200; the `state` field says whether the relay is serving. The
/// call counts show how many submissions are waiting to be pulled and how
/// many pulled calls are waiting for results.
pub async fn health_handler(State(state): State<RelayState>) -> Json<serde_json::Value> {
    let health = state.shutdown.health_state();

    Json(json!({
        "state": health.as_str(),
        "pending_calls": state.relay.pending_count(),
        "dispensed_calls": state.relay.dispensed_count(),
        "in_flight": state.shutdown.in_flight_count(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

/// Liveness probe: 200 whenever the process answers.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe: 200 when ready, 503 while starting or draining.
pub async fn readiness_handler(State(state): State<RelayState>) -> StatusCode {
    if state.shutdown.health_state() == HealthState::Ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Instant;

    use callrelay_core::CallerContext;

    use super::*;
    use crate::network::ShutdownController;
    use crate::relay::{Relay, RelayConfig};

    fn test_state() -> RelayState {
        RelayState {
            relay: Arc::new(Relay::new(RelayConfig {
                check_hosts: false,
                ..RelayConfig::default()
            })),
            shutdown: Arc::new(ShutdownController::new()),
            start_time: Instant::now(),
        }
    }

    #[tokio::test]
    async fn health_reports_state_and_counts() {
        let state = test_state();
        state.shutdown.set_ready();

        let json = health_handler(State(state)).await.0;
        assert_eq!(json["state"], "ready");
        assert_eq!(json["pending_calls"], 0);
        assert_eq!(json["dispensed_calls"], 0);
        assert_eq!(json["in_flight"], 0);
        assert!(json["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn health_counts_pending_calls() {
        let state = test_state();
        let _pending = state
            .relay
            .enqueue("t".into(), "echo".into(), Vec::new(), &CallerContext::default())
            .unwrap();
        let json = health_handler(State(state)).await.0;
        assert_eq!(json["pending_calls"], 1);
        assert_eq!(json["state"], "starting");
    }

    #[tokio::test]
    async fn liveness_always_ok() {
        assert_eq!(liveness_handler().await, StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_follows_health_state() {
        let state = test_state();
        assert_eq!(
            readiness_handler(State(state.clone())).await,
            StatusCode::SERVICE_UNAVAILABLE
        );
        state.shutdown.set_ready();
        assert_eq!(readiness_handler(State(state.clone())).await, StatusCode::OK);
        state.shutdown.trigger_shutdown();
        assert_eq!(
            readiness_handler(State(state)).await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
