//! The relay's RPC endpoint.
//!
//! Every RPC arrives as `POST /relay`. Methods in the dispense namespace go
//! to the dispense side; anything else is submitted as a call and the
//! request is held open until the call's outcome is known. Faults are
//! answered with HTTP 200 like any other RPC response.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, State};
use axum::http::header::REFERER;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use callrelay_core::{CallerContext, DispenseRequest, RpcRequest, RpcResponse};
use tracing::debug;

use super::RelayState;

pub async fn relay_rpc_handler(
    State(state): State<RelayState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(request): Json<RpcRequest>,
) -> Response {
    let ctx = CallerContext {
        host: Some(peer.ip().to_canonical().to_string()),
        referer: headers
            .get(REFERER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
    };

    let outcome = if request.is_dispense() {
        // Results for calls already in flight are accepted while draining.
        match DispenseRequest::parse(&request) {
            Ok(dispense) => state.relay.dispense(dispense, &ctx).await,
            Err(error) => Err(error),
        }
    } else {
        if !state.shutdown.health_state().accepts_requests() {
            return (StatusCode::SERVICE_UNAVAILABLE, "relay is shutting down").into_response();
        }
        let _guard = state.shutdown.in_flight_guard();
        let tag = request.tag.unwrap_or_else(|| state.relay.new_tag());
        state
            .relay
            .submit_tagged(tag, request.method, request.params, &ctx)
            .await
    };

    if let Err(error) = &outcome {
        debug!(peer = %peer, code = error.code(), %error, "rpc fault");
    }
    Json(RpcResponse::from(outcome)).into_response()
}

/// Plain-text notice for browsers and humans poking at the endpoint.
pub async fn relay_info_handler(State(state): State<RelayState>) -> String {
    format!(
        "callrelay: POST JSON-RPC requests to this URL.\n\
         origin policy: {}\npending calls: {}\ndispensed calls: {}\n",
        state.relay.policy_name(),
        state.relay.pending_count(),
        state.relay.dispensed_count(),
    )
}
