//! Servicer nudge endpoint: `GET /nudge?relay=<url>&callTag=<tag>`.
//!
//! A submitter running on the servicer's machine nudges it just before
//! submitting, so the servicer knows which relay to poll and which tag to
//! collect. Only loopback callers are served.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Query, State};
use axum::http::header::CACHE_CONTROL;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::{debug, warn};

use super::NudgeState;

#[derive(Debug, Default, Deserialize)]
pub struct NudgeParams {
    pub relay: Option<String>,
    #[serde(rename = "callTag")]
    pub call_tag: Option<String>,
}

pub async fn nudge_handler(
    State(state): State<NudgeState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Query(params): Query<NudgeParams>,
) -> Response {
    if !peer.ip().to_canonical().is_loopback() {
        warn!(%peer, "refused nudge from non-local host");
        return (StatusCode::FORBIDDEN, "nudges are accepted from localhost only").into_response();
    }

    let Some(relay) = params.relay else {
        // Sent once by a submitter to check that the servicer is listening.
        debug!("nudge listener probed");
        return (StatusCode::OK, "callrelay servicer").into_response();
    };
    let Some(tag) = params.call_tag.filter(|tag| !tag.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "missing callTag").into_response();
    };
    match reqwest::Url::parse(&relay) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        _ => {
            warn!(%relay, "nudge names an unusable relay address");
            return (StatusCode::BAD_REQUEST, "relay must be an http(s) URL").into_response();
        }
    }

    state.poller.nudge(&relay, tag);
    (StatusCode::NO_CONTENT, [(CACHE_CONTROL, "no-cache")]).into_response()
}
