//! HTTP listeners: relay RPC endpoint, servicer nudge endpoint, health
//! probes, middleware, and shutdown control.

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod module;
pub mod shutdown;

pub use config::*;
pub use handlers::{NudgeState, RelayState};
pub use module::{build_nudge_router, build_relay_router, NetworkModule, NUDGE_PATH, RELAY_PATH};
pub use shutdown::*;
