//! Capacity limits for relay WebSocket connections
//!
//! Each relay connection holds an upstream model session, so upgrades are
//! counted globally and per client IP. Plain HTTP requests are not counted.
//!
//! # Example
//!
//! ```ignore
//! use axum::Router;
//! use parlons_gateway::middleware::connection_limit_middleware;
//!
//! let app = Router::new()
//!     .route("/gemini", get(relay_handler))
//!     .layer(axum::middleware::from_fn_with_state(
//!         state.clone(),
//!         connection_limit_middleware,
//!     ));
//! ```

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode, header::UPGRADE},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::warn;

use crate::state::{AppState, ConnectionLimitError};

/// IP whose slot was reserved for this upgrade.
///
/// The relay handler releases the slot when the socket ends or the upgrade
/// fails.
#[derive(Clone, Copy, Debug)]
pub struct ClientIp(pub IpAddr);

fn is_websocket_upgrade(request: &Request<Body>) -> bool {
    request
        .headers()
        .get(UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
}

/// Reserve a connection slot before a WebSocket upgrade.
///
/// Refuses with 503 when the server-wide limit is reached and 429 when the
/// caller's IP is at its limit. On success the [`ClientIp`] extension is
/// attached for the handler.
pub async fn connection_limit_middleware(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if !is_websocket_upgrade(&request) {
        return next.run(request).await;
    }

    let client_ip = addr.ip();

    match state.try_acquire_connection(client_ip) {
        Ok(()) => {
            request.extensions_mut().insert(ClientIp(client_ip));
            next.run(request).await
        }
        Err(e @ ConnectionLimitError::GlobalLimitReached) => {
            warn!(ip = %client_ip, "Rejecting relay connection: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "Server at capacity. Please try again later.",
            )
                .into_response()
        }
        Err(e @ ConnectionLimitError::PerIpLimitReached) => {
            warn!(ip = %client_ip, "Rejecting relay connection: {}", e);
            (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many connections from your IP address.",
            )
                .into_response()
        }
    }
}
