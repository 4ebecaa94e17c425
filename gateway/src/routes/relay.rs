//! Relay WebSocket route configuration

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::relay_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Path of the relay WebSocket endpoint.
pub const RELAY_PATH: &str = "/gemini";

/// Create the relay WebSocket router
///
/// # Endpoint
///
/// `GET /gemini` - WebSocket upgrade for a voice conversation
///
/// # Protocol
///
/// After WebSocket upgrade, clients send:
/// 1. `setup` with an optional system instruction and voice (within 8s)
/// 2. `audio_chunk` frames (base64 PCM16, 16kHz, mono), `audio_end`, text turns
///
/// Server responds with:
/// - `connected` once the upstream session is ready
/// - `model_audio` (base64 PCM16, 24kHz), `model_text`, `model_turn_complete`
/// - `tool_call` when the model requests a function
/// - `error` on failures
///
/// # Example
///
/// ```json
/// // Client sends setup
/// {"type": "setup", "voice": "Kore", "systemInstruction": "Tu es un tuteur de français."}
///
/// // Server responds
/// {"type": "connected"}
/// ```
pub fn create_relay_router() -> Router<Arc<AppState>> {
    Router::new()
        .route(RELAY_PATH, get(relay_handler))
        .layer(TraceLayer::new_for_http())
}
