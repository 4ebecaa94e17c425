//! Gemini relay WebSocket handlers
//!
//! Each client connection is bridged 1:1 onto one upstream live session.
//!
//! # Protocol
//!
//! ## Client → Server
//!
//! - **setup**: Open the upstream session (system instruction, voice). Must
//!   arrive within the setup window; later ones are ignored
//! - **audio_chunk**: Base64 PCM16 microphone audio
//! - **audio_end**: Microphone stream ended
//! - **text_turn**: Plain text user turn
//! - **client_content**: Raw conversation turns
//! - **tool_response**: Function call results
//!
//! ## Server → Client
//!
//! - **connected**: Upstream session ready
//! - **model_audio**: Base64 PCM16 speech at 24kHz
//! - **model_text**: Transcript fragment
//! - **model_turn_complete**: Model finished its turn
//! - **tool_call**: Function calls requested by the model
//! - **error**: Error message

mod handler;
mod translate;

pub use handler::{MISSING_SETUP, UPSTREAM_NOT_CONFIGURED, relay_handler};
pub use translate::{forward_client_message, translate_server_message};
