//! Gemini Live upstream provider.
//!
//! # Backends
//!
//! - **Vertex AI** - regional endpoint, OAuth bearer token from a service account
//! - **Gemini Developer API** - global endpoint, API key in the query string
//!
//! # Voices
//!
//! Puck, Charon, Kore (default), Fenrir, Aoede, Leda, Orus, Zephyr

mod auth;
mod client;
mod config;
mod messages;

pub use auth::{
    AccessTokenProvider, CLOUD_PLATFORM_SCOPE, ServiceAccountKey, ServiceAccountTokenProvider,
    StaticAccessToken,
};
pub use client::{GeminiLiveConnector, GeminiLiveSession};
pub use config::{
    DEFAULT_GEMINI_API_MODEL, DEFAULT_SETUP_COMPLETE_TIMEOUT, DEFAULT_VERTEX_LOCATION,
    DEFAULT_VERTEX_MODEL, GEMINI_API_LIVE_URL, GeminiBackend, GeminiLiveConfig, GeminiVoice,
    VERTEX_LIVE_PATH,
};
pub use messages::{ClientFrame, RealtimeInputFrame, SetupFrame};
