//! Base traits and types for upstream live speech sessions.
//!
//! A live session is a bidirectional speech-to-speech conversation with a
//! hosted model. The relay opens exactly one session per client connection
//! through a [`LiveConnector`] and drives it through [`LiveSession`].
//!
//! # Audio Format
//!
//! Input: PCM 16-bit signed little-endian at 16kHz, base64 encoded.
//! Output: PCM 16-bit signed little-endian at 24kHz, base64 encoded.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

use super::messages::{ClientContent, LiveServerMessage, RealtimeInput, Tool, ToolResponse};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while talking to the upstream model.
#[derive(Debug, Error)]
pub enum LiveError {
    /// Connection to the provider failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Provider-specific error
    #[error("Provider error: {0}")]
    ProviderError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Operation timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Not connected
    #[error("Not connected")]
    NotConnected,

    /// Session error
    #[error("Session error: {0}")]
    SessionError(String),
}

/// Result type for live session operations.
pub type LiveResult<T> = Result<T, LiveError>;

// =============================================================================
// Configuration Types
// =============================================================================

/// Output modality requested from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Modality {
    #[default]
    Audio,
    Text,
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Modality::Audio => write!(f, "AUDIO"),
            Modality::Text => write!(f, "TEXT"),
        }
    }
}

/// Per-session configuration handed to [`LiveConnector::connect`].
#[derive(Debug, Clone, PartialEq)]
pub struct LiveSessionConfig {
    /// Model identifier, without any backend-specific resource prefix
    pub model: String,
    pub response_modality: Modality,
    /// Prebuilt voice name, e.g. "Kore"
    pub voice_name: String,
    pub system_instruction: String,
    pub tools: Vec<Tool>,
}

impl Default for LiveSessionConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            response_modality: Modality::Audio,
            voice_name: "Kore".to_string(),
            system_instruction: String::new(),
            tools: vec![Tool::default()],
        }
    }
}

// =============================================================================
// Callback Types
// =============================================================================

/// Callback fired once the upstream session is established.
pub type LiveOpenCallback =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback for every message the model sends.
pub type LiveMessageCallback =
    Arc<dyn Fn(LiveServerMessage) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback fired when the upstream connection ends, with an optional reason.
pub type LiveCloseCallback =
    Arc<dyn Fn(Option<String>) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback for upstream errors that do not by themselves end the session.
pub type LiveErrorCallback =
    Arc<dyn Fn(LiveError) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Event handlers registered at connect time.
#[derive(Clone, Default)]
pub struct LiveCallbacks {
    pub on_open: Option<LiveOpenCallback>,
    pub on_message: Option<LiveMessageCallback>,
    pub on_close: Option<LiveCloseCallback>,
    pub on_error: Option<LiveErrorCallback>,
}

impl LiveCallbacks {
    pub async fn emit_open(&self) {
        if let Some(cb) = &self.on_open {
            cb().await;
        }
    }

    pub async fn emit_message(&self, message: LiveServerMessage) {
        if let Some(cb) = &self.on_message {
            cb(message).await;
        }
    }

    pub async fn emit_close(&self, reason: Option<String>) {
        if let Some(cb) = &self.on_close {
            cb(reason).await;
        }
    }

    pub async fn emit_error(&self, error: LiveError) {
        if let Some(cb) = &self.on_error {
            cb(error).await;
        }
    }
}

impl fmt::Debug for LiveCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveCallbacks")
            .field("on_open", &self.on_open.is_some())
            .field("on_message", &self.on_message.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

// =============================================================================
// Session Traits
// =============================================================================

/// An established upstream conversation.
///
/// Sends are fire-and-forget from the caller's perspective: they fail only
/// when the session is no longer connected.
#[async_trait]
pub trait LiveSession: Send + Sync {
    /// Stream realtime audio input or the end-of-stream signal.
    async fn send_realtime_input(&self, input: RealtimeInput) -> LiveResult<()>;

    /// Append conversation turns.
    async fn send_client_content(&self, content: ClientContent) -> LiveResult<()>;

    /// Answer a tool call.
    async fn send_tool_response(&self, response: ToolResponse) -> LiveResult<()>;

    /// Close the session. Idempotent.
    async fn close(&mut self) -> LiveResult<()>;

    fn is_open(&self) -> bool;
}

/// Type alias for boxed live sessions.
pub type BoxedLiveSession = Box<dyn LiveSession>;

/// Factory for upstream sessions.
///
/// `connect` resolves once the upstream has acknowledged the session setup.
/// The callbacks stay registered for the lifetime of the returned session.
#[async_trait]
pub trait LiveConnector: Send + Sync {
    async fn connect(
        &self,
        config: LiveSessionConfig,
        callbacks: LiveCallbacks,
    ) -> LiveResult<BoxedLiveSession>;

    /// Short provider name for logs.
    fn provider_name(&self) -> &'static str;
}
