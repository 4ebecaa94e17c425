//! Relay wire protocol
//!
//! One JSON object per WebSocket text frame, discriminated by `type`. The
//! same types are used by the relay handler and by the client session, so
//! both directions derive `Serialize` and `Deserialize`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::live::{ClientContent, FunctionResponse, ToolCall};

/// Maximum allowed size for a system instruction (64 KB)
pub const MAX_INSTRUCTIONS_SIZE: usize = 64 * 1024;

/// Maximum allowed size for text carried in a turn (64 KB)
pub const MAX_TEXT_SIZE: usize = 64 * 1024;

/// Maximum allowed size for a base64 audio payload (1 MB)
pub const MAX_AUDIO_PAYLOAD_SIZE: usize = 1024 * 1024;

/// Maximum allowed size for serialized function responses (64 KB)
pub const MAX_TOOL_RESPONSE_SIZE: usize = 64 * 1024;

/// Message types accepted from clients.
pub const CLIENT_MESSAGE_TYPES: [&str; 6] = [
    "setup",
    "audio_chunk",
    "audio_end",
    "text_turn",
    "client_content",
    "tool_response",
];

// =============================================================================
// Client -> Relay
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Opens the upstream session. Only the first one on a connection counts.
    #[serde(rename = "setup")]
    Setup {
        #[serde(
            rename = "systemInstruction",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        system_instruction: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        voice: Option<String>,
    },

    /// One base64 PCM16 frame from the microphone
    #[serde(rename = "audio_chunk")]
    AudioChunk {
        #[serde(rename = "mimeType")]
        mime_type: String,
        data: String,
    },

    #[serde(rename = "audio_end")]
    AudioEnd,

    /// Plain text user turn
    #[serde(rename = "text_turn")]
    TextTurn {
        text: String,
        #[serde(
            rename = "turnComplete",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        turn_complete: Option<bool>,
    },

    /// Raw conversation turns, forwarded as-is
    #[serde(rename = "client_content")]
    ClientContent { content: ClientContent },

    #[serde(rename = "tool_response")]
    ToolResponse {
        #[serde(rename = "functionResponses", default)]
        function_responses: Vec<FunctionResponse>,
    },
}

// =============================================================================
// Relay -> Client
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Upstream session is open and ready
    #[serde(rename = "connected")]
    Connected,

    #[serde(rename = "error")]
    Error { error: String },

    /// One fragment of synthesized speech
    #[serde(rename = "model_audio")]
    ModelAudio {
        #[serde(rename = "mimeType")]
        mime_type: String,
        data: String,
    },

    /// One final transcript fragment
    #[serde(rename = "model_text")]
    ModelText { text: String },

    #[serde(rename = "model_turn_complete")]
    ModelTurnComplete,

    #[serde(rename = "tool_call")]
    ToolCall {
        #[serde(rename = "toolCall")]
        tool_call: ToolCall,
    },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }
}

// =============================================================================
// Parsing
// =============================================================================

/// Failure to turn a text frame into a [`ClientMessage`] or [`ServerMessage`].
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// Not JSON, not an object, missing `type`, or fields of the wrong shape
    #[error("Malformed message: {0}")]
    Malformed(String),

    /// Well-formed JSON with a `type` this side does not handle
    #[error("Unknown message type: {0}")]
    UnknownType(String),
}

/// Read the `type` discriminator without committing to a variant.
fn message_type(value: &serde_json::Value) -> Result<&str, ProtocolError> {
    value
        .as_object()
        .ok_or_else(|| ProtocolError::Malformed("expected a JSON object".to_string()))?
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or_else(|| ProtocolError::Malformed("missing string field 'type'".to_string()))
}

impl ClientMessage {
    /// Parse one client text frame.
    ///
    /// Unknown `type` values are reported separately so the relay can log and
    /// ignore them instead of answering with an error.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        let kind = message_type(&value)?;
        if !CLIENT_MESSAGE_TYPES.contains(&kind) {
            return Err(ProtocolError::UnknownType(kind.to_string()));
        }
        serde_json::from_value(value).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    /// Wire name of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Setup { .. } => "setup",
            Self::AudioChunk { .. } => "audio_chunk",
            Self::AudioEnd => "audio_end",
            Self::TextTurn { .. } => "text_turn",
            Self::ClientContent { .. } => "client_content",
            Self::ToolResponse { .. } => "tool_response",
        }
    }
}

impl ServerMessage {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        let kind = message_type(&value)?;
        match kind {
            "connected" | "error" | "model_audio" | "model_text" | "model_turn_complete"
            | "tool_call" => {
                serde_json::from_value(value).map_err(|e| ProtocolError::Malformed(e.to_string()))
            }
            other => Err(ProtocolError::UnknownType(other.to_string())),
        }
    }
}

// =============================================================================
// Validation
// =============================================================================

/// Error type for message validation failures
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// System instruction exceeds maximum allowed size
    InstructionsTooLarge { size: usize, max: usize },
    /// Text content exceeds maximum allowed size
    TextTooLarge { size: usize, max: usize },
    /// Audio payload exceeds maximum allowed size
    AudioTooLarge { size: usize, max: usize },
    /// Function responses exceed maximum allowed size
    ToolResponseTooLarge { size: usize, max: usize },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InstructionsTooLarge { size, max } => {
                write!(
                    f,
                    "System instruction too large: {} bytes (max: {} bytes)",
                    size, max
                )
            }
            Self::TextTooLarge { size, max } => {
                write!(f, "Text too large: {} bytes (max: {} bytes)", size, max)
            }
            Self::AudioTooLarge { size, max } => {
                write!(f, "Audio chunk too large: {} bytes (max: {} bytes)", size, max)
            }
            Self::ToolResponseTooLarge { size, max } => {
                write!(
                    f,
                    "Tool response too large: {} bytes (max: {} bytes)",
                    size, max
                )
            }
        }
    }
}

impl std::error::Error for ValidationError {}

fn check(size: usize, max: usize, err: fn(usize, usize) -> ValidationError) -> Result<(), ValidationError> {
    if size > max { Err(err(size, max)) } else { Ok(()) }
}

impl ClientMessage {
    /// Validates message field sizes to prevent resource exhaustion attacks.
    pub fn validate_size(&self) -> Result<(), ValidationError> {
        match self {
            Self::Setup {
                system_instruction: Some(instruction),
                ..
            } => check(instruction.len(), MAX_INSTRUCTIONS_SIZE, |size, max| {
                ValidationError::InstructionsTooLarge { size, max }
            }),
            Self::AudioChunk { data, .. } => check(data.len(), MAX_AUDIO_PAYLOAD_SIZE, |size, max| {
                ValidationError::AudioTooLarge { size, max }
            }),
            Self::TextTurn { text, .. } => check(text.len(), MAX_TEXT_SIZE, |size, max| {
                ValidationError::TextTooLarge { size, max }
            }),
            Self::ClientContent { content } => {
                let size = content
                    .turns
                    .iter()
                    .flat_map(|turn| turn.parts.iter())
                    .filter_map(|part| part.text.as_ref())
                    .map(String::len)
                    .sum();
                check(size, MAX_TEXT_SIZE, |size, max| ValidationError::TextTooLarge {
                    size,
                    max,
                })
            }
            Self::ToolResponse { function_responses } => {
                let size = serde_json::to_vec(function_responses)
                    .map(|v| v.len())
                    .unwrap_or(0);
                check(size, MAX_TOOL_RESPONSE_SIZE, |size, max| {
                    ValidationError::ToolResponseTooLarge { size, max }
                })
            }
            Self::Setup { .. } | Self::AudioEnd => Ok(()),
        }
    }
}
