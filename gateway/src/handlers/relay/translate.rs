//! Message translation between the relay protocol and the upstream session.

use crate::core::audio::{PLAYBACK_SAMPLE_RATE, pcm_mime_type};
use crate::core::live::{
    Blob, ClientContent, Content, LiveResult, LiveServerMessage, LiveSession, RealtimeInput,
    ToolResponse,
};
use crate::protocol::{ClientMessage, ServerMessage};

/// Translate one upstream message into zero or more client messages.
///
/// Parts are emitted in order, followed by `model_turn_complete` when the
/// turn ended, then `tool_call` if present.
pub fn translate_server_message(message: LiveServerMessage) -> Vec<ServerMessage> {
    let mut out = Vec::new();

    if let Some(content) = message.server_content {
        if let Some(turn) = content.model_turn {
            for part in turn.parts {
                if let Some(blob) = part.inline_data
                    && !blob.data.is_empty()
                {
                    out.push(ServerMessage::ModelAudio {
                        mime_type: pcm_mime_type(PLAYBACK_SAMPLE_RATE),
                        data: blob.data,
                    });
                }
                if let Some(text) = part.text
                    && !text.is_empty()
                {
                    out.push(ServerMessage::ModelText { text });
                }
            }
        }
        if content.turn_complete == Some(true) {
            out.push(ServerMessage::ModelTurnComplete);
        }
    }

    if let Some(tool_call) = message.tool_call
        && tool_call.function_calls.is_some()
    {
        out.push(ServerMessage::ToolCall { tool_call });
    }

    out
}

/// Forward one client message to the upstream session.
///
/// `setup` is handled by the connection itself and is a no-op here.
pub async fn forward_client_message(
    session: &dyn LiveSession,
    message: ClientMessage,
) -> LiveResult<()> {
    match message {
        ClientMessage::AudioChunk { mime_type, data } => {
            session
                .send_realtime_input(RealtimeInput::Media(Blob { mime_type, data }))
                .await
        }
        ClientMessage::AudioEnd => {
            session
                .send_realtime_input(RealtimeInput::AudioStreamEnd)
                .await
        }
        ClientMessage::TextTurn {
            text,
            turn_complete,
        } => {
            session
                .send_client_content(ClientContent {
                    turns: vec![Content::user_text(text)],
                    turn_complete: Some(turn_complete.unwrap_or(true)),
                    ..Default::default()
                })
                .await
        }
        ClientMessage::ClientContent { content } => session.send_client_content(content).await,
        ClientMessage::ToolResponse { function_responses } => {
            session
                .send_tool_response(ToolResponse { function_responses })
                .await
        }
        ClientMessage::Setup { .. } => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::live::{FunctionCall, Part, ServerContent, ToolCall};
    use serde_json::json;

    fn audio_part(data: &str) -> Part {
        Part::inline(Blob {
            mime_type: "audio/pcm;rate=24000".to_string(),
            data: data.to_string(),
        })
    }

    #[test]
    fn test_translate_audio_text_and_turn_complete() {
        let message = LiveServerMessage {
            server_content: Some(ServerContent {
                model_turn: Some(Content {
                    role: Some("model".to_string()),
                    parts: vec![audio_part("AAA="), Part::text("Bonjour"), audio_part("BBB=")],
                    ..Default::default()
                }),
                turn_complete: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        };

        let out = translate_server_message(message);
        assert_eq!(
            out,
            vec![
                ServerMessage::ModelAudio {
                    mime_type: "audio/pcm;rate=24000".to_string(),
                    data: "AAA=".to_string(),
                },
                ServerMessage::ModelText {
                    text: "Bonjour".to_string()
                },
                ServerMessage::ModelAudio {
                    mime_type: "audio/pcm;rate=24000".to_string(),
                    data: "BBB=".to_string(),
                },
                ServerMessage::ModelTurnComplete,
            ]
        );
    }

    #[test]
    fn test_translate_ignores_empty_and_unrelated() {
        let message = LiveServerMessage {
            server_content: Some(ServerContent {
                model_turn: Some(Content {
                    role: None,
                    parts: vec![audio_part(""), Part::text(""), Part::default()],
                    ..Default::default()
                }),
                turn_complete: Some(false),
                interrupted: Some(true),
                ..Default::default()
            }),
            usage_metadata: Some(json!({"totalTokenCount": 12})),
            ..Default::default()
        };
        assert!(translate_server_message(message).is_empty());
        assert!(translate_server_message(LiveServerMessage::default()).is_empty());
    }

    #[test]
    fn test_translate_tool_call() {
        let tool_call = ToolCall {
            function_calls: Some(vec![FunctionCall {
                id: Some("call-1".to_string()),
                name: "conjugate".to_string(),
                args: Some(json!({"verb": "aller"})),
            }]),
        };
        let message = LiveServerMessage {
            tool_call: Some(tool_call.clone()),
            ..Default::default()
        };
        assert_eq!(
            translate_server_message(message),
            vec![ServerMessage::ToolCall { tool_call }]
        );

        let empty = LiveServerMessage {
            tool_call: Some(ToolCall::default()),
            ..Default::default()
        };
        assert!(translate_server_message(empty).is_empty());
    }
}
