//! Gemini Live client frames.
//!
//! Each frame is a JSON object with a single top-level member naming the
//! frame kind (`setup`, `realtimeInput`, `clientContent`, `toolResponse`).
//! Server frames deserialize into [`LiveServerMessage`].

use serde::Serialize;

use crate::core::live::base::Modality;
use crate::core::live::messages::{Blob, ClientContent, Content, Part, RealtimeInput, Tool, ToolResponse};

/// Frames sent from the relay to the Live API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientFrame {
    Setup(SetupFrame),
    RealtimeInput(RealtimeInputFrame),
    ClientContent(ClientContent),
    ToolResponse(ToolResponse),
}

impl From<RealtimeInput> for ClientFrame {
    fn from(input: RealtimeInput) -> Self {
        let frame = match input {
            RealtimeInput::Media(blob) => RealtimeInputFrame {
                media_chunks: Some(vec![blob]),
                audio_stream_end: None,
            },
            RealtimeInput::AudioStreamEnd => RealtimeInputFrame {
                media_chunks: None,
                audio_stream_end: Some(true),
            },
        };
        Self::RealtimeInput(frame)
    }
}

/// First frame on every connection.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupFrame {
    pub model: String,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
}

impl SetupFrame {
    pub fn new(
        model: String,
        modality: Modality,
        voice_name: &str,
        system_instruction: &str,
        tools: Vec<Tool>,
    ) -> Self {
        let speech_config = (!voice_name.is_empty()).then(|| SpeechConfig {
            voice_config: VoiceConfig {
                prebuilt_voice_config: PrebuiltVoiceConfig {
                    voice_name: voice_name.to_string(),
                },
            },
        });
        let system_instruction = (!system_instruction.is_empty()).then(|| Content {
            role: None,
            parts: vec![Part::text(system_instruction)],
            ..Default::default()
        });

        Self {
            model,
            generation_config: GenerationConfig {
                response_modalities: vec![modality],
                speech_config,
            },
            system_instruction,
            tools,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<Modality>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<SpeechConfig>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInputFrame {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_chunks: Option<Vec<Blob>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_stream_end: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_setup_frame_serialization() {
        let frame = ClientFrame::Setup(SetupFrame::new(
            "models/m".to_string(),
            Modality::Audio,
            "Kore",
            "Parle lentement.",
            vec![Tool::default()],
        ));

        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({
                "setup": {
                    "model": "models/m",
                    "generationConfig": {
                        "responseModalities": ["AUDIO"],
                        "speechConfig": {
                            "voiceConfig": {"prebuiltVoiceConfig": {"voiceName": "Kore"}}
                        }
                    },
                    "systemInstruction": {"parts": [{"text": "Parle lentement."}]},
                    "tools": [{"functionDeclarations": []}]
                }
            })
        );
    }

    #[test]
    fn test_setup_frame_omits_empty_fields() {
        let frame = SetupFrame::new("models/m".to_string(), Modality::Text, "", "", vec![]);
        let value = serde_json::to_value(&frame).unwrap();
        assert!(value.get("systemInstruction").is_none());
        assert!(value.get("tools").is_none());
        assert!(value["generationConfig"].get("speechConfig").is_none());
    }

    #[test]
    fn test_realtime_input_frames() {
        let media: ClientFrame = RealtimeInput::Media(Blob {
            mime_type: "audio/pcm;rate=16000".to_string(),
            data: "AAA=".to_string(),
        })
        .into();
        assert_eq!(
            serde_json::to_value(&media).unwrap(),
            json!({"realtimeInput": {"mediaChunks": [{"mimeType": "audio/pcm;rate=16000", "data": "AAA="}]}})
        );

        let end: ClientFrame = RealtimeInput::AudioStreamEnd.into();
        assert_eq!(
            serde_json::to_value(&end).unwrap(),
            json!({"realtimeInput": {"audioStreamEnd": true}})
        );
    }

    #[test]
    fn test_client_content_frame() {
        let frame = ClientFrame::ClientContent(ClientContent {
            turns: vec![Content::user_text("Bonjour")],
            turn_complete: Some(true),
            ..Default::default()
        });
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({"clientContent": {"turns": [{"role": "user", "parts": [{"text": "Bonjour"}]}], "turnComplete": true}})
        );
    }
}
