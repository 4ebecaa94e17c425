//! Gemini Live configuration types.
//!
//! Covers endpoint selection for the two hosted backends (Vertex AI and the
//! Gemini Developer API), model resource naming and the prebuilt voice list.

use std::time::Duration;

use url::Url;

/// Vertex AI Live endpoint path, appended to the regional host.
pub const VERTEX_LIVE_PATH: &str =
    "/ws/google.cloud.aiplatform.v1beta1.LlmBidiService/BidiGenerateContent";

/// Gemini Developer API Live endpoint.
pub const GEMINI_API_LIVE_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Default native-audio model on Vertex AI.
pub const DEFAULT_VERTEX_MODEL: &str = "gemini-live-2.5-flash-native-audio";

/// Default native-audio model on the Gemini Developer API.
pub const DEFAULT_GEMINI_API_MODEL: &str = "gemini-2.5-flash-native-audio-preview-09-2025";

/// Default Vertex AI region.
pub const DEFAULT_VERTEX_LOCATION: &str = "us-central1";

/// How long to wait for `setupComplete` after the socket opens.
pub const DEFAULT_SETUP_COMPLETE_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Voices
// =============================================================================

/// Prebuilt voices available to native-audio models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GeminiVoice {
    Puck,
    Charon,
    #[default]
    Kore,
    Fenrir,
    Aoede,
    Leda,
    Orus,
    Zephyr,
}

impl GeminiVoice {
    pub const ALL: [GeminiVoice; 8] = [
        Self::Puck,
        Self::Charon,
        Self::Kore,
        Self::Fenrir,
        Self::Aoede,
        Self::Leda,
        Self::Orus,
        Self::Zephyr,
    ];

    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Puck => "Puck",
            Self::Charon => "Charon",
            Self::Kore => "Kore",
            Self::Fenrir => "Fenrir",
            Self::Aoede => "Aoede",
            Self::Leda => "Leda",
            Self::Orus => "Orus",
            Self::Zephyr => "Zephyr",
        }
    }

    /// Case-insensitive lookup of a known voice.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|voice| voice.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

impl std::fmt::Display for GeminiVoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Backend
// =============================================================================

/// Which hosted API serves the Live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeminiBackend {
    /// Vertex AI, authenticated with an OAuth bearer token
    Vertex { project_id: String, location: String },
    /// Gemini Developer API, authenticated with an API key
    GeminiApi { api_key: String },
}

impl GeminiBackend {
    /// WebSocket endpoint for this backend.
    pub fn endpoint_url(&self) -> Result<Url, url::ParseError> {
        match self {
            Self::Vertex { location, .. } => {
                let host = if location == "global" {
                    "aiplatform.googleapis.com".to_string()
                } else {
                    format!("{location}-aiplatform.googleapis.com")
                };
                Url::parse(&format!("wss://{host}{VERTEX_LIVE_PATH}"))
            }
            Self::GeminiApi { api_key } => {
                let mut url = Url::parse(GEMINI_API_LIVE_URL)?;
                url.query_pairs_mut().append_pair("key", api_key);
                Ok(url)
            }
        }
    }

    /// Fully qualified model resource name sent in the setup frame.
    ///
    /// Names that already carry a resource prefix are kept as-is.
    pub fn model_resource(&self, model: &str) -> String {
        match self {
            Self::Vertex {
                project_id,
                location,
            } => {
                if model.starts_with("projects/") {
                    model.to_string()
                } else if model.starts_with("publishers/") {
                    format!("projects/{project_id}/locations/{location}/{model}")
                } else {
                    format!(
                        "projects/{project_id}/locations/{location}/publishers/google/models/{model}"
                    )
                }
            }
            Self::GeminiApi { .. } => {
                if model.starts_with("models/") {
                    model.to_string()
                } else {
                    format!("models/{model}")
                }
            }
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Vertex { .. } => DEFAULT_VERTEX_MODEL,
            Self::GeminiApi { .. } => DEFAULT_GEMINI_API_MODEL,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Vertex { .. } => "vertex",
            Self::GeminiApi { .. } => "gemini-api",
        }
    }
}

/// Connection settings for a [`super::GeminiLiveConnector`].
#[derive(Debug, Clone)]
pub struct GeminiLiveConfig {
    pub backend: GeminiBackend,
    /// Overrides the per-session model when set
    pub model: Option<String>,
    pub setup_complete_timeout: Duration,
}

impl GeminiLiveConfig {
    pub fn new(backend: GeminiBackend) -> Self {
        Self {
            backend,
            model: None,
            setup_complete_timeout: DEFAULT_SETUP_COMPLETE_TIMEOUT,
        }
    }

    /// Resolve the model for a session: configured override, then the
    /// session's own request, then the backend default.
    pub fn resolve_model(&self, requested: &str) -> String {
        let model = self
            .model
            .as_deref()
            .filter(|m| !m.is_empty())
            .or(Some(requested).filter(|m| !m.is_empty()))
            .unwrap_or(self.backend.default_model());
        self.backend.model_resource(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex() -> GeminiBackend {
        GeminiBackend::Vertex {
            project_id: "frenchy".to_string(),
            location: "us-central1".to_string(),
        }
    }

    #[test]
    fn test_voice_parsing() {
        assert_eq!(GeminiVoice::parse("Kore"), Some(GeminiVoice::Kore));
        assert_eq!(GeminiVoice::parse("puck"), Some(GeminiVoice::Puck));
        assert_eq!(GeminiVoice::parse("alloy"), None);
        assert_eq!(GeminiVoice::default().to_string(), "Kore");
    }

    #[test]
    fn test_vertex_endpoint() {
        let url = vertex().endpoint_url().unwrap();
        assert_eq!(url.host_str(), Some("us-central1-aiplatform.googleapis.com"));
        assert!(url.path().ends_with("LlmBidiService/BidiGenerateContent"));

        let global = GeminiBackend::Vertex {
            project_id: "p".to_string(),
            location: "global".to_string(),
        };
        assert_eq!(
            global.endpoint_url().unwrap().host_str(),
            Some("aiplatform.googleapis.com")
        );
    }

    #[test]
    fn test_gemini_api_endpoint_carries_key() {
        let backend = GeminiBackend::GeminiApi {
            api_key: "abc 123".to_string(),
        };
        let url = backend.endpoint_url().unwrap();
        assert_eq!(url.scheme(), "wss");
        assert!(url.query_pairs().any(|(k, v)| k == "key" && v == "abc 123"));
    }

    #[test]
    fn test_vertex_model_resource() {
        let backend = vertex();
        assert_eq!(
            backend.model_resource(DEFAULT_VERTEX_MODEL),
            "projects/frenchy/locations/us-central1/publishers/google/models/gemini-live-2.5-flash-native-audio"
        );
        assert_eq!(
            backend.model_resource("publishers/google/models/x"),
            "projects/frenchy/locations/us-central1/publishers/google/models/x"
        );
        assert_eq!(backend.model_resource("projects/a/b"), "projects/a/b");
    }

    #[test]
    fn test_gemini_api_model_resource() {
        let backend = GeminiBackend::GeminiApi {
            api_key: "k".to_string(),
        };
        assert_eq!(backend.model_resource("foo"), "models/foo");
        assert_eq!(backend.model_resource("models/foo"), "models/foo");
    }

    #[test]
    fn test_resolve_model_precedence() {
        let mut config = GeminiLiveConfig::new(vertex());
        assert!(config.resolve_model("").ends_with(DEFAULT_VERTEX_MODEL));
        assert!(config.resolve_model("custom").ends_with("/custom"));

        config.model = Some("pinned".to_string());
        assert!(config.resolve_model("custom").ends_with("/pinned"));
    }
}
