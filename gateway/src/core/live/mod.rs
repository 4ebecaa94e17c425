//! Upstream live speech sessions.
//!
//! The relay treats the hosted model as an opaque capability: a
//! [`LiveConnector`] opens a [`LiveSession`] configured with a voice and a
//! system instruction, and model output arrives through [`LiveCallbacks`].
//!
//! # Supported Providers
//!
//! - **Vertex AI** - Gemini Live on Google Cloud (service account auth)
//! - **Gemini API** - Gemini Live on the Developer API (API key auth)
//!
//! # Example
//!
//! ```rust,ignore
//! use parlons_gateway::core::live::{create_live_connector, LiveCallbacks, LiveSessionConfig};
//!
//! let connector = create_live_connector(&config)?.expect("upstream configured");
//! let session = connector
//!     .connect(LiveSessionConfig::default(), LiveCallbacks::default())
//!     .await?;
//! ```

mod base;
pub mod gemini;
pub mod messages;

use std::sync::Arc;

pub use base::{
    BoxedLiveSession, LiveCallbacks, LiveCloseCallback, LiveConnector, LiveError,
    LiveErrorCallback, LiveMessageCallback, LiveOpenCallback, LiveResult, LiveSession,
    LiveSessionConfig, Modality,
};
pub use gemini::{
    AccessTokenProvider, GeminiBackend, GeminiLiveConfig, GeminiLiveConnector, GeminiVoice,
    ServiceAccountKey, ServiceAccountTokenProvider, StaticAccessToken,
};
pub use messages::{
    Blob, ClientContent, Content, FunctionCall, FunctionDeclaration, FunctionResponse,
    LiveServerMessage, Part, RealtimeInput, ServerContent, Tool, ToolCall, ToolResponse,
};

use crate::config::ServerConfig;

/// Supported upstream providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveProvider {
    /// Gemini Live on Vertex AI
    Vertex,
    /// Gemini Live on the Gemini Developer API
    GeminiApi,
}

impl LiveProvider {
    /// Parse provider from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "vertex" | "vertexai" | "vertex-ai" => Some(Self::Vertex),
            "gemini" | "gemini-api" | "gemini_api" => Some(Self::GeminiApi),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vertex => "vertex",
            Self::GeminiApi => "gemini-api",
        }
    }

    /// Pick a provider from whichever credentials are configured.
    ///
    /// An explicit `live_provider` wins; otherwise a Vertex project is
    /// preferred over a Gemini API key.
    pub fn from_config(config: &ServerConfig) -> LiveResult<Option<Self>> {
        if let Some(name) = config.live_provider.as_deref() {
            return Self::parse(name).map(Some).ok_or_else(|| {
                LiveError::InvalidConfiguration(format!("Unsupported live provider: {name}"))
            });
        }

        if config.vertex_project_id.as_deref().is_some_and(|p| !p.is_empty()) {
            Ok(Some(Self::Vertex))
        } else if config.gemini_api_key.as_deref().is_some_and(|k| !k.is_empty()) {
            Ok(Some(Self::GeminiApi))
        } else {
            Ok(None)
        }
    }
}

impl std::fmt::Display for LiveProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Build the upstream connector described by the server configuration.
///
/// Returns `Ok(None)` when no upstream credentials are configured; the relay
/// then refuses sessions with an error message instead of failing to start.
pub fn create_live_connector(config: &ServerConfig) -> LiveResult<Option<Arc<dyn LiveConnector>>> {
    let Some(provider) = LiveProvider::from_config(config)? else {
        return Ok(None);
    };

    let (backend, token_provider): (GeminiBackend, Option<Arc<dyn AccessTokenProvider>>) =
        match provider {
            LiveProvider::Vertex => {
                let project_id = config.vertex_project_id.clone().ok_or_else(|| {
                    LiveError::InvalidConfiguration("VERTEX_PROJECT_ID is required".to_string())
                })?;
                let token_provider: Arc<dyn AccessTokenProvider> =
                    if let Some(token) = config.vertex_access_token.as_deref() {
                        Arc::new(StaticAccessToken::new(token))
                    } else if let Some(credentials) = config.google_credentials.as_deref() {
                        Arc::new(ServiceAccountTokenProvider::new(ServiceAccountKey::load(
                            credentials,
                        )?))
                    } else {
                        return Err(LiveError::AuthenticationFailed(
                            "Vertex AI requires GOOGLE_APPLICATION_CREDENTIALS_JSON or VERTEX_ACCESS_TOKEN"
                                .to_string(),
                        ));
                    };
                (
                    GeminiBackend::Vertex {
                        project_id,
                        location: config.vertex_location.clone(),
                    },
                    Some(token_provider),
                )
            }
            LiveProvider::GeminiApi => {
                let api_key = config.gemini_api_key.clone().ok_or_else(|| {
                    LiveError::AuthenticationFailed("GEMINI_API_KEY is required".to_string())
                })?;
                (GeminiBackend::GeminiApi { api_key }, None)
            }
        };

    let mut live_config = GeminiLiveConfig::new(backend);
    live_config.model = config.live_model.clone();

    tracing::info!(provider = %provider, "Live upstream configured");
    let connector = GeminiLiveConnector::new(live_config, token_provider)?;
    Ok(Some(Arc::new(connector)))
}

/// Get list of supported upstream providers.
pub fn get_supported_live_providers() -> Vec<&'static str> {
    vec![LiveProvider::Vertex.as_str(), LiveProvider::GeminiApi.as_str()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parsing() {
        assert_eq!(LiveProvider::parse("vertex"), Some(LiveProvider::Vertex));
        assert_eq!(LiveProvider::parse("Vertex-AI"), Some(LiveProvider::Vertex));
        assert_eq!(LiveProvider::parse("gemini"), Some(LiveProvider::GeminiApi));
        assert_eq!(LiveProvider::parse("openai"), None);
    }

    #[test]
    fn test_provider_display() {
        assert_eq!(LiveProvider::Vertex.to_string(), "vertex");
        assert_eq!(LiveProvider::GeminiApi.to_string(), "gemini-api");
    }

    #[test]
    fn test_supported_providers() {
        let providers = get_supported_live_providers();
        assert!(providers.contains(&"vertex"));
        assert!(providers.contains(&"gemini-api"));
    }

    #[test]
    fn test_no_credentials_means_no_connector() {
        let config = ServerConfig::default();
        assert!(create_live_connector(&config).unwrap().is_none());
    }

    #[test]
    fn test_gemini_api_connector() {
        let mut config = ServerConfig::default();
        config.gemini_api_key = Some("key".to_string());
        let connector = create_live_connector(&config).unwrap().unwrap();
        assert_eq!(connector.provider_name(), "gemini");
    }

    #[test]
    fn test_vertex_without_credentials_fails() {
        let mut config = ServerConfig::default();
        config.vertex_project_id = Some("frenchy".to_string());
        assert!(matches!(
            create_live_connector(&config),
            Err(LiveError::AuthenticationFailed(_))
        ));
    }

    #[test]
    fn test_vertex_with_static_token() {
        let mut config = ServerConfig::default();
        config.vertex_project_id = Some("frenchy".to_string());
        config.vertex_access_token = Some("ya29.x".to_string());
        assert!(create_live_connector(&config).unwrap().is_some());
    }

    #[test]
    fn test_vertex_project_preferred_over_api_key() {
        let mut config = ServerConfig::default();
        config.vertex_project_id = Some("frenchy".to_string());
        config.vertex_access_token = Some("ya29.x".to_string());
        config.gemini_api_key = Some("key".to_string());
        assert_eq!(
            LiveProvider::from_config(&config).unwrap(),
            Some(LiveProvider::Vertex)
        );
        assert!(create_live_connector(&config).unwrap().is_some());

        config.live_provider = Some("gemini-api".to_string());
        assert_eq!(
            LiveProvider::from_config(&config).unwrap(),
            Some(LiveProvider::GeminiApi)
        );
    }

    #[test]
    fn test_explicit_unknown_provider() {
        let mut config = ServerConfig::default();
        config.live_provider = Some("openai".to_string());
        assert!(matches!(
            create_live_connector(&config),
            Err(LiveError::InvalidConfiguration(_))
        ));
    }
}
