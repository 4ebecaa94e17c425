use serde::Deserialize;
use std::path::PathBuf;

/// Complete YAML configuration structure
///
/// This structure represents the full configuration that can be loaded from a YAML file.
/// All fields are optional to allow partial configuration. Values given here override
/// environment variables.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 8081
///   tls:
///     enabled: true
///     cert_path: "/etc/parlons/cert.pem"
///     key_path: "/etc/parlons/key.pem"
///   static_dir: "../client/dist"
///
/// upstream:
///   provider: "vertex"
///   vertex_project_id: "my-project"
///   vertex_location: "us-central1"
///   google_credentials: "/path/to/service-account.json"
///   gemini_api_key: "your-gemini-key"
///   model: "gemini-live-2.5-flash-native-audio"
///   connect_timeout_ms: 15000
///
/// session:
///   default_voice: "Kore"
///   system_instruction: "You are a helpful French tutor."
///   setup_timeout_ms: 8000
///
/// security:
///   cors_allowed_origins: "https://app.example.com"
///   max_websocket_connections: 500
///   max_connections_per_ip: 20
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub upstream: Option<UpstreamYaml>,
    pub session: Option<SessionYaml>,
    pub security: Option<SecurityYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tls: Option<TlsYaml>,
    /// Directory served for non-relay paths
    pub static_dir: Option<String>,
}

/// TLS configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TlsYaml {
    pub enabled: Option<bool>,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

/// Upstream live model settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct UpstreamYaml {
    /// "vertex" or "gemini-api"
    pub provider: Option<String>,
    pub vertex_project_id: Option<String>,
    pub vertex_location: Option<String>,
    /// Google Cloud credentials - can be:
    /// - Path to service account JSON file
    /// - Inline JSON content (for secrets management)
    pub google_credentials: Option<String>,
    pub vertex_access_token: Option<String>,
    pub gemini_api_key: Option<String>,
    pub model: Option<String>,
    pub connect_timeout_ms: Option<u64>,
}

/// Per-session defaults from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SessionYaml {
    pub default_voice: Option<String>,
    pub system_instruction: Option<String>,
    pub setup_timeout_ms: Option<u64>,
}

/// Security configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SecurityYaml {
    /// Comma-separated allowed origins, or "*"
    pub cors_allowed_origins: Option<String>,
    pub max_websocket_connections: Option<usize>,
    pub max_connections_per_ip: Option<u32>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file cannot be read
    /// - The YAML is malformed
    /// - Required fields have invalid types
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}
