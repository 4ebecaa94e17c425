//! Configuration module for the Parlons relay
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//! - `utils`: Utility functions for configuration parsing
//!
//! # Example
//! ```rust,no_run
//! use parlons_gateway::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

mod env;
mod merge;
mod utils;
mod validation;
mod yaml;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 8081;

/// Default upstream voice.
pub const DEFAULT_VOICE: &str = "Kore";

/// Default window for the client's `setup` message.
pub const DEFAULT_SETUP_TIMEOUT_MS: u64 = 8000;

/// Default bound on opening the upstream session.
pub const DEFAULT_UPSTREAM_CONNECT_TIMEOUT_MS: u64 = 15000;

/// Default per-IP WebSocket connection cap.
pub const DEFAULT_MAX_CONNECTIONS_PER_IP: u32 = 100;

/// Asset directory served in production mode when `STATIC_DIR` is not set.
pub const PRODUCTION_STATIC_DIR: &str = "../client/dist";

/// System instruction used when the client's `setup` does not carry one.
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "Tu es \"Frenchy\", un tuteur de français chaleureux et patient.

- Parle toujours en français, sauf si l'utilisateur te demande de passer à l'anglais.
- Corrige les erreurs avec bienveillance, en reformulant naturellement la phrase.
- Adapte ton vocabulaire et ta vitesse au niveau de l'utilisateur.
- Donne des exemples concrets et encourage l'utilisateur à parler.

Sois concis et encourageant.";

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Server configuration
///
/// Contains all configuration needed to run the relay: listener, upstream
/// credentials, session defaults and connection limits.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// TLS configuration (optional)
    pub tls: Option<TlsConfig>,

    // Upstream
    /// Explicit provider choice ("vertex" or "gemini-api"); inferred from credentials when None
    pub live_provider: Option<String>,
    pub vertex_project_id: Option<String>,
    /// Default: "us-central1"
    pub vertex_location: String,
    /// Google Cloud service account credentials - can be:
    /// - Path to service account JSON file
    /// - Inline JSON content (for secrets management)
    pub google_credentials: Option<String>,
    /// Pre-minted OAuth token, used instead of service account credentials
    pub vertex_access_token: Option<String>,
    pub gemini_api_key: Option<String>,
    /// Model override; None uses the backend default
    pub live_model: Option<String>,

    // Session defaults
    pub default_voice: String,
    pub default_system_instruction: String,
    /// Window for the client's `setup` message, in milliseconds
    pub setup_timeout_ms: u64,
    /// Bound on opening the upstream session, in milliseconds
    pub upstream_connect_timeout_ms: u64,

    /// Directory served for non-relay paths (production mode)
    pub static_dir: Option<PathBuf>,

    // Security
    /// Comma-separated list of allowed origins, or "*" for any
    pub cors_allowed_origins: Option<String>,
    /// Maximum concurrent WebSocket connections
    /// Default: None (unlimited)
    pub max_websocket_connections: Option<usize>,
    /// Maximum connections per IP address
    /// Default: 100
    pub max_connections_per_ip: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            tls: None,
            live_provider: None,
            vertex_project_id: None,
            vertex_location: "us-central1".to_string(),
            google_credentials: None,
            vertex_access_token: None,
            gemini_api_key: None,
            live_model: None,
            default_voice: DEFAULT_VOICE.to_string(),
            default_system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            setup_timeout_ms: DEFAULT_SETUP_TIMEOUT_MS,
            upstream_connect_timeout_ms: DEFAULT_UPSTREAM_CONNECT_TIMEOUT_MS,
            static_dir: None,
            cors_allowed_origins: None,
            max_websocket_connections: None,
            max_connections_per_ip: DEFAULT_MAX_CONNECTIONS_PER_IP,
        }
    }
}

/// Zeroize secret fields when the configuration is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut creds) = self.google_credentials {
            creds.zeroize();
        }
        if let Some(ref mut token) = self.vertex_access_token {
            token.zeroize();
        }
        if let Some(ref mut key) = self.gemini_api_key {
            key.zeroize();
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// `.env` values are expected to be loaded into the environment already
    /// (see `main.rs`). Performs validation on the result.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = env::load_from_env()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if TLS is enabled
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    pub fn setup_timeout(&self) -> Duration {
        Duration::from_millis(self.setup_timeout_ms)
    }

    pub fn upstream_connect_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_connect_timeout_ms)
    }

    /// Whether any upstream credentials are present.
    pub fn has_live_credentials(&self) -> bool {
        self.gemini_api_key.is_some()
            || (self.vertex_project_id.is_some()
                && (self.google_credentials.is_some() || self.vertex_access_token.is_some()))
    }
}
