//! Environment variable loading.

use std::path::PathBuf;

use super::utils::{env_bool, env_parse, env_var};
use super::{
    DEFAULT_MAX_CONNECTIONS_PER_IP, DEFAULT_SETUP_TIMEOUT_MS, DEFAULT_UPSTREAM_CONNECT_TIMEOUT_MS,
    PRODUCTION_STATIC_DIR, ServerConfig, TlsConfig,
};

/// Build a [`ServerConfig`] from environment variables, with defaults for
/// anything unset.
///
/// Does not validate; callers run `validation::validate` on the result.
pub(super) fn load_from_env() -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let defaults = ServerConfig::default();

    let host = env_var("HOST").unwrap_or_else(|| defaults.host.clone());
    let port = env_parse::<u16>("PORT")?.unwrap_or(defaults.port);

    let tls = if env_bool("TLS_ENABLED", false) {
        let cert_path = env_var("TLS_CERT_PATH")
            .ok_or("TLS_CERT_PATH is required when TLS_ENABLED is true")?;
        let key_path = env_var("TLS_KEY_PATH")
            .ok_or("TLS_KEY_PATH is required when TLS_ENABLED is true")?;
        Some(TlsConfig {
            cert_path: PathBuf::from(cert_path),
            key_path: PathBuf::from(key_path),
        })
    } else {
        None
    };

    // Inline JSON wins over a file path when both are present
    let google_credentials = env_var("GOOGLE_APPLICATION_CREDENTIALS_JSON")
        .or_else(|| env_var("GOOGLE_APPLICATION_CREDENTIALS"));

    let static_dir = env_var("STATIC_DIR").map(PathBuf::from).or_else(|| {
        env_var("NODE_ENV")
            .filter(|mode| mode.eq_ignore_ascii_case("production"))
            .map(|_| PathBuf::from(PRODUCTION_STATIC_DIR))
    });

    Ok(ServerConfig {
        host,
        port,
        tls,
        live_provider: env_var("LIVE_PROVIDER"),
        vertex_project_id: env_var("VERTEX_PROJECT_ID"),
        vertex_location: env_var("VERTEX_LOCATION")
            .unwrap_or_else(|| defaults.vertex_location.clone()),
        google_credentials,
        vertex_access_token: env_var("VERTEX_ACCESS_TOKEN"),
        gemini_api_key: env_var("GEMINI_API_KEY"),
        live_model: env_var("LIVE_MODEL"),
        default_voice: env_var("DEFAULT_VOICE").unwrap_or_else(|| defaults.default_voice.clone()),
        default_system_instruction: env_var("DEFAULT_SYSTEM_INSTRUCTION")
            .unwrap_or_else(|| defaults.default_system_instruction.clone()),
        setup_timeout_ms: env_parse::<u64>("SETUP_TIMEOUT_MS")?
            .unwrap_or(DEFAULT_SETUP_TIMEOUT_MS),
        upstream_connect_timeout_ms: env_parse::<u64>("UPSTREAM_CONNECT_TIMEOUT_MS")?
            .unwrap_or(DEFAULT_UPSTREAM_CONNECT_TIMEOUT_MS),
        static_dir,
        cors_allowed_origins: env_var("CORS_ALLOWED_ORIGINS"),
        max_websocket_connections: env_parse::<usize>("MAX_WEBSOCKET_CONNECTIONS")?,
        max_connections_per_ip: env_parse::<u32>("MAX_CONNECTIONS_PER_IP")?
            .unwrap_or(DEFAULT_MAX_CONNECTIONS_PER_IP),
    })
}
