//! Configuration validation.

use super::ServerConfig;
use crate::core::live::LiveProvider;

/// Validate a fully merged configuration.
///
/// # Errors
/// - TLS certificate or key file does not exist
/// - A Vertex project is configured without any credentials
/// - `live_provider` names an unknown provider
/// - A timeout or the per-IP limit is zero
pub(super) fn validate(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(tls) = &config.tls {
        if !tls.cert_path.exists() {
            return Err(format!(
                "TLS certificate not found at {}",
                tls.cert_path.display()
            )
            .into());
        }
        if !tls.key_path.exists() {
            return Err(format!("TLS key not found at {}", tls.key_path.display()).into());
        }
    }

    if let Some(name) = config.live_provider.as_deref()
        && LiveProvider::parse(name).is_none()
    {
        return Err(format!(
            "Unsupported live provider '{name}'. Supported: vertex, gemini-api"
        )
        .into());
    }

    let vertex_selected = match config.live_provider.as_deref().and_then(LiveProvider::parse) {
        Some(provider) => provider == LiveProvider::Vertex,
        None => config.vertex_project_id.is_some(),
    };
    if vertex_selected {
        if config.vertex_project_id.is_none() {
            return Err("VERTEX_PROJECT_ID is required for the vertex provider".into());
        }
        if config.google_credentials.is_none() && config.vertex_access_token.is_none() {
            return Err(
                "Vertex AI requires credentials: set GOOGLE_APPLICATION_CREDENTIALS, \
                 GOOGLE_APPLICATION_CREDENTIALS_JSON or VERTEX_ACCESS_TOKEN"
                    .into(),
            );
        }
    }

    if matches!(
        config.live_provider.as_deref().and_then(LiveProvider::parse),
        Some(LiveProvider::GeminiApi)
    ) && config.gemini_api_key.is_none()
    {
        return Err("GEMINI_API_KEY is required for the gemini-api provider".into());
    }

    if config.setup_timeout_ms == 0 {
        return Err("setup_timeout_ms must be greater than zero".into());
    }
    if config.upstream_connect_timeout_ms == 0 {
        return Err("upstream_connect_timeout_ms must be greater than zero".into());
    }
    if config.max_connections_per_ip == 0 {
        return Err("max_connections_per_ip must be greater than zero".into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TlsConfig;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&ServerConfig::default()).is_ok());
    }

    #[test]
    fn test_tls_paths_must_exist() {
        let mut config = ServerConfig::default();
        config.tls = Some(TlsConfig {
            cert_path: PathBuf::from("/nonexistent/cert.pem"),
            key_path: PathBuf::from("/nonexistent/key.pem"),
        });
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("TLS certificate not found"));

        let dir = TempDir::new().unwrap();
        let cert = dir.path().join("cert.pem");
        let key = dir.path().join("key.pem");
        std::fs::write(&cert, "cert").unwrap();
        std::fs::write(&key, "key").unwrap();
        config.tls = Some(TlsConfig {
            cert_path: cert,
            key_path: key,
        });
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_vertex_requires_credentials() {
        let mut config = ServerConfig::default();
        config.vertex_project_id = Some("frenchy".to_string());
        assert!(validate(&config).is_err());

        config.vertex_access_token = Some("ya29.token".to_string());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_gemini_api_key_takes_precedence_over_vertex_project() {
        let mut config = ServerConfig::default();
        config.vertex_project_id = Some("frenchy".to_string());
        config.gemini_api_key = Some("key".to_string());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_explicit_provider_checks() {
        let mut config = ServerConfig::default();
        config.live_provider = Some("openai".to_string());
        assert!(validate(&config).unwrap_err().to_string().contains("openai"));

        config.live_provider = Some("gemini-api".to_string());
        assert!(validate(&config).unwrap_err().to_string().contains("GEMINI_API_KEY"));

        config.gemini_api_key = Some("key".to_string());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_zero_limits_rejected() {
        let mut config = ServerConfig::default();
        config.upstream_connect_timeout_ms = 0;
        assert!(validate(&config).is_err());

        let mut config = ServerConfig::default();
        config.max_connections_per_ip = 0;
        assert!(validate(&config).is_err());
    }
}
