//! Merging YAML values over the environment-derived configuration.

use std::path::PathBuf;

use super::yaml::YamlConfig;
use super::{ServerConfig, TlsConfig, env};

/// Load the environment configuration and apply YAML overrides on top.
///
/// A YAML value, when present, always wins. `server.tls.enabled: false`
/// turns TLS off even if the environment enabled it.
pub(super) fn merge_config(
    yaml: Option<YamlConfig>,
) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = env::load_from_env()?;

    let Some(yaml) = yaml else {
        return Ok(config);
    };

    if let Some(server) = yaml.server {
        if let Some(host) = server.host {
            config.host = host;
        }
        if let Some(port) = server.port {
            config.port = port;
        }
        if let Some(dir) = server.static_dir {
            config.static_dir = Some(PathBuf::from(dir));
        }
        if let Some(tls) = server.tls {
            match tls.enabled {
                Some(false) => config.tls = None,
                Some(true) => {
                    let cert_path = tls
                        .cert_path
                        .map(PathBuf::from)
                        .or_else(|| config.tls.as_ref().map(|t| t.cert_path.clone()))
                        .ok_or("server.tls.cert_path is required when TLS is enabled")?;
                    let key_path = tls
                        .key_path
                        .map(PathBuf::from)
                        .or_else(|| config.tls.as_ref().map(|t| t.key_path.clone()))
                        .ok_or("server.tls.key_path is required when TLS is enabled")?;
                    config.tls = Some(TlsConfig {
                        cert_path,
                        key_path,
                    });
                }
                None => {
                    if let Some(existing) = config.tls.as_mut() {
                        if let Some(cert) = tls.cert_path {
                            existing.cert_path = PathBuf::from(cert);
                        }
                        if let Some(key) = tls.key_path {
                            existing.key_path = PathBuf::from(key);
                        }
                    }
                }
            }
        }
    }

    if let Some(upstream) = yaml.upstream {
        if upstream.provider.is_some() {
            config.live_provider = upstream.provider;
        }
        if upstream.vertex_project_id.is_some() {
            config.vertex_project_id = upstream.vertex_project_id;
        }
        if let Some(location) = upstream.vertex_location {
            config.vertex_location = location;
        }
        if upstream.google_credentials.is_some() {
            config.google_credentials = upstream.google_credentials;
        }
        if upstream.vertex_access_token.is_some() {
            config.vertex_access_token = upstream.vertex_access_token;
        }
        if upstream.gemini_api_key.is_some() {
            config.gemini_api_key = upstream.gemini_api_key;
        }
        if upstream.model.is_some() {
            config.live_model = upstream.model;
        }
        if let Some(ms) = upstream.connect_timeout_ms {
            config.upstream_connect_timeout_ms = ms;
        }
    }

    if let Some(session) = yaml.session {
        if let Some(voice) = session.default_voice {
            config.default_voice = voice;
        }
        if let Some(instruction) = session.system_instruction {
            config.default_system_instruction = instruction;
        }
        if let Some(ms) = session.setup_timeout_ms {
            config.setup_timeout_ms = ms;
        }
    }

    if let Some(security) = yaml.security {
        if security.cors_allowed_origins.is_some() {
            config.cors_allowed_origins = security.cors_allowed_origins;
        }
        if security.max_websocket_connections.is_some() {
            config.max_websocket_connections = security.max_websocket_connections;
        }
        if let Some(per_ip) = security.max_connections_per_ip {
            config.max_connections_per_ip = per_ip;
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::yaml::{SecurityYaml, ServerYaml, SessionYaml, TlsYaml};
    use serial_test::serial;

    fn clear_env() {
        unsafe {
            for name in [
                "HOST",
                "PORT",
                "TLS_ENABLED",
                "TLS_CERT_PATH",
                "TLS_KEY_PATH",
                "DEFAULT_VOICE",
                "MAX_CONNECTIONS_PER_IP",
            ] {
                std::env::remove_var(name);
            }
        }
    }

    #[test]
    #[serial]
    fn test_merge_without_yaml_returns_env() {
        clear_env();
        unsafe {
            std::env::set_var("DEFAULT_VOICE", "Charon");
        }

        let config = merge_config(None).unwrap();
        assert_eq!(config.default_voice, "Charon");

        clear_env();
    }

    #[test]
    #[serial]
    fn test_merge_tls_disabled_in_yaml() {
        clear_env();
        unsafe {
            std::env::set_var("TLS_ENABLED", "true");
            std::env::set_var("TLS_CERT_PATH", "/env/cert.pem");
            std::env::set_var("TLS_KEY_PATH", "/env/key.pem");
        }

        let yaml = YamlConfig {
            server: Some(ServerYaml {
                tls: Some(TlsYaml {
                    enabled: Some(false),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = merge_config(Some(yaml)).unwrap();
        assert!(config.tls.is_none());

        clear_env();
    }

    #[test]
    #[serial]
    fn test_merge_tls_enabled_requires_paths() {
        clear_env();

        let yaml = YamlConfig {
            server: Some(ServerYaml {
                tls: Some(TlsYaml {
                    enabled: Some(true),
                    cert_path: Some("/yaml/cert.pem".to_string()),
                    key_path: None,
                }),
                ..Default::default()
            }),
            ..Default::default()
        };

        let err = merge_config(Some(yaml)).unwrap_err();
        assert!(err.to_string().contains("key_path"));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_merge_session_and_security_overrides() {
        clear_env();
        unsafe {
            std::env::set_var("MAX_CONNECTIONS_PER_IP", "7");
        }

        let yaml = YamlConfig {
            session: Some(SessionYaml {
                default_voice: Some("Leda".to_string()),
                system_instruction: Some("Réponds en une phrase.".to_string()),
                setup_timeout_ms: Some(1500),
            }),
            security: Some(SecurityYaml {
                max_websocket_connections: Some(12),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = merge_config(Some(yaml)).unwrap();
        assert_eq!(config.default_voice, "Leda");
        assert_eq!(config.default_system_instruction, "Réponds en une phrase.");
        assert_eq!(config.setup_timeout_ms, 1500);
        assert_eq!(config.max_websocket_connections, Some(12));
        // Not set in YAML, kept from env
        assert_eq!(config.max_connections_per_ip, 7);

        clear_env();
    }
}
