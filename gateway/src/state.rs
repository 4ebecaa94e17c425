//! Shared application state
//!
//! Holds the configuration, the upstream connector, the registry of bound
//! relay connections, and WebSocket connection counters used by
//! `connection_limit_middleware`.

use dashmap::DashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::core::live::{LiveConnector, create_live_connector};

/// Why a new WebSocket connection was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConnectionLimitError {
    #[error("global WebSocket connection limit reached")]
    GlobalLimitReached,
    #[error("per-IP WebSocket connection limit reached")]
    PerIpLimitReached,
}

/// Registry entry for a relay connection with a bound upstream session.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub voice: String,
    pub started_at: Instant,
}

pub struct AppState {
    pub config: ServerConfig,
    /// None when no upstream credentials are configured
    pub connector: Option<Arc<dyn LiveConnector>>,
    /// Connection id -> bound session
    pub sessions: DashMap<Uuid, SessionInfo>,
    ws_connections: AtomicUsize,
    ip_connections: DashMap<IpAddr, u32>,
}

impl AppState {
    /// Build state from configuration, creating the upstream connector.
    ///
    /// A connector that fails to build is logged and left unset so the server
    /// still starts; relay clients then get a "not configured" error.
    pub async fn new(config: ServerConfig) -> Arc<Self> {
        let connector = match create_live_connector(&config) {
            Ok(Some(connector)) => {
                info!(
                    provider = connector.provider_name(),
                    "Live upstream connector initialized"
                );
                Some(connector)
            }
            Ok(None) => {
                warn!(
                    "No live upstream credentials configured. Set VERTEX_PROJECT_ID with \
                     GOOGLE_APPLICATION_CREDENTIALS, or GEMINI_API_KEY."
                );
                None
            }
            Err(e) => {
                error!("Failed to initialize live upstream connector: {}", e);
                None
            }
        };

        Self::with_connector(config, connector)
    }

    /// Build state around an already constructed connector.
    pub fn with_connector(
        config: ServerConfig,
        connector: Option<Arc<dyn LiveConnector>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            connector,
            sessions: DashMap::new(),
            ws_connections: AtomicUsize::new(0),
            ip_connections: DashMap::new(),
        })
    }

    /// Reserve a WebSocket slot for `ip`.
    ///
    /// The per-IP entry stays locked while the global counter is updated, so
    /// a refused global slot never leaves the per-IP count incremented. An
    /// entry created for a refused connection is removed again.
    pub fn try_acquire_connection(&self, ip: IpAddr) -> Result<(), ConnectionLimitError> {
        let result = {
            let mut per_ip = self.ip_connections.entry(ip).or_insert(0);
            if *per_ip >= self.config.max_connections_per_ip {
                Err(ConnectionLimitError::PerIpLimitReached)
            } else {
                let max_global = self.config.max_websocket_connections;
                let reserved = self.ws_connections.fetch_update(
                    Ordering::AcqRel,
                    Ordering::Acquire,
                    |current| match max_global {
                        Some(max) if current >= max => None,
                        _ => Some(current + 1),
                    },
                );
                match reserved {
                    Ok(_) => {
                        *per_ip += 1;
                        Ok(())
                    }
                    Err(_) => Err(ConnectionLimitError::GlobalLimitReached),
                }
            }
        };

        if result.is_err() {
            self.ip_connections.remove_if(&ip, |_, count| *count == 0);
        }
        result
    }

    /// Release a slot acquired with [`try_acquire_connection`](Self::try_acquire_connection).
    pub fn release_connection(&self, ip: IpAddr) {
        let _ = self
            .ws_connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_sub(1)
            });

        self.ip_connections.remove_if_mut(&ip, |_, count| {
            *count = count.saturating_sub(1);
            *count == 0
        });
    }

    pub fn ws_connection_count(&self) -> usize {
        self.ws_connections.load(Ordering::Acquire)
    }

    pub fn ip_connection_count(&self, ip: &IpAddr) -> u32 {
        self.ip_connections.get(ip).map(|c| *c).unwrap_or(0)
    }

    pub fn active_session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn test_new_without_credentials_has_no_connector() {
        let state = AppState::new(ServerConfig::default()).await;
        assert!(state.connector.is_none());
        assert_eq!(state.active_session_count(), 0);
    }

    #[test]
    fn test_release_removes_empty_ip_entry() {
        let state = AppState::with_connector(ServerConfig::default(), None);
        let ip: IpAddr = Ipv4Addr::new(10, 0, 0, 1).into();

        state.try_acquire_connection(ip).unwrap();
        state.release_connection(ip);
        assert_eq!(state.ip_connection_count(&ip), 0);
        assert!(state.ip_connections.get(&ip).is_none());

        // Releasing an unknown IP is a no-op
        state.release_connection(ip);
        assert_eq!(state.ws_connection_count(), 0);
    }

    #[test]
    fn test_global_refusal_keeps_per_ip_count() {
        let mut config = ServerConfig::default();
        config.max_websocket_connections = Some(1);
        let state = AppState::with_connector(config, None);
        let a: IpAddr = Ipv4Addr::new(10, 0, 0, 1).into();
        let b: IpAddr = Ipv4Addr::new(10, 0, 0, 2).into();

        state.try_acquire_connection(a).unwrap();
        assert_eq!(
            state.try_acquire_connection(b),
            Err(ConnectionLimitError::GlobalLimitReached)
        );
        assert_eq!(state.ip_connection_count(&b), 0);
        assert!(state.ip_connections.get(&b).is_none());
    }

    #[test]
    fn test_refused_flood_leaves_no_ip_entries() {
        let mut config = ServerConfig::default();
        config.max_websocket_connections = Some(1);
        let state = AppState::with_connector(config, None);

        state.try_acquire_connection(Ipv4Addr::new(10, 0, 0, 1).into()).unwrap();
        for last in 2..=200u8 {
            let ip: IpAddr = Ipv4Addr::new(10, 0, 1, last).into();
            assert!(state.try_acquire_connection(ip).is_err());
        }
        assert_eq!(state.ip_connections.len(), 1);
        assert_eq!(state.ws_connection_count(), 1);
    }

    #[test]
    fn test_session_registry() {
        let state = AppState::with_connector(ServerConfig::default(), None);
        let id = Uuid::new_v4();
        state.sessions.insert(
            id,
            SessionInfo {
                voice: "Kore".to_string(),
                started_at: Instant::now(),
            },
        );
        assert_eq!(state.active_session_count(), 1);
        assert_eq!(state.sessions.get(&id).unwrap().voice, "Kore");
        state.sessions.remove(&id);
        assert_eq!(state.active_session_count(), 0);
    }
}
