//! Gemini Live WebSocket client implementing [`LiveConnector`].
//!
//! # Protocol
//!
//! - Endpoint: see [`GeminiBackend::endpoint_url`]
//! - First frame: `setup`; the session is usable once `setupComplete` arrives
//! - Audio in: `realtimeInput.mediaChunks` with `audio/pcm;rate=16000`
//! - Audio out: `serverContent.modelTurn.parts[].inlineData` at 24kHz
//!
//! Server frames may be delivered as text or binary WebSocket messages; both
//! carry UTF-8 JSON.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use http::HeaderValue;
use http::header::AUTHORIZATION;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::auth::AccessTokenProvider;
use super::config::{GeminiBackend, GeminiLiveConfig};
use super::messages::{ClientFrame, SetupFrame};
use crate::core::live::base::{
    BoxedLiveSession, LiveCallbacks, LiveConnector, LiveError, LiveResult, LiveSession,
    LiveSessionConfig,
};
use crate::core::live::messages::{ClientContent, LiveServerMessage, RealtimeInput, ToolResponse};

/// Channel capacity for frames queued towards the upstream socket.
const WS_CHANNEL_CAPACITY: usize = 256;

/// Grace period for the connection task to flush a close frame.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

type UpstreamStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

enum SessionCommand {
    Frame(ClientFrame),
    Close,
}

// =============================================================================
// Connector
// =============================================================================

/// Opens Gemini Live sessions against Vertex AI or the Gemini Developer API.
pub struct GeminiLiveConnector {
    config: GeminiLiveConfig,
    token_provider: Option<Arc<dyn AccessTokenProvider>>,
}

impl GeminiLiveConnector {
    /// Create a connector. Vertex AI requires a token provider.
    pub fn new(
        config: GeminiLiveConfig,
        token_provider: Option<Arc<dyn AccessTokenProvider>>,
    ) -> LiveResult<Self> {
        match &config.backend {
            GeminiBackend::Vertex { project_id, .. } => {
                if project_id.is_empty() {
                    return Err(LiveError::InvalidConfiguration(
                        "Vertex AI project id is required".to_string(),
                    ));
                }
                if token_provider.is_none() {
                    return Err(LiveError::AuthenticationFailed(
                        "Vertex AI requires service account credentials".to_string(),
                    ));
                }
            }
            GeminiBackend::GeminiApi { api_key } => {
                if api_key.is_empty() {
                    return Err(LiveError::AuthenticationFailed(
                        "Gemini API key is required".to_string(),
                    ));
                }
            }
        }

        Ok(Self {
            config,
            token_provider,
        })
    }

    pub fn config(&self) -> &GeminiLiveConfig {
        &self.config
    }

    async fn build_request(&self) -> LiveResult<Request> {
        let url = self
            .config
            .backend
            .endpoint_url()
            .map_err(|e| LiveError::InvalidConfiguration(format!("Invalid endpoint: {e}")))?;

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| LiveError::ConnectionFailed(e.to_string()))?;

        if let Some(provider) = &self.token_provider {
            let token = provider.access_token().await?;
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| LiveError::AuthenticationFailed(e.to_string()))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        Ok(request)
    }
}

#[async_trait]
impl LiveConnector for GeminiLiveConnector {
    async fn connect(
        &self,
        session_config: LiveSessionConfig,
        callbacks: LiveCallbacks,
    ) -> LiveResult<BoxedLiveSession> {
        let request = self.build_request().await?;

        let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| LiveError::ConnectionFailed(e.to_string()))?;

        let (mut ws_sink, mut ws_stream) = ws_stream.split();

        let model = self.config.resolve_model(&session_config.model);
        tracing::info!(
            backend = self.config.backend.name(),
            model = %model,
            voice = %session_config.voice_name,
            "Connected to Gemini Live, sending setup"
        );

        let setup = ClientFrame::Setup(SetupFrame::new(
            model,
            session_config.response_modality,
            &session_config.voice_name,
            &session_config.system_instruction,
            session_config.tools,
        ));
        let json = serde_json::to_string(&setup)
            .map_err(|e| LiveError::SerializationError(e.to_string()))?;
        ws_sink
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| LiveError::WebSocketError(e.to_string()))?;

        match tokio::time::timeout(
            self.config.setup_complete_timeout,
            wait_for_setup_complete(&mut ws_stream),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                let _ = ws_sink.send(Message::Close(None)).await;
                return Err(LiveError::Timeout(
                    "No setupComplete from Gemini Live".to_string(),
                ));
            }
        }

        let (tx, mut rx) = mpsc::channel::<SessionCommand>(WS_CHANNEL_CAPACITY);
        let open = Arc::new(AtomicBool::new(true));

        callbacks.emit_open().await;

        let task_open = open.clone();
        let handle = tokio::spawn(async move {
            let mut close_reason: Option<String> = None;

            loop {
                tokio::select! {
                    command = rx.recv() => match command {
                        Some(SessionCommand::Frame(frame)) => {
                            let json = match serde_json::to_string(&frame) {
                                Ok(j) => j,
                                Err(e) => {
                                    tracing::error!("Failed to serialize Gemini frame: {}", e);
                                    continue;
                                }
                            };
                            if let Err(e) = ws_sink.send(Message::Text(json.into())).await {
                                tracing::error!("Failed to send to Gemini Live: {}", e);
                                callbacks
                                    .emit_error(LiveError::WebSocketError(e.to_string()))
                                    .await;
                                close_reason = Some(e.to_string());
                                break;
                            }
                        }
                        Some(SessionCommand::Close) | None => {
                            let _ = ws_sink.send(Message::Close(None)).await;
                            break;
                        }
                    },

                    incoming = ws_stream.next() => match incoming {
                        Some(Ok(Message::Text(text))) => {
                            dispatch_server_payload(text.as_str().as_bytes(), &callbacks).await;
                        }
                        Some(Ok(Message::Binary(data))) => {
                            dispatch_server_payload(&data, &callbacks).await;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = ws_sink.send(Message::Pong(data)).await {
                                tracing::error!("Failed to send pong: {}", e);
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            close_reason = frame
                                .map(|f| f.reason.to_string())
                                .filter(|reason| !reason.is_empty());
                            tracing::info!(reason = ?close_reason, "Gemini Live closed the session");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::error!("Gemini Live WebSocket error: {}", e);
                            callbacks
                                .emit_error(LiveError::WebSocketError(e.to_string()))
                                .await;
                            close_reason = Some(e.to_string());
                            break;
                        }
                        None => break,
                    },
                }
            }

            task_open.store(false, Ordering::SeqCst);
            callbacks.emit_close(close_reason).await;
            tracing::debug!("Gemini Live connection task ended");
        });

        Ok(Box::new(GeminiLiveSession {
            sender: tx,
            open,
            handle: Some(handle),
        }))
    }

    fn provider_name(&self) -> &'static str {
        "gemini"
    }
}

async fn wait_for_setup_complete(stream: &mut SplitStream<UpstreamStream>) -> LiveResult<()> {
    while let Some(message) = stream.next().await {
        let payload = match message {
            Ok(Message::Text(text)) => text.as_str().as_bytes().to_vec(),
            Ok(Message::Binary(data)) => data.to_vec(),
            Ok(Message::Close(frame)) => {
                let reason = frame
                    .map(|f| format!("{} {}", u16::from(f.code), f.reason))
                    .unwrap_or_else(|| "no close frame".to_string());
                return Err(LiveError::ConnectionFailed(format!(
                    "Gemini Live closed during setup: {reason}"
                )));
            }
            Ok(_) => continue,
            Err(e) => return Err(LiveError::WebSocketError(e.to_string())),
        };

        match serde_json::from_slice::<LiveServerMessage>(&payload) {
            Ok(message) if message.setup_complete.is_some() => return Ok(()),
            Ok(_) => tracing::debug!("Ignoring Gemini frame received before setupComplete"),
            Err(e) => tracing::warn!("Failed to parse Gemini frame during setup: {}", e),
        }
    }

    Err(LiveError::ConnectionFailed(
        "Gemini Live connection ended during setup".to_string(),
    ))
}

async fn dispatch_server_payload(payload: &[u8], callbacks: &LiveCallbacks) {
    match serde_json::from_slice::<LiveServerMessage>(payload) {
        Ok(message) => {
            if let Some(go_away) = &message.go_away {
                tracing::warn!(time_left = ?go_away.time_left, "Gemini Live sent goAway");
            }
            callbacks.emit_message(message).await;
        }
        Err(e) => {
            tracing::warn!(
                "Failed to parse Gemini server frame: {} - {}",
                e,
                String::from_utf8_lossy(payload)
            );
        }
    }
}

// =============================================================================
// Session
// =============================================================================

/// Handle to one open Gemini Live session.
pub struct GeminiLiveSession {
    sender: mpsc::Sender<SessionCommand>,
    open: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl GeminiLiveSession {
    async fn send_frame(&self, frame: ClientFrame) -> LiveResult<()> {
        if !self.is_open() {
            return Err(LiveError::NotConnected);
        }
        self.sender
            .send(SessionCommand::Frame(frame))
            .await
            .map_err(|e| LiveError::WebSocketError(e.to_string()))
    }
}

#[async_trait]
impl LiveSession for GeminiLiveSession {
    async fn send_realtime_input(&self, input: RealtimeInput) -> LiveResult<()> {
        self.send_frame(input.into()).await
    }

    async fn send_client_content(&self, content: ClientContent) -> LiveResult<()> {
        self.send_frame(ClientFrame::ClientContent(content)).await
    }

    async fn send_tool_response(&self, response: ToolResponse) -> LiveResult<()> {
        self.send_frame(ClientFrame::ToolResponse(response)).await
    }

    async fn close(&mut self) -> LiveResult<()> {
        let Some(mut handle) = self.handle.take() else {
            return Ok(());
        };

        if self.open.swap(false, Ordering::SeqCst) {
            let _ = self.sender.send(SessionCommand::Close).await;
        }

        if tokio::time::timeout(CLOSE_TIMEOUT, &mut handle).await.is_err() {
            tracing::warn!("Gemini Live connection task did not stop in time, aborting");
            handle.abort();
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

impl Drop for GeminiLiveSession {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
