//! Shared test infrastructure
//!
//! - [`MockConnector`]: scripted in-process upstream that records every input
//! - [`spawn_relay`]: the real router served on an ephemeral port
//! - [`ScriptedInput`]: microphone driven by the test

#![allow(dead_code)]

use async_trait::async_trait;
use axum::middleware;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parlons_gateway::client::{AudioInput, DeviceError, InputStream, SampleSink};
use parlons_gateway::core::live::{
    Blob, BoxedLiveSession, ClientContent, Content, LiveCallbacks, LiveConnector, LiveError,
    LiveResult, LiveServerMessage, LiveSession, LiveSessionConfig, Part, RealtimeInput,
    ServerContent, ToolResponse,
};
use parlons_gateway::middleware::connection_limit_middleware;
use parlons_gateway::{AppState, ServerConfig, routes};

// =============================================================================
// Mock upstream
// =============================================================================

/// What the relay pushed into a mock session, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Realtime(RealtimeInput),
    Content(ClientContent),
    ToolResponse(ToolResponse),
    Closed,
}

pub struct MockSession {
    recorded: Arc<Mutex<Vec<Recorded>>>,
    open: AtomicBool,
}

#[async_trait]
impl LiveSession for MockSession {
    async fn send_realtime_input(&self, input: RealtimeInput) -> LiveResult<()> {
        if !self.is_open() {
            return Err(LiveError::NotConnected);
        }
        self.recorded.lock().push(Recorded::Realtime(input));
        Ok(())
    }

    async fn send_client_content(&self, content: ClientContent) -> LiveResult<()> {
        if !self.is_open() {
            return Err(LiveError::NotConnected);
        }
        self.recorded.lock().push(Recorded::Content(content));
        Ok(())
    }

    async fn send_tool_response(&self, response: ToolResponse) -> LiveResult<()> {
        if !self.is_open() {
            return Err(LiveError::NotConnected);
        }
        self.recorded.lock().push(Recorded::ToolResponse(response));
        Ok(())
    }

    async fn close(&mut self) -> LiveResult<()> {
        if self.open.swap(false, Ordering::SeqCst) {
            self.recorded.lock().push(Recorded::Closed);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// Upstream connector whose sessions record their inputs.
#[derive(Default)]
pub struct MockConnector {
    pub connects: AtomicUsize,
    pub configs: Mutex<Vec<LiveSessionConfig>>,
    pub recorded: Arc<Mutex<Vec<Recorded>>>,
    callbacks: Mutex<Option<LiveCallbacks>>,
    fail_with: Option<String>,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(reason: &str) -> Arc<Self> {
        Arc::new(Self {
            fail_with: Some(reason.to_string()),
            ..Default::default()
        })
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn recorded(&self) -> Vec<Recorded> {
        self.recorded.lock().clone()
    }

    fn callbacks(&self) -> LiveCallbacks {
        self.callbacks
            .lock()
            .clone()
            .expect("no upstream session was opened")
    }

    /// Deliver a message from the "model".
    pub async fn emit(&self, message: LiveServerMessage) {
        self.callbacks().emit_message(message).await;
    }

    /// Simulate the upstream hanging up.
    pub async fn close_upstream(&self, reason: &str) {
        self.callbacks().emit_close(Some(reason.to_string())).await;
    }
}

#[async_trait]
impl LiveConnector for MockConnector {
    async fn connect(
        &self,
        config: LiveSessionConfig,
        callbacks: LiveCallbacks,
    ) -> LiveResult<BoxedLiveSession> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.configs.lock().push(config);

        if let Some(reason) = &self.fail_with {
            return Err(LiveError::ConnectionFailed(reason.clone()));
        }

        callbacks.emit_open().await;
        *self.callbacks.lock() = Some(callbacks);

        Ok(Box::new(MockSession {
            recorded: self.recorded.clone(),
            open: AtomicBool::new(true),
        }))
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

// =============================================================================
// Upstream message builders
// =============================================================================

pub fn model_audio(data: &str) -> LiveServerMessage {
    LiveServerMessage {
        server_content: Some(ServerContent {
            model_turn: Some(Content {
                role: Some("model".to_string()),
                parts: vec![Part::inline(Blob {
                    mime_type: "audio/pcm;rate=24000".to_string(),
                    data: data.to_string(),
                })],
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn model_text(text: &str) -> LiveServerMessage {
    LiveServerMessage {
        server_content: Some(ServerContent {
            model_turn: Some(Content {
                role: Some("model".to_string()),
                parts: vec![Part::text(text)],
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn turn_complete() -> LiveServerMessage {
    LiveServerMessage {
        server_content: Some(ServerContent {
            turn_complete: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    }
}

// =============================================================================
// Relay server
// =============================================================================

pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.host = "127.0.0.1".to_string();
    config.port = 0;
    config
}

pub fn state_with(
    config: ServerConfig,
    connector: Option<Arc<MockConnector>>,
) -> Arc<AppState> {
    AppState::with_connector(
        config,
        connector.map(|c| c as Arc<dyn LiveConnector>),
    )
}

/// Serve the health and relay routes on 127.0.0.1 with an ephemeral port.
pub async fn spawn_relay(state: Arc<AppState>) -> SocketAddr {
    let relay_routes = routes::relay::create_relay_router().layer(
        middleware::from_fn_with_state(state.clone(), connection_limit_middleware),
    );
    let app = routes::api::create_api_router()
        .merge(relay_routes)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    addr
}

pub fn relay_ws_url(addr: SocketAddr) -> String {
    format!("ws://{addr}/gemini")
}

/// Poll `check` until it holds or `limit` passes.
pub async fn wait_until(limit: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

// =============================================================================
// Microphone
// =============================================================================

/// Microphone whose samples are pushed by the test.
pub struct ScriptedInput {
    sink: Arc<Mutex<Option<SampleSink>>>,
    sample_rate: u32,
    deny: bool,
    pub opens: AtomicUsize,
}

impl ScriptedInput {
    pub fn new(sample_rate: u32) -> Arc<Self> {
        Arc::new(Self {
            sink: Arc::new(Mutex::new(None)),
            sample_rate,
            deny: false,
            opens: AtomicUsize::new(0),
        })
    }

    pub fn denied() -> Arc<Self> {
        Arc::new(Self {
            sink: Arc::new(Mutex::new(None)),
            sample_rate: 48_000,
            deny: true,
            opens: AtomicUsize::new(0),
        })
    }

    /// Push samples as if the device produced them. False when closed.
    pub fn push(&self, samples: &[f32]) -> bool {
        match self.sink.lock().as_ref() {
            Some(sink) => sink.push(samples),
            None => false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.sink.lock().is_some()
    }
}

struct ScriptedStream {
    sink: Arc<Mutex<Option<SampleSink>>>,
    sample_rate: u32,
}

impl InputStream for ScriptedStream {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn close(&mut self) {
        self.sink.lock().take();
    }
}

#[async_trait]
impl AudioInput for ScriptedInput {
    async fn open(&self, sink: SampleSink) -> Result<Box<dyn InputStream>, DeviceError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.deny {
            return Err(DeviceError::PermissionDenied("NotAllowedError".to_string()));
        }
        *self.sink.lock() = Some(sink);
        Ok(Box::new(ScriptedStream {
            sink: self.sink.clone(),
            sample_rate: self.sample_rate,
        }))
    }
}
