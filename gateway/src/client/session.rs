//! Client session bridge
//!
//! Owns one conversation with the relay: the WebSocket transport, the
//! outbound microphone path, inbound playback and the transcript and state
//! callbacks. See [`ClientSession`].

use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};
use url::Url;

use super::capture::{AudioFrame, CaptureThread, FRAME_SIZE};
use super::device::{AudioInput, AudioOutput, DeviceError, InputStream};
use super::playback::PlaybackScheduler;
use crate::core::audio::{
    CAPTURE_WIRE_SAMPLE_RATE, PLAYBACK_SAMPLE_RATE, parse_pcm_rate, pcm_mime_type,
    samples_to_wire, wire_to_samples,
};
use crate::core::live::{ClientContent, Content};
use crate::protocol::{ClientMessage, ServerMessage};

/// Relay used when running against a local development server
pub const LOCAL_RELAY_URL: &str = "ws://localhost:8081/gemini";

/// Text of the no-op turn sent to keep an idle upstream session open
pub const KEEP_ALIVE_TEXT: &str = "[KEEP_ALIVE]";

/// Pick the relay endpoint for a page origin.
///
/// Local or unknown origins go to the development relay. Anything else uses
/// the origin's host and port, with `wss` when the page is served over
/// `https`.
pub fn relay_url(origin: Option<&str>) -> String {
    let Some(origin) = origin.and_then(|o| Url::parse(o).ok()) else {
        return LOCAL_RELAY_URL.to_string();
    };

    let host = match origin.host_str() {
        Some(host) if host != "localhost" && host != "127.0.0.1" => host,
        _ => return LOCAL_RELAY_URL.to_string(),
    };

    let scheme = if origin.scheme() == "https" { "wss" } else { "ws" };
    match origin.port() {
        Some(port) => format!("{scheme}://{host}:{port}/gemini"),
        None => format!("{scheme}://{host}/gemini"),
    }
}

// =============================================================================
// Configuration & callbacks
// =============================================================================

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub relay_url: String,
    pub system_instruction: String,
    pub voice: String,
    /// Bound on transport open plus setup acknowledgment
    pub connect_timeout: Duration,
    pub keepalive_interval: Duration,
    /// Keepalive only fires after this long without turn activity
    pub idle_threshold: Duration,
    /// Delay between turn-complete and "not speaking"
    pub speaking_grace: Duration,
    pub frame_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: LOCAL_RELAY_URL.to_string(),
            system_instruction: String::new(),
            voice: "Kore".to_string(),
            connect_timeout: Duration::from_secs(15),
            keepalive_interval: Duration::from_secs(30),
            idle_threshold: Duration::from_secs(120),
            speaking_grace: Duration::from_millis(800),
            frame_size: FRAME_SIZE,
        }
    }
}

/// Mic or speaking state change.
pub type StateCallback = Arc<dyn Fn(bool) + Send + Sync>;

/// Transcript fragment with its finality flag.
pub type TranscriptCallback = Arc<dyn Fn(String, bool) + Send + Sync>;

#[derive(Clone, Default)]
pub struct ClientCallbacks {
    pub on_mic_state: Option<StateCallback>,
    pub on_speaking_state: Option<StateCallback>,
    pub on_transcript: Option<TranscriptCallback>,
}

impl ClientCallbacks {
    pub fn on_mic_state(mut self, cb: impl Fn(bool) + Send + Sync + 'static) -> Self {
        self.on_mic_state = Some(Arc::new(cb));
        self
    }

    pub fn on_speaking_state(mut self, cb: impl Fn(bool) + Send + Sync + 'static) -> Self {
        self.on_speaking_state = Some(Arc::new(cb));
        self
    }

    pub fn on_transcript(mut self, cb: impl Fn(String, bool) + Send + Sync + 'static) -> Self {
        self.on_transcript = Some(Arc::new(cb));
        self
    }
}

impl fmt::Debug for ClientCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCallbacks")
            .field("on_mic_state", &self.on_mic_state.is_some())
            .field("on_speaking_state", &self.on_speaking_state.is_some())
            .field("on_transcript", &self.on_transcript.is_some())
            .finish()
    }
}

// =============================================================================
// Errors & state
// =============================================================================

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The relay answered the setup with an error message
    #[error("{0}")]
    Rejected(String),

    #[error("Connection closed")]
    ClosedBeforeReady,

    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),

    #[error("Session is not ready")]
    NotReady,

    #[error("Session has been disconnected")]
    Disposed,

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// Transport lifecycle.
///
/// `Connected` covers the window between transport open and the relay's
/// `connected` acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Disconnected,
    Connecting,
    Connected,
    Ready,
}

enum Outgoing {
    Message(ClientMessage),
    Close,
}

struct Capture {
    thread: CaptureThread,
    stream: Box<dyn InputStream>,
    forwarder: JoinHandle<()>,
}

impl Capture {
    fn release(mut self) {
        self.stream.close();
        self.forwarder.abort();
        self.thread.shutdown();
    }
}

struct SessionState {
    phase: ConnectionPhase,
    outbound: Option<mpsc::UnboundedSender<Outgoing>>,
    reader: Option<JoinHandle<()>>,
    keepalive: Option<JoinHandle<()>>,
    recording: bool,
    capture: Option<Capture>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            phase: ConnectionPhase::Disconnected,
            outbound: None,
            reader: None,
            keepalive: None,
            recording: false,
            capture: None,
        }
    }

    fn send(&self, message: ClientMessage) -> Result<(), ClientError> {
        let outbound = self.outbound.as_ref().ok_or(ClientError::NotReady)?;
        outbound
            .send(Outgoing::Message(message))
            .map_err(|_| ClientError::SendFailed("transport writer stopped".to_string()))
    }
}

struct Inner {
    config: RwLock<ClientConfig>,
    callbacks: RwLock<ClientCallbacks>,
    state: Mutex<SessionState>,
    input: Arc<dyn AudioInput>,
    playback: PlaybackScheduler,
    speaking: AtomicBool,
    disposed: AtomicBool,
    last_activity: Mutex<Instant>,
}

// =============================================================================
// ClientSession
// =============================================================================

/// One conversation with the relay.
///
/// Cheap to clone; clones share the same session. Control calls never block
/// on the network except [`connect`](Self::connect). After
/// [`disconnect`](Self::disconnect) the instance is unusable and a new one
/// must be built, normally through [`SessionSlot`](super::SessionSlot).
#[derive(Clone)]
pub struct ClientSession {
    inner: Arc<Inner>,
}

impl ClientSession {
    pub fn new(
        config: ClientConfig,
        input: Arc<dyn AudioInput>,
        output: Arc<dyn AudioOutput>,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let weak = weak.clone();
            let on_drained = Arc::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.set_speaking(false);
                }
            });

            Inner {
                config: RwLock::new(config),
                callbacks: RwLock::new(ClientCallbacks::default()),
                state: Mutex::new(SessionState::new()),
                input,
                playback: PlaybackScheduler::new(output, on_drained),
                speaking: AtomicBool::new(false),
                disposed: AtomicBool::new(false),
                last_activity: Mutex::new(Instant::now()),
            }
        });

        Self { inner }
    }

    /// Replace the callbacks. Takes effect for every later event.
    pub fn set_callbacks(&self, callbacks: ClientCallbacks) {
        *self.inner.callbacks.write() = callbacks;
    }

    /// Voice requested by the next [`connect`](Self::connect).
    pub fn set_voice(&self, voice: impl Into<String>) {
        self.inner.config.write().voice = voice.into();
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.inner.state.lock().phase
    }

    pub fn is_ready(&self) -> bool {
        self.phase() == ConnectionPhase::Ready
    }

    pub fn is_recording(&self) -> bool {
        self.inner.state.lock().recording
    }

    pub fn is_speaking(&self) -> bool {
        self.inner.speaking.load(Ordering::Acquire)
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    pub fn ptr_eq(&self, other: &ClientSession) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Open the relay transport, send `setup` and wait for `connected`.
    ///
    /// Returns immediately when already connecting or connected.
    pub async fn connect(&self) -> Result<(), ClientError> {
        if self.is_disposed() {
            return Err(ClientError::Disposed);
        }

        {
            let mut state = self.inner.state.lock();
            if state.phase != ConnectionPhase::Disconnected {
                debug!(phase = ?state.phase, "connect() ignored, session already active");
                return Ok(());
            }
            state.phase = ConnectionPhase::Connecting;
        }

        let config = self.inner.config.read().clone();
        let setup = ClientMessage::Setup {
            system_instruction: Some(config.system_instruction.clone()),
            voice: Some(config.voice.clone()),
        };

        info!(url = %config.relay_url, voice = %config.voice, "Connecting to relay");

        let handshake = tokio::time::timeout(
            config.connect_timeout,
            open_and_handshake(&self.inner, &config.relay_url, setup),
        )
        .await
        .unwrap_or(Err(ClientError::Timeout(config.connect_timeout)));

        let (sink, stream) = match handshake {
            Ok(parts) => parts,
            Err(e) => {
                warn!("Relay connect failed: {}", e);
                let mut state = self.inner.state.lock();
                if state.phase != ConnectionPhase::Disconnected {
                    state.phase = ConnectionPhase::Disconnected;
                }
                return Err(e);
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(sink, rx));

        let weak = Arc::downgrade(&self.inner);
        let reader = tokio::spawn(run_reader(weak.clone(), stream));
        let keepalive = tokio::spawn(run_keepalive(weak, config.keepalive_interval));

        {
            let mut state = self.inner.state.lock();
            if self.is_disposed() || state.phase != ConnectionPhase::Connected {
                // Torn down while the handshake was in flight
                let _ = tx.send(Outgoing::Close);
                reader.abort();
                keepalive.abort();
                return Err(ClientError::Disposed);
            }
            state.phase = ConnectionPhase::Ready;
            state.outbound = Some(tx);
            state.reader = Some(reader);
            state.keepalive = Some(keepalive);
        }

        self.inner.touch();
        info!("Relay session ready");
        Ok(())
    }

    /// Start streaming microphone audio.
    ///
    /// The device is opened on first use and kept for the rest of the
    /// connection. A denied device fails the call and recording stays off.
    pub async fn start_recording(&self) -> Result<(), ClientError> {
        if self.is_disposed() {
            return Err(ClientError::Disposed);
        }

        let needs_capture = {
            let state = self.inner.state.lock();
            if state.phase != ConnectionPhase::Ready {
                return Err(ClientError::NotReady);
            }
            if state.recording {
                return Ok(());
            }
            state.capture.is_none()
        };

        if needs_capture {
            let capture = open_capture(&self.inner).await?;
            let mut state = self.inner.state.lock();
            if state.phase != ConnectionPhase::Ready {
                drop(state);
                capture.release();
                return Err(ClientError::NotReady);
            }
            if let Some(previous) = state.capture.replace(capture) {
                drop(state);
                previous.release();
            }
        }

        {
            let mut state = self.inner.state.lock();
            if state.phase != ConnectionPhase::Ready {
                return Err(ClientError::NotReady);
            }
            if state.recording {
                return Ok(());
            }
            let Some(capture) = state.capture.as_ref() else {
                return Err(ClientError::NotReady);
            };
            capture.thread.start();
            state.recording = true;
        }

        self.inner.touch();
        info!("Recording started");
        self.inner.emit_mic_state(true);
        Ok(())
    }

    /// Stop streaming microphone audio and close the user turn.
    ///
    /// The device stays open so the next start is immediate. Idempotent.
    pub fn stop_recording(&self) {
        {
            let mut state = self.inner.state.lock();
            if !state.recording {
                return;
            }
            state.recording = false;
            if let Some(capture) = state.capture.as_ref() {
                capture.thread.stop();
            }

            if state.outbound.is_some() {
                let _ = state.send(ClientMessage::AudioEnd);
                let _ = state.send(ClientMessage::ClientContent {
                    content: user_turn(""),
                });
            }
        }

        info!("Recording stopped");
        self.inner.emit_mic_state(false);
    }

    /// Send a typed user turn.
    pub fn send_message(&self, text: &str) -> Result<(), ClientError> {
        {
            let state = self.inner.state.lock();
            if state.phase != ConnectionPhase::Ready {
                return Err(ClientError::NotReady);
            }
            state.send(ClientMessage::ClientContent {
                content: user_turn(text),
            })?;
        }
        self.inner.touch();
        Ok(())
    }

    /// Tear the session down for good. Idempotent.
    pub fn disconnect(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Disconnecting client session");
        self.inner.teardown(true);
    }
}

impl fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSession")
            .field("phase", &self.phase())
            .field("recording", &self.is_recording())
            .field("speaking", &self.is_speaking())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

fn user_turn(text: &str) -> ClientContent {
    ClientContent {
        turns: vec![Content::user_text(text)],
        turn_complete: Some(true),
        ..Default::default()
    }
}

// =============================================================================
// Inner
// =============================================================================

impl Inner {
    fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    fn emit_mic_state(&self, recording: bool) {
        let cb = self.callbacks.read().on_mic_state.clone();
        if let Some(cb) = cb {
            cb(recording);
        }
    }

    fn emit_transcript(&self, text: String, is_final: bool) {
        let cb = self.callbacks.read().on_transcript.clone();
        if let Some(cb) = cb {
            cb(text, is_final);
        }
    }

    /// Fires the speaking callback on transitions only.
    fn set_speaking(&self, speaking: bool) {
        if self.speaking.swap(speaking, Ordering::AcqRel) == speaking {
            return;
        }
        let cb = self.callbacks.read().on_speaking_state.clone();
        if let Some(cb) = cb {
            cb(speaking);
        }
    }

    fn handle_server_message(self: &Arc<Self>, message: ServerMessage) {
        self.touch();

        match message {
            ServerMessage::ModelAudio { mime_type, data } => {
                let samples = match wire_to_samples(&data) {
                    Ok(samples) => samples,
                    Err(e) => {
                        warn!("Dropping undecodable model audio: {}", e);
                        return;
                    }
                };
                if samples.is_empty() {
                    return;
                }
                let rate = parse_pcm_rate(&mime_type).unwrap_or(PLAYBACK_SAMPLE_RATE);
                self.set_speaking(true);
                self.playback.enqueue(samples, rate);
            }
            ServerMessage::ModelText { text } => {
                self.emit_transcript(text, true);
            }
            ServerMessage::ModelTurnComplete => {
                let weak = Arc::downgrade(self);
                let grace = self.config.read().speaking_grace;
                tokio::spawn(async move {
                    tokio::time::sleep(grace).await;
                    if let Some(inner) = weak.upgrade()
                        && inner.playback.pending() == 0
                    {
                        inner.set_speaking(false);
                    }
                });
            }
            ServerMessage::ToolCall { tool_call } => {
                debug!(?tool_call, "Ignoring tool call");
            }
            ServerMessage::Error { error } => {
                warn!("Relay error: {}", error);
            }
            ServerMessage::Connected => {
                debug!("Duplicate connected acknowledgment");
            }
        }
    }

    /// Release the transport, capture and playback.
    ///
    /// With `close_transport` the writer is asked to send a close frame;
    /// otherwise the transport is already gone.
    fn teardown(&self, close_transport: bool) {
        let (outbound, reader, keepalive, capture, was_recording) = {
            let mut state = self.state.lock();
            if state.phase == ConnectionPhase::Disconnected && state.capture.is_none() {
                return;
            }
            state.phase = ConnectionPhase::Disconnected;
            let was_recording = std::mem::replace(&mut state.recording, false);
            (
                state.outbound.take(),
                state.reader.take(),
                state.keepalive.take(),
                state.capture.take(),
                was_recording,
            )
        };

        if let Some(keepalive) = keepalive {
            keepalive.abort();
        }
        if close_transport {
            if let Some(outbound) = outbound {
                let _ = outbound.send(Outgoing::Close);
            }
            if let Some(reader) = reader {
                reader.abort();
            }
        }
        if let Some(capture) = capture {
            capture.release();
        }

        self.playback.stop_all();
        self.set_speaking(false);
        if was_recording {
            self.emit_mic_state(false);
        }
    }
}

// =============================================================================
// Transport tasks
// =============================================================================

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;
type WsSink = futures_util::stream::SplitSink<WsStream, Message>;
type WsSource = futures_util::stream::SplitStream<WsStream>;

async fn open_and_handshake(
    inner: &Arc<Inner>,
    url: &str,
    setup: ClientMessage,
) -> Result<(WsSink, WsSource), ClientError> {
    let (ws_stream, _response) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| ClientError::ConnectionFailed(e.to_string()))?;
    let (mut sink, mut stream) = ws_stream.split();

    {
        let mut state = inner.state.lock();
        if state.phase == ConnectionPhase::Connecting {
            state.phase = ConnectionPhase::Connected;
        }
    }

    let json = serde_json::to_string(&setup)
        .map_err(|e| ClientError::SendFailed(e.to_string()))?;
    sink.send(Message::Text(json.into()))
        .await
        .map_err(|e| ClientError::SendFailed(e.to_string()))?;

    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => match ServerMessage::parse(text.as_str()) {
                Ok(ServerMessage::Connected) => return Ok((sink, stream)),
                Ok(ServerMessage::Error { error }) => return Err(ClientError::Rejected(error)),
                Ok(other) => debug!(?other, "Message before setup acknowledgment"),
                Err(e) => warn!("Ignoring malformed relay message: {}", e),
            },
            Some(Ok(Message::Close(_))) | None => return Err(ClientError::ClosedBeforeReady),
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(ClientError::ConnectionFailed(e.to_string())),
        }
    }
}

async fn run_writer(mut sink: WsSink, mut rx: mpsc::UnboundedReceiver<Outgoing>) {
    while let Some(outgoing) = rx.recv().await {
        match outgoing {
            Outgoing::Message(message) => {
                let json = match serde_json::to_string(&message) {
                    Ok(json) => json,
                    Err(e) => {
                        error!("Failed to serialize client message: {}", e);
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(json.into())).await {
                    warn!("Relay send failed: {}", e);
                    break;
                }
            }
            Outgoing::Close => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        }
    }
    let _ = sink.close().await;
}

/// Handles relay messages one at a time, in arrival order.
async fn run_reader(inner: Weak<Inner>, mut stream: WsSource) {
    while let Some(frame) = stream.next().await {
        let Some(session) = inner.upgrade() else {
            return;
        };
        match frame {
            Ok(Message::Text(text)) => match ServerMessage::parse(text.as_str()) {
                Ok(message) => session.handle_server_message(message),
                Err(e) => warn!("Ignoring malformed relay message: {}", e),
            },
            Ok(Message::Close(frame)) => {
                info!(?frame, "Relay closed the connection");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Relay transport error: {}", e);
                break;
            }
        }
    }

    if let Some(session) = inner.upgrade() {
        session.teardown(false);
    }
}

async fn run_keepalive(inner: Weak<Inner>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let Some(session) = inner.upgrade() else {
            return;
        };

        let idle_threshold = session.config.read().idle_threshold;
        if session.idle_for() < idle_threshold {
            continue;
        }

        let state = session.state.lock();
        if state.phase != ConnectionPhase::Ready {
            continue;
        }
        // Keepalives are not turn activity; an idle session sends one per tick
        debug!("Sending keepalive turn");
        let _ = state.send(ClientMessage::ClientContent {
            content: user_turn(KEEP_ALIVE_TEXT),
        });
    }
}

// =============================================================================
// Capture
// =============================================================================

async fn open_capture(inner: &Arc<Inner>) -> Result<Capture, ClientError> {
    let frame_size = inner.config.read().frame_size;
    let (frames_tx, frames_rx) = mpsc::unbounded_channel();

    let mut thread = CaptureThread::spawn(frame_size, frames_tx)
        .map_err(|e| DeviceError::ThreadSpawn(e.to_string()))?;
    let Some(sink) = thread.sink() else {
        return Err(DeviceError::Unavailable("capture thread closed".to_string()).into());
    };

    let stream = match inner.input.open(sink).await {
        Ok(stream) => stream,
        Err(e) => {
            error!("Failed to open microphone: {}", e);
            thread.shutdown();
            return Err(e.into());
        }
    };

    let native_rate = stream.sample_rate();
    info!(native_rate, frame_size, "Microphone opened");

    let forwarder = tokio::spawn(run_forwarder(Arc::downgrade(inner), frames_rx, native_rate));

    Ok(Capture {
        thread,
        stream,
        forwarder,
    })
}

/// Encodes captured frames in capture order and hands them to the writer.
async fn run_forwarder(
    inner: Weak<Inner>,
    mut frames: mpsc::UnboundedReceiver<AudioFrame>,
    native_rate: u32,
) {
    let mime_type = pcm_mime_type(CAPTURE_WIRE_SAMPLE_RATE);

    while let Some(frame) = frames.recv().await {
        let Some(session) = inner.upgrade() else {
            return;
        };

        let data = samples_to_wire(&frame.samples, native_rate, CAPTURE_WIRE_SAMPLE_RATE);
        let message = ClientMessage::AudioChunk {
            mime_type: mime_type.clone(),
            data,
        };

        let failed = {
            let mut state = session.state.lock();
            if !state.recording {
                continue;
            }
            match state.send(message) {
                Ok(()) => false,
                Err(e) => {
                    warn!(frame = frame.index, "Audio send failed, stopping recording: {}", e);
                    state.recording = false;
                    if let Some(capture) = state.capture.as_ref() {
                        capture.thread.stop();
                    }
                    true
                }
            }
        };

        if failed {
            session.emit_mic_state(false);
        }
    }
}
