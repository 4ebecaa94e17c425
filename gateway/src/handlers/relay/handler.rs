//! Relay WebSocket handler
//!
//! Terminates one browser connection, waits for its `setup` message, opens
//! the upstream live session and then translates messages both ways until
//! either side goes away.

use axum::{
    Extension,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::{select, time::Duration};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::core::live::{
    BoxedLiveSession, GeminiVoice, LiveCallbacks, LiveConnector, LiveError, LiveResult,
    LiveServerMessage, LiveSessionConfig,
};
use crate::middleware::ClientIp;
use crate::protocol::{ClientMessage, ProtocolError, ServerMessage};
use crate::state::{AppState, SessionInfo};

use super::translate::{forward_client_message, translate_server_message};

/// Optimized channel buffer size for audio workloads
const CHANNEL_BUFFER_SIZE: usize = 1024;

/// Maximum WebSocket frame size (2 MB)
const MAX_WS_FRAME_SIZE: usize = 2 * 1024 * 1024;

/// Maximum WebSocket message size (2 MB)
const MAX_WS_MESSAGE_SIZE: usize = 2 * 1024 * 1024;

/// How long queued outgoing messages may take to flush on close
const SENDER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Sent to clients when the server has no upstream credentials.
pub const UPSTREAM_NOT_CONFIGURED: &str = "Live upstream not configured. Check server logs.";

/// Sent when the setup window elapses.
pub const MISSING_SETUP: &str = "Missing setup message";

enum RelayRoute {
    Outgoing(ServerMessage),
    Close,
}

/// Upstream callback events, funneled into the connection loop.
enum UpstreamEvent {
    Opened,
    Message(LiveServerMessage),
    Closed(Option<String>),
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RelayPhase {
    /// Waiting for the first `setup`
    AwaitingSetup,
    /// Upstream connect in flight
    Binding,
    /// Upstream session open
    Bound,
}

/// Per-connection record, owned by the connection task.
struct RelayConnection {
    id: Uuid,
    phase: RelayPhase,
    voice: Option<String>,
    session: Option<BoxedLiveSession>,
    /// Upstream events that arrived before the connect result was handled
    held_events: VecDeque<UpstreamEvent>,
}

impl RelayConnection {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            phase: RelayPhase::AwaitingSetup,
            voice: None,
            session: None,
            held_events: VecDeque::new(),
        }
    }
}

type PendingConnect = Option<JoinHandle<LiveResult<BoxedLiveSession>>>;

/// Relay WebSocket handler
///
/// Upgrades the HTTP connection to WebSocket. The `ClientIp` extension is
/// present when `connection_limit_middleware` reserved a slot, which is
/// released once the socket ends.
pub async fn relay_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    client_ip: Option<Extension<ClientIp>>,
) -> Response {
    let client_ip = client_ip.map(|Extension(ip)| ip);
    debug!(ip = ?client_ip, "Relay WebSocket connection upgrade requested");

    let failed_state = state.clone();
    let failed_ip = client_ip;

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_failed_upgrade(move |e| {
            warn!("Relay WebSocket upgrade failed: {}", e);
            if let Some(ClientIp(ip)) = failed_ip {
                failed_state.release_connection(ip);
            }
        })
        .on_upgrade(move |socket| handle_relay_socket(socket, state, client_ip))
}

/// Drive one relay connection to completion.
async fn handle_relay_socket(socket: WebSocket, state: Arc<AppState>, client_ip: Option<ClientIp>) {
    let mut conn = RelayConnection::new();
    info!(connection_id = %conn.id, "Relay WebSocket connection established");

    let (mut sender, mut receiver) = socket.split();
    let (message_tx, mut message_rx) = mpsc::channel::<RelayRoute>(CHANNEL_BUFFER_SIZE);

    // Sender task for outgoing messages
    let mut sender_task = tokio::spawn(async move {
        while let Some(route) = message_rx.recv().await {
            let should_close = matches!(route, RelayRoute::Close);

            let result = match route {
                RelayRoute::Outgoing(message) => match serde_json::to_string(&message) {
                    Ok(json_str) => sender.send(Message::Text(json_str.into())).await,
                    Err(e) => {
                        error!("Failed to serialize outgoing message: {}", e);
                        continue;
                    }
                },
                RelayRoute::Close => sender.send(Message::Close(None)).await,
            };

            if let Err(e) = result {
                debug!("Failed to send WebSocket message: {}", e);
                break;
            }

            if should_close {
                break;
            }
        }
    });

    let mut pending: PendingConnect = None;

    if let Some(connector) = state.connector.clone() {
        run_connection(
            &mut conn,
            &mut pending,
            &mut receiver,
            &state,
            connector,
            &message_tx,
        )
        .await;
    } else {
        error!(
            connection_id = %conn.id,
            "Rejecting relay connection: live upstream not configured"
        );
        send(&message_tx, ServerMessage::error(UPSTREAM_NOT_CONFIGURED)).await;
    }

    // Cleanup
    if let Some(handle) = pending.take() {
        // The connect is still in flight; close whatever it produces
        let id = conn.id;
        tokio::spawn(async move {
            if let Ok(Ok(mut session)) = handle.await {
                debug!(connection_id = %id, "Closing upstream session that finished binding after disconnect");
                let _ = session.close().await;
            }
        });
    }

    if let Some(mut session) = conn.session.take()
        && let Err(e) = session.close().await
    {
        warn!(connection_id = %conn.id, "Failed to close upstream session: {}", e);
    }

    state.sessions.remove(&conn.id);

    let _ = message_tx.send(RelayRoute::Close).await;
    drop(message_tx);
    if tokio::time::timeout(SENDER_DRAIN_TIMEOUT, &mut sender_task)
        .await
        .is_err()
    {
        sender_task.abort();
    }

    if let Some(ClientIp(ip)) = client_ip {
        state.release_connection(ip);
    }

    info!(connection_id = %conn.id, "Relay WebSocket connection terminated");
}

/// Event loop for a connection with an upstream available.
async fn run_connection(
    conn: &mut RelayConnection,
    pending: &mut PendingConnect,
    receiver: &mut futures::stream::SplitStream<WebSocket>,
    state: &Arc<AppState>,
    connector: Arc<dyn LiveConnector>,
    message_tx: &mpsc::Sender<RelayRoute>,
) {
    let (upstream_tx, mut upstream_rx) = mpsc::channel::<UpstreamEvent>(CHANNEL_BUFFER_SIZE);

    let setup_timeout = state.config.setup_timeout();
    let setup_deadline = tokio::time::sleep(setup_timeout);
    tokio::pin!(setup_deadline);

    loop {
        let awaiting_setup = conn.phase == RelayPhase::AwaitingSetup;
        let binding = pending.is_some();

        select! {
            biased;

            joined = async {
                match pending.as_mut() {
                    Some(handle) => handle.await,
                    None => std::future::pending().await,
                }
            }, if binding => {
                *pending = None;
                let result = joined.unwrap_or_else(|e| {
                    Err(LiveError::SessionError(format!("Upstream connect task failed: {e}")))
                });
                if !on_connect_result(conn, result, state, message_tx).await {
                    break;
                }
            }

            Some(event) = upstream_rx.recv() => {
                if conn.phase != RelayPhase::Bound {
                    conn.held_events.push_back(event);
                    continue;
                }
                if !handle_upstream_event(event, conn.id, message_tx).await {
                    break;
                }
            }

            msg_result = receiver.next() => {
                match msg_result {
                    Some(Ok(msg)) => {
                        let continue_processing = process_client_frame(
                            msg,
                            conn,
                            pending,
                            state,
                            &connector,
                            &upstream_tx,
                            message_tx,
                        )
                        .await;

                        if !continue_processing {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(connection_id = %conn.id, "Relay WebSocket error: {}", e);
                        break;
                    }
                    None => {
                        info!(connection_id = %conn.id, "Relay WebSocket connection closed by client");
                        break;
                    }
                }
            }

            () = &mut setup_deadline, if awaiting_setup => {
                warn!(
                    connection_id = %conn.id,
                    "No setup message within {}ms, closing",
                    setup_timeout.as_millis()
                );
                send(message_tx, ServerMessage::error(MISSING_SETUP)).await;
                break;
            }
        }
    }
}

/// Process one incoming WebSocket frame
#[inline(always)]
async fn process_client_frame(
    msg: Message,
    conn: &mut RelayConnection,
    pending: &mut PendingConnect,
    state: &Arc<AppState>,
    connector: &Arc<dyn LiveConnector>,
    upstream_tx: &mpsc::Sender<UpstreamEvent>,
    message_tx: &mpsc::Sender<RelayRoute>,
) -> bool {
    match msg {
        Message::Text(text) => {
            let message = match ClientMessage::parse(text.as_str()) {
                Ok(message) => message,
                Err(ProtocolError::UnknownType(kind)) => {
                    warn!(connection_id = %conn.id, kind = %kind, "Ignoring unknown message type");
                    return true;
                }
                Err(e) => {
                    warn!(connection_id = %conn.id, "Dropping client message: {}", e);
                    return true;
                }
            };

            if let Err(e) = message.validate_size() {
                warn!(connection_id = %conn.id, "Message validation failed: {}", e);
                send(message_tx, ServerMessage::error(e.to_string())).await;
                return true;
            }

            handle_client_message(message, conn, pending, state, connector, upstream_tx, message_tx)
                .await
        }
        Message::Binary(data) => {
            warn!(
                connection_id = %conn.id,
                bytes = data.len(),
                "Ignoring binary frame; audio must be sent as audio_chunk"
            );
            true
        }
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => {
            info!(connection_id = %conn.id, "Relay WebSocket close received");
            false
        }
    }
}

async fn handle_client_message(
    message: ClientMessage,
    conn: &mut RelayConnection,
    pending: &mut PendingConnect,
    state: &Arc<AppState>,
    connector: &Arc<dyn LiveConnector>,
    upstream_tx: &mpsc::Sender<UpstreamEvent>,
    message_tx: &mpsc::Sender<RelayRoute>,
) -> bool {
    let (system_instruction, voice) = match message {
        ClientMessage::Setup {
            system_instruction,
            voice,
        } => (system_instruction, voice),
        other => {
            let kind = other.kind();
            let Some(session) = conn.session.as_deref() else {
                warn!(connection_id = %conn.id, kind, "No upstream session yet, dropping message");
                return true;
            };
            if let Err(e) = forward_client_message(session, other).await {
                warn!(connection_id = %conn.id, kind, "Failed to forward to upstream: {}", e);
                send(message_tx, ServerMessage::error(format!("Failed to send {kind}: {e}"))).await;
            }
            return true;
        }
    };

    if conn.phase != RelayPhase::AwaitingSetup {
        info!(connection_id = %conn.id, "Duplicate setup ignored");
        return true;
    }

    let voice = voice
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| state.config.default_voice.clone());
    if GeminiVoice::parse(&voice).is_none() {
        warn!(connection_id = %conn.id, voice = %voice, "Unknown voice, passing it through");
    }
    let system_instruction = system_instruction
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| state.config.default_system_instruction.clone());

    conn.phase = RelayPhase::Binding;
    conn.voice = Some(voice.clone());

    let session_config = LiveSessionConfig {
        voice_name: voice,
        system_instruction,
        ..Default::default()
    };
    let callbacks = upstream_callbacks(upstream_tx.clone());
    let connector = connector.clone();
    let connect_timeout = state.config.upstream_connect_timeout();

    info!(
        connection_id = %conn.id,
        provider = connector.provider_name(),
        voice = %session_config.voice_name,
        "Opening upstream live session"
    );

    *pending = Some(tokio::spawn(async move {
        match tokio::time::timeout(connect_timeout, connector.connect(session_config, callbacks))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(LiveError::Timeout(format!(
                "upstream did not open within {}ms",
                connect_timeout.as_millis()
            ))),
        }
    }));

    true
}

/// Apply the outcome of the upstream connect. Returns false to close.
async fn on_connect_result(
    conn: &mut RelayConnection,
    result: LiveResult<BoxedLiveSession>,
    state: &Arc<AppState>,
    message_tx: &mpsc::Sender<RelayRoute>,
) -> bool {
    let session = match result {
        Ok(session) => session,
        Err(e) => {
            error!(connection_id = %conn.id, "Failed to open upstream session: {}", e);
            send(
                message_tx,
                ServerMessage::error(format!("Failed to connect to live upstream: {e}")),
            )
            .await;
            return false;
        }
    };

    conn.session = Some(session);
    conn.phase = RelayPhase::Bound;
    state.sessions.insert(
        conn.id,
        SessionInfo {
            voice: conn.voice.clone().unwrap_or_default(),
            started_at: Instant::now(),
        },
    );
    info!(connection_id = %conn.id, "Upstream live session bound");
    send(message_tx, ServerMessage::Connected).await;

    while let Some(event) = conn.held_events.pop_front() {
        if !handle_upstream_event(event, conn.id, message_tx).await {
            return false;
        }
    }
    true
}

/// Forward one upstream event to the client. Returns false to close.
async fn handle_upstream_event(
    event: UpstreamEvent,
    id: Uuid,
    message_tx: &mpsc::Sender<RelayRoute>,
) -> bool {
    match event {
        UpstreamEvent::Opened => {
            debug!(connection_id = %id, "Upstream session opened");
            true
        }
        UpstreamEvent::Message(message) => {
            if let Some(go_away) = &message.go_away {
                warn!(connection_id = %id, time_left = ?go_away.time_left, "Upstream will disconnect soon");
            }
            for outgoing in translate_server_message(message) {
                send(message_tx, outgoing).await;
            }
            true
        }
        UpstreamEvent::Closed(reason) => {
            info!(connection_id = %id, reason = ?reason, "Upstream session closed");
            false
        }
        UpstreamEvent::Failed(message) => {
            warn!(connection_id = %id, "Upstream error: {}", message);
            send(message_tx, ServerMessage::error(message)).await;
            true
        }
    }
}

/// Callbacks that funnel every upstream event into the connection loop.
fn upstream_callbacks(tx: mpsc::Sender<UpstreamEvent>) -> LiveCallbacks {
    let open_tx = tx.clone();
    let message_tx = tx.clone();
    let close_tx = tx.clone();
    let error_tx = tx;

    LiveCallbacks {
        on_open: Some(Arc::new(move || {
            let tx = open_tx.clone();
            Box::pin(async move {
                let _ = tx.send(UpstreamEvent::Opened).await;
            })
        })),
        on_message: Some(Arc::new(move |message: LiveServerMessage| {
            let tx = message_tx.clone();
            Box::pin(async move {
                let _ = tx.send(UpstreamEvent::Message(message)).await;
            })
        })),
        on_close: Some(Arc::new(move |reason: Option<String>| {
            let tx = close_tx.clone();
            Box::pin(async move {
                let _ = tx.send(UpstreamEvent::Closed(reason)).await;
            })
        })),
        on_error: Some(Arc::new(move |error: LiveError| {
            let tx = error_tx.clone();
            Box::pin(async move {
                let _ = tx.send(UpstreamEvent::Failed(error.to_string())).await;
            })
        })),
    }
}

async fn send(message_tx: &mpsc::Sender<RelayRoute>, message: ServerMessage) {
    let _ = message_tx.send(RelayRoute::Outgoing(message)).await;
}
