//! WebSocket routes
//!
//! One route per streaming shape. Each upgraded socket registers in the
//! connection table before the upgrade, so the limit is enforced with a
//! plain HTTP 503 instead of an accepted-then-closed socket.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{ConnectInfo, Path, Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use contracts::{CloseReason, CollabMessage};
use stream_channel::{channel, CancellationToken, Delivery, StreamSender};

use crate::frames::{ClientFrame, ServerFrame};
use crate::hub::StreamHub;
use crate::registry::{ConnectionGuard, StreamKind};

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

/// Inbound buffer of one session participant
const SESSION_INBOUND: usize = 16;

/// Error frames queued while the writer is busy
const NOTICE_QUEUE: usize = 8;

/// Build the router
pub fn router(hub: StreamHub) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/ingest", get(ingest_ws))
        .route("/v1/snapshots", get(snapshots_ws))
        .route("/v1/sessions/{session_id}", get(session_ws))
        .route("/v1/alerts", get(alerts_ws))
        .with_state(hub)
}

async fn health(State(hub): State<StreamHub>) -> impl IntoResponse {
    Json(hub.health())
}

/// Register the connection or refuse the upgrade
fn open(hub: &StreamHub, kind: StreamKind, peer: SocketAddr) -> Result<ConnectionGuard, Response> {
    if hub.is_draining() {
        return Err((StatusCode::SERVICE_UNAVAILABLE, "server is shutting down").into_response());
    }
    hub.registry().on_open(kind, Some(peer)).map_err(|e| {
        warn!(kind = %kind, peer = %peer, error = %e, "connection refused");
        (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response()
    })
}

// ===== socket helpers =====

enum Inbound {
    Frame(ClientFrame),
    Invalid(String),
    Closed,
}

/// Next client frame; pings and pongs are skipped
async fn next_frame(stream: &mut WsStream) -> Inbound {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                return match ClientFrame::parse(text.as_str()) {
                    Ok(frame) => Inbound::Frame(frame),
                    Err(e) => Inbound::Invalid(format!("invalid frame: {e}")),
                };
            }
            Some(Ok(Message::Binary(_))) => {
                return Inbound::Invalid("binary frames are not supported".to_string());
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            Some(Ok(Message::Close(_))) | None => return Inbound::Closed,
            Some(Err(e)) => {
                debug!(error = %e, "websocket read failed");
                return Inbound::Closed;
            }
        }
    }
}

/// Send one frame; false once the client is gone
async fn send_frame(sink: &mut WsSink, guard: &ConnectionGuard, frame: &ServerFrame) -> bool {
    let message = match frame.to_message() {
        Ok(message) => message,
        Err(e) => {
            error!(connection = %guard.id(), error = %e, "failed to encode frame");
            return true;
        }
    };
    if sink.send(message).await.is_err() {
        return false;
    }
    guard.record_outbound();
    true
}

/// Send `end{reason}` and close the socket
async fn finish(sink: &mut WsSink, guard: &ConnectionGuard, reason: CloseReason) {
    debug!(connection = %guard.id(), reason = %reason, "stream finished");
    if send_frame(sink, guard, &ServerFrame::end(reason)).await {
        let _ = sink.close().await;
    }
}

/// Wait for the opening request frame of a server-streaming route
async fn await_request<T>(
    stream: &mut WsStream,
    sink: &mut WsSink,
    guard: &ConnectionGuard,
    shutdown: &CancellationToken,
    pick: impl Fn(ClientFrame) -> Result<T, ClientFrame>,
) -> Option<T> {
    loop {
        let inbound = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                finish(sink, guard, CloseReason::Shutdown).await;
                return None;
            }
            inbound = next_frame(stream) => inbound,
        };

        let notice = match inbound {
            Inbound::Frame(frame) => match pick(frame) {
                Ok(request) => {
                    guard.record_inbound();
                    return Some(request);
                }
                Err(other) => ServerFrame::error(format!(
                    "unexpected '{}' frame before subscription",
                    other.name()
                )),
            },
            Inbound::Invalid(message) => ServerFrame::error(message),
            Inbound::Closed => return None,
        };
        if !send_frame(sink, guard, &notice).await {
            return None;
        }
    }
}

// ===== ingest =====

async fn ingest_ws(
    State(hub): State<StreamHub>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    let guard = match open(&hub, StreamKind::Ingest, peer) {
        Ok(guard) => guard,
        Err(response) => return response,
    };
    ws.on_upgrade(move |socket| ingest_connection(socket, hub, guard))
}

async fn ingest_connection(socket: WebSocket, hub: StreamHub, guard: ConnectionGuard) {
    let (mut sink, mut stream) = socket.split();
    let shutdown = hub.shutdown_token();

    let capacity = hub.config().ingest.max_concurrent_batches.max(1) * 2;
    let (tx, rx) = channel(capacity, Delivery::Reliable);
    let call = {
        let hub = hub.clone();
        tokio::spawn(async move { hub.ingest(rx).await })
    };

    let reason = loop {
        let inbound = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break CloseReason::Shutdown,
            inbound = next_frame(&mut stream) => inbound,
        };

        match inbound {
            Inbound::Frame(ClientFrame::Batch(batch)) => {
                guard.record_inbound();
                let sent = tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break CloseReason::Shutdown,
                    sent = tx.send(batch) => sent,
                };
                if let Err(e) = sent {
                    break e.reason;
                }
            }
            Inbound::Frame(ClientFrame::End) => break CloseReason::Completed,
            Inbound::Frame(other) => {
                let notice = ServerFrame::error(format!(
                    "unexpected '{}' frame on ingest stream",
                    other.name()
                ));
                if !send_frame(&mut sink, &guard, &notice).await {
                    break CloseReason::PeerGone;
                }
            }
            Inbound::Invalid(message) => {
                if !send_frame(&mut sink, &guard, &ServerFrame::error(message)).await {
                    break CloseReason::PeerGone;
                }
            }
            Inbound::Closed => break CloseReason::PeerGone,
        }
    };

    tx.close(reason.clone());
    drop(tx);

    let result = match call.await {
        Ok(result) => result,
        Err(e) => {
            error!(connection = %guard.id(), error = %e, "ingestion task failed");
            finish(&mut sink, &guard, CloseReason::Error("ingestion failed".into())).await;
            return;
        }
    };

    if reason != CloseReason::PeerGone
        && send_frame(&mut sink, &guard, &ServerFrame::Result(result)).await
    {
        finish(&mut sink, &guard, reason).await;
    }
}

// ===== snapshots =====

async fn snapshots_ws(
    State(hub): State<StreamHub>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    let guard = match open(&hub, StreamKind::Snapshots, peer) {
        Ok(guard) => guard,
        Err(response) => return response,
    };
    ws.on_upgrade(move |socket| snapshots_connection(socket, hub, guard))
}

async fn snapshots_connection(socket: WebSocket, hub: StreamHub, guard: ConnectionGuard) {
    let (mut sink, mut stream) = socket.split();
    let shutdown = hub.shutdown_token();

    let pick = |frame: ClientFrame| match frame {
        ClientFrame::Subscribe(subscription) => Ok(subscription),
        other => Err(other),
    };
    let Some(subscription) = await_request(&mut stream, &mut sink, &guard, &shutdown, pick).await
    else {
        return;
    };

    let subscription = hub.subscribe_snapshots(subscription);
    let reason = loop {
        tokio::select! {
            received = subscription.stream.recv() => match received {
                Ok(snapshot) => {
                    if !send_frame(&mut sink, &guard, &ServerFrame::Snapshot(snapshot)).await {
                        break None;
                    }
                }
                Err(end) => break Some(end.reason),
            },
            inbound = next_frame(&mut stream) => match inbound {
                Inbound::Closed => break None,
                Inbound::Frame(ClientFrame::End) => {
                    subscription.stream.close(CloseReason::Cancelled);
                    break Some(CloseReason::Cancelled);
                }
                Inbound::Frame(_) | Inbound::Invalid(_) => {
                    let notice = ServerFrame::error("subscription already active");
                    if !send_frame(&mut sink, &guard, &notice).await {
                        break None;
                    }
                }
            },
        }
    };

    drop(subscription);
    if let Some(reason) = reason {
        finish(&mut sink, &guard, reason).await;
    }
}

// ===== sessions =====

#[derive(Debug, Deserialize)]
struct SessionParams {
    participant_id: String,
}

async fn session_ws(
    State(hub): State<StreamHub>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Path(session_id): Path<String>,
    Query(params): Query<SessionParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let guard = match open(&hub, StreamKind::Session, peer) {
        Ok(guard) => guard,
        Err(response) => return response,
    };
    ws.on_upgrade(move |socket| {
        session_connection(socket, hub, guard, session_id, params.participant_id)
    })
}

async fn session_connection(
    socket: WebSocket,
    hub: StreamHub,
    guard: ConnectionGuard,
    session_id: String,
    participant_id: String,
) {
    let guard = Arc::new(guard);
    let (mut sink, stream) = socket.split();

    let (in_tx, in_rx) = channel(SESSION_INBOUND, Delivery::Reliable);
    let out = match hub.join_session(&session_id, &participant_id, in_rx).await {
        Ok(out) => out,
        Err(e) => {
            warn!(session = %session_id, participant = %participant_id, error = %e, "join refused");
            let _ = send_frame(&mut sink, &guard, &ServerFrame::error(e.to_string())).await;
            finish(&mut sink, &guard, e.close_reason()).await;
            return;
        }
    };

    // Reading runs on its own task: a chat send waiting on backpressure must
    // not stop this socket from draining its own outbound messages.
    let (notice_tx, mut notices) = mpsc::channel(NOTICE_QUEUE);
    let reader = tokio::spawn(session_reader(
        stream,
        in_tx,
        notice_tx,
        Arc::clone(&guard),
    ));

    let reason = loop {
        tokio::select! {
            received = out.recv() => match received {
                Ok(message) => {
                    if !send_frame(&mut sink, &guard, &ServerFrame::Message(message)).await {
                        break None;
                    }
                }
                Err(end) => break Some(end.reason),
            },
            Some(notice) = notices.recv() => {
                if !send_frame(&mut sink, &guard, &notice).await {
                    break None;
                }
            }
        }
    };

    reader.abort();
    drop(out);
    if let Some(reason) = reason {
        finish(&mut sink, &guard, reason).await;
    }
}

async fn session_reader(
    mut stream: WsStream,
    inbound: StreamSender<CollabMessage>,
    notices: mpsc::Sender<ServerFrame>,
    guard: Arc<ConnectionGuard>,
) {
    loop {
        match next_frame(&mut stream).await {
            Inbound::Frame(ClientFrame::Message(message)) => {
                guard.record_inbound();
                if inbound.send(message).await.is_err() {
                    return;
                }
            }
            Inbound::Frame(ClientFrame::End) => {
                inbound.close(CloseReason::Completed);
                return;
            }
            Inbound::Frame(other) => {
                let _ = notices.try_send(ServerFrame::error(format!(
                    "unexpected '{}' frame on session stream",
                    other.name()
                )));
            }
            Inbound::Invalid(message) => {
                let _ = notices.try_send(ServerFrame::error(message));
            }
            Inbound::Closed => {
                inbound.close(CloseReason::PeerGone);
                return;
            }
        }
    }
}

// ===== alerts =====

async fn alerts_ws(
    State(hub): State<StreamHub>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    let guard = match open(&hub, StreamKind::Alerts, peer) {
        Ok(guard) => guard,
        Err(response) => return response,
    };
    ws.on_upgrade(move |socket| alerts_connection(socket, hub, guard))
}

async fn alerts_connection(socket: WebSocket, hub: StreamHub, guard: ConnectionGuard) {
    let (mut sink, mut stream) = socket.split();
    let shutdown = hub.shutdown_token();

    let pick = |frame: ClientFrame| match frame {
        ClientFrame::SubscribeAlerts(filter) => Ok(filter),
        other => Err(other),
    };
    let Some(filter) = await_request(&mut stream, &mut sink, &guard, &shutdown, pick).await else {
        return;
    };

    let (events, _subscriber) = hub.subscribe_alerts(filter);
    let reason = loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => {
                    if !send_frame(&mut sink, &guard, &ServerFrame::Event(event)).await {
                        break None;
                    }
                }
                Err(end) => break Some(end.reason),
            },
            inbound = next_frame(&mut stream) => match inbound {
                Inbound::Closed => break None,
                Inbound::Frame(ClientFrame::End) => {
                    events.close(CloseReason::Cancelled);
                    break Some(CloseReason::Cancelled);
                }
                Inbound::Frame(_) | Inbound::Invalid(_) => {
                    let notice = ServerFrame::error("subscription already active");
                    if !send_frame(&mut sink, &guard, &notice).await {
                        break None;
                    }
                }
            },
        }
    };

    drop(events);
    if let Some(reason) = reason {
        finish(&mut sink, &guard, reason).await;
    }
}
