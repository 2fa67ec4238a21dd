//! §4.7 Transport & Fan-out — the real-time WebSocket endpoint. Runs over
//! axum's native WebSocket support so the realtime path and the REST API
//! share one listener and one port.

pub mod queue;
pub mod wire;

use crate::auth::{AuthGate, Principal};
use crate::rooms::awareness::ClientId;
use crate::rooms::{Room, RoomRegistry, Subscriber};
use crate::session_service::model::Role;
use crate::session_service::SessionService;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use queue::OutboundQueue;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};
use wire::Frame;

/// Liveness timeout: no ping from the client in this long closes 1006 (§4.7).
const PING_TIMEOUT: Duration = Duration::from_secs(60);
const OUTBOUND_QUEUE_CAPACITY: usize = queue::DEFAULT_CAPACITY;

#[derive(Clone)]
pub struct TransportState {
    pub auth: Arc<AuthGate>,
    pub sessions: Arc<SessionService>,
    pub rooms: Arc<RoomRegistry>,
    pub rt_subprotocol: String,
}

fn close(code: u16, reason: &'static str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: reason.into(),
    }))
}

/// `GET /rt/{sessionId}/{filePathEncoded}` — upgrades to the binary
/// real-time protocol (§6.2). Percent-decoding of `filePathEncoded` is
/// handled by axum's `Path` extractor.
pub async fn upgrade(
    State(state): State<TransportState>,
    Path((session_id, file_path)): Path<(String, String)>,
    headers: axum::http::HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let principal = match state.auth.authenticate(&headers).await {
        Ok(p) => p,
        Err(_) => return axum::http::StatusCode::UNAUTHORIZED.into_response(),
    };

    let decision = state.sessions.authorize(&principal, &session_id, Role::Viewer).await;
    if !decision.allow {
        return axum::http::StatusCode::FORBIDDEN.into_response();
    }

    ws.protocols([state.rt_subprotocol.clone()])
        .on_upgrade(move |socket| handle_socket(socket, state, principal, session_id, file_path))
}

async fn handle_socket(
    socket: WebSocket,
    state: TransportState,
    principal: Principal,
    session_id: String,
    file_path: String,
) {
    let room = match state.rooms.acquire(&session_id, &file_path).await {
        Ok(room) => room,
        Err(e) => {
            warn!(session_id, file_path, err = %e, "failed to acquire room");
            return;
        }
    };

    let (mut sink, mut stream) = futures_util::StreamExt::split(socket);
    let outbound = Arc::new(OutboundQueue::new(OUTBOUND_QUEUE_CAPACITY));
    let client_id = register_subscriber(&room, &principal, outbound.clone()).await;

    send_initial_sync(&room, &outbound).await;

    let (close_tx, mut close_rx) = mpsc::channel::<(u16, &'static str)>(1);
    let mut invalidations = state.sessions.subscribe_invalidations();
    let writer_room = room.clone();
    let writer_outbound = outbound.clone();
    let invalidation_user_id = principal.user_id.clone();
    let writer = tokio::spawn(async move {
        use futures_util::SinkExt;
        loop {
            tokio::select! {
                frame = writer_outbound.pop() => {
                    match frame {
                        Some(frame) => {
                            if sink.send(Message::Binary(frame.encode().into())).await.is_err() {
                                break;
                            }
                        }
                        None => {
                            let reason = writer_outbound.close_reason();
                            let _ = sink.send(close(reason.code, reason.reason)).await;
                            break;
                        }
                    }
                }
                requested = close_rx.recv() => {
                    if let Some((code, reason)) = requested {
                        let _ = sink.send(close(code, reason)).await;
                    }
                    break;
                }
                invalidation = invalidations.recv() => {
                    match invalidation {
                        Ok(ev) if ev.session_id == writer_room.session_id
                            && (ev.user_id.is_none() || ev.user_id.as_deref() == Some(invalidation_user_id.as_str())) => {
                            let _ = sink.send(close(4403, "access revoked")).await;
                            break;
                        }
                        Ok(_) => continue,
                        Err(_) => continue,
                    }
                }
                _ = tokio::time::sleep(PING_TIMEOUT) => {
                    let _ = sink.send(close(1006, "ping timeout")).await;
                    break;
                }
            }
        }
    });

    while let Some(Ok(msg)) = futures_util::StreamExt::next(&mut stream).await {
        match msg {
            Message::Binary(bytes) => {
                if bytes.len() > wire::MAX_FRAME_BYTES {
                    let _ = close_tx.send((4413, "frame too large")).await;
                    break;
                }
                let frame = match Frame::decode(&bytes) {
                    Ok(f) => f,
                    Err(e) => {
                        warn!(err = %e, "invalid frame, closing connection");
                        let _ = close_tx.send((1008, "invalid framing")).await;
                        break;
                    }
                };
                if !handle_frame(&room, &principal, client_id, frame).await {
                    let _ = close_tx.send((1008, "invalid framing")).await;
                    break;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    writer.abort();
    deregister_subscriber(&room, client_id).await;
}

async fn register_subscriber(room: &Arc<Room>, principal: &Principal, queue: Arc<OutboundQueue>) -> ClientId {
    let mut state = room.lock().await;
    let client_id = state.allocate_client_id();
    state.subscribers.insert(
        client_id,
        Subscriber {
            user_id: principal.user_id.clone(),
            queue,
        },
    );
    state.last_activity_at = tokio::time::Instant::now();
    info!(session_id = %room.session_id, file_path = %room.file_path, client_id, "subscriber joined");
    client_id
}

async fn deregister_subscriber(room: &Arc<Room>, client_id: ClientId) {
    let awareness_update = {
        let mut state = room.lock().await;
        state.subscribers.remove(&client_id);
        state.awareness.remove(client_id);
        state.last_activity_at = tokio::time::Instant::now();
        state.awareness.encode_update(&[client_id])
    };
    room.broadcast(Frame::AwarenessUpdate(awareness_update), None).await;
    info!(session_id = %room.session_id, file_path = %room.file_path, client_id, "subscriber left");
}

/// Sends `SyncStep1`/`SyncStep2`/`AwarenessSnapshot` to a newly-joined
/// subscriber so it can converge on the current document and presence
/// (§4.7 connection lifecycle).
async fn send_initial_sync(room: &Arc<Room>, outbound: &Arc<OutboundQueue>) {
    let state = room.lock().await;
    let state_vector = state.document.state_vector();
    let full_update = state.document.encode_full();
    let snapshot = state.awareness.encode_snapshot();
    drop(state);

    let _ = outbound.push(Frame::SyncStep1(state_vector));
    let _ = outbound.push(Frame::SyncStep2(full_update));
    let _ = outbound.push(Frame::AwarenessSnapshot(snapshot));
}

/// Applies one decoded client frame to room state. Returns `false` when the
/// connection must be closed with 1008 because applying it left the
/// document state unreadable (§6.5, §7): the caller closes rather than the
/// frame handler itself, since closing needs the writer task's sink.
async fn handle_frame(room: &Arc<Room>, principal: &Principal, client_id: ClientId, frame: Frame) -> bool {
    match frame {
        Frame::SyncStep1(their_state_vector) => {
            let diff = {
                let state = room.lock().await;
                state.document.encode_diff(&their_state_vector)
            };
            if let Ok(diff) = diff {
                if let Some(subscriber) = room.lock().await.subscribers.get(&client_id) {
                    let _ = subscriber.queue.push(Frame::SyncStep2(diff));
                }
            }
        }
        Frame::DocUpdate(update) => {
            {
                let mut state = room.lock().await;
                if state.document.apply(&update).is_err() {
                    return false;
                }
                state.dirty = true;
                state.last_activity_at = tokio::time::Instant::now();
            }
            room.notify_dirty(principal.user_id.clone());
            room.broadcast(Frame::DocUpdate(update), Some(client_id)).await;
        }
        Frame::AwarenessUpdate(payload) => {
            let changed: Vec<ClientId> = match crate::rooms::awareness::AwarenessRegistry::decode_update(&payload) {
                Ok(decoded) => {
                    let mut state = room.lock().await;
                    for (id, maybe_state) in decoded.iter() {
                        match maybe_state {
                            Some(awareness) => state.awareness.set(*id, awareness.clone()),
                            None => {
                                state.awareness.remove(*id);
                            }
                        }
                    }
                    state.last_activity_at = tokio::time::Instant::now();
                    decoded.keys().copied().collect()
                }
                Err(e) => {
                    warn!(err = %e, "dropping malformed awareness update");
                    return true;
                }
            };
            let rebroadcast = {
                let state = room.lock().await;
                state.awareness.encode_update(&changed)
            };
            room.broadcast(Frame::AwarenessUpdate(rebroadcast), Some(client_id)).await;
        }
        Frame::Ping => {
            if let Some(subscriber) = room.lock().await.subscribers.get(&client_id) {
                let _ = subscriber.queue.push(Frame::Pong);
            }
        }
        Frame::SyncStep2(_) | Frame::AwarenessSnapshot(_) | Frame::Pong => {
            // Client-originated only in reply to our own requests; nothing
            // to do for a server that never issues SyncStep1 to clients.
        }
    }
    true
}
