use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tracing::{error, info, warn};

use parley_types::events::{ClientCommand, ServerEvent};

use crate::session::{self, Session, SessionDeps};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// How long an unauthenticated socket may sit before we hang up.
const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle a single WebSocket connection: wait for `Authenticate`, run the
/// sign-on sequence, then pump events both ways until either side drops.
pub async fn handle_connection(socket: WebSocket, deps: SessionDeps) {
    let (mut sender, mut receiver) = socket.split();

    let (conn_id, mut event_rx) = deps.transport.register().await;

    // Step 1: the connection is unauthenticated until a valid token arrives.
    let token = match wait_for_token(&mut receiver).await {
        Some(token) => token,
        None => {
            warn!("WebSocket client failed to authenticate in time, closing");
            send_event(&mut sender, &ServerEvent::AuthError).await;
            deps.transport.unregister(conn_id).await;
            return;
        }
    };

    let session = match Session::authenticate(deps.clone(), conn_id, &token).await {
        Ok(session) => session,
        Err(e) => {
            warn!("WebSocket authentication failed: {e}");
            send_event(&mut sender, &ServerEvent::AuthError).await;
            deps.transport.unregister(conn_id).await;
            return;
        }
    };

    let username = session.username().to_string();
    info!("{username} connected to gateway on {conn_id}");

    // Shared flag for heartbeat
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward engine events -> socket, with heartbeat.
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = event_rx.recv() => {
                    let Some(event) = result else { break };
                    let text = serde_json::to_string(&event).unwrap();
                    if sender.send(WsMessage::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {missed_heartbeats} pongs), dropping connection");
                            break;
                        }
                    }
                    if sender.send(WsMessage::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Parse client commands and dispatch them in arrival order.
    let recv_username = username.clone();
    let mut recv_task = tokio::spawn(async move {
        let mut session = session;
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                WsMessage::Text(text) => match serde_json::from_str::<ClientCommand>(&text) {
                    Ok(cmd) => {
                        if let Err(e) = session.handle(cmd).await {
                            error!("{recv_username}: command dropped: {e}");
                        }
                    }
                    Err(e) => {
                        warn!(
                            "{recv_username} bad command: {e} -- raw: {}",
                            &text[..text.len().min(200)]
                        );
                    }
                },
                WsMessage::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                WsMessage::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    session::disconnect(&deps, &username, conn_id).await;
    info!("{username} disconnected from gateway");
}

async fn wait_for_token(receiver: &mut SplitStream<WebSocket>) -> Option<String> {
    let deadline = tokio::time::timeout(AUTH_TIMEOUT, async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let WsMessage::Text(text) = msg {
                if let Ok(ClientCommand::Authenticate { token }) =
                    serde_json::from_str::<ClientCommand>(&text)
                {
                    return Some(token);
                }
            }
        }
        None
    });

    deadline.await.ok().flatten()
}

async fn send_event(sender: &mut SplitSink<WebSocket, WsMessage>, event: &ServerEvent) {
    if let Ok(text) = serde_json::to_string(event) {
        let _ = sender.send(WsMessage::Text(text.into())).await;
    }
}
