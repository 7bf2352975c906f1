pub mod handlers;
mod host;
mod player;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::{AppState, RoomSession};
use crate::types::{Player, PlayerInfo, Presence, RoundPhase};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub room: Option<String>,
    pub token: Option<String>,
}

/// WebSocket upgrade handler. The join token is checked before upgrading.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let (Some(room), Some(token)) = (params.room, params.token) else {
        return (StatusCode::BAD_REQUEST, "room and token are required").into_response();
    };

    let player = match state.authenticate(&room, &token).await {
        Ok(p) => p,
        Err(e) => {
            tracing::info!("Rejected WebSocket for room {}: {}", room, e);
            return (StatusCode::UNAUTHORIZED, e.to_string()).into_response();
        }
    };

    let Some(session) = state.get_session(&room).await else {
        return (StatusCode::NOT_FOUND, "room not found").into_response();
    };

    tracing::info!(
        "WebSocket connection request: room={}, player={}",
        session.room.code,
        player.id
    );

    ws.on_upgrade(move |socket| handle_socket(socket, player, session, state))
}

async fn send_json(
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            tracing::error!("Failed to serialize message: {}", e);
            true
        }
    }
}

/// Messages a freshly connected client needs to catch up
pub async fn welcome_messages(session: &RoomSession, player: &Player) -> Vec<ServerMessage> {
    let machine = session.machine.lock().await;
    let mut msgs = vec![ServerMessage::Welcome {
        protocol: "1.0".to_string(),
        room_code: session.room.code.clone(),
        player: PlayerInfo::from(player),
        is_host: session.is_host(&player.id),
        snapshot: machine.snapshot(),
        server_now: chrono::Utc::now().to_rfc3339(),
    }];
    if machine.phase() == RoundPhase::Challenge {
        msgs.push(ServerMessage::DareView {
            view: machine.dare_view(&player.id),
        });
    }
    msgs
}

/// Handle individual WebSocket connection
async fn handle_socket(
    socket: WebSocket,
    player: Player,
    session: Arc<RoomSession>,
    state: Arc<AppState>,
) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before the welcome so nothing falls between snapshot and feed
    let mut events = session.events.subscribe();

    session.connect(&player.id).await;
    if let Err(e) = state.set_presence(&player, Presence::InRoom).await {
        tracing::warn!("Failed to mark {} as in room: {}", player.id, e);
    }

    let mut welcomed = true;
    for msg in welcome_messages(&session, &player).await {
        if !send_json(&mut sender, &msg).await {
            tracing::error!("Failed to send welcome message");
            welcomed = false;
            break;
        }
    }

    while welcomed {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        if event.is_for(&player.id) && !send_json(&mut sender, &event.msg).await {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Client {} lagged, {} room events skipped", player.id, skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!("Received message: {}", text);

                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                if let Some(response) =
                                    handlers::handle_message(client_msg, &player, &state).await
                                {
                                    if !send_json(&mut sender, &response).await {
                                        tracing::error!("Failed to send response");
                                        break;
                                    }
                                }
                            }
                            Err(e) => {
                                tracing::error!("Failed to parse client message: {}", e);
                                let error = ServerMessage::Error {
                                    code: "PARSE_ERROR".to_string(),
                                    msg: format!("Invalid message format: {}", e),
                                };
                                let _ = send_json(&mut sender, &error).await;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!("WebSocket closed");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    // Another tab of the same player keeps them in the room
    if session.disconnect(&player.id).await == 0 {
        if let Err(e) = state.set_presence(&player, Presence::OutOfRoom).await {
            tracing::warn!("Failed to mark {} as out of room: {}", player.id, e);
        }
    }
    tracing::info!(
        "WebSocket connection closed for player {} in room {}",
        player.id,
        session.room.code
    );
}
