//! WebSocket message dispatch
//!
//! Resolves the sender's room, checks host authorization, then dispatches to
//! the role-specific handler modules.

use crate::error::GameError;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use crate::types::Player;
use std::sync::Arc;

use super::{host, player};

/// Macro to check host authorization and return early if unauthorized
macro_rules! check_host {
    ($session:expr, $player:expr, $action:expr) => {
        if !$session.is_host(&$player.id) {
            return Some(ServerMessage::Error {
                code: "UNAUTHORIZED".to_string(),
                msg: format!("Only the host can {}", $action),
            });
        }
    };
}

/// Handle client messages and return optional response
pub async fn handle_message(
    msg: ClientMessage,
    sender: &Player,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    let Some(session) = state.get_session(&sender.room_code).await else {
        return Some(ServerMessage::error(&GameError::RoomNotFound(
            sender.room_code.clone(),
        )));
    };

    match msg {
        // Player messages
        ClientMessage::CastVote { target_id, msg_id } => {
            player::handle_cast_vote(&session, sender, target_id, msg_id).await
        }

        ClientMessage::SetPresence { presence } => {
            player::handle_set_presence(state, sender, presence).await
        }

        ClientMessage::SubmitDare { text } => {
            player::handle_submit_dare(&session, sender, text).await
        }

        ClientMessage::CompleteDare => player::handle_complete_dare(&session, sender).await,

        // Host-only commands (authorization checked before dispatch)
        ClientMessage::CloseVoting => {
            check_host!(session, sender, "close voting");
            host::handle_close_voting(&session).await
        }

        ClientMessage::GiveDare => {
            check_host!(session, sender, "start a challenge");
            host::handle_give_dare(state, &session).await
        }

        ClientMessage::SkipRound => {
            check_host!(session, sender, "skip a round");
            host::handle_skip_round(&session).await
        }

        ClientMessage::Resync => {
            check_host!(session, sender, "resync votes");
            host::handle_resync(&session).await
        }
    }
}
