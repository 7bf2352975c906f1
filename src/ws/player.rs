//! Player message handlers
//!
//! Voting, presence and the dare round trip between giver and winner.

use crate::protocol::ServerMessage;
use crate::state::{AppState, RoomSession};
use crate::types::{Player, Presence, RoundPhase};
use std::sync::Arc;

pub async fn handle_cast_vote(
    session: &RoomSession,
    voter: &Player,
    target_id: String,
    msg_id: String,
) -> Option<ServerMessage> {
    tracing::info!(
        "Vote in {}: {} -> {} (msg {})",
        session.room.code,
        voter.id,
        target_id,
        msg_id
    );

    let mut machine = session.machine.lock().await;
    match machine.cast_vote(&voter.id, &target_id).await {
        Ok(_) => {
            session.broadcast(ServerMessage::Tally {
                question_index: machine.question_index(),
                counts: machine.counts().clone(),
                seq: session.next_tally_seq(),
            });
            if machine.phase() == RoundPhase::Results {
                session.announce_phase(&machine);
            }
            Some(ServerMessage::VoteAck { msg_id })
        }
        Err(e) => {
            tracing::debug!("Vote rejected: {}", e);
            Some(ServerMessage::error(&e))
        }
    }
}

pub async fn handle_set_presence(
    state: &Arc<AppState>,
    player: &Player,
    presence: Presence,
) -> Option<ServerMessage> {
    match state.set_presence(player, presence).await {
        Ok(_) => None,
        Err(e) => Some(ServerMessage::error(&e)),
    }
}

pub async fn handle_submit_dare(
    session: &RoomSession,
    author: &Player,
    text: String,
) -> Option<ServerMessage> {
    let mut machine = session.machine.lock().await;
    match machine.submit_dare(&author.id, &text) {
        Ok(()) => {
            tracing::info!("Dare submitted in {}", session.room.code);
            session.send_dare_views(&machine);
            Some(ServerMessage::DareView {
                view: machine.dare_view(&author.id),
            })
        }
        Err(e) => Some(ServerMessage::error(&e)),
    }
}

pub async fn handle_complete_dare(session: &RoomSession, player: &Player) -> Option<ServerMessage> {
    let mut machine = session.machine.lock().await;
    match machine.complete_dare(&player.id).await {
        Ok(phase) => {
            tracing::info!("Dare completed in {}, now {:?}", session.room.code, phase);
            Some(session.announce_phase(&machine))
        }
        Err(e) => Some(ServerMessage::error(&e)),
    }
}
