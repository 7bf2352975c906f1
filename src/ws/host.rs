//! Host message handlers

use crate::protocol::ServerMessage;
use crate::state::{AppState, RoomSession};
use std::sync::Arc;

pub async fn handle_close_voting(session: &RoomSession) -> Option<ServerMessage> {
    let mut machine = session.machine.lock().await;
    if let Err(e) = machine.close_voting() {
        return Some(ServerMessage::error(&e));
    }
    Some(session.announce_phase(&machine))
}

pub async fn handle_give_dare(state: &Arc<AppState>, session: &RoomSession) -> Option<ServerMessage> {
    // Giver is picked now but stays hidden until the reveal
    {
        let mut machine = session.machine.lock().await;
        let mut rng = rand::rng();
        if let Err(e) = machine.start_challenge(&mut rng) {
            return Some(ServerMessage::error(&e));
        }
        session.announce_phase(&machine);
    }

    // Drumroll; the room stays unlocked meanwhile
    let delay = state.config.challenge_reveal_delay;
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let mut machine = session.machine.lock().await;
    let (giver_id, winner_id) = match machine.reveal_challenge() {
        Ok(c) => (c.giver_id.clone(), c.winner_id.clone()),
        Err(e) => {
            // Host skipped the round during the drumroll
            tracing::debug!("Challenge in {} not revealed: {}", session.room.code, e);
            return Some(ServerMessage::error(&e));
        }
    };

    tracing::info!(
        "Challenge in {}: {} dares {}",
        session.room.code,
        giver_id,
        winner_id
    );
    session.broadcast(ServerMessage::ChallengeGiver {
        giver_id,
        winner_id,
    });

    Some(session.announce_phase(&machine))
}

/// Also moves on from a challenge whose giver or winner has gone quiet
pub async fn handle_skip_round(session: &RoomSession) -> Option<ServerMessage> {
    let mut machine = session.machine.lock().await;
    match machine.skip_round().await {
        Ok(_) => Some(session.announce_phase(&machine)),
        Err(e) => Some(ServerMessage::error(&e)),
    }
}

pub async fn handle_resync(session: &RoomSession) -> Option<ServerMessage> {
    let mut machine = session.machine.lock().await;
    match machine.resync().await {
        Ok(()) => {
            tracing::info!("Resynced votes for {}", session.room.code);
            session.broadcast(ServerMessage::Tally {
                question_index: machine.question_index(),
                counts: machine.counts().clone(),
                seq: session.next_tally_seq(),
            });
            Some(ServerMessage::Phase {
                snapshot: machine.snapshot(),
                server_now: chrono::Utc::now().to_rfc3339(),
            })
        }
        Err(e) => Some(ServerMessage::error(&e)),
    }
}
