use crate::protocol::ServerMessage;
use crate::state::{AppState, RoomSession};
use crate::types::RoundPhase;
use std::sync::Arc;

/// Spawn a background task that pulls realtime votes into every room's tally
/// and pushes changed counts to that room's clients
pub fn spawn_tally_broadcaster(state: Arc<AppState>) {
    let interval = state.config.tally_broadcast_interval;
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;

            let sessions: Vec<Arc<RoomSession>> =
                state.sessions.read().await.values().cloned().collect();

            for session in sessions {
                sync_room(&session).await;
            }
        }
    });
}

/// Drain one room's subscription and broadcast if the counts moved.
/// Returns true when something was sent.
pub async fn sync_room(session: &RoomSession) -> bool {
    let mut machine = session.machine.lock().await;

    let phase = machine.phase();
    if phase != RoundPhase::Voting && phase != RoundPhase::Results {
        return false;
    }

    machine.sync();
    let current = (machine.question_index(), machine.counts().clone());

    let mut last = session.last_tally.lock().await;
    if last.as_ref() == Some(&current) {
        return false;
    }

    session.broadcast(ServerMessage::Tally {
        question_index: current.0,
        counts: current.1.clone(),
        seq: session.next_tally_seq(),
    });

    // Late votes can change the outcome while results are on screen
    if phase == RoundPhase::Results {
        if let Some(outcome) = machine.outcome() {
            session.broadcast(ServerMessage::Results {
                question_index: current.0,
                outcome: outcome.clone(),
                counts: current.1.clone(),
            });
        }
    }

    *last = Some(current);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::CreateRoom;
    use crate::store::Backend;
    use crate::types::{Vote, VoteScope};

    #[tokio::test]
    async fn test_sync_room_broadcasts_only_on_change() {
        let state = AppState::default();
        let (room, host) = state.create_room(CreateRoom::default()).await.unwrap();
        let session = state.get_session(&room.code).await.unwrap();
        let mut events = session.events.subscribe();

        // First pass publishes the (empty) baseline, second has nothing new
        assert!(sync_room(&session).await);
        assert!(!sync_room(&session).await);

        // A row written by someone else lands through the realtime feed
        state
            .backend
            .insert_vote(Vote::new(
                &VoteScope::new(room.code.clone(), 0),
                "outsider".into(),
                host.id.clone(),
            ))
            .await
            .unwrap();
        assert!(sync_room(&session).await);

        let mut last_counts = None;
        while let Ok(event) = events.try_recv() {
            if let ServerMessage::Tally { counts, .. } = event.msg {
                last_counts = Some(counts);
            }
        }
        assert_eq!(last_counts.unwrap().get(&host.id), Some(&1));
    }

    #[tokio::test]
    async fn test_sync_room_skips_challenge_and_finished() {
        let state = AppState::default();
        let (room, _host) = state
            .create_room(CreateRoom {
                questions: Some(vec!["Who is most likely to nap?".into()]),
                ..CreateRoom::default()
            })
            .await
            .unwrap();
        let session = state.get_session(&room.code).await.unwrap();

        {
            let mut machine = session.machine.lock().await;
            machine.close_voting().unwrap();
            machine.skip_round().await.unwrap();
            assert_eq!(machine.phase(), RoundPhase::Finished);
        }

        assert!(!sync_room(&session).await);
    }
}
