mod player;
mod room;

use crate::config::AppConfig;
use crate::phase::PhaseMachine;
use crate::protocol::{Audience, RoomEvent, ServerMessage};
use crate::store::{Backend, MemoryBackend};
use crate::types::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};

pub use room::CreateRoom;

/// Live state of one room: its phase machine and the channel its clients
/// listen on
pub struct RoomSession {
    pub room: Room,
    pub machine: Mutex<PhaseMachine>,
    pub events: broadcast::Sender<RoomEvent>,
    /// (question index, counts) last pushed by the tally broadcaster
    pub last_tally: Mutex<Option<(usize, Counts)>>,
    tally_seq: AtomicU64,
    /// Open sockets per player
    connections: Mutex<HashMap<PlayerId, usize>>,
}

impl RoomSession {
    pub fn new(room: Room, machine: PhaseMachine) -> Self {
        let (tx, _rx) = broadcast::channel(100);
        Self {
            room,
            machine: Mutex::new(machine),
            events: tx,
            last_tally: Mutex::new(None),
            tally_seq: AtomicU64::new(0),
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Sequence number for the next tally message, so clients can drop
    /// out-of-order updates
    pub fn next_tally_seq(&self) -> u64 {
        self.tally_seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Send to every client of the room
    pub fn broadcast(&self, msg: ServerMessage) {
        // Ignore send errors (no receivers connected is fine)
        let _ = self.events.send(RoomEvent {
            to: Audience::All,
            msg,
        });
    }

    /// Send to the connections of a single player
    pub fn send_to(&self, player_id: &str, msg: ServerMessage) {
        let _ = self.events.send(RoomEvent {
            to: Audience::Player(player_id.to_string()),
            msg,
        });
    }

    pub fn is_host(&self, player_id: &str) -> bool {
        self.room.host_id == player_id
    }

    /// Register a socket for `player_id`, returns how many are open now
    pub async fn connect(&self, player_id: &str) -> usize {
        let mut connections = self.connections.lock().await;
        let open = connections.entry(player_id.to_string()).or_insert(0);
        *open += 1;
        *open
    }

    /// Drop a socket for `player_id`, returns how many are still open
    pub async fn disconnect(&self, player_id: &str) -> usize {
        let mut connections = self.connections.lock().await;
        match connections.get_mut(player_id) {
            Some(open) if *open > 1 => {
                *open -= 1;
                *open
            }
            _ => {
                connections.remove(player_id);
                0
            }
        }
    }

    /// Broadcast everything clients need after a phase change and return the
    /// phase message for the caller
    pub fn announce_phase(&self, machine: &PhaseMachine) -> ServerMessage {
        let phase = ServerMessage::Phase {
            snapshot: machine.snapshot(),
            server_now: chrono::Utc::now().to_rfc3339(),
        };
        self.broadcast(phase.clone());

        match machine.phase() {
            RoundPhase::Results => {
                if let Some(outcome) = machine.outcome() {
                    self.broadcast(ServerMessage::Results {
                        question_index: machine.question_index(),
                        outcome: outcome.clone(),
                        counts: machine.counts().clone(),
                    });
                }
            }
            RoundPhase::Challenge => self.send_dare_views(machine),
            RoundPhase::Finished => {
                // Each player only gets the dares they had to do
                for player in machine.roster() {
                    self.send_to(
                        &player.id,
                        ServerMessage::Finished {
                            results: machine
                                .results()
                                .iter()
                                .map(|r| r.visible_to(Some(&player.id)))
                                .collect(),
                        },
                    );
                }
            }
            RoundPhase::Voting => {}
        }

        phase
    }

    /// The dare is only ever sent to the giver and the winner
    pub fn send_dare_views(&self, machine: &PhaseMachine) {
        if let Some(challenge) = machine.challenge() {
            for id in [&challenge.giver_id, &challenge.winner_id] {
                self.send_to(
                    id,
                    ServerMessage::DareView {
                        view: machine.dare_view(id),
                    },
                );
            }
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn Backend>,
    pub config: AppConfig,
    pub sessions: Arc<RwLock<HashMap<RoomCode, Arc<RoomSession>>>>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self::with_backend(Arc::new(MemoryBackend::new()), config)
    }

    pub fn with_backend(backend: Arc<dyn Backend>, config: AppConfig) -> Self {
        Self {
            backend,
            config,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn get_session(&self, code: &str) -> Option<Arc<RoomSession>> {
        self.sessions.read().await.get(&code.to_uppercase()).cloned()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(AppConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GameError;

    #[tokio::test]
    async fn test_create_room_and_join() {
        let state = AppState::default();
        let (room, host) = state
            .create_room(CreateRoom {
                host_name: Some("Ann".to_string()),
                ..CreateRoom::default()
            })
            .await
            .unwrap();

        assert_eq!(room.code.len(), 5);
        assert_eq!(room.host_id, host.id);
        assert_eq!(room.questions.len(), state.config.questions_per_room);
        assert_eq!(host.display_name, "Ann");

        let guest = state.join_room(&room.code, None).await.unwrap();
        assert!(!guest.display_name.is_empty());
        assert_ne!(guest.token, host.token);

        let session = state.get_session(&room.code).await.unwrap();
        let machine = session.machine.lock().await;
        assert_eq!(machine.roster().len(), 2);
        assert_eq!(machine.phase(), RoundPhase::Voting);
    }

    #[tokio::test]
    async fn test_room_codes_are_case_insensitive() {
        let state = AppState::default();
        let (room, _host) = state.create_room(CreateRoom::default()).await.unwrap();

        let lower = room.code.to_lowercase();
        assert!(state.get_session(&lower).await.is_some());
        assert!(state.join_room(&lower, Some("Bob".into())).await.is_ok());
    }

    #[tokio::test]
    async fn test_join_unknown_room() {
        let state = AppState::default();
        let result = state.join_room("ZZZZZ", Some("Bob".into())).await;
        assert_eq!(result.unwrap_err(), GameError::RoomNotFound("ZZZZZ".into()));
    }

    #[tokio::test]
    async fn test_custom_questions() {
        let state = AppState::default();
        let (room, _host) = state
            .create_room(CreateRoom {
                questions: Some(vec![
                    "Who is most likely to nap?".to_string(),
                    "Who is most likely to dance?".to_string(),
                ]),
                ..CreateRoom::default()
            })
            .await
            .unwrap();

        assert_eq!(room.questions.len(), 2);
        assert_eq!(room.questions[1].text, "Who is most likely to dance?");
    }

    #[tokio::test]
    async fn test_empty_custom_questions_rejected() {
        let state = AppState::default();
        let result = state
            .create_room(CreateRoom {
                questions: Some(vec!["  ".to_string()]),
                ..CreateRoom::default()
            })
            .await;
        assert!(matches!(result, Err(GameError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_practice_room_has_bots() {
        let state = AppState::default();
        let (room, host) = state
            .create_room(CreateRoom {
                practice: true,
                ..CreateRoom::default()
            })
            .await
            .unwrap();

        assert_eq!(room.mode, RoomMode::Practice);
        let players = state.backend.list_players(&room.code).await.unwrap();
        assert_eq!(players.len(), 1 + room::PRACTICE_BOTS);

        let session = state.get_session(&room.code).await.unwrap();
        let mut machine = session.machine.lock().await;
        let target = players[1].id.clone();
        machine.cast_vote(&host.id, &target).await.unwrap();
        assert_eq!(
            machine.counts().values().sum::<u32>() as usize,
            1 + room::PRACTICE_BOTS
        );
    }

    #[tokio::test]
    async fn test_connection_counting() {
        let state = AppState::default();
        let (room, host) = state.create_room(CreateRoom::default()).await.unwrap();
        let session = state.get_session(&room.code).await.unwrap();

        assert_eq!(session.connect(&host.id).await, 1);
        assert_eq!(session.connect(&host.id).await, 2);
        assert_eq!(session.disconnect(&host.id).await, 1);
        assert_eq!(session.disconnect(&host.id).await, 0);
        // Unknown players are already gone
        assert_eq!(session.disconnect("nobody").await, 0);
    }

    #[tokio::test]
    async fn test_quorum_closes_when_last_voter_leaves() {
        let state = AppState::new(AppConfig {
            auto_close: AutoClose::Quorum,
            ..AppConfig::default()
        });
        let (room, host) = state.create_room(CreateRoom::default()).await.unwrap();
        let bob = state.join_room(&room.code, Some("Bob".into())).await.unwrap();
        let cy = state.join_room(&room.code, Some("Cy".into())).await.unwrap();

        let session = state.get_session(&room.code).await.unwrap();
        let mut events = session.events.subscribe();
        {
            let mut machine = session.machine.lock().await;
            machine.cast_vote(&host.id, &bob.id).await.unwrap();
            machine.cast_vote(&bob.id, &host.id).await.unwrap();
            assert_eq!(machine.phase(), RoundPhase::Voting);
        }

        state.set_presence(&cy, Presence::OutOfRoom).await.unwrap();
        assert_eq!(session.machine.lock().await.phase(), RoundPhase::Results);

        let mut announced = false;
        while let Ok(event) = events.try_recv() {
            if let ServerMessage::Phase { snapshot, .. } = event.msg {
                announced |= snapshot.phase == RoundPhase::Results;
            }
        }
        assert!(announced, "clients should see voting close");
    }

    #[tokio::test]
    async fn test_presence_updates_roster() {
        let state = AppState::default();
        let (room, host) = state.create_room(CreateRoom::default()).await.unwrap();

        state.set_presence(&host, Presence::Away).await.unwrap();

        let session = state.get_session(&room.code).await.unwrap();
        let machine = session.machine.lock().await;
        assert_eq!(machine.roster()[0].presence, Presence::Away);
    }

    #[tokio::test]
    async fn test_authenticate_checks_room() {
        let state = AppState::default();
        let (room_a, host_a) = state.create_room(CreateRoom::default()).await.unwrap();
        let (room_b, _host_b) = state.create_room(CreateRoom::default()).await.unwrap();

        assert_eq!(
            state
                .authenticate(&room_a.code, &host_a.token)
                .await
                .unwrap()
                .id,
            host_a.id
        );
        assert_eq!(
            state
                .authenticate(&room_b.code, &host_a.token)
                .await
                .unwrap_err(),
            GameError::NotARoomMember(host_a.id.clone())
        );
        assert_eq!(
            state.authenticate(&room_a.code, "nope").await.unwrap_err(),
            GameError::PlayerNotFound
        );
    }
}
