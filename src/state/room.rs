use super::{AppState, RoomSession};
use crate::error::{GameError, GameResult};
use crate::phase::PhaseMachine;
use crate::questions;
use crate::source::{BackedVoteSource, SimulatedVoteSource, VoteSource};
use crate::types::*;
use rand::Rng;
use serde::Deserialize;
use std::sync::Arc;

/// Safe character set for room codes (excludes 0/O, 1/I/L to avoid confusion)
const CODE_CHARS: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
const CODE_LENGTH: usize = 5;

/// Simulated players added to a practice room
pub const PRACTICE_BOTS: usize = 3;

/// Generate a random short code (5 characters)
fn generate_room_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LENGTH)
        .map(|_| CODE_CHARS[rng.random_range(0..CODE_CHARS.len())] as char)
        .collect()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateRoom {
    pub host_name: Option<String>,
    /// Custom prompts; drawn from the built-in bank when absent
    pub questions: Option<Vec<String>>,
    pub question_count: Option<usize>,
    #[serde(default)]
    pub practice: bool,
}

impl AppState {
    /// Create a room, its host player and its live session
    pub async fn create_room(&self, req: CreateRoom) -> GameResult<(Room, Player)> {
        let questions = match req.questions {
            Some(texts) => {
                let questions = questions::from_texts(texts);
                if questions.is_empty() {
                    return Err(GameError::InvalidRequest(
                        "a room needs at least one question".to_string(),
                    ));
                }
                questions
            }
            None => questions::draw(
                req.question_count
                    .unwrap_or(self.config.questions_per_room)
                    .max(1),
            ),
        };

        // Generate a unique code (check for collisions)
        let code = loop {
            let code = generate_room_code();
            if self.backend.get_room(&code).await?.is_none() {
                break code;
            }
        };

        let host = self.new_player(&code, req.host_name);
        let room = Room {
            code: code.clone(),
            host_id: host.id.clone(),
            questions,
            mode: if req.practice {
                RoomMode::Practice
            } else {
                RoomMode::Live
            },
            created_at: chrono::Utc::now().to_rfc3339(),
        };

        self.backend.insert_room(room.clone()).await?;
        self.backend.insert_player(host.clone()).await?;

        let source: Arc<dyn VoteSource> = match room.mode {
            RoomMode::Live => Arc::new(BackedVoteSource::new(self.backend.clone())),
            RoomMode::Practice => {
                let mut bots = Vec::with_capacity(PRACTICE_BOTS);
                for _ in 0..PRACTICE_BOTS {
                    let bot = self.new_player(&code, None);
                    self.backend.insert_player(bot.clone()).await?;
                    bots.push(bot.id);
                }
                let mut candidates = bots.clone();
                candidates.insert(0, host.id.clone());
                Arc::new(SimulatedVoteSource::new(
                    self.backend.clone(),
                    bots,
                    candidates,
                ))
            }
        };

        let roster = self.roster(&code).await?;
        let machine =
            PhaseMachine::start(&room, roster, source, self.config.phase_settings()).await?;

        self.sessions
            .write()
            .await
            .insert(code.clone(), Arc::new(RoomSession::new(room.clone(), machine)));

        tracing::info!(
            "Created {:?} room {} with {} questions",
            room.mode,
            code,
            room.questions.len()
        );
        Ok((room, host))
    }

    /// Add a player to an existing room
    pub async fn join_room(&self, code: &str, display_name: Option<String>) -> GameResult<Player> {
        let session = self
            .get_session(code)
            .await
            .ok_or_else(|| GameError::RoomNotFound(code.to_string()))?;

        let player = self.new_player(&session.room.code, display_name);
        self.backend.insert_player(player.clone()).await?;
        self.refresh_roster(&session).await?;

        tracing::info!(
            "Player {} ({}) joined room {}",
            player.id,
            player.display_name,
            session.room.code
        );
        Ok(player)
    }

    pub async fn roster(&self, code: &str) -> GameResult<Vec<PlayerInfo>> {
        Ok(self
            .backend
            .list_players(code)
            .await?
            .iter()
            .map(PlayerInfo::from)
            .collect())
    }

    /// Push the current player list into the session and to its clients
    pub async fn refresh_roster(&self, session: &RoomSession) -> GameResult<()> {
        let roster = self.roster(&session.room.code).await?;
        let mut machine = session.machine.lock().await;
        let closed = machine.set_roster(roster.clone());
        session.broadcast(crate::protocol::ServerMessage::Roster { players: roster });
        if closed {
            session.announce_phase(&machine);
        }
        Ok(())
    }

    /// Persisted results as `viewer` may see them
    pub async fn room_results(
        &self,
        code: &str,
        viewer_id: Option<&str>,
    ) -> GameResult<Vec<RoundResult>> {
        let code = code.to_uppercase();
        if self.backend.get_room(&code).await?.is_none() {
            return Err(GameError::RoomNotFound(code));
        }
        Ok(self
            .backend
            .load_results(&code)
            .await?
            .iter()
            .map(|r| r.visible_to(viewer_id))
            .collect())
    }
}
