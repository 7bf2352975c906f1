use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

use super::Backend;
use crate::error::{GameError, GameResult};
use crate::types::*;

/// Capacity of the insert notification channel. Receivers that fall further
/// behind than this lose rows and must resync.
const VOTE_FEED_CAPACITY: usize = 256;

/// In-process backend
#[derive(Clone)]
pub struct MemoryBackend {
    rooms: Arc<RwLock<HashMap<RoomCode, Room>>>,
    players: Arc<RwLock<Vec<Player>>>,
    votes: Arc<RwLock<Vec<Vote>>>,
    results: Arc<RwLock<HashMap<RoomCode, Vec<RoundResult>>>>,
    vote_feed: broadcast::Sender<Vote>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(VOTE_FEED_CAPACITY);
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            players: Arc::new(RwLock::new(Vec::new())),
            votes: Arc::new(RwLock::new(Vec::new())),
            results: Arc::new(RwLock::new(HashMap::new())),
            vote_feed: tx,
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn insert_room(&self, room: Room) -> GameResult<()> {
        let mut rooms = self.rooms.write().await;
        if rooms.contains_key(&room.code) {
            return Err(GameError::Backend(format!(
                "room {} already exists",
                room.code
            )));
        }
        rooms.insert(room.code.clone(), room);
        Ok(())
    }

    async fn get_room(&self, code: &str) -> GameResult<Option<Room>> {
        Ok(self.rooms.read().await.get(code).cloned())
    }

    async fn insert_player(&self, player: Player) -> GameResult<()> {
        if !self.rooms.read().await.contains_key(&player.room_code) {
            return Err(GameError::RoomNotFound(player.room_code));
        }
        self.players.write().await.push(player);
        Ok(())
    }

    async fn list_players(&self, room_code: &str) -> GameResult<Vec<Player>> {
        Ok(self
            .players
            .read()
            .await
            .iter()
            .filter(|p| p.room_code == room_code)
            .cloned()
            .collect())
    }

    async fn find_player_by_token(&self, token: &str) -> GameResult<Option<Player>> {
        Ok(self
            .players
            .read()
            .await
            .iter()
            .find(|p| p.token == token)
            .cloned())
    }

    async fn update_presence(&self, player_id: &str, presence: Presence) -> GameResult<Player> {
        let mut players = self.players.write().await;
        let player = players
            .iter_mut()
            .find(|p| p.id == player_id)
            .ok_or(GameError::PlayerNotFound)?;
        player.presence = presence;
        Ok(player.clone())
    }

    async fn insert_vote(&self, vote: Vote) -> GameResult<()> {
        {
            let mut votes = self.votes.write().await;
            if votes.iter().any(|v| {
                v.room_code == vote.room_code
                    && v.question_index == vote.question_index
                    && v.voter_id == vote.voter_id
            }) {
                return Err(GameError::AlreadyVoted);
            }
            votes.push(vote.clone());
        }

        // No subscribers is fine
        let _ = self.vote_feed.send(vote);
        Ok(())
    }

    async fn select_votes(&self, scope: &VoteScope) -> GameResult<Vec<Vote>> {
        Ok(self
            .votes
            .read()
            .await
            .iter()
            .filter(|v| v.room_code == scope.room_code && v.question_index == scope.question_index)
            .cloned()
            .collect())
    }

    async fn has_voted(&self, scope: &VoteScope, voter_id: &str) -> GameResult<bool> {
        Ok(self.votes.read().await.iter().any(|v| {
            v.room_code == scope.room_code
                && v.question_index == scope.question_index
                && v.voter_id == voter_id
        }))
    }

    fn subscribe_votes(&self) -> broadcast::Receiver<Vote> {
        self.vote_feed.subscribe()
    }

    async fn save_results(&self, room_code: &str, results: Vec<RoundResult>) -> GameResult<()> {
        self.results
            .write()
            .await
            .insert(room_code.to_string(), results);
        Ok(())
    }

    async fn load_results(&self, room_code: &str) -> GameResult<Vec<RoundResult>> {
        Ok(self
            .results
            .read()
            .await
            .get(room_code)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room(code: &str) -> Room {
        Room {
            code: code.to_string(),
            host_id: "host".to_string(),
            questions: vec![],
            mode: RoomMode::Live,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    #[tokio::test]
    async fn test_insert_vote_rejects_second_vote_for_same_question() {
        let backend = MemoryBackend::new();
        let scope = VoteScope::new("ABCDE", 0);

        backend
            .insert_vote(Vote::new(&scope, "p1".into(), "p2".into()))
            .await
            .unwrap();
        let result = backend
            .insert_vote(Vote::new(&scope, "p1".into(), "p3".into()))
            .await;
        assert_eq!(result, Err(GameError::AlreadyVoted));

        // Next question is a fresh ballot
        let next = VoteScope::new("ABCDE", 1);
        assert!(backend
            .insert_vote(Vote::new(&next, "p1".into(), "p3".into()))
            .await
            .is_ok());
        assert_eq!(backend.select_votes(&scope).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_insert_vote_notifies_subscribers() {
        let backend = MemoryBackend::new();
        let mut rx = backend.subscribe_votes();
        let scope = VoteScope::new("ABCDE", 0);

        backend
            .insert_vote(Vote::new(&scope, "p1".into(), "p2".into()))
            .await
            .unwrap();

        let row = rx.try_recv().unwrap();
        assert_eq!(row.voter_id, "p1");
        assert_eq!(row.scope(), scope);
    }

    #[tokio::test]
    async fn test_player_requires_existing_room() {
        let backend = MemoryBackend::new();
        let player = Player {
            id: "p1".into(),
            room_code: "NOPE1".into(),
            token: "t".into(),
            display_name: "Ann".into(),
            presence: Presence::InRoom,
            joined_at: chrono::Utc::now().to_rfc3339(),
        };
        assert_eq!(
            backend.insert_player(player.clone()).await,
            Err(GameError::RoomNotFound("NOPE1".into()))
        );

        backend.insert_room(room("NOPE1")).await.unwrap();
        backend.insert_player(player).await.unwrap();

        let updated = backend.update_presence("p1", Presence::Away).await.unwrap();
        assert_eq!(updated.presence, Presence::Away);
        assert_eq!(backend.list_players("NOPE1").await.unwrap().len(), 1);
    }
}
