//! Persistence contract for rooms, players and votes.
//!
//! The game only talks to storage through [`Backend`]. It mirrors what a hosted
//! row store offers: filtered queries, single-row inserts and a feed of insert
//! notifications. [`MemoryBackend`] keeps everything in process.

mod memory;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::GameResult;
use crate::types::*;

pub use memory::MemoryBackend;

#[async_trait]
pub trait Backend: Send + Sync {
    async fn insert_room(&self, room: Room) -> GameResult<()>;

    async fn get_room(&self, code: &str) -> GameResult<Option<Room>>;

    async fn insert_player(&self, player: Player) -> GameResult<()>;

    /// All players of a room, in join order
    async fn list_players(&self, room_code: &str) -> GameResult<Vec<Player>>;

    async fn find_player_by_token(&self, token: &str) -> GameResult<Option<Player>>;

    async fn update_presence(&self, player_id: &str, presence: Presence) -> GameResult<Player>;

    /// Append a vote row. Fails with `AlreadyVoted` if the voter already has a
    /// row for the same scope.
    async fn insert_vote(&self, vote: Vote) -> GameResult<()>;

    async fn select_votes(&self, scope: &VoteScope) -> GameResult<Vec<Vote>>;

    async fn has_voted(&self, scope: &VoteScope, voter_id: &str) -> GameResult<bool>;

    /// Receiver for every vote inserted from now on, across all rooms
    fn subscribe_votes(&self) -> broadcast::Receiver<Vote>;

    async fn save_results(&self, room_code: &str, results: Vec<RoundResult>) -> GameResult<()>;

    async fn load_results(&self, room_code: &str) -> GameResult<Vec<RoundResult>>;
}
