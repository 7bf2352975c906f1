use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Opaque ID types
pub type RoomCode = String;
pub type PlayerId = String;
pub type VoteId = String;

/// Vote counts per target player for one (room, question) pair
pub type Counts = HashMap<PlayerId, u32>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    InRoom,
    OutOfRoom,
    Away,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub room_code: RoomCode,
    /// Secret join token, only ever returned to the player it belongs to
    pub token: String,
    pub display_name: String,
    pub presence: Presence,
    pub joined_at: String,
}

/// Player as seen by other participants (no token)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerInfo {
    pub id: PlayerId,
    pub display_name: String,
    pub presence: Presence,
}

impl From<&Player> for PlayerInfo {
    fn from(p: &Player) -> Self {
        Self {
            id: p.id.clone(),
            display_name: p.display_name.clone(),
            presence: p.presence,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Question {
    pub index: usize,
    pub text: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RoomMode {
    /// Votes come from real players through the backend
    Live,
    /// Votes of the other players are simulated
    Practice,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub code: RoomCode,
    pub host_id: PlayerId,
    pub questions: Vec<Question>,
    pub mode: RoomMode,
    pub created_at: String,
}

/// The (room, question index) pair a tally or subscription is bound to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoteScope {
    pub room_code: RoomCode,
    pub question_index: usize,
}

impl VoteScope {
    pub fn new(room_code: impl Into<RoomCode>, question_index: usize) -> Self {
        Self {
            room_code: room_code.into(),
            question_index,
        }
    }
}

impl fmt::Display for VoteScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.room_code, self.question_index)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vote {
    pub id: VoteId,
    pub room_code: RoomCode,
    pub question_index: usize,
    pub voter_id: PlayerId,
    pub target_id: PlayerId,
    pub ts: String,
}

impl Vote {
    pub fn new(scope: &VoteScope, voter_id: PlayerId, target_id: PlayerId) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            room_code: scope.room_code.clone(),
            question_index: scope.question_index,
            voter_id,
            target_id,
            ts: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn scope(&self) -> VoteScope {
        VoteScope::new(self.room_code.clone(), self.question_index)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundPhase {
    Voting,
    Results,
    Challenge,
    Finished,
}

/// What happened in one question, persisted when the room finishes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoundResult {
    pub question_index: usize,
    pub question: String,
    pub winner_id: Option<PlayerId>,
    pub counts: Counts,
    /// Only ever shown to that round's winner
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dare: Option<String>,
}

impl RoundResult {
    /// Copy as `viewer` may see it. Anonymous viewers never get the dare.
    pub fn visible_to(&self, viewer_id: Option<&str>) -> RoundResult {
        let is_winner = viewer_id.is_some() && viewer_id == self.winner_id.as_deref();
        RoundResult {
            dare: self.dare.clone().filter(|_| is_winner),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AutoClose {
    /// Results are shown when the host advances
    Manual,
    /// Voting closes by itself once every in-room player has voted
    Quorum,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Vote targets must match a player id exactly
    IdOnly,
    /// Fall back to a case-insensitive, unambiguous display name match
    IdOrName,
}
