use crate::phase::{DareView, PhaseSnapshot};
use crate::resolver::Outcome;
use crate::types::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientMessage {
    CastVote {
        target_id: PlayerId,
        msg_id: String,
    },
    SetPresence {
        presence: Presence,
    },
    SubmitDare {
        text: String,
    },
    /// Winner marks the dare as done
    CompleteDare,
    // Host-only messages
    CloseVoting,
    /// "Give a dare": pick the challenge giver
    GiveDare,
    /// Move on from results without a dare
    SkipRound,
    /// Reload the current question's votes from the backend
    Resync,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        protocol: String,
        room_code: RoomCode,
        player: PlayerInfo,
        is_host: bool,
        snapshot: PhaseSnapshot,
        server_now: String,
    },
    Phase {
        snapshot: PhaseSnapshot,
        server_now: String,
    },
    Tally {
        question_index: usize,
        counts: Counts,
        seq: u64,
    },
    VoteAck {
        msg_id: String,
    },
    Results {
        question_index: usize,
        outcome: Outcome,
        counts: Counts,
    },
    ChallengeGiver {
        giver_id: PlayerId,
        winner_id: PlayerId,
    },
    /// Per-player view of the dare; never broadcast to the whole room
    DareView {
        view: DareView,
    },
    Roster {
        players: Vec<PlayerInfo>,
    },
    Finished {
        results: Vec<RoundResult>,
    },
    Error {
        code: String,
        msg: String,
    },
}

impl ServerMessage {
    pub fn error(err: &crate::error::GameError) -> Self {
        ServerMessage::Error {
            code: err.code().to_string(),
            msg: err.to_string(),
        }
    }
}

/// Who a room event is delivered to
#[derive(Debug, Clone, PartialEq)]
pub enum Audience {
    All,
    Player(PlayerId),
}

/// Message fanned out on a room's broadcast channel
#[derive(Debug, Clone)]
pub struct RoomEvent {
    pub to: Audience,
    pub msg: ServerMessage,
}

impl RoomEvent {
    pub fn is_for(&self, player_id: &str) -> bool {
        match &self.to {
            Audience::All => true,
            Audience::Player(id) => id == player_id,
        }
    }
}
