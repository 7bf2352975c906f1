use crate::types::RoundPhase;

/// Result type for game operations
pub type GameResult<T> = Result<T, GameError>;

/// Errors that can occur while running a room
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GameError {
    #[error("Room {0} not found")]
    RoomNotFound(String),

    #[error("Player not found")]
    PlayerNotFound,

    #[error("Player {0} is not a member of this room")]
    NotARoomMember(String),

    #[error("Player has already voted on this question")]
    AlreadyVoted,

    #[error("Cannot {action} during {from:?}")]
    InvalidTransition {
        from: RoundPhase,
        action: &'static str,
    },

    #[error("There is no single winner this round")]
    NoWinner,

    #[error("Nobody is left to give a dare")]
    NoChallengeGiver,

    #[error("Only the challenge giver can write the dare")]
    NotChallengeGiver,

    #[error("Only the round winner can do that")]
    NotWinner,

    #[error("The dare has already been submitted")]
    DareAlreadySubmitted,

    #[error("The dare has not been submitted yet")]
    DareMissing,

    #[error("Invalid dare: {0}")]
    InvalidDare(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Backend request failed: {0}")]
    Backend(String),
}

impl GameError {
    /// Stable error code sent to clients
    pub fn code(&self) -> &'static str {
        match self {
            GameError::RoomNotFound(_) => "ROOM_NOT_FOUND",
            GameError::PlayerNotFound => "PLAYER_NOT_FOUND",
            GameError::NotARoomMember(_) => "NOT_A_ROOM_MEMBER",
            GameError::AlreadyVoted => "ALREADY_VOTED",
            GameError::InvalidTransition { .. } => "INVALID_TRANSITION",
            GameError::NoWinner => "NO_WINNER",
            GameError::NoChallengeGiver => "NO_CHALLENGE_GIVER",
            GameError::NotChallengeGiver => "NOT_CHALLENGE_GIVER",
            GameError::NotWinner => "NOT_WINNER",
            GameError::DareAlreadySubmitted => "DARE_ALREADY_SUBMITTED",
            GameError::DareMissing => "DARE_MISSING",
            GameError::InvalidDare(_) => "INVALID_DARE",
            GameError::InvalidRequest(_) => "INVALID_REQUEST",
            GameError::Backend(_) => "BACKEND_ERROR",
        }
    }
}
