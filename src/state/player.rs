use super::AppState;
use crate::error::{GameError, GameResult};
use crate::types::*;
use rand::Rng;

const TOKEN_CHARS: &[u8] = b"abcdefghijkmnpqrstuvwxyz23456789";
const TOKEN_LENGTH: usize = 24;
const MAX_NAME_CHARS: usize = 32;

fn generate_token() -> String {
    let mut rng = rand::rng();
    (0..TOKEN_LENGTH)
        .map(|_| TOKEN_CHARS[rng.random_range(0..TOKEN_CHARS.len())] as char)
        .collect()
}

/// Friendly name for players who did not pick one
fn generate_display_name() -> String {
    petname::petname(2, " ").unwrap_or_else(|| {
        let n: u16 = rand::rng().random_range(1000..10000);
        format!("Guest {}", n)
    })
}

fn clean_display_name(name: Option<String>) -> String {
    match name {
        Some(n) if !n.trim().is_empty() => n.trim().chars().take(MAX_NAME_CHARS).collect(),
        _ => generate_display_name(),
    }
}

impl AppState {
    /// Build (but do not store) a player for `room_code`
    pub(super) fn new_player(&self, room_code: &str, display_name: Option<String>) -> Player {
        Player {
            id: ulid::Ulid::new().to_string(),
            room_code: room_code.to_string(),
            token: generate_token(),
            display_name: clean_display_name(display_name),
            presence: Presence::InRoom,
            joined_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Resolve a join token to a player of the given room
    pub async fn authenticate(&self, code: &str, token: &str) -> GameResult<Player> {
        let player = self
            .backend
            .find_player_by_token(token)
            .await?
            .ok_or(GameError::PlayerNotFound)?;

        if !player.room_code.eq_ignore_ascii_case(code) {
            return Err(GameError::NotARoomMember(player.id));
        }
        Ok(player)
    }

    pub async fn set_presence(&self, player: &Player, presence: Presence) -> GameResult<Player> {
        let updated = self.backend.update_presence(&player.id, presence).await?;
        if let Some(session) = self.get_session(&player.room_code).await {
            self.refresh_roster(&session).await?;
        }
        tracing::debug!("Player {} is now {:?}", player.id, presence);
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_is_trimmed_and_capped() {
        assert_eq!(clean_display_name(Some("  Ann  ".into())), "Ann");
        assert_eq!(
            clean_display_name(Some("x".repeat(100))).chars().count(),
            MAX_NAME_CHARS
        );
        assert!(!clean_display_name(Some("   ".into())).trim().is_empty());
        assert!(!clean_display_name(None).is_empty());
    }

    #[test]
    fn test_tokens_are_unique_enough() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), TOKEN_LENGTH);
        assert_ne!(a, b);
    }
}
