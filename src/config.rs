//! Server configuration from environment variables

use std::time::Duration;

use crate::phase::PhaseSettings;
use crate::types::{AutoClose, MatchPolicy};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    /// Questions drawn from the bank when a room is created without its own
    pub questions_per_room: usize,
    /// Pause before the challenge giver is announced
    pub challenge_reveal_delay: Duration,
    pub auto_close: AutoClose,
    pub match_policy: MatchPolicy,
    pub max_dare_chars: usize,
    /// How often live tallies are pushed to clients
    pub tally_broadcast_interval: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 6573,
            questions_per_room: 10,
            challenge_reveal_delay: Duration::from_millis(2000),
            auto_close: AutoClose::Manual,
            match_policy: MatchPolicy::IdOnly,
            max_dare_chars: 280,
            tally_broadcast_interval: Duration::from_millis(500),
        }
    }
}

/// Parse an env var, falling back to `default` when missing or malformed
pub(crate) fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!("Ignoring invalid value {:?} for {}", raw, key);
                default
            }
        },
        Err(_) => default,
    }
}

pub(crate) fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v != "0" && v.to_lowercase() != "false")
        .unwrap_or(default)
}

impl AppConfig {
    /// Load config from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let auto_close = match std::env::var("WML_AUTO_CLOSE").as_deref() {
            Ok("quorum") => AutoClose::Quorum,
            Ok("manual") | Err(_) => AutoClose::Manual,
            Ok(other) => {
                tracing::warn!("Unknown WML_AUTO_CLOSE value {:?}, using manual", other);
                AutoClose::Manual
            }
        };

        let match_policy = if env_flag("WML_NAME_FALLBACK", false) {
            MatchPolicy::IdOrName
        } else {
            MatchPolicy::IdOnly
        };

        let config = Self {
            port: env_parse("WML_PORT", defaults.port),
            questions_per_room: env_parse("WML_QUESTIONS_PER_ROOM", defaults.questions_per_room)
                .max(1),
            challenge_reveal_delay: Duration::from_millis(env_parse(
                "WML_CHALLENGE_DELAY_MS",
                defaults.challenge_reveal_delay.as_millis() as u64,
            )),
            auto_close,
            match_policy,
            max_dare_chars: env_parse("WML_MAX_DARE_CHARS", defaults.max_dare_chars),
            tally_broadcast_interval: Duration::from_millis(
                env_parse(
                    "WML_TALLY_BROADCAST_MS",
                    defaults.tally_broadcast_interval.as_millis() as u64,
                )
                .max(50),
            ),
        };

        tracing::info!(
            port = config.port,
            questions_per_room = config.questions_per_room,
            challenge_delay_ms = config.challenge_reveal_delay.as_millis() as u64,
            auto_close = ?config.auto_close,
            match_policy = ?config.match_policy,
            "Game config loaded"
        );

        config
    }

    pub fn phase_settings(&self) -> PhaseSettings {
        PhaseSettings {
            auto_close: self.auto_close,
            match_policy: self.match_policy,
            max_dare_chars: self.max_dare_chars,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const KEYS: &[&str] = &[
        "WML_PORT",
        "WML_QUESTIONS_PER_ROOM",
        "WML_CHALLENGE_DELAY_MS",
        "WML_AUTO_CLOSE",
        "WML_NAME_FALLBACK",
        "WML_MAX_DARE_CHARS",
        "WML_TALLY_BROADCAST_MS",
    ];

    fn clear_env() {
        for key in KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_without_env() {
        clear_env();
        let config = AppConfig::from_env();
        assert_eq!(config.port, 6573);
        assert_eq!(config.auto_close, AutoClose::Manual);
        assert_eq!(config.match_policy, MatchPolicy::IdOnly);
        assert_eq!(config.challenge_reveal_delay, Duration::from_secs(2));
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        std::env::set_var("WML_PORT", "8080");
        std::env::set_var("WML_AUTO_CLOSE", "quorum");
        std::env::set_var("WML_NAME_FALLBACK", "true");
        std::env::set_var("WML_CHALLENGE_DELAY_MS", "0");

        let config = AppConfig::from_env();
        assert_eq!(config.port, 8080);
        assert_eq!(config.auto_close, AutoClose::Quorum);
        assert_eq!(config.match_policy, MatchPolicy::IdOrName);
        assert_eq!(config.challenge_reveal_delay, Duration::ZERO);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_malformed_values_fall_back() {
        clear_env();
        std::env::set_var("WML_PORT", "not-a-port");
        std::env::set_var("WML_QUESTIONS_PER_ROOM", "0");

        let config = AppConfig::from_env();
        assert_eq!(config.port, 6573);
        assert_eq!(config.questions_per_room, 1);

        clear_env();
    }
}
