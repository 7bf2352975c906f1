//! Where votes come from.
//!
//! The phase machine only sees [`VoteSource`]. Live rooms use
//! [`BackedVoteSource`]; practice rooms use [`SimulatedVoteSource`], which
//! fills in the bots' ballots as soon as a real player votes.

use async_trait::async_trait;
use rand::seq::IndexedRandom;
use std::sync::Arc;

use crate::error::GameResult;
use crate::realtime::Subscription;
use crate::store::Backend;
use crate::types::*;

#[async_trait]
pub trait VoteSource: Send + Sync {
    /// Name of this source for logging
    fn name(&self) -> &str;

    async fn fetch_votes(&self, scope: &VoteScope) -> GameResult<Vec<Vote>>;

    async fn has_voted(&self, scope: &VoteScope, voter_id: &str) -> GameResult<bool>;

    /// Insert one vote row and return it
    async fn cast_vote(
        &self,
        scope: &VoteScope,
        voter_id: &str,
        target_id: &str,
    ) -> GameResult<Vote>;

    /// Open a realtime subscription for rows inserted from now on
    fn subscribe(&self, scope: &VoteScope) -> Subscription;

    async fn record_results(&self, room_code: &str, results: Vec<RoundResult>) -> GameResult<()>;

    /// Players whose ballots this source casts itself. They never act on
    /// their own, so they cannot be handed a dare to write.
    fn simulated_players(&self) -> &[PlayerId] {
        &[]
    }
}

pub struct BackedVoteSource {
    backend: Arc<dyn Backend>,
}

impl BackedVoteSource {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl VoteSource for BackedVoteSource {
    fn name(&self) -> &str {
        "backend"
    }

    async fn fetch_votes(&self, scope: &VoteScope) -> GameResult<Vec<Vote>> {
        self.backend.select_votes(scope).await
    }

    async fn has_voted(&self, scope: &VoteScope, voter_id: &str) -> GameResult<bool> {
        self.backend.has_voted(scope, voter_id).await
    }

    async fn cast_vote(
        &self,
        scope: &VoteScope,
        voter_id: &str,
        target_id: &str,
    ) -> GameResult<Vote> {
        let vote = Vote::new(scope, voter_id.to_string(), target_id.to_string());
        self.backend.insert_vote(vote.clone()).await?;
        tracing::debug!("Vote {} recorded in {}", vote.id, scope);
        Ok(vote)
    }

    fn subscribe(&self, scope: &VoteScope) -> Subscription {
        Subscription::new(scope.clone(), self.backend.subscribe_votes())
    }

    async fn record_results(&self, room_code: &str, results: Vec<RoundResult>) -> GameResult<()> {
        self.backend.save_results(room_code, results).await
    }
}

/// Practice source: rows still go through the backend, but every bot casts a
/// random ballot right after a human votes.
pub struct SimulatedVoteSource {
    inner: BackedVoteSource,
    bots: Vec<PlayerId>,
    candidates: Vec<PlayerId>,
}

impl SimulatedVoteSource {
    /// `candidates` are everybody who can be voted for, bots included
    pub fn new(backend: Arc<dyn Backend>, bots: Vec<PlayerId>, candidates: Vec<PlayerId>) -> Self {
        Self {
            inner: BackedVoteSource::new(backend),
            bots,
            candidates,
        }
    }

    /// One random ballot per bot, never for itself
    fn bot_ballots(&self) -> Vec<(PlayerId, PlayerId)> {
        let mut rng = rand::rng();
        self.bots
            .iter()
            .filter_map(|bot| {
                let others: Vec<&PlayerId> =
                    self.candidates.iter().filter(|c| *c != bot).collect();
                others
                    .choose(&mut rng)
                    .map(|target| (bot.clone(), (*target).clone()))
            })
            .collect()
    }
}

#[async_trait]
impl VoteSource for SimulatedVoteSource {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn fetch_votes(&self, scope: &VoteScope) -> GameResult<Vec<Vote>> {
        self.inner.fetch_votes(scope).await
    }

    async fn has_voted(&self, scope: &VoteScope, voter_id: &str) -> GameResult<bool> {
        self.inner.has_voted(scope, voter_id).await
    }

    async fn cast_vote(
        &self,
        scope: &VoteScope,
        voter_id: &str,
        target_id: &str,
    ) -> GameResult<Vote> {
        let vote = self.inner.cast_vote(scope, voter_id, target_id).await?;

        for (bot, target) in self.bot_ballots() {
            if self.inner.has_voted(scope, &bot).await? {
                continue;
            }
            self.inner.cast_vote(scope, &bot, &target).await?;
        }

        Ok(vote)
    }

    fn subscribe(&self, scope: &VoteScope) -> Subscription {
        self.inner.subscribe(scope)
    }

    fn simulated_players(&self) -> &[PlayerId] {
        &self.bots
    }

    async fn record_results(&self, room_code: &str, results: Vec<RoundResult>) -> GameResult<()> {
        self.inner.record_results(room_code, results).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBackend;

    #[tokio::test]
    async fn test_backed_source_round_trip_through_subscription() {
        let source = BackedVoteSource::new(Arc::new(MemoryBackend::new()));
        let scope = VoteScope::new("ROOM1", 0);
        let mut sub = source.subscribe(&scope);

        let vote = source.cast_vote(&scope, "a", "b").await.unwrap();

        assert!(source.has_voted(&scope, "a").await.unwrap());
        assert!(!source.has_voted(&scope, "b").await.unwrap());
        assert_eq!(sub.drain(), vec![vote]);
    }

    #[tokio::test]
    async fn test_simulated_source_fills_in_bot_votes() {
        let source = SimulatedVoteSource::new(
            Arc::new(MemoryBackend::new()),
            vec!["bot1".into(), "bot2".into(), "bot3".into()],
            vec!["me".into(), "bot1".into(), "bot2".into(), "bot3".into()],
        );
        let scope = VoteScope::new("PRACT", 0);

        source.cast_vote(&scope, "me", "bot2").await.unwrap();

        let rows = source.fetch_votes(&scope).await.unwrap();
        assert_eq!(rows.len(), 4);
        for row in &rows {
            assert_ne!(row.voter_id, row.target_id, "bots never vote for themselves");
        }
        for bot in ["bot1", "bot2", "bot3"] {
            assert!(source.has_voted(&scope, bot).await.unwrap());
        }
    }
}
