//! Per-room round flow: `Voting -> Results -> Challenge -> Voting ... -> Finished`.
//!
//! The machine owns the tally and realtime subscription of the active
//! question. Moving to the next question always unsubscribes the old feed
//! before the next one is opened, and builds the new tally from scratch.

use rand::seq::IndexedRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{GameError, GameResult};
use crate::realtime::Subscription;
use crate::resolver::Outcome;
use crate::source::VoteSource;
use crate::tally::TallyCache;
use crate::types::*;

#[derive(Debug, Clone)]
pub struct PhaseSettings {
    pub auto_close: AutoClose,
    pub match_policy: MatchPolicy,
    pub max_dare_chars: usize,
}

impl Default for PhaseSettings {
    fn default() -> Self {
        Self {
            auto_close: AutoClose::Manual,
            match_policy: MatchPolicy::IdOnly,
            max_dare_chars: 280,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Challenge {
    pub winner_id: PlayerId,
    pub giver_id: PlayerId,
    #[serde(skip)]
    dare: Option<String>,
    /// Hidden from snapshots and dare views until the reveal
    #[serde(skip)]
    revealed: bool,
}

impl Challenge {
    pub fn dare_submitted(&self) -> bool {
        self.dare.is_some()
    }
}

/// What a given player may see of the dare
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DareView {
    Hidden,
    /// Challenge giver, dare not written yet
    Compose,
    /// Challenge giver, dare handed over
    Submitted,
    /// Winner, dare not written yet
    Waiting,
    Dare { text: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhaseSnapshot {
    pub phase: RoundPhase,
    pub question_index: usize,
    pub total_questions: usize,
    pub question: Option<Question>,
    pub counts: Counts,
    pub outcome: Option<Outcome>,
    pub challenge: Option<Challenge>,
}

/// Uniform pick among everyone except the winner
pub fn pick_challenge_giver<R: Rng + ?Sized>(
    roster: &[PlayerInfo],
    winner_id: &str,
    rng: &mut R,
) -> Option<PlayerId> {
    let candidates: Vec<&PlayerInfo> = roster.iter().filter(|p| p.id != winner_id).collect();
    candidates.choose(rng).map(|p| p.id.clone())
}

pub struct PhaseMachine {
    room_code: RoomCode,
    questions: Vec<Question>,
    source: Arc<dyn VoteSource>,
    settings: PhaseSettings,
    phase: RoundPhase,
    question_index: usize,
    tally: TallyCache,
    subscription: Subscription,
    outcome: Option<Outcome>,
    challenge: Option<Challenge>,
    results: Vec<RoundResult>,
}

impl PhaseMachine {
    /// Open the first question of `room`
    pub async fn start(
        room: &Room,
        roster: Vec<PlayerInfo>,
        source: Arc<dyn VoteSource>,
        settings: PhaseSettings,
    ) -> GameResult<Self> {
        let scope = VoteScope::new(room.code.clone(), 0);
        let mut machine = Self {
            room_code: room.code.clone(),
            questions: room.questions.clone(),
            tally: TallyCache::empty(scope.clone(), roster, settings.match_policy),
            subscription: Subscription::closed(scope),
            source,
            settings,
            phase: RoundPhase::Voting,
            question_index: 0,
            outcome: None,
            challenge: None,
            results: Vec::new(),
        };

        if machine.questions.is_empty() {
            machine.phase = RoundPhase::Finished;
            return Ok(machine);
        }

        machine.open_question(0).await?;
        tracing::info!(
            "Room {} started with {} questions ({} votes)",
            machine.room_code,
            machine.questions.len(),
            machine.source.name()
        );
        Ok(machine)
    }

    /// Swap subscription and tally over to question `index`. On a failed bulk
    /// load the tally stays empty but subscribed, and the error is returned.
    async fn open_question(&mut self, index: usize) -> GameResult<()> {
        self.subscription.unsubscribe();

        let scope = VoteScope::new(self.room_code.clone(), index);
        let roster = self.tally.roster().to_vec();
        self.question_index = index;
        self.subscription = self.source.subscribe(&scope);
        self.tally = TallyCache::empty(scope.clone(), roster.clone(), self.settings.match_policy);

        match TallyCache::load_initial(
            self.source.as_ref(),
            scope.clone(),
            roster,
            self.settings.match_policy,
        )
        .await
        {
            Ok(tally) => {
                self.tally = tally;
                self.sync();
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Failed to load votes for {}: {}", scope, e);
                Err(e)
            }
        }
    }

    /// Apply every pending realtime row. Returns how many were counted.
    pub fn sync(&mut self) -> usize {
        let mut counted = 0;
        for row in self.subscription.drain() {
            if let crate::tally::ApplyOutcome::Counted(_) = self.tally.apply_incoming(row) {
                counted += 1;
            }
        }
        if counted > 0 && self.phase == RoundPhase::Results {
            self.outcome = Some(Outcome::from_counts(self.tally.counts()));
        }
        counted
    }

    /// Rebuild the current question's tally from a full fetch
    pub async fn resync(&mut self) -> GameResult<()> {
        if self.phase == RoundPhase::Finished {
            return Err(GameError::InvalidTransition {
                from: self.phase,
                action: "resync",
            });
        }
        self.open_question(self.question_index).await?;
        if self.phase == RoundPhase::Results {
            self.outcome = Some(Outcome::from_counts(self.tally.counts()));
        }
        Ok(())
    }

    /// Replace the roster. Returns true if this closed voting, which happens
    /// under quorum when the last player still to vote leaves.
    pub fn set_roster(&mut self, roster: Vec<PlayerInfo>) -> bool {
        let resolved = self.tally.set_roster(roster);
        if resolved > 0 {
            tracing::debug!("{} pending votes resolved in {}", resolved, self.room_code);
        }
        match self.phase {
            RoundPhase::Results => {
                self.outcome = Some(Outcome::from_counts(self.tally.counts()));
                false
            }
            RoundPhase::Voting => self.close_on_quorum(),
            _ => false,
        }
    }

    fn require_phase(&self, expected: RoundPhase, action: &'static str) -> GameResult<()> {
        if self.phase != expected {
            return Err(GameError::InvalidTransition {
                from: self.phase,
                action,
            });
        }
        Ok(())
    }

    fn require_member(&self, player_id: &str) -> GameResult<()> {
        if self.tally.roster().iter().any(|p| p.id == player_id) {
            Ok(())
        } else {
            Err(GameError::NotARoomMember(player_id.to_string()))
        }
    }

    pub async fn cast_vote(&mut self, voter_id: &str, target_id: &str) -> GameResult<Vote> {
        self.require_phase(RoundPhase::Voting, "cast a vote")?;
        self.require_member(voter_id)?;
        self.require_member(target_id)?;

        self.sync();
        let scope = self.tally.scope().clone();
        if self.tally.has_voted(voter_id) || self.source.has_voted(&scope, voter_id).await? {
            return Err(GameError::AlreadyVoted);
        }

        let vote = self.source.cast_vote(&scope, voter_id, target_id).await?;
        self.tally.apply_incoming(vote.clone());
        self.sync();

        self.close_on_quorum();
        Ok(vote)
    }

    fn close_on_quorum(&mut self) -> bool {
        if self.settings.auto_close != AutoClose::Quorum || !self.quorum_reached() {
            return false;
        }
        tracing::info!("Everyone in {} has voted, closing voting", self.room_code);
        self.close_voting().is_ok()
    }

    /// Every player currently in the room has voted
    fn quorum_reached(&self) -> bool {
        let mut present = self
            .tally
            .roster()
            .iter()
            .filter(|p| p.presence == Presence::InRoom)
            .peekable();
        present.peek().is_some() && present.all(|p| self.tally.has_voted(&p.id))
    }

    pub fn close_voting(&mut self) -> GameResult<&Outcome> {
        self.require_phase(RoundPhase::Voting, "close voting")?;
        self.sync();

        self.phase = RoundPhase::Results;
        let outcome = Outcome::from_counts(self.tally.counts());
        tracing::info!(
            "Voting closed in {} on question {}: {:?}",
            self.room_code,
            self.question_index,
            outcome
        );
        let outcome = self.outcome.insert(outcome);
        Ok(&*outcome)
    }

    /// "Give a dare": pick who writes it
    pub fn start_challenge<R: Rng + ?Sized>(&mut self, rng: &mut R) -> GameResult<&Challenge> {
        self.require_phase(RoundPhase::Results, "start a challenge")?;

        let winner_id = self
            .outcome
            .as_ref()
            .and_then(|o| o.winner())
            .cloned()
            .ok_or(GameError::NoWinner)?;

        // Bots cannot write a dare, and nobody should wait on a player who left
        let bots = self.source.simulated_players();
        let pool: Vec<PlayerInfo> = self
            .tally
            .roster()
            .iter()
            .filter(|p| p.presence != Presence::OutOfRoom && !bots.contains(&p.id))
            .cloned()
            .collect();
        let giver_id =
            pick_challenge_giver(&pool, &winner_id, rng).ok_or(GameError::NoChallengeGiver)?;

        self.phase = RoundPhase::Challenge;
        let challenge = self.challenge.insert(Challenge {
            winner_id,
            giver_id,
            dare: None,
            revealed: false,
        });
        Ok(&*challenge)
    }

    /// Announce the challenge giver picked by `start_challenge`
    pub fn reveal_challenge(&mut self) -> GameResult<&Challenge> {
        self.require_phase(RoundPhase::Challenge, "reveal the challenge")?;
        let challenge = self
            .challenge
            .as_mut()
            .ok_or(GameError::NoChallengeGiver)?;
        challenge.revealed = true;
        Ok(&*challenge)
    }

    pub fn submit_dare(&mut self, author_id: &str, text: &str) -> GameResult<()> {
        self.require_phase(RoundPhase::Challenge, "submit a dare")?;
        let max_chars = self.settings.max_dare_chars;
        let challenge = self
            .challenge
            .as_mut()
            .ok_or(GameError::NoChallengeGiver)?;

        if challenge.giver_id != author_id {
            return Err(GameError::NotChallengeGiver);
        }
        if challenge.dare.is_some() {
            return Err(GameError::DareAlreadySubmitted);
        }

        let text = text.trim();
        if text.is_empty() {
            return Err(GameError::InvalidDare("dare cannot be empty".to_string()));
        }
        if text.chars().count() > max_chars {
            return Err(GameError::InvalidDare(format!(
                "dare is longer than {} characters",
                max_chars
            )));
        }

        challenge.dare = Some(text.to_string());
        Ok(())
    }

    pub fn dare_view(&self, viewer_id: &str) -> DareView {
        let Some(challenge) = self
            .challenge
            .as_ref()
            .filter(|c| self.phase == RoundPhase::Challenge && c.revealed)
        else {
            return DareView::Hidden;
        };

        match &challenge.dare {
            None if viewer_id == challenge.giver_id => DareView::Compose,
            None if viewer_id == challenge.winner_id => DareView::Waiting,
            Some(_) if viewer_id == challenge.giver_id => DareView::Submitted,
            Some(text) if viewer_id == challenge.winner_id => DareView::Dare { text: text.clone() },
            _ => DareView::Hidden,
        }
    }

    /// Winner marks the dare as done
    pub async fn complete_dare(&mut self, by: &str) -> GameResult<RoundPhase> {
        self.require_phase(RoundPhase::Challenge, "complete a dare")?;
        let challenge = self
            .challenge
            .as_ref()
            .ok_or(GameError::NoChallengeGiver)?;
        if challenge.winner_id != by {
            return Err(GameError::NotWinner);
        }
        if challenge.dare.is_none() {
            return Err(GameError::DareMissing);
        }
        self.advance().await
    }

    /// Move on without a dare: ties, nobody to give one, or a challenge that
    /// stalled because the giver or winner is gone
    pub async fn skip_round(&mut self) -> GameResult<RoundPhase> {
        if self.phase != RoundPhase::Challenge {
            self.require_phase(RoundPhase::Results, "skip the round")?;
        }
        self.advance().await
    }

    async fn advance(&mut self) -> GameResult<RoundPhase> {
        let result = RoundResult {
            question_index: self.question_index,
            question: self
                .current_question()
                .map(|q| q.text.clone())
                .unwrap_or_default(),
            winner_id: self.outcome.as_ref().and_then(|o| o.winner()).cloned(),
            counts: self.tally.counts().clone(),
            dare: self.challenge.as_ref().and_then(|c| c.dare.clone()),
        };
        self.results.push(result);
        self.outcome = None;
        self.challenge = None;

        let next = self.question_index + 1;
        if next >= self.questions.len() {
            self.phase = RoundPhase::Finished;
            self.subscription.unsubscribe();
            self.source
                .record_results(&self.room_code, self.results.clone())
                .await?;
            tracing::info!("Room {} finished", self.room_code);
        } else {
            self.phase = RoundPhase::Voting;
            self.open_question(next).await?;
            tracing::info!("Room {} moved to question {}", self.room_code, next);
        }

        Ok(self.phase)
    }

    pub fn room_code(&self) -> &str {
        &self.room_code
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn question_index(&self) -> usize {
        self.question_index
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.question_index)
    }

    pub fn counts(&self) -> &Counts {
        self.tally.counts()
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    /// The current challenge, once revealed
    pub fn challenge(&self) -> Option<&Challenge> {
        self.challenge.as_ref().filter(|c| c.revealed)
    }

    pub fn results(&self) -> &[RoundResult] {
        &self.results
    }

    pub fn unmapped_votes(&self) -> &[Vote] {
        self.tally.unmapped()
    }

    pub fn roster(&self) -> &[PlayerInfo] {
        self.tally.roster()
    }

    pub fn snapshot(&self) -> PhaseSnapshot {
        PhaseSnapshot {
            phase: self.phase,
            question_index: self.question_index,
            total_questions: self.questions.len(),
            question: self.current_question().cloned(),
            counts: self.tally.counts().clone(),
            outcome: self.outcome.clone(),
            challenge: self.challenge().cloned(),
        }
    }
}
