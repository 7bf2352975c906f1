//! Vote tally for the active question.
//!
//! Built from one bulk fetch when a question starts, then kept current by
//! applying rows from the realtime subscription one at a time. Increments are
//! commutative and de-duplicated by vote id, so arrival order and redelivery do
//! not change the result.

use std::collections::HashSet;

use crate::error::GameResult;
use crate::source::VoteSource;
use crate::types::*;

/// What applying a single row did to the tally
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    Counted(PlayerId),
    /// Row id was already applied
    Duplicate,
    /// Row belongs to another question of this room
    StaleQuestion,
    OtherRoom,
    /// Target matches no known player; kept aside, not counted
    Unmapped,
}

#[derive(Debug, Clone)]
pub struct TallyCache {
    scope: VoteScope,
    policy: MatchPolicy,
    roster: Vec<PlayerInfo>,
    counts: Counts,
    seen: HashSet<VoteId>,
    voters: HashSet<PlayerId>,
    unmapped: Vec<Vote>,
}

impl TallyCache {
    pub fn empty(scope: VoteScope, roster: Vec<PlayerInfo>, policy: MatchPolicy) -> Self {
        Self {
            scope,
            policy,
            roster,
            counts: Counts::new(),
            seen: HashSet::new(),
            voters: HashSet::new(),
            unmapped: Vec::new(),
        }
    }

    /// Fetch every row for `scope` and count it
    pub async fn load_initial(
        source: &dyn VoteSource,
        scope: VoteScope,
        roster: Vec<PlayerInfo>,
        policy: MatchPolicy,
    ) -> GameResult<Self> {
        let rows = source.fetch_votes(&scope).await?;
        let mut cache = Self::empty(scope, roster, policy);
        for row in rows {
            cache.apply_incoming(row);
        }
        tracing::debug!(
            "Loaded tally for {}: {} votes, {} unmapped",
            cache.scope,
            cache.total(),
            cache.unmapped.len()
        );
        Ok(cache)
    }

    pub fn apply_incoming(&mut self, row: Vote) -> ApplyOutcome {
        if row.room_code != self.scope.room_code {
            return ApplyOutcome::OtherRoom;
        }
        if row.question_index != self.scope.question_index {
            return ApplyOutcome::StaleQuestion;
        }
        if !self.seen.insert(row.id.clone()) {
            return ApplyOutcome::Duplicate;
        }
        self.voters.insert(row.voter_id.clone());

        match self.map_target(&row.target_id) {
            Some(player_id) => {
                *self.counts.entry(player_id.clone()).or_insert(0) += 1;
                ApplyOutcome::Counted(player_id)
            }
            None => {
                tracing::debug!(
                    "Vote {} in {} targets unknown player {}",
                    row.id,
                    self.scope,
                    row.target_id
                );
                self.unmapped.push(row);
                ApplyOutcome::Unmapped
            }
        }
    }

    /// Replace the roster and retry rows that could not be mapped before.
    /// Returns how many of them are now counted.
    pub fn set_roster(&mut self, roster: Vec<PlayerInfo>) -> usize {
        self.roster = roster;

        let pending = std::mem::take(&mut self.unmapped);
        let mut resolved = 0;
        for row in pending {
            match self.map_target(&row.target_id) {
                Some(player_id) => {
                    *self.counts.entry(player_id).or_insert(0) += 1;
                    resolved += 1;
                }
                None => self.unmapped.push(row),
            }
        }
        resolved
    }

    fn map_target(&self, target_id: &str) -> Option<PlayerId> {
        if let Some(p) = self.roster.iter().find(|p| p.id == target_id) {
            return Some(p.id.clone());
        }

        if self.policy == MatchPolicy::IdOrName {
            let needle = target_id.to_lowercase();
            let mut matches = self
                .roster
                .iter()
                .filter(|p| p.display_name.to_lowercase() == needle);
            if let (Some(p), None) = (matches.next(), matches.next()) {
                return Some(p.id.clone());
            }
        }

        None
    }

    pub fn scope(&self) -> &VoteScope {
        &self.scope
    }

    pub fn counts(&self) -> &Counts {
        &self.counts
    }

    pub fn total(&self) -> u32 {
        self.counts.values().sum()
    }

    pub fn roster(&self) -> &[PlayerInfo] {
        &self.roster
    }

    /// Rows whose target could not be resolved to a player
    pub fn unmapped(&self) -> &[Vote] {
        &self.unmapped
    }

    pub fn has_voted(&self, voter_id: &str) -> bool {
        self.voters.contains(voter_id)
    }

    pub fn voter_count(&self) -> usize {
        self.voters.len()
    }
}
