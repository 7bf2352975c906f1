//! Winner resolution over a tally

use serde::{Deserialize, Serialize};

use crate::types::{Counts, PlayerId};

/// Single pass over the counts. Returns the player holding the maximum only
/// when nobody else shares it and it is above zero.
pub fn resolve_winner(counts: &Counts) -> Option<PlayerId> {
    let mut max = 0u32;
    let mut holders = 0usize;
    let mut leader: Option<&PlayerId> = None;

    for (player_id, &count) in counts {
        if count > max {
            max = count;
            holders = 1;
            leader = Some(player_id);
        } else if count == max && count > 0 {
            holders += 1;
        }
    }

    if holders == 1 {
        leader.cloned()
    } else {
        None
    }
}

/// Round outcome as shown on the results screen
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    NoVotes,
    /// Two or more players share the top count
    Tie { player_ids: Vec<PlayerId>, votes: u32 },
    Winner { player_id: PlayerId, votes: u32 },
}

impl Outcome {
    pub fn from_counts(counts: &Counts) -> Self {
        let max = counts.values().copied().max().unwrap_or(0);
        if max == 0 {
            return Outcome::NoVotes;
        }

        match resolve_winner(counts) {
            Some(player_id) => Outcome::Winner {
                player_id,
                votes: max,
            },
            None => {
                let mut player_ids: Vec<PlayerId> = counts
                    .iter()
                    .filter(|(_, &c)| c == max)
                    .map(|(id, _)| id.clone())
                    .collect();
                player_ids.sort();
                Outcome::Tie {
                    player_ids,
                    votes: max,
                }
            }
        }
    }

    pub fn winner(&self) -> Option<&PlayerId> {
        match self {
            Outcome::Winner { player_id, .. } => Some(player_id),
            _ => None,
        }
    }
}
