//! Scoped view over the backend's vote insert feed.
//!
//! A [`Subscription`] only yields rows for the (room, question) it was opened
//! for. Delivery is at-least-once per receiver in arrival order; a receiver
//! that lags behind the channel capacity loses rows, which the tally only
//! recovers on the next bulk load.

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

use crate::types::{Vote, VoteScope};

pub struct Subscription {
    scope: VoteScope,
    rx: Option<broadcast::Receiver<Vote>>,
}

impl Subscription {
    pub fn new(scope: VoteScope, rx: broadcast::Receiver<Vote>) -> Self {
        tracing::debug!("Subscribed to votes for {}", scope);
        Self {
            scope,
            rx: Some(rx),
        }
    }

    /// A subscription that never delivers anything
    pub fn closed(scope: VoteScope) -> Self {
        Self { scope, rx: None }
    }

    pub fn scope(&self) -> &VoteScope {
        &self.scope
    }

    pub fn is_active(&self) -> bool {
        self.rx.is_some()
    }

    /// Stop delivery. Safe to call any number of times.
    pub fn unsubscribe(&mut self) {
        if self.rx.take().is_some() {
            tracing::debug!("Unsubscribed from votes for {}", self.scope);
        }
    }

    /// Collect every pending in-scope row without waiting
    pub fn drain(&mut self) -> Vec<Vote> {
        let mut rows = Vec::new();
        let Some(rx) = self.rx.as_mut() else {
            return rows;
        };

        loop {
            match rx.try_recv() {
                Ok(vote) => {
                    if vote.room_code == self.scope.room_code
                        && vote.question_index == self.scope.question_index
                    {
                        rows.push(vote);
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        "Vote subscription for {} lagged, {} rows skipped",
                        self.scope,
                        skipped
                    );
                }
                Err(TryRecvError::Closed) => {
                    tracing::warn!("Vote feed closed for {}", self.scope);
                    self.rx = None;
                    break;
                }
            }
        }

        rows
    }

    /// Wait for the next in-scope row. Returns `None` once unsubscribed or
    /// when the feed closes.
    pub async fn recv(&mut self) -> Option<Vote> {
        loop {
            let rx = self.rx.as_mut()?;
            match rx.recv().await {
                Ok(vote) => {
                    if vote.room_code == self.scope.room_code
                        && vote.question_index == self.scope.question_index
                    {
                        return Some(vote);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        "Vote subscription for {} lagged, {} rows skipped",
                        self.scope,
                        skipped
                    );
                }
                Err(RecvError::Closed) => {
                    self.rx = None;
                    return None;
                }
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
