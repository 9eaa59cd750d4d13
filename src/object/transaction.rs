//! Per-request transaction bookkeeping for SET processing.

use std::fmt;

use crate::error::TransactionError;

/// SET phase as seen by one managed object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Prepare,
    Commit,
    Rollback,
    Cleanup,
}

impl Phase {
    pub fn can_transition_to(self, next: Phase) -> bool {
        matches!(
            (self, next),
            (Phase::Prepare, Phase::Prepare | Phase::Commit | Phase::Rollback)
                | (Phase::Commit, Phase::Commit | Phase::Cleanup)
                | (Phase::Rollback, Phase::Rollback | Phase::Cleanup)
                | (Phase::Cleanup, Phase::Cleanup)
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Prepare => write!(f, "prepare"),
            Phase::Commit => write!(f, "commit"),
            Phase::Rollback => write!(f, "rollback"),
            Phase::Cleanup => write!(f, "cleanup"),
        }
    }
}

/// Phase and counters for one transaction id.
///
/// Every sub-request (one per varbind) advances the context once; the
/// counters record how many reached each terminal phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionContext {
    id: u64,
    phase: Phase,
    commits: u32,
    rollbacks: u32,
    cleanups: u32,
}

impl TransactionContext {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            phase: Phase::Prepare,
            commits: 0,
            rollbacks: 0,
            cleanups: 0,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn advance(&mut self, next: Phase) -> Result<(), TransactionError> {
        if !self.phase.can_transition_to(next) {
            return Err(TransactionError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        match next {
            Phase::Prepare => {}
            Phase::Commit => self.commits += 1,
            Phase::Rollback => self.rollbacks += 1,
            Phase::Cleanup => self.cleanups += 1,
        }
        self.phase = next;
        Ok(())
    }

    /// Every committed sub-request has been cleaned up and nothing rolled back.
    pub fn is_successful(&self) -> bool {
        self.rollbacks == 0 && self.commits > 0 && self.cleanups >= self.commits
    }

    /// Every rolled back sub-request has been cleaned up.
    pub fn is_rolled_back(&self) -> bool {
        self.rollbacks > 0 && self.cleanups >= self.rollbacks
    }
}
