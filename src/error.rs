use thiserror::Error;

use crate::match_state::MatchPhase;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad input, rejected before anything changed.
    Validation,
    /// The action is not allowed in the current phase of the match.
    State,
    /// The state itself is impossible (corrupt snapshot, broken sums).
    Invariant,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScoringError {
    #[error("overs limit must be at least 1 (got {0})")]
    InvalidOversLimit(u32),

    #[error("invalid delivery: {reason}")]
    InvalidDelivery { reason: String },

    #[error("over {} already has six legal balls", over + 1)]
    OverSealed { over: u32 },

    #[error("cannot {action} while {phase}")]
    InvalidTransition {
        action: &'static str,
        phase: MatchPhase,
    },

    #[error("innings {0} is already complete")]
    InningsComplete(u8),

    #[error("match is already complete")]
    MatchComplete,

    #[error("nothing to undo")]
    NothingToUndo,

    #[error("result is only available once the match is complete")]
    ResultUnavailable,

    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl ScoringError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidOversLimit(_) | Self::InvalidDelivery { .. } | Self::OverSealed { .. } => {
                ErrorCategory::Validation
            }
            Self::InvalidTransition { .. }
            | Self::InningsComplete(_)
            | Self::MatchComplete
            | Self::NothingToUndo
            | Self::ResultUnavailable => ErrorCategory::State,
            Self::Invariant(_) => ErrorCategory::Invariant,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistenceError {
    #[error("match {match_id} not found")]
    NotFound { match_id: String },

    #[error("malformed {what}: {reason}")]
    Malformed { what: &'static str, reason: String },

    #[error("storage failure during {op}: {message}")]
    Storage { op: &'static str, message: String },

    /// Another writer moved the match on since this session last saw it.
    #[error("match {match_id} changed elsewhere (expected revision {expected}, found {found})")]
    Conflict {
        match_id: String,
        expected: u64,
        found: u64,
    },
}

impl PersistenceError {
    pub fn storage(op: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Storage {
            op,
            message: err.to_string(),
        }
    }

    pub fn malformed(what: &'static str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            what,
            reason: reason.into(),
        }
    }
}

/// Error surfaced by a scoring session: either the state machine refused the
/// action or the store could not take the write. Neither leaves a partial
/// change behind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Scoring(#[from] ScoringError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl SessionError {
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::Scoring(err) if err.category() == ErrorCategory::Invariant)
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence(PersistenceError::Storage { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_split_user_errors_from_invariants() {
        assert_eq!(
            ScoringError::OverSealed { over: 0 }.category(),
            ErrorCategory::Validation
        );
        assert_eq!(ScoringError::NothingToUndo.category(), ErrorCategory::State);
        let err = SessionError::from(ScoringError::Invariant("wickets > 10".into()));
        assert!(err.is_invariant_violation());
        assert!(!err.is_retryable());
    }

    #[test]
    fn storage_failures_are_retryable() {
        let err = SessionError::from(PersistenceError::storage("append delivery", "disk full"));
        assert!(err.is_retryable());
        assert_eq!(
            err.to_string(),
            "storage failure during append delivery: disk full"
        );
    }

    #[test]
    fn conflicts_are_not_retryable() {
        let err = SessionError::from(PersistenceError::Conflict {
            match_id: "m1".into(),
            expected: 3,
            found: 4,
        });
        assert!(!err.is_retryable());
        assert!(!err.is_invariant_violation());
        assert_eq!(
            err.to_string(),
            "match m1 changed elsewhere (expected revision 3, found 4)"
        );
    }
}
