use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ball::Delivery;
use crate::error::ScoringError;
use crate::history::History;
use crate::innings::{ALL_OUT_WICKETS, DeliveryOutcome, Innings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchPhase {
    AwaitingStart,
    InInnings1,
    /// Paused for the innings break; only an explicit start moves on.
    Innings1Complete,
    InInnings2,
    MatchComplete,
}

impl fmt::Display for MatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::AwaitingStart => "waiting for the match to start",
            Self::InInnings1 => "innings 1 is in progress",
            Self::Innings1Complete => "at the innings break",
            Self::InInnings2 => "innings 2 is in progress",
            Self::MatchComplete => "the match is complete",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchResult {
    Team1Won { runs: u32 },
    Team2Won { wickets: u32 },
    Tied,
}

impl fmt::Display for MatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Team1Won { runs } => write!(f, "Team 1 won by {runs} runs"),
            Self::Team2Won { wickets } => write!(f, "Team 2 won by {wickets} wickets"),
            Self::Tied => f.write_str("Match tied"),
        }
    }
}

/// Full scoring state of one match. Transitions never mutate in place: each
/// `with_*` method returns the next state or the reason it was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchState {
    pub total_overs: u32,
    pub current_innings: u8,
    pub innings1: Innings,
    pub innings2: Innings,
    pub target_runs: Option<u32>,
    pub is_match_complete: bool,
}

impl Default for MatchState {
    fn default() -> Self {
        Self {
            total_overs: 0,
            current_innings: 1,
            innings1: Innings::default(),
            innings2: Innings::default(),
            target_runs: None,
            is_match_complete: false,
        }
    }
}

impl MatchState {
    pub fn start(total_overs: u32) -> Result<Self, ScoringError> {
        if total_overs < 1 {
            return Err(ScoringError::InvalidOversLimit(total_overs));
        }
        Ok(Self {
            total_overs,
            innings1: Innings::new(),
            ..Self::default()
        })
    }

    pub fn phase(&self) -> MatchPhase {
        if self.total_overs == 0 {
            MatchPhase::AwaitingStart
        } else if self.is_match_complete {
            MatchPhase::MatchComplete
        } else if self.current_innings == 2 {
            MatchPhase::InInnings2
        } else if self.innings1.is_complete {
            MatchPhase::Innings1Complete
        } else {
            MatchPhase::InInnings1
        }
    }

    pub fn innings(&self, number: u8) -> &Innings {
        if number == 2 {
            &self.innings2
        } else {
            &self.innings1
        }
    }

    fn innings_mut(&mut self, number: u8) -> &mut Innings {
        if number == 2 {
            &mut self.innings2
        } else {
            &mut self.innings1
        }
    }

    /// The innings currently at the crease (or the one that just finished).
    pub fn batting(&self) -> &Innings {
        self.innings(self.current_innings)
    }

    pub fn with_delivery(&self, delivery: Delivery) -> Result<Self, ScoringError> {
        self.apply_delivery(delivery).map(|(next, _)| next)
    }

    pub fn apply_delivery(
        &self,
        delivery: Delivery,
    ) -> Result<(Self, DeliveryOutcome), ScoringError> {
        match self.phase() {
            MatchPhase::AwaitingStart => {
                return Err(ScoringError::InvalidTransition {
                    action: "record a delivery",
                    phase: MatchPhase::AwaitingStart,
                });
            }
            MatchPhase::Innings1Complete => return Err(ScoringError::InningsComplete(1)),
            MatchPhase::MatchComplete => return Err(ScoringError::MatchComplete),
            MatchPhase::InInnings1 | MatchPhase::InInnings2 => {}
        }
        delivery.validate()?;

        let mut next = self.clone();
        let number = next.current_innings;
        let target = if number == 2 { next.target_runs } else { None };
        let overs_limit = next.total_overs;
        let outcome = next
            .innings_mut(number)
            .apply_delivery(number, delivery, overs_limit, target)?;
        if outcome.innings_end.is_some() {
            next.close_innings(number);
        }
        Ok((next, outcome))
    }

    pub fn with_second_innings_started(&self) -> Result<Self, ScoringError> {
        let phase = self.phase();
        if phase != MatchPhase::Innings1Complete {
            return Err(ScoringError::InvalidTransition {
                action: "start the second innings",
                phase,
            });
        }
        let mut next = self.clone();
        next.current_innings = 2;
        next.innings2 = Innings::new();
        Ok(next)
    }

    /// Closes innings 1 early at the scorer's request, mid-over if need be.
    pub fn with_innings_ended(&self) -> Result<Self, ScoringError> {
        let phase = self.phase();
        if phase != MatchPhase::InInnings1 {
            return Err(ScoringError::InvalidTransition {
                action: "end the innings",
                phase,
            });
        }
        let mut next = self.clone();
        next.close_innings(1);
        Ok(next)
    }

    fn close_innings(&mut self, number: u8) {
        if number == 1 {
            self.innings1.is_complete = true;
            self.target_runs = Some(self.innings1.total_runs + 1);
        } else {
            self.innings2.is_complete = true;
            self.is_match_complete = true;
        }
    }

    pub fn result(&self) -> Result<MatchResult, ScoringError> {
        if self.phase() != MatchPhase::MatchComplete {
            return Err(ScoringError::ResultUnavailable);
        }
        let first = self.innings1.total_runs;
        let second = self.innings2.total_runs;
        Ok(if second > first {
            MatchResult::Team2Won {
                wickets: ALL_OUT_WICKETS.saturating_sub(self.innings2.wickets),
            }
        } else if first > second {
            MatchResult::Team1Won {
                runs: first - second,
            }
        } else {
            MatchResult::Tied
        })
    }

    /// Checks every structural invariant. A failure means the state could
    /// not have been produced by the transitions above.
    pub fn validate(&self) -> Result<(), ScoringError> {
        if self.phase() == MatchPhase::AwaitingStart {
            if *self != Self::default() {
                return Err(ScoringError::Invariant(
                    "unstarted match carries scoring state".to_string(),
                ));
            }
            return Ok(());
        }
        if !matches!(self.current_innings, 1 | 2) {
            return Err(ScoringError::Invariant(format!(
                "current innings {}",
                self.current_innings
            )));
        }
        if !self.innings1.is_started() {
            return Err(ScoringError::Invariant("innings 1 never opened".to_string()));
        }
        self.innings1.check_invariants(1, self.total_overs)?;
        self.innings2.check_invariants(2, self.total_overs)?;

        let expected_target = self
            .innings1
            .is_complete
            .then(|| self.innings1.total_runs + 1);
        if self.target_runs != expected_target {
            return Err(ScoringError::Invariant(format!(
                "target {:?} with innings 1 on {}",
                self.target_runs, self.innings1.total_runs
            )));
        }

        let second_started = self.innings2.is_started();
        if self.current_innings == 2 && (!self.innings1.is_complete || !second_started) {
            return Err(ScoringError::Invariant(
                "innings 2 active before innings 1 closed".to_string(),
            ));
        }
        if self.current_innings == 1 && second_started {
            return Err(ScoringError::Invariant(
                "innings 2 has balls while innings 1 is active".to_string(),
            ));
        }
        if self.is_match_complete != self.innings2.is_complete {
            return Err(ScoringError::Invariant(
                "match completion disagrees with innings 2".to_string(),
            ));
        }
        if let Some(target) = self.target_runs
            && second_started
            && self.innings2.total_runs >= target
            && !self.innings2.is_complete
        {
            return Err(ScoringError::Invariant(
                "target reached but chase still open".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Deliver(Delivery),
    StartSecondInnings,
    EndInnings,
    Undo,
}

/// A computed but uncommitted transition. It only commits against the
/// machine generation it was prepared from.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedChange {
    pub action: Action,
    pub before: MatchState,
    pub after: MatchState,
    pub outcome: Option<DeliveryOutcome>,
    generation: u64,
}

/// The match state machine: the live state plus its undo history. Every
/// committed action snapshots the prior state first, so undo works no matter
/// how the caller drives it.
#[derive(Debug, Clone, Default)]
pub struct ScoringMachine {
    state: MatchState,
    history: History,
    generation: u64,
}

impl ScoringMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resumes from a stored state. History starts empty.
    pub fn from_state(state: MatchState) -> Result<Self, ScoringError> {
        state.validate()?;
        Ok(Self {
            state,
            history: History::new(),
            generation: 0,
        })
    }

    pub fn state(&self) -> &MatchState {
        &self.state
    }

    pub fn phase(&self) -> MatchPhase {
        self.state.phase()
    }

    pub fn history_depth(&self) -> usize {
        self.history.len()
    }

    pub fn can_undo(&self) -> bool {
        !self.history.is_empty()
    }

    pub fn start_match(&mut self, total_overs: u32) -> Result<&MatchState, ScoringError> {
        let state = MatchState::start(total_overs)?;
        self.history.clear();
        self.state = state;
        self.generation += 1;
        Ok(&self.state)
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.state = MatchState::default();
        self.generation += 1;
    }

    pub fn prepare(&self, action: Action) -> Result<PreparedChange, ScoringError> {
        let (after, outcome) = match action {
            Action::Deliver(delivery) => {
                let (next, outcome) = self.state.apply_delivery(delivery)?;
                (next, Some(outcome))
            }
            Action::StartSecondInnings => (self.state.with_second_innings_started()?, None),
            Action::EndInnings => (self.state.with_innings_ended()?, None),
            Action::Undo => {
                let restored = self.history.peek().ok_or(ScoringError::NothingToUndo)?;
                (restored.clone(), None)
            }
        };
        Ok(PreparedChange {
            action,
            before: self.state.clone(),
            after,
            outcome,
            generation: self.generation,
        })
    }

    pub fn commit(&mut self, change: PreparedChange) -> Result<&MatchState, ScoringError> {
        if change.generation != self.generation {
            return Err(ScoringError::Invariant(
                "change was prepared against an older state".to_string(),
            ));
        }
        if change.action == Action::Undo {
            self.history.restore();
        } else {
            self.history.snapshot(&self.state);
        }
        self.state = change.after;
        self.generation += 1;
        Ok(&self.state)
    }

    pub fn apply(&mut self, action: Action) -> Result<&MatchState, ScoringError> {
        let change = self.prepare(action)?;
        self.commit(change)
    }

    pub fn record_delivery(&mut self, delivery: Delivery) -> Result<&MatchState, ScoringError> {
        self.apply(Action::Deliver(delivery))
    }

    pub fn record_runs(&mut self, runs: u32) -> Result<&MatchState, ScoringError> {
        self.record_delivery(Delivery::normal(runs))
    }

    pub fn record_wide(&mut self) -> Result<&MatchState, ScoringError> {
        self.record_delivery(Delivery::wide())
    }

    pub fn record_no_ball(&mut self, runs: u32) -> Result<&MatchState, ScoringError> {
        self.record_delivery(Delivery::no_ball(runs))
    }

    pub fn record_wicket(&mut self) -> Result<&MatchState, ScoringError> {
        self.record_delivery(Delivery::wicket())
    }

    pub fn start_second_innings(&mut self) -> Result<&MatchState, ScoringError> {
        self.apply(Action::StartSecondInnings)
    }

    pub fn end_innings(&mut self) -> Result<&MatchState, ScoringError> {
        self.apply(Action::EndInnings)
    }

    pub fn undo(&mut self) -> Result<&MatchState, ScoringError> {
        self.apply(Action::Undo)
    }

    pub fn result(&self) -> Result<MatchResult, ScoringError> {
        self.state.result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_overs_is_rejected() {
        assert_eq!(
            MatchState::start(0).unwrap_err(),
            ScoringError::InvalidOversLimit(0)
        );
    }

    #[test]
    fn phases_follow_the_match() {
        let mut machine = ScoringMachine::new();
        assert_eq!(machine.phase(), MatchPhase::AwaitingStart);
        machine.start_match(1).unwrap();
        assert_eq!(machine.phase(), MatchPhase::InInnings1);
        for _ in 0..6 {
            machine.record_runs(1).unwrap();
        }
        assert_eq!(machine.phase(), MatchPhase::Innings1Complete);
        assert_eq!(machine.state().target_runs, Some(7));
        machine.start_second_innings().unwrap();
        assert_eq!(machine.phase(), MatchPhase::InInnings2);
        machine.record_runs(6).unwrap();
        machine.record_runs(1).unwrap();
        assert_eq!(machine.phase(), MatchPhase::MatchComplete);
        assert_eq!(
            machine.result().unwrap(),
            MatchResult::Team2Won { wickets: 10 }
        );
    }

    #[test]
    fn innings_break_is_not_skipped() {
        let mut machine = ScoringMachine::new();
        machine.start_match(1).unwrap();
        machine.end_innings().unwrap();
        let err = machine.record_runs(1).unwrap_err();
        assert_eq!(err, ScoringError::InningsComplete(1));
    }

    #[test]
    fn second_innings_only_from_the_break() {
        let mut machine = ScoringMachine::new();
        machine.start_match(3).unwrap();
        let err = machine.start_second_innings().unwrap_err();
        assert_eq!(
            err,
            ScoringError::InvalidTransition {
                action: "start the second innings",
                phase: MatchPhase::InInnings1,
            }
        );
        assert_eq!(machine.history_depth(), 0);
    }

    #[test]
    fn manual_end_sets_target_mid_over() {
        let mut machine = ScoringMachine::new();
        machine.start_match(5).unwrap();
        machine.record_runs(4).unwrap();
        machine.record_no_ball(1).unwrap();
        machine.end_innings().unwrap();
        assert_eq!(machine.state().target_runs, Some(7));
        assert_eq!(machine.state().innings1.current_ball, 1);
        machine.state().validate().unwrap();
    }

    #[test]
    fn stale_prepared_change_is_refused() {
        let mut machine = ScoringMachine::new();
        machine.start_match(2).unwrap();
        let stale = machine.prepare(Action::Deliver(Delivery::normal(2))).unwrap();
        machine.record_runs(1).unwrap();
        let err = machine.commit(stale).unwrap_err();
        assert!(matches!(err, ScoringError::Invariant(_)));
        assert_eq!(machine.state().innings1.total_runs, 1);
    }

    #[test]
    fn result_waits_for_completion() {
        let machine = ScoringMachine::new();
        assert_eq!(
            machine.result().unwrap_err(),
            ScoringError::ResultUnavailable
        );
    }

    #[test]
    fn team_one_wins_by_runs() {
        let mut machine = ScoringMachine::new();
        machine.start_match(1).unwrap();
        for _ in 0..6 {
            machine.record_runs(2).unwrap();
        }
        machine.start_second_innings().unwrap();
        for _ in 0..6 {
            machine.record_runs(1).unwrap();
        }
        let result = machine.result().unwrap();
        assert_eq!(result, MatchResult::Team1Won { runs: 6 });
        assert_eq!(result.to_string(), "Team 1 won by 6 runs");
    }

    #[test]
    fn validate_flags_impossible_wickets() {
        let mut state = MatchState::start(2).unwrap();
        state.innings1.wickets = 11;
        assert!(matches!(
            state.validate().unwrap_err(),
            ScoringError::Invariant(_)
        ));
    }
}
