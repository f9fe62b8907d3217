use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ball::Delivery;
use crate::error::ScoringError;
use crate::over::{BALLS_PER_OVER, Over};

pub const ALL_OUT_WICKETS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InningsEnd {
    AllOut,
    OversExhausted,
    TargetReached,
}

impl fmt::Display for InningsEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllOut => f.write_str("all out"),
            Self::OversExhausted => f.write_str("overs complete"),
            Self::TargetReached => f.write_str("target reached"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub over_sealed: bool,
    pub over_advanced: bool,
    pub innings_end: Option<InningsEnd>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RequiredRate {
    /// Nothing left to chase.
    Achieved,
    PerOver(f64),
    /// Runs still needed with no balls left; only reachable through a
    /// contradictory state.
    NotApplicable,
}

impl fmt::Display for RequiredRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Achieved => f.write_str("0.00"),
            Self::PerOver(rate) => write!(f, "{rate:.2}"),
            Self::NotApplicable => f.write_str("N/A"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Innings {
    pub overs: Vec<Over>,
    pub total_runs: u32,
    pub wickets: u32,
    pub current_over: u32,
    pub current_ball: u32,
    pub is_complete: bool,
}

impl Innings {
    /// An innings ready for its first ball: over 0 open, counters at zero.
    pub fn new() -> Self {
        Self {
            overs: vec![Over::new()],
            ..Self::default()
        }
    }

    pub fn is_started(&self) -> bool {
        !self.overs.is_empty()
    }

    pub fn current(&self) -> Option<&Over> {
        self.overs.get(self.current_over as usize)
    }

    /// Overs already bowled out; the over in progress is excluded.
    pub fn completed_overs(&self) -> &[Over] {
        let end = (self.current_over as usize).min(self.overs.len());
        &self.overs[..end]
    }

    pub fn apply_delivery(
        &mut self,
        number: u8,
        delivery: Delivery,
        overs_limit: u32,
        target: Option<u32>,
    ) -> Result<DeliveryOutcome, ScoringError> {
        if self.is_complete {
            return Err(ScoringError::InningsComplete(number));
        }

        // Open the current over if the list has not caught up with it.
        let idx = self.current_over as usize;
        while self.overs.len() <= idx {
            self.overs.push(Over::new());
        }

        let over_sealed = self.overs[idx].apply_delivery(self.current_over, delivery)?;
        if delivery.is_legal() {
            self.current_ball += 1;
        }
        self.total_runs += delivery.total_runs();
        if delivery.is_wicket() {
            self.wickets += 1;
        }

        let mut outcome = DeliveryOutcome {
            over_sealed,
            over_advanced: false,
            innings_end: None,
        };

        // A successful chase ends the innings on the spot, even mid-over.
        if target.is_some_and(|t| self.total_runs >= t) {
            self.is_complete = true;
            outcome.innings_end = Some(InningsEnd::TargetReached);
        } else if self.wickets >= ALL_OUT_WICKETS {
            self.is_complete = true;
            outcome.innings_end = Some(InningsEnd::AllOut);
        } else if over_sealed {
            if self.current_over + 1 < overs_limit {
                self.current_over += 1;
                self.current_ball = 0;
                self.overs.push(Over::new());
                outcome.over_advanced = true;
            } else {
                self.is_complete = true;
                outcome.innings_end = Some(InningsEnd::OversExhausted);
            }
        }

        Ok(outcome)
    }

    pub fn balls_bowled(&self) -> u32 {
        self.current_over * BALLS_PER_OVER + self.current_ball
    }

    pub fn overs_display(&self) -> String {
        format_overs(self.current_over, self.current_ball)
    }

    pub fn run_rate(&self) -> f64 {
        let overs = f64::from(self.current_over) + f64::from(self.current_ball) / 6.0;
        if overs == 0.0 {
            return 0.0;
        }
        f64::from(self.total_runs) / overs
    }

    pub fn run_rate_display(&self) -> String {
        format_rate(self.run_rate())
    }

    pub fn runs_required(&self, target: u32) -> u32 {
        target.saturating_sub(self.total_runs)
    }

    pub fn balls_remaining(&self, overs_limit: u32) -> u32 {
        (overs_limit * BALLS_PER_OVER).saturating_sub(self.balls_bowled())
    }

    pub fn required_run_rate(&self, target: u32, overs_limit: u32) -> RequiredRate {
        let needed = self.runs_required(target);
        if needed == 0 {
            return RequiredRate::Achieved;
        }
        let balls = self.balls_remaining(overs_limit);
        if balls == 0 {
            return RequiredRate::NotApplicable;
        }
        RequiredRate::PerOver(f64::from(needed) / f64::from(balls) * 6.0)
    }

    pub fn check_invariants(&self, number: u8, overs_limit: u32) -> Result<(), ScoringError> {
        let fail = |msg: String| Err(ScoringError::Invariant(format!("innings {number}: {msg}")));

        if !self.is_started() {
            if self.total_runs != 0 || self.wickets != 0 || self.current_over != 0 {
                return fail("has aggregates but no overs".to_string());
            }
            if self.current_ball != 0 || self.is_complete {
                return fail("not started but marked in progress".to_string());
            }
            return Ok(());
        }

        if self.wickets > ALL_OUT_WICKETS {
            return fail(format!("{} wickets", self.wickets));
        }
        if self.wickets == ALL_OUT_WICKETS && !self.is_complete {
            return fail("all out but still open".to_string());
        }
        if self.current_over >= overs_limit {
            return fail(format!(
                "current over {} beyond limit {overs_limit}",
                self.current_over
            ));
        }
        if self.overs.len() != self.current_over as usize + 1 {
            return fail(format!(
                "{} overs stored for current over {}",
                self.overs.len(),
                self.current_over
            ));
        }

        let runs: u32 = self.overs.iter().map(|o| o.total_runs).sum();
        let wickets: u32 = self.overs.iter().map(|o| o.wickets).sum();
        if runs != self.total_runs {
            return fail(format!("total {} but overs sum to {runs}", self.total_runs));
        }
        if wickets != self.wickets {
            return fail(format!(
                "{} wickets but overs sum to {wickets}",
                self.wickets
            ));
        }

        for (idx, over) in self.overs.iter().enumerate() {
            if over.legal_balls > BALLS_PER_OVER {
                return fail(format!("over {idx} has {} legal balls", over.legal_balls));
            }
            if !over.is_consistent() {
                return fail(format!("over {idx} totals disagree with its balls"));
            }
            if idx < self.current_over as usize && !over.is_sealed() {
                return fail(format!("over {idx} closed before six legal balls"));
            }
        }

        if let Some(current) = self.current()
            && current.legal_balls != self.current_ball
        {
            return fail(format!(
                "current ball {} but over has {} legal balls",
                self.current_ball, current.legal_balls
            ));
        }
        if self.current_ball >= BALLS_PER_OVER && !self.is_complete {
            return fail("sealed over left open".to_string());
        }
        Ok(())
    }
}

/// `3.2` while an over is in progress, `4` once the fourth over is sealed.
pub fn format_overs(over: u32, ball: u32) -> String {
    if ball >= BALLS_PER_OVER {
        (over + 1).to_string()
    } else {
        format!("{over}.{ball}")
    }
}

pub fn format_rate(rate: f64) -> String {
    format!("{rate:.2}")
}
