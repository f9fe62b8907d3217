use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ScoringError;

/// Most runs a batter can be credited with off one ball (an all-run four
/// plus overthrows to the boundary).
pub const MAX_RUNS_OFF_BAT: u32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeliveryKind {
    Normal,
    Wide,
    NoBall,
    Wicket,
}

/// One ball as the scorer recorded it. `runs` are the runs off the bat; the
/// one-run penalty for a wide or no-ball is added by [`Delivery::total_runs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Delivery {
    pub runs: u32,
    pub kind: DeliveryKind,
}

impl Delivery {
    pub fn normal(runs: u32) -> Self {
        Self {
            runs,
            kind: DeliveryKind::Normal,
        }
    }

    pub fn wide() -> Self {
        Self {
            runs: 0,
            kind: DeliveryKind::Wide,
        }
    }

    pub fn no_ball(runs: u32) -> Self {
        Self {
            runs,
            kind: DeliveryKind::NoBall,
        }
    }

    pub fn wicket() -> Self {
        Self {
            runs: 0,
            kind: DeliveryKind::Wicket,
        }
    }

    /// Builds a delivery from loose fields, rejecting combinations the model
    /// cannot represent.
    pub fn try_new(runs: u32, kind: DeliveryKind) -> Result<Self, ScoringError> {
        let delivery = Self { runs, kind };
        delivery.validate()?;
        Ok(delivery)
    }

    pub fn validate(&self) -> Result<(), ScoringError> {
        if self.runs > MAX_RUNS_OFF_BAT {
            return Err(ScoringError::InvalidDelivery {
                reason: format!(
                    "{} runs off one ball (at most {MAX_RUNS_OFF_BAT})",
                    self.runs
                ),
            });
        }
        match self.kind {
            DeliveryKind::Wicket if self.runs != 0 => Err(ScoringError::InvalidDelivery {
                reason: format!("a wicket carries no runs (got {})", self.runs),
            }),
            DeliveryKind::Wide if self.runs != 0 => Err(ScoringError::InvalidDelivery {
                reason: format!("a wide is worth exactly one run (got {} extra)", self.runs),
            }),
            _ => Ok(()),
        }
    }

    pub fn is_legal(&self) -> bool {
        matches!(self.kind, DeliveryKind::Normal | DeliveryKind::Wicket)
    }

    pub fn is_extra(&self) -> bool {
        !self.is_legal()
    }

    pub fn is_wicket(&self) -> bool {
        self.kind == DeliveryKind::Wicket
    }

    /// Runs credited to the batting side, extras included.
    pub fn total_runs(&self) -> u32 {
        match self.kind {
            DeliveryKind::Normal => self.runs,
            DeliveryKind::Wide => 1,
            DeliveryKind::NoBall => self.runs + 1,
            DeliveryKind::Wicket => 0,
        }
    }

    pub fn label(&self) -> String {
        match self.kind {
            DeliveryKind::Wide => "Wd".to_string(),
            DeliveryKind::NoBall => format!("Nb+{}", self.runs),
            DeliveryKind::Wicket => "W".to_string(),
            DeliveryKind::Normal => self.runs.to_string(),
        }
    }

    /// Boundaries, wickets and extras get highlighted in the ball strip.
    pub fn is_highlight(&self) -> bool {
        match self.kind {
            DeliveryKind::Normal => self.runs == 4 || self.runs == 6,
            _ => true,
        }
    }
}

impl fmt::Display for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}
