use serde::{Deserialize, Serialize};

use crate::ball::Delivery;
use crate::error::{PersistenceError, ScoringError};
use crate::innings::Innings;
use crate::match_state::MatchState;
use crate::over::Over;

pub type MatchId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InningsAggregates {
    pub innings: u8,
    pub total_runs: u32,
    pub wickets: u32,
    pub current_over: u32,
    pub current_ball: u32,
    pub is_complete: bool,
}

impl InningsAggregates {
    pub fn of(number: u8, innings: &Innings) -> Self {
        Self {
            innings: number,
            total_runs: innings.total_runs,
            wickets: innings.wickets,
            current_over: innings.current_over,
            current_ball: innings.current_ball,
            is_complete: innings.is_complete,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchAggregates {
    pub current_innings: u8,
    pub is_match_complete: bool,
    pub innings: InningsAggregates,
}

/// A stored match converted into the strict data model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSnapshot {
    pub match_id: MatchId,
    pub name: Option<String>,
    pub created_at: String,
    pub revision: u64,
    pub state: MatchState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchListing {
    pub match_id: MatchId,
    pub name: Option<String>,
    pub total_overs: u32,
    pub current_innings: u8,
    pub innings1_runs: u32,
    pub innings1_wickets: u32,
    pub innings2_runs: u32,
    pub innings2_wickets: u32,
    pub is_match_complete: bool,
    pub created_at: String,
}

impl MatchListing {
    pub fn display_name(&self) -> String {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("Match {}", short_id(&self.match_id)),
        }
    }

    pub fn score_line(&self) -> String {
        if self.current_innings == 2 {
            format!(
                "{}/{} v {}/{}",
                self.innings1_runs, self.innings1_wickets, self.innings2_runs, self.innings2_wickets
            )
        } else {
            format!("{}/{}", self.innings1_runs, self.innings1_wickets)
        }
    }
}

pub fn short_id(match_id: &str) -> &str {
    match_id.get(..8).unwrap_or(match_id)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteOp {
    AppendDelivery {
        innings: u8,
        over_number: u32,
        delivery: Delivery,
        updated_over: Over,
    },
    StartOver {
        innings: u8,
        over_number: u32,
    },
    DeleteLastDelivery {
        innings: u8,
        over_number: u32,
    },
    /// Drops an over (and any balls in it) that an undone action had opened.
    DiscardOver {
        innings: u8,
        over_number: u32,
    },
    UpdateAggregates(MatchAggregates),
    MarkInningsComplete {
        innings: u8,
    },
    MarkMatchComplete,
}

/// Durable store for matches. Implementations apply each batch from
/// [`PersistenceGateway::apply_writes`] atomically and bump the match
/// revision once per batch; the single-operation helpers are one-op batches.
pub trait PersistenceGateway {
    fn create_match(&mut self, total_overs: u32, name: Option<&str>)
    -> Result<MatchId, PersistenceError>;

    fn load_match(&self, match_id: &str) -> Result<MatchSnapshot, PersistenceError>;

    fn list_matches(&self) -> Result<Vec<MatchListing>, PersistenceError>;

    fn delete_match(&mut self, match_id: &str) -> Result<(), PersistenceError>;

    /// Change counter for `match_id`; spectators poll it.
    fn revision(&self, match_id: &str) -> Result<u64, PersistenceError>;

    /// Applies `ops` all-or-nothing and returns the new revision.
    ///
    /// With `expected_revision` set, the batch only lands if the stored
    /// revision still matches; otherwise nothing is written and the call
    /// fails with [`PersistenceError::Conflict`].
    fn apply_writes(
        &mut self,
        match_id: &str,
        expected_revision: Option<u64>,
        ops: &[WriteOp],
    ) -> Result<u64, PersistenceError>;

    fn append_delivery(
        &mut self,
        match_id: &str,
        innings: u8,
        over_number: u32,
        delivery: &Delivery,
        updated_over: &Over,
    ) -> Result<(), PersistenceError> {
        let op = WriteOp::AppendDelivery {
            innings,
            over_number,
            delivery: *delivery,
            updated_over: updated_over.clone(),
        };
        self.apply_writes(match_id, None, &[op]).map(|_| ())
    }

    fn start_over(
        &mut self,
        match_id: &str,
        innings: u8,
        over_number: u32,
    ) -> Result<(), PersistenceError> {
        let op = WriteOp::StartOver {
            innings,
            over_number,
        };
        self.apply_writes(match_id, None, &[op]).map(|_| ())
    }

    fn update_match_aggregates(
        &mut self,
        match_id: &str,
        aggregates: &MatchAggregates,
    ) -> Result<(), PersistenceError> {
        self.apply_writes(match_id, None, &[WriteOp::UpdateAggregates(*aggregates)])
            .map(|_| ())
    }

    fn mark_innings_complete(
        &mut self,
        match_id: &str,
        innings: u8,
    ) -> Result<(), PersistenceError> {
        self.apply_writes(match_id, None, &[WriteOp::MarkInningsComplete { innings }])
            .map(|_| ())
    }

    fn delete_last_delivery(
        &mut self,
        match_id: &str,
        innings: u8,
        over_number: u32,
    ) -> Result<(), PersistenceError> {
        let op = WriteOp::DeleteLastDelivery {
            innings,
            over_number,
        };
        self.apply_writes(match_id, None, &[op]).map(|_| ())
    }

    fn discard_over(
        &mut self,
        match_id: &str,
        innings: u8,
        over_number: u32,
    ) -> Result<(), PersistenceError> {
        let op = WriteOp::DiscardOver {
            innings,
            over_number,
        };
        self.apply_writes(match_id, None, &[op]).map(|_| ())
    }

    fn mark_match_complete(&mut self, match_id: &str) -> Result<(), PersistenceError> {
        self.apply_writes(match_id, None, &[WriteOp::MarkMatchComplete])
            .map(|_| ())
    }
}

/// Works out the writes that take the stored match from `before` to `after`.
///
/// Forward actions only ever append balls and open overs; undo only ever
/// removes them. Any other difference in the ball lists means the two states
/// do not share a history and is reported as an invariant violation.
pub fn plan_writes(before: &MatchState, after: &MatchState) -> Result<Vec<WriteOp>, ScoringError> {
    let mut ops = Vec::new();
    let match_level_changed = before.current_innings != after.current_innings
        || before.is_match_complete != after.is_match_complete;
    let mut aggregates_written = false;

    for number in [1u8, 2] {
        let old = before.innings(number);
        let new = after.innings(number);
        let count = old.overs.len().max(new.overs.len());

        // Retract newest first so each delete hits the true last ball.
        for idx in (0..count).rev() {
            let over_number = idx as u32;
            match (old.overs.get(idx), new.overs.get(idx)) {
                (Some(prev), Some(next)) if next.balls.len() < prev.balls.len() => {
                    ensure_prefix(number, over_number, &next.balls, &prev.balls)?;
                    for _ in next.balls.len()..prev.balls.len() {
                        ops.push(WriteOp::DeleteLastDelivery {
                            innings: number,
                            over_number,
                        });
                    }
                }
                (Some(prev), None) => {
                    for _ in &prev.balls {
                        ops.push(WriteOp::DeleteLastDelivery {
                            innings: number,
                            over_number,
                        });
                    }
                    ops.push(WriteOp::DiscardOver {
                        innings: number,
                        over_number,
                    });
                }
                _ => {}
            }
        }

        for idx in 0..count {
            let over_number = idx as u32;
            let (already, next) = match (old.overs.get(idx), new.overs.get(idx)) {
                (None, Some(next)) => {
                    ops.push(WriteOp::StartOver {
                        innings: number,
                        over_number,
                    });
                    (0, next)
                }
                (Some(prev), Some(next)) if next.balls.len() > prev.balls.len() => {
                    ensure_prefix(number, over_number, &prev.balls, &next.balls)?;
                    (prev.balls.len(), next)
                }
                (Some(prev), Some(next)) if next.balls.len() == prev.balls.len() => {
                    if prev != next {
                        return Err(ScoringError::Invariant(format!(
                            "innings {number} over {over_number} rewritten in place"
                        )));
                    }
                    continue;
                }
                _ => continue,
            };
            for end in already..next.balls.len() {
                ops.push(WriteOp::AppendDelivery {
                    innings: number,
                    over_number,
                    delivery: next.balls[end],
                    updated_over: Over::from_balls(next.balls[..=end].to_vec()),
                });
            }
        }

        if InningsAggregates::of(number, old) != InningsAggregates::of(number, new) {
            ops.push(WriteOp::UpdateAggregates(MatchAggregates {
                current_innings: after.current_innings,
                is_match_complete: after.is_match_complete,
                innings: InningsAggregates::of(number, new),
            }));
            aggregates_written = true;
        }
        if !old.is_complete && new.is_complete {
            ops.push(WriteOp::MarkInningsComplete { innings: number });
        }
    }

    if match_level_changed && !aggregates_written {
        ops.push(WriteOp::UpdateAggregates(MatchAggregates {
            current_innings: after.current_innings,
            is_match_complete: after.is_match_complete,
            innings: InningsAggregates::of(after.current_innings, after.batting()),
        }));
    }
    if !before.is_match_complete && after.is_match_complete {
        ops.push(WriteOp::MarkMatchComplete);
    }
    Ok(ops)
}

fn ensure_prefix(
    innings: u8,
    over_number: u32,
    shorter: &[Delivery],
    longer: &[Delivery],
) -> Result<(), ScoringError> {
    if longer.starts_with(shorter) {
        Ok(())
    } else {
        Err(ScoringError::Invariant(format!(
            "innings {innings} over {over_number} balls diverged"
        )))
    }
}
