use serde::Serialize;

use crate::ball::Delivery;
use crate::innings::{Innings, format_overs};
use crate::match_state::{MatchPhase, MatchState};
use crate::over::Over;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BallChip {
    pub label: String,
    pub highlight: bool,
}

impl From<&Delivery> for BallChip {
    fn from(delivery: &Delivery) -> Self {
        Self {
            label: delivery.label(),
            highlight: delivery.is_highlight(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverLine {
    /// 1-based, as read out at the ground.
    pub number: u32,
    pub runs: u32,
    pub wickets: u32,
    pub balls: Vec<BallChip>,
}

impl OverLine {
    fn new(idx: usize, over: &Over) -> Self {
        Self {
            number: idx as u32 + 1,
            runs: over.total_runs,
            wickets: over.wickets,
            balls: over.balls.iter().map(BallChip::from).collect(),
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "Over {}: {} runs, {} wicket(s)",
            self.number, self.runs, self.wickets
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChaseLine {
    pub target: u32,
    pub runs_required: u32,
    pub balls_remaining: u32,
    pub required_rate: String,
}

/// Everything the scoreboard screens print, derived from a match state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Scoreboard {
    pub phase: MatchPhase,
    pub batting_innings: u8,
    pub score: String,
    pub overs: String,
    pub run_rate: String,
    pub chase: Option<ChaseLine>,
    pub this_over: Vec<BallChip>,
    pub completed_overs: Vec<OverLine>,
    pub first_innings: Option<String>,
    pub result: Option<String>,
}

impl Scoreboard {
    pub fn from_state(state: &MatchState) -> Self {
        let batting = state.batting();
        let this_over = batting
            .current()
            .filter(|_| !batting.is_complete)
            .map(|over| over.balls.iter().map(BallChip::from).collect())
            .unwrap_or_default();

        let shown: &[Over] = if batting.is_complete || state.is_match_complete {
            &batting.overs
        } else {
            batting.completed_overs()
        };
        let completed_overs = shown
            .iter()
            .enumerate()
            .map(|(idx, over)| OverLine::new(idx, over))
            .collect();

        let chase = match (state.current_innings, state.target_runs) {
            (2, Some(target)) => Some(ChaseLine {
                target,
                runs_required: batting.runs_required(target),
                balls_remaining: batting.balls_remaining(state.total_overs),
                required_rate: batting
                    .required_run_rate(target, state.total_overs)
                    .to_string(),
            }),
            _ => None,
        };

        let first_innings = (state.current_innings == 2 || state.innings1.is_complete)
            .then(|| innings_summary(&state.innings1));

        Self {
            phase: state.phase(),
            batting_innings: state.current_innings,
            score: score_line(batting),
            overs: format!("{}/{}", batting.overs_display(), state.total_overs),
            run_rate: batting.run_rate_display(),
            chase,
            this_over,
            completed_overs,
            first_innings,
            result: state.result().ok().map(|r| r.to_string()),
        }
    }

    /// One-line score for list rows and logs: `Inn 2 45/3 (7.2/20)`.
    pub fn headline(&self) -> String {
        format!("Inn {} {} ({})", self.batting_innings, self.score, self.overs)
    }
}

pub fn score_line(innings: &Innings) -> String {
    format!("{}/{}", innings.total_runs, innings.wickets)
}

fn innings_summary(innings: &Innings) -> String {
    format!(
        "{} in {} overs",
        score_line(innings),
        format_overs(innings.current_over, innings.current_ball)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_over_shows_in_this_over_only() {
        let mut state = MatchState::start(20).unwrap();
        for ball in [Delivery::normal(1); 6] {
            state = state.with_delivery(ball).unwrap();
        }
        state = state.with_delivery(Delivery::normal(4)).unwrap();
        state = state.with_delivery(Delivery::wide()).unwrap();

        let board = Scoreboard::from_state(&state);
        assert_eq!(board.score, "11/0");
        assert_eq!(board.overs, "1.1/20");
        assert_eq!(board.completed_overs.len(), 1);
        assert_eq!(board.completed_overs[0].summary(), "Over 1: 6 runs, 0 wicket(s)");
        let labels: Vec<_> = board.this_over.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["4", "Wd"]);
        assert!(board.this_over.iter().all(|c| c.highlight));
        assert!(board.chase.is_none());
        assert_eq!(board.headline(), "Inn 1 11/0 (1.1/20)");
    }

    #[test]
    fn chase_line_tracks_target() {
        let state = MatchState::start(2)
            .unwrap()
            .with_delivery(Delivery::normal(6))
            .unwrap()
            .with_innings_ended()
            .unwrap()
            .with_second_innings_started()
            .unwrap()
            .with_delivery(Delivery::normal(2))
            .unwrap();

        let board = Scoreboard::from_state(&state);
        let chase = board.chase.unwrap();
        assert_eq!(chase.target, 7);
        assert_eq!(chase.runs_required, 5);
        assert_eq!(chase.balls_remaining, 11);
        assert_eq!(chase.required_rate, "2.73");
        assert_eq!(board.first_innings.as_deref(), Some("6/0 in 0.1 overs"));
    }

    #[test]
    fn finished_match_lists_every_over_and_result() {
        let mut state = MatchState::start(1).unwrap();
        for _ in 0..6 {
            state = state.with_delivery(Delivery::normal(0)).unwrap();
        }
        state = state.with_second_innings_started().unwrap();
        state = state.with_delivery(Delivery::normal(1)).unwrap();

        let board = Scoreboard::from_state(&state);
        assert_eq!(board.phase, MatchPhase::MatchComplete);
        assert_eq!(board.completed_overs.len(), 1);
        assert!(board.this_over.is_empty());
        assert_eq!(board.result.as_deref(), Some("Team 2 won by 10 wickets"));
    }
}
