use serde::{Deserialize, Serialize};

use crate::ball::Delivery;
use crate::error::ScoringError;

pub const BALLS_PER_OVER: u32 = 6;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Over {
    pub balls: Vec<Delivery>,
    pub total_runs: u32,
    pub legal_balls: u32,
    pub wickets: u32,
}

impl Over {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the aggregates from a ball list.
    pub fn from_balls(balls: Vec<Delivery>) -> Self {
        let mut over = Self::new();
        for ball in balls {
            over.push(ball);
        }
        over
    }

    pub fn is_sealed(&self) -> bool {
        self.legal_balls >= BALLS_PER_OVER
    }

    /// Applies one delivery and reports whether the over is now sealed.
    ///
    /// A legal ball offered to a sealed over is rejected without touching the
    /// over. Extras are still accepted; the innings never offers one after the
    /// seal because it moves on to the next over first.
    pub fn apply_delivery(
        &mut self,
        over_number: u32,
        delivery: Delivery,
    ) -> Result<bool, ScoringError> {
        delivery.validate()?;
        if delivery.is_legal() && self.is_sealed() {
            return Err(ScoringError::OverSealed { over: over_number });
        }
        self.push(delivery);
        Ok(self.is_sealed())
    }

    fn push(&mut self, delivery: Delivery) {
        self.total_runs += delivery.total_runs();
        if delivery.is_legal() {
            self.legal_balls += 1;
        }
        if delivery.is_wicket() {
            self.wickets += 1;
        }
        self.balls.push(delivery);
    }

    pub fn labels(&self) -> Vec<String> {
        self.balls.iter().map(Delivery::label).collect()
    }

    /// True when the stored aggregates agree with the balls.
    pub fn is_consistent(&self) -> bool {
        let rebuilt = Self::from_balls(self.balls.clone());
        rebuilt.total_runs == self.total_runs
            && rebuilt.legal_balls == self.legal_balls
            && rebuilt.wickets == self.wickets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn six_legal_balls_seal_the_over() {
        let mut over = Over::new();
        for i in 0..5 {
            assert!(!over.apply_delivery(0, Delivery::normal(i)).unwrap());
        }
        assert!(over.apply_delivery(0, Delivery::normal(1)).unwrap());
        assert_eq!(over.legal_balls, 6);
        assert_eq!(over.total_runs, 11);
    }

    #[test]
    fn seventh_legal_ball_is_rejected_untouched() {
        let mut over = Over::from_balls(vec![Delivery::normal(1); 6]);
        let before = over.clone();
        let err = over.apply_delivery(3, Delivery::wicket()).unwrap_err();
        assert_eq!(err, ScoringError::OverSealed { over: 3 });
        assert_eq!(over, before);
    }

    #[test]
    fn extras_do_not_count_toward_the_six() {
        let mut over = Over::new();
        over.apply_delivery(0, Delivery::wide()).unwrap();
        over.apply_delivery(0, Delivery::no_ball(2)).unwrap();
        over.apply_delivery(0, Delivery::wicket()).unwrap();
        assert_eq!(over.legal_balls, 1);
        assert_eq!(over.total_runs, 4);
        assert_eq!(over.wickets, 1);
        assert_eq!(over.labels(), vec!["Wd", "Nb+2", "W"]);
        assert!(over.is_consistent());
    }
}
