use std::thread;
use std::time::Duration;

use rand::Rng;
use tracing::info;

use crate::ball::Delivery;
use crate::error::{ScoringError, SessionError};
use crate::gateway::PersistenceGateway;
use crate::match_state::{MatchPhase, MatchResult};
use crate::notify::ChangeNotifier;
use crate::scorer::Scorer;

/// Roughly T20-shaped: mostly dots and singles, a boundary every couple of
/// overs, a wicket every few overs.
pub fn random_delivery<R: Rng + ?Sized>(rng: &mut R) -> Delivery {
    match rng.gen_range(0..100) {
        0..=33 => Delivery::normal(0),
        34..=63 => Delivery::normal(1),
        64..=72 => Delivery::normal(2),
        73..=74 => Delivery::normal(3),
        75..=83 => Delivery::normal(4),
        84..=88 => Delivery::normal(6),
        89..=92 => Delivery::wide(),
        93..=95 => Delivery::no_ball(rng.gen_range(0..=2)),
        _ => Delivery::wicket(),
    }
}

/// Bowls random deliveries through `scorer` until the match is decided,
/// starting the second innings at the break. `pace` is slept between actions
/// so spectators can follow along.
pub fn play_demo_match<G, N, R>(
    scorer: &mut Scorer<N>,
    gateway: &mut G,
    rng: &mut R,
    pace: Duration,
) -> Result<MatchResult, SessionError>
where
    G: PersistenceGateway + ?Sized,
    N: ChangeNotifier,
    R: Rng + ?Sized,
{
    loop {
        match scorer.phase() {
            MatchPhase::MatchComplete => return Ok(scorer.result()?),
            MatchPhase::Innings1Complete => {
                let target = scorer.start_second_innings(gateway)?.target_runs;
                info!(match_id = %scorer.match_id(), ?target, "demo second innings started");
            }
            MatchPhase::InInnings1 | MatchPhase::InInnings2 => {
                scorer.record_delivery(gateway, random_delivery(rng))?;
            }
            phase @ MatchPhase::AwaitingStart => {
                return Err(ScoringError::InvalidTransition {
                    action: "play a demo match",
                    phase,
                }
                .into());
            }
        }
        if !pace.is_zero() {
            thread::sleep(pace);
        }
    }
}
