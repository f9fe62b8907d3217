use tracing::{debug, info, warn};

use crate::ball::Delivery;
use crate::error::{ScoringError, SessionError};
use crate::gateway::{MatchId, PersistenceGateway, plan_writes};
use crate::match_state::{Action, MatchPhase, MatchResult, MatchState, ScoringMachine};
use crate::notify::{ChangeNotifier, MatchChanged, NoopNotifier};

/// A scoring session for one match.
///
/// Each action is computed on the side, written through the gateway as one
/// batch, and only committed to the in-memory machine once the batch has
/// landed. A failed write leaves state and history exactly as they were, so
/// the same action can simply be retried.
pub struct Scorer<N: ChangeNotifier = NoopNotifier> {
    match_id: MatchId,
    name: Option<String>,
    machine: ScoringMachine,
    revision: u64,
    notifier: N,
}

impl Scorer<NoopNotifier> {
    pub fn create<G: PersistenceGateway + ?Sized>(
        gateway: &mut G,
        total_overs: u32,
        name: Option<&str>,
    ) -> Result<Self, SessionError> {
        Self::create_with(gateway, total_overs, name, NoopNotifier)
    }

    pub fn resume<G: PersistenceGateway + ?Sized>(
        gateway: &G,
        match_id: &str,
    ) -> Result<Self, SessionError> {
        Self::resume_with(gateway, match_id, NoopNotifier)
    }
}

impl<N: ChangeNotifier> Scorer<N> {
    pub fn create_with<G: PersistenceGateway + ?Sized>(
        gateway: &mut G,
        total_overs: u32,
        name: Option<&str>,
        notifier: N,
    ) -> Result<Self, SessionError> {
        // Reject a bad limit before anything is stored.
        let mut machine = ScoringMachine::new();
        machine.start_match(total_overs)?;
        let match_id = gateway.create_match(total_overs, name)?;
        Ok(Self {
            match_id,
            name: name.map(str::to_string),
            machine,
            revision: 0,
            notifier,
        })
    }

    /// Picks up a stored match. Undo history does not survive a restart.
    pub fn resume_with<G: PersistenceGateway + ?Sized>(
        gateway: &G,
        match_id: &str,
        notifier: N,
    ) -> Result<Self, SessionError> {
        let snapshot = gateway.load_match(match_id)?;
        let machine = ScoringMachine::from_state(snapshot.state)?;
        info!(match_id, phase = %machine.phase(), "scoring resumed");
        Ok(Self {
            match_id: snapshot.match_id,
            name: snapshot.name,
            machine,
            revision: snapshot.revision,
            notifier,
        })
    }

    pub fn match_id(&self) -> &str {
        &self.match_id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn state(&self) -> &MatchState {
        self.machine.state()
    }

    /// Store revision after the last committed action.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn phase(&self) -> MatchPhase {
        self.machine.phase()
    }

    pub fn can_undo(&self) -> bool {
        self.machine.can_undo()
    }

    pub fn history_depth(&self) -> usize {
        self.machine.history_depth()
    }

    pub fn result(&self) -> Result<MatchResult, ScoringError> {
        self.machine.result()
    }

    pub fn apply<G: PersistenceGateway + ?Sized>(
        &mut self,
        gateway: &mut G,
        action: Action,
    ) -> Result<&MatchState, SessionError> {
        let change = self.machine.prepare(action)?;
        let ops = plan_writes(&change.before, &change.after)?;

        let revision = match gateway.apply_writes(&self.match_id, Some(self.revision), &ops) {
            Ok(revision) => revision,
            Err(err) => {
                warn!(
                    match_id = %self.match_id,
                    ?action,
                    error = %err,
                    "write failed; action not applied"
                );
                return Err(err.into());
            }
        };

        let outcome = change.outcome;
        let before_phase = change.before.phase();
        self.machine.commit(change)?;
        self.revision = revision;
        let after_phase = self.machine.phase();

        debug!(match_id = %self.match_id, ?action, revision, "action committed");
        if let Some(end) = outcome.and_then(|o| o.innings_end) {
            info!(match_id = %self.match_id, %end, "innings closed");
        }
        if before_phase != after_phase {
            info!(
                match_id = %self.match_id,
                from = %before_phase,
                to = %after_phase,
                "phase changed"
            );
        }
        if after_phase == MatchPhase::MatchComplete
            && before_phase != MatchPhase::MatchComplete
            && let Ok(result) = self.machine.result()
        {
            info!(match_id = %self.match_id, %result, "match complete");
        }

        self.notifier.notify(MatchChanged {
            match_id: self.match_id.clone(),
            revision,
        });
        Ok(self.machine.state())
    }

    pub fn record_delivery<G: PersistenceGateway + ?Sized>(
        &mut self,
        gateway: &mut G,
        delivery: Delivery,
    ) -> Result<&MatchState, SessionError> {
        self.apply(gateway, Action::Deliver(delivery))
    }

    pub fn record_runs<G: PersistenceGateway + ?Sized>(
        &mut self,
        gateway: &mut G,
        runs: u32,
    ) -> Result<&MatchState, SessionError> {
        self.record_delivery(gateway, Delivery::normal(runs))
    }

    pub fn record_wide<G: PersistenceGateway + ?Sized>(
        &mut self,
        gateway: &mut G,
    ) -> Result<&MatchState, SessionError> {
        self.record_delivery(gateway, Delivery::wide())
    }

    pub fn record_no_ball<G: PersistenceGateway + ?Sized>(
        &mut self,
        gateway: &mut G,
        runs: u32,
    ) -> Result<&MatchState, SessionError> {
        self.record_delivery(gateway, Delivery::no_ball(runs))
    }

    pub fn record_wicket<G: PersistenceGateway + ?Sized>(
        &mut self,
        gateway: &mut G,
    ) -> Result<&MatchState, SessionError> {
        self.record_delivery(gateway, Delivery::wicket())
    }

    pub fn start_second_innings<G: PersistenceGateway + ?Sized>(
        &mut self,
        gateway: &mut G,
    ) -> Result<&MatchState, SessionError> {
        self.apply(gateway, Action::StartSecondInnings)
    }

    pub fn end_innings<G: PersistenceGateway + ?Sized>(
        &mut self,
        gateway: &mut G,
    ) -> Result<&MatchState, SessionError> {
        self.apply(gateway, Action::EndInnings)
    }

    pub fn undo<G: PersistenceGateway + ?Sized>(
        &mut self,
        gateway: &mut G,
    ) -> Result<&MatchState, SessionError> {
        self.apply(gateway, Action::Undo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::SqliteGateway;
    use std::sync::mpsc;

    #[test]
    fn zero_overs_never_reaches_the_store() {
        let mut gateway = SqliteGateway::open_in_memory().unwrap();
        let err = Scorer::create(&mut gateway, 0, None).err().unwrap();
        assert_eq!(err, SessionError::Scoring(ScoringError::InvalidOversLimit(0)));
        assert!(gateway.list_matches().unwrap().is_empty());
    }

    #[test]
    fn committed_actions_are_announced() {
        let mut gateway = SqliteGateway::open_in_memory().unwrap();
        let (tx, rx) = mpsc::channel();
        let mut scorer = Scorer::create_with(&mut gateway, 2, None, tx).unwrap();
        scorer.record_runs(&mut gateway, 4).unwrap();
        scorer.record_wide(&mut gateway).unwrap();
        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].revision, 2);
        assert!(events.iter().all(|e| e.match_id == scorer.match_id()));
        assert_eq!(scorer.revision(), 2);
    }

    #[test]
    fn refused_action_is_not_announced() {
        let mut gateway = SqliteGateway::open_in_memory().unwrap();
        let (tx, rx) = mpsc::channel();
        let mut scorer = Scorer::create_with(&mut gateway, 2, None, tx).unwrap();
        let err = scorer.undo(&mut gateway).unwrap_err();
        assert_eq!(err, SessionError::Scoring(ScoringError::NothingToUndo));
        assert!(rx.try_recv().is_err());
        assert_eq!(gateway.revision(scorer.match_id()).unwrap(), 0);
    }

    #[test]
    fn resume_picks_up_stored_state() {
        let mut gateway = SqliteGateway::open_in_memory().unwrap();
        let mut scorer = Scorer::create(&mut gateway, 3, Some("Nets")).unwrap();
        scorer.record_runs(&mut gateway, 6).unwrap();
        scorer.record_no_ball(&mut gateway, 1).unwrap();

        let resumed = Scorer::resume(&gateway, scorer.match_id()).unwrap();
        assert_eq!(resumed.state(), scorer.state());
        assert_eq!(resumed.name(), Some("Nets"));
        assert!(!resumed.can_undo());
    }
}
