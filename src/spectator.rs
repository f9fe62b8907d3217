use tracing::debug;

use crate::error::SessionError;
use crate::gateway::{MatchSnapshot, PersistenceGateway};
use crate::match_state::MatchState;
use crate::notify::MatchChanged;
use crate::scoreboard::Scoreboard;

/// Read-only view of a match owned by someone else. It never mutates the
/// store; notifications only tell it when to reload.
#[derive(Debug, Clone)]
pub struct Spectator {
    match_id: String,
    snapshot: Option<MatchSnapshot>,
}

impl Spectator {
    pub fn new(match_id: impl Into<String>) -> Self {
        Self {
            match_id: match_id.into(),
            snapshot: None,
        }
    }

    pub fn match_id(&self) -> &str {
        &self.match_id
    }

    pub fn snapshot(&self) -> Option<&MatchSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn state(&self) -> Option<&MatchState> {
        self.snapshot.as_ref().map(|s| &s.state)
    }

    pub fn revision(&self) -> Option<u64> {
        self.snapshot.as_ref().map(|s| s.revision)
    }

    /// Loads the full match again. Returns whether anything changed; loading
    /// the same stored state twice is a no-op.
    pub fn reload<G: PersistenceGateway + ?Sized>(
        &mut self,
        gateway: &G,
    ) -> Result<bool, SessionError> {
        let snapshot = gateway.load_match(&self.match_id)?;
        if self.snapshot.as_ref() == Some(&snapshot) {
            return Ok(false);
        }
        debug!(match_id = %self.match_id, revision = snapshot.revision, "spectator view updated");
        self.snapshot = Some(snapshot);
        Ok(true)
    }

    /// Reloads when `event` is about this match; other matches are ignored.
    pub fn on_change<G: PersistenceGateway + ?Sized>(
        &mut self,
        event: &MatchChanged,
        gateway: &G,
    ) -> Result<bool, SessionError> {
        if event.match_id != self.match_id {
            return Ok(false);
        }
        self.reload(gateway)
    }

    pub fn scoreboard(&self) -> Option<Scoreboard> {
        self.state().map(Scoreboard::from_state)
    }
}
