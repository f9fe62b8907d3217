use std::collections::HashMap;
use std::sync::mpsc::Sender;

use crate::error::PersistenceError;
use crate::gateway::PersistenceGateway;

/// "Match X changed": a trigger to reload, never a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchChanged {
    pub match_id: String,
    pub revision: u64,
}

pub trait ChangeNotifier {
    fn notify(&self, event: MatchChanged);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl ChangeNotifier for NoopNotifier {
    fn notify(&self, _event: MatchChanged) {}
}

impl ChangeNotifier for Sender<MatchChanged> {
    fn notify(&self, event: MatchChanged) {
        // A gone receiver just means nobody is watching.
        let _ = self.send(event);
    }
}

/// Polls persisted revisions and reports each match whose counter moved since
/// the last poll. Catches writes made by other processes.
#[derive(Debug, Default)]
pub struct RevisionWatcher {
    seen: HashMap<String, u64>,
}

impl RevisionWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn watch(&mut self, match_id: impl Into<String>, revision: u64) {
        self.seen.insert(match_id.into(), revision);
    }

    pub fn unwatch(&mut self, match_id: &str) {
        self.seen.remove(match_id);
    }

    pub fn is_watching(&self, match_id: &str) -> bool {
        self.seen.contains_key(match_id)
    }

    pub fn poll<G: PersistenceGateway + ?Sized>(
        &mut self,
        gateway: &G,
    ) -> Result<Vec<MatchChanged>, PersistenceError> {
        let mut changed = Vec::new();
        for (match_id, seen) in self.seen.iter_mut() {
            let revision = gateway.revision(match_id)?;
            if revision != *seen {
                *seen = revision;
                changed.push(MatchChanged {
                    match_id: match_id.clone(),
                    revision,
                });
            }
        }
        Ok(changed)
    }
}
