use crate::match_state::MatchState;

/// LIFO stack of full-state snapshots. Each entry is an owned clone, so later
/// mutations of the live state never leak into history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct History {
    stack: Vec<MatchState>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&mut self, state: &MatchState) {
        self.stack.push(state.clone());
    }

    pub fn restore(&mut self) -> Option<MatchState> {
        self.stack.pop()
    }

    pub fn peek(&self) -> Option<&MatchState> {
        self.stack.last()
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn clear(&mut self) {
        self.stack.clear();
    }
}
