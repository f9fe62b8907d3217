use std::collections::VecDeque;

use crate::ball::Delivery;
use crate::config::MAX_OVERS;
use crate::gateway::{MatchListing, MatchSnapshot};
use crate::match_state::MatchState;
use crate::scoreboard::Scoreboard;
use crate::toss::CoinFace;

const MAX_LOGS: usize = 200;
const MAX_NAME_LEN: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Browser,
    Setup,
    Scoring,
    Watch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupField {
    Name,
    Overs,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupForm {
    pub name: String,
    pub overs: String,
    pub field: SetupField,
}

impl SetupForm {
    fn new(default_overs: u32) -> Self {
        Self {
            name: String::new(),
            overs: default_overs.to_string(),
            field: SetupField::Name,
        }
    }
}

/// A key that needs a follow-up key before it means anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    NoBallRuns,
}

/// The match on screen, either being scored here or watched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveMatch {
    pub match_id: String,
    pub name: Option<String>,
    pub state: MatchState,
    pub revision: u64,
    pub can_undo: bool,
    pub history_depth: usize,
}

impl LiveMatch {
    pub fn watched(snapshot: MatchSnapshot) -> Self {
        Self {
            match_id: snapshot.match_id,
            name: snapshot.name,
            state: snapshot.state,
            revision: snapshot.revision,
            can_undo: false,
            history_depth: 0,
        }
    }

    pub fn title(&self) -> String {
        match self.name.as_deref() {
            Some(name) => name.to_string(),
            None => format!("Match {}", crate::gateway::short_id(&self.match_id)),
        }
    }
}

pub struct AppState {
    pub screen: Screen,
    pub matches: Vec<MatchListing>,
    pub selected: usize,
    pub setup: SetupForm,
    pub live: Option<LiveMatch>,
    /// A command is with the worker; scoring keys are dropped until it answers.
    pub pending: bool,
    pub prompt: Option<Prompt>,
    pub toss: Option<CoinFace>,
    pub help_overlay: bool,
    pub last_error: Option<String>,
    pub logs: VecDeque<String>,
    pub default_overs: u32,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_OVERS)
    }
}

impl AppState {
    pub fn new(default_overs: u32) -> Self {
        Self {
            screen: Screen::Browser,
            matches: Vec::new(),
            selected: 0,
            setup: SetupForm::new(default_overs),
            live: None,
            pending: false,
            prompt: None,
            toss: None,
            help_overlay: false,
            last_error: None,
            logs: VecDeque::new(),
            default_overs,
        }
    }

    pub fn push_log(&mut self, msg: impl Into<String>) {
        self.logs.push_back(msg.into());
        while self.logs.len() > MAX_LOGS {
            self.logs.pop_front();
        }
    }

    pub fn selected_match(&self) -> Option<&MatchListing> {
        self.matches.get(self.selected)
    }

    pub fn selected_match_id(&self) -> Option<String> {
        self.selected_match().map(|m| m.match_id.clone())
    }

    pub fn select_next(&mut self) {
        if self.matches.is_empty() {
            self.selected = 0;
            return;
        }
        self.selected = (self.selected + 1) % self.matches.len();
    }

    pub fn select_prev(&mut self) {
        if self.matches.is_empty() {
            self.selected = 0;
            return;
        }
        if self.selected == 0 {
            self.selected = self.matches.len() - 1;
        } else {
            self.selected -= 1;
        }
    }

    pub fn clamp_selection(&mut self) {
        if self.matches.is_empty() {
            self.selected = 0;
        } else if self.selected >= self.matches.len() {
            self.selected = self.matches.len() - 1;
        }
    }

    pub fn scoreboard(&self) -> Option<Scoreboard> {
        self.live.as_ref().map(|live| Scoreboard::from_state(&live.state))
    }

    /// Marks a command as in flight. Returns false when one already is, in
    /// which case the caller must not send another.
    pub fn begin_command(&mut self) -> bool {
        if self.pending {
            return false;
        }
        self.pending = true;
        self.last_error = None;
        true
    }

    pub fn open_setup(&mut self) {
        self.setup = SetupForm::new(self.default_overs);
        self.screen = Screen::Setup;
    }

    pub fn setup_toggle_field(&mut self) {
        self.setup.field = match self.setup.field {
            SetupField::Name => SetupField::Overs,
            SetupField::Overs => SetupField::Name,
        };
    }

    pub fn setup_input(&mut self, ch: char) {
        match self.setup.field {
            SetupField::Name => {
                if !ch.is_control() && self.setup.name.chars().count() < MAX_NAME_LEN {
                    self.setup.name.push(ch);
                }
            }
            SetupField::Overs => {
                if ch.is_ascii_digit() && self.setup.overs.len() < 2 {
                    self.setup.overs.push(ch);
                }
            }
        }
    }

    pub fn setup_backspace(&mut self) {
        match self.setup.field {
            SetupField::Name => {
                self.setup.name.pop();
            }
            SetupField::Overs => {
                self.setup.overs.pop();
            }
        }
    }

    pub fn setup_command(&self) -> Result<ScorerCommand, String> {
        let total_overs = self
            .setup
            .overs
            .trim()
            .parse::<u32>()
            .map_err(|_| "overs must be a number".to_string())?;
        if !(1..=MAX_OVERS).contains(&total_overs) {
            return Err(format!("overs must be between 1 and {MAX_OVERS}"));
        }
        let name = self.setup.name.trim();
        Ok(ScorerCommand::CreateMatch {
            total_overs,
            name: (!name.is_empty()).then(|| name.to_string()),
        })
    }

    pub fn accepts_scoring_input(&self) -> bool {
        self.screen == Screen::Scoring && self.live.is_some() && !self.pending
    }

    /// Maps a scoring key to a command. `n` opens the no-ball prompt; the next
    /// digit completes it.
    pub fn scoring_key(&mut self, ch: char) -> Option<ScorerCommand> {
        if let Some(Prompt::NoBallRuns) = self.prompt {
            self.prompt = None;
            let runs = ch.to_digit(10).filter(|r| *r <= 6)?;
            return Some(ScorerCommand::Record(Delivery::no_ball(runs)));
        }
        match ch {
            '0'..='6' => ch
                .to_digit(10)
                .map(|runs| ScorerCommand::Record(Delivery::normal(runs))),
            'w' => Some(ScorerCommand::Record(Delivery::wide())),
            'x' => Some(ScorerCommand::Record(Delivery::wicket())),
            'n' => {
                self.prompt = Some(Prompt::NoBallRuns);
                None
            }
            'u' => Some(ScorerCommand::Undo),
            'e' => Some(ScorerCommand::EndInnings),
            's' => Some(ScorerCommand::StartSecondInnings),
            _ => None,
        }
    }

    pub fn close_match(&mut self) {
        self.live = None;
        self.prompt = None;
        self.toss = None;
        self.screen = Screen::Browser;
    }
}

#[derive(Debug, Clone)]
pub enum Delta {
    SetMatches(Vec<MatchListing>),
    MatchOpened { live: LiveMatch, screen: Screen },
    ScoringUpdated(LiveMatch),
    SpectatorUpdated(LiveMatch),
    MatchDeleted { match_id: String },
    CommandFailed(String),
    Log(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScorerCommand {
    CreateMatch {
        total_overs: u32,
        name: Option<String>,
    },
    OpenMatch {
        match_id: String,
    },
    Watch {
        match_id: String,
    },
    CloseMatch,
    Record(Delivery),
    Undo,
    EndInnings,
    StartSecondInnings,
    ListMatches,
    DeleteMatch {
        match_id: String,
    },
    Refresh,
}

pub fn apply_delta(state: &mut AppState, delta: Delta) {
    match delta {
        Delta::SetMatches(matches) => {
            let selected_id = state.selected_match_id();
            state.matches = matches;
            if let Some(id) = selected_id
                && let Some(idx) = state.matches.iter().position(|m| m.match_id == id)
            {
                state.selected = idx;
            }
            state.clamp_selection();
        }
        Delta::MatchOpened { live, screen } => {
            state.push_log(format!("[INFO] Opened {}", live.title()));
            state.live = Some(live);
            state.screen = screen;
            state.prompt = None;
            state.toss = None;
            state.pending = false;
        }
        Delta::ScoringUpdated(live) => {
            state.pending = false;
            state.last_error = None;
            if state.screen == Screen::Scoring
                && state
                    .live
                    .as_ref()
                    .is_some_and(|current| current.match_id == live.match_id)
            {
                state.live = Some(live);
            }
        }
        Delta::SpectatorUpdated(live) => {
            if state.screen == Screen::Watch
                && state
                    .live
                    .as_ref()
                    .is_some_and(|current| current.match_id == live.match_id)
            {
                state.live = Some(live);
            }
        }
        Delta::MatchDeleted { match_id } => {
            state.pending = false;
            state.matches.retain(|m| m.match_id != match_id);
            state.clamp_selection();
            if state
                .live
                .as_ref()
                .is_some_and(|live| live.match_id == match_id)
            {
                state.close_match();
            }
            state.push_log(format!(
                "[INFO] Deleted match {}",
                crate::gateway::short_id(&match_id)
            ));
        }
        Delta::CommandFailed(message) => {
            state.pending = false;
            state.push_log(format!("[WARN] {message}"));
            state.last_error = Some(message);
        }
        Delta::Log(msg) => state.push_log(msg),
    }
}
