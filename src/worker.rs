use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::error::SessionError;
use crate::gateway::PersistenceGateway;
use crate::match_state::{Action, MatchPhase};
use crate::notify::RevisionWatcher;
use crate::persist::SqliteGateway;
use crate::scoreboard::Scoreboard;
use crate::scorer::Scorer;
use crate::spectator::Spectator;
use crate::state::{Delta, LiveMatch, Screen, ScorerCommand};

/// Owns the store connection and whichever match is open. All writes happen
/// here, one command at a time.
pub struct ScoringWorker<G: PersistenceGateway> {
    gateway: G,
    tx: Sender<Delta>,
    scorer: Option<Scorer>,
    spectator: Option<Spectator>,
    watcher: RevisionWatcher,
}

impl<G: PersistenceGateway> ScoringWorker<G> {
    pub fn new(gateway: G, tx: Sender<Delta>) -> Self {
        Self {
            gateway,
            tx,
            scorer: None,
            spectator: None,
            watcher: RevisionWatcher::new(),
        }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn handle(&mut self, cmd: ScorerCommand) {
        match cmd {
            ScorerCommand::CreateMatch { total_overs, name } => {
                match Scorer::create(&mut self.gateway, total_overs, name.as_deref()) {
                    Ok(scorer) => {
                        self.log(format!(
                            "[INFO] New {total_overs}-over match {}",
                            crate::gateway::short_id(scorer.match_id())
                        ));
                        self.open_scorer(scorer);
                        self.send_matches();
                    }
                    Err(err) => self.fail("create match", err),
                }
            }
            ScorerCommand::OpenMatch { match_id } => {
                match Scorer::resume(&self.gateway, &match_id) {
                    Ok(scorer) => self.open_scorer(scorer),
                    Err(err) => self.fail("open match", err),
                }
            }
            ScorerCommand::Watch { match_id } => self.watch(match_id),
            ScorerCommand::CloseMatch => self.close(),
            ScorerCommand::Record(delivery) => self.score(Action::Deliver(delivery)),
            ScorerCommand::Undo => self.score(Action::Undo),
            ScorerCommand::EndInnings => self.score(Action::EndInnings),
            ScorerCommand::StartSecondInnings => self.score(Action::StartSecondInnings),
            ScorerCommand::ListMatches => self.send_matches(),
            ScorerCommand::DeleteMatch { match_id } => {
                if self
                    .scorer
                    .as_ref()
                    .is_some_and(|s| s.match_id() == match_id)
                    || self
                        .spectator
                        .as_ref()
                        .is_some_and(|s| s.match_id() == match_id)
                {
                    self.close();
                }
                match self.gateway.delete_match(&match_id) {
                    Ok(()) => {
                        let _ = self.tx.send(Delta::MatchDeleted { match_id });
                        self.send_matches();
                    }
                    Err(err) => self.fail("delete match", err.into()),
                }
            }
            ScorerCommand::Refresh => self.refresh(),
        }
    }

    /// Checks the watched match for writes made elsewhere.
    pub fn poll(&mut self) {
        let Some(spectator) = self.spectator.as_mut() else {
            return;
        };
        let events = match self.watcher.poll(&self.gateway) {
            Ok(events) => events,
            Err(err) => {
                warn!(error = %err, "revision poll failed");
                return;
            }
        };
        for event in events {
            match spectator.on_change(&event, &self.gateway) {
                Ok(true) => {
                    if let Some(snapshot) = spectator.snapshot() {
                        let live = LiveMatch::watched(snapshot.clone());
                        let _ = self.tx.send(Delta::SpectatorUpdated(live));
                    }
                }
                Ok(false) => {}
                Err(err) => {
                    warn!(match_id = %event.match_id, error = %err, "spectator reload failed");
                    let _ = self
                        .tx
                        .send(Delta::Log(format!("[WARN] Reload failed: {err}")));
                }
            }
        }
    }

    fn open_scorer(&mut self, scorer: Scorer) {
        self.spectator = None;
        self.watcher = RevisionWatcher::new();
        let live = scoring_view(&scorer);
        self.scorer = Some(scorer);
        let _ = self.tx.send(Delta::MatchOpened {
            live,
            screen: Screen::Scoring,
        });
    }

    fn watch(&mut self, match_id: String) {
        self.scorer = None;
        let mut spectator = Spectator::new(match_id.clone());
        if let Err(err) = spectator.reload(&self.gateway) {
            self.fail("watch match", err);
            return;
        }
        let Some(snapshot) = spectator.snapshot().cloned() else {
            return;
        };
        self.watcher = RevisionWatcher::new();
        self.watcher.watch(match_id, snapshot.revision);
        self.spectator = Some(spectator);
        let _ = self.tx.send(Delta::MatchOpened {
            live: LiveMatch::watched(snapshot),
            screen: Screen::Watch,
        });
    }

    fn close(&mut self) {
        self.scorer = None;
        self.spectator = None;
        self.watcher = RevisionWatcher::new();
    }

    fn score(&mut self, action: Action) {
        let Some(scorer) = self.scorer.as_mut() else {
            let _ = self
                .tx
                .send(Delta::CommandFailed("no match is open for scoring".to_string()));
            return;
        };
        let before = scorer.phase();
        match scorer.apply(&mut self.gateway, action) {
            Ok(_) => {
                let live = scoring_view(scorer);
                let after = scorer.phase();
                let mut lines = vec![action_log(action, &live)];
                if before != after {
                    lines.push(phase_log(after, &live));
                }
                let _ = self.tx.send(Delta::ScoringUpdated(live));
                for line in lines {
                    let _ = self.tx.send(Delta::Log(line));
                }
            }
            Err(err) => self.fail("score", err),
        }
    }

    fn refresh(&mut self) {
        if let Some(spectator) = self.spectator.as_mut() {
            match spectator.reload(&self.gateway) {
                Ok(changed) => {
                    if let Some(snapshot) = spectator.snapshot() {
                        self.watcher.watch(snapshot.match_id.clone(), snapshot.revision);
                        let live = LiveMatch::watched(snapshot.clone());
                        let _ = self.tx.send(Delta::SpectatorUpdated(live));
                    }
                    if !changed {
                        let _ = self.tx.send(Delta::Log("[INFO] Already up to date".to_string()));
                    }
                }
                Err(err) => self.fail("refresh", err),
            }
            return;
        }
        if let Some(scorer) = self.scorer.as_ref() {
            let _ = self.tx.send(Delta::ScoringUpdated(scoring_view(scorer)));
            return;
        }
        self.send_matches();
    }

    fn send_matches(&mut self) {
        match self.gateway.list_matches() {
            Ok(matches) => {
                let _ = self.tx.send(Delta::SetMatches(matches));
            }
            Err(err) => {
                warn!(error = %err, "listing matches failed");
                let _ = self
                    .tx
                    .send(Delta::Log(format!("[WARN] Could not list matches: {err}")));
            }
        }
    }

    fn fail(&self, op: &str, err: SessionError) {
        if err.is_invariant_violation() {
            error!(op, error = %err, "scoring invariant violated");
        } else {
            warn!(op, error = %err, retryable = err.is_retryable(), "command refused");
        }
        let message = if err.is_retryable() {
            format!("{err} (safe to retry)")
        } else {
            err.to_string()
        };
        let _ = self.tx.send(Delta::CommandFailed(message));
    }

    fn log(&self, msg: String) {
        let _ = self.tx.send(Delta::Log(msg));
    }
}

pub fn spawn_scoring_worker(
    config: AppConfig,
    tx: Sender<Delta>,
    cmd_rx: Receiver<ScorerCommand>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let gateway = match SqliteGateway::open(&config.db_path) {
            Ok(gateway) => gateway,
            Err(err) => {
                error!(path = %config.db_path.display(), error = %err, "cannot open match store");
                let _ = tx.send(Delta::CommandFailed(format!("cannot open match store: {err}")));
                return;
            }
        };
        info!(path = %config.db_path.display(), "match store opened");
        run_worker(ScoringWorker::new(gateway, tx), cmd_rx, config.watch_poll);
    })
}

fn run_worker<G: PersistenceGateway>(
    mut worker: ScoringWorker<G>,
    cmd_rx: Receiver<ScorerCommand>,
    poll_every: Duration,
) {
    worker.send_matches();
    let mut last_poll = Instant::now();
    loop {
        let wait = poll_every
            .checked_sub(last_poll.elapsed())
            .unwrap_or(Duration::ZERO);
        match cmd_rx.recv_timeout(wait) {
            Ok(cmd) => worker.handle(cmd),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        if last_poll.elapsed() >= poll_every {
            worker.poll();
            last_poll = Instant::now();
        }
    }
    info!("scoring worker stopped");
}

fn scoring_view(scorer: &Scorer) -> LiveMatch {
    LiveMatch {
        match_id: scorer.match_id().to_string(),
        name: scorer.name().map(str::to_string),
        state: scorer.state().clone(),
        revision: scorer.revision(),
        can_undo: scorer.can_undo(),
        history_depth: scorer.history_depth(),
    }
}

fn action_log(action: Action, live: &LiveMatch) -> String {
    let headline = Scoreboard::from_state(&live.state).headline();
    match action {
        Action::Deliver(delivery) => format!("[INFO] {delivery} | {headline}"),
        Action::Undo => format!("[INFO] Undo | {headline}"),
        Action::EndInnings => format!("[INFO] Innings ended | {headline}"),
        Action::StartSecondInnings => format!("[INFO] Second innings started | {headline}"),
    }
}

fn phase_log(phase: MatchPhase, live: &LiveMatch) -> String {
    match (phase, live.state.result()) {
        (MatchPhase::MatchComplete, Ok(result)) => format!("[INFO] {result}"),
        (MatchPhase::Innings1Complete, _) => match live.state.target_runs {
            Some(target) => format!("[INFO] Innings break, target {target}"),
            None => "[INFO] Innings break".to_string(),
        },
        (phase, _) => format!("[INFO] Now {phase}"),
    }
}
