use std::io;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::prelude::*;
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use tracing::info;

use cricket_terminal::config::{self, AppConfig};
use cricket_terminal::gateway::short_id;
use cricket_terminal::logging;
use cricket_terminal::match_state::MatchPhase;
use cricket_terminal::scoreboard::{BallChip, Scoreboard};
use cricket_terminal::state::{AppState, Delta, Screen, ScorerCommand, SetupField, apply_delta};
use cricket_terminal::toss::flip_coin;
use cricket_terminal::worker::spawn_scoring_worker;

struct App {
    state: AppState,
    should_quit: bool,
    cmd_tx: Option<mpsc::Sender<ScorerCommand>>,
}

impl App {
    fn new(default_overs: u32, cmd_tx: Option<mpsc::Sender<ScorerCommand>>) -> Self {
        Self {
            state: AppState::new(default_overs),
            should_quit: false,
            cmd_tx,
        }
    }

    fn send(&mut self, cmd: ScorerCommand) {
        let Some(tx) = &self.cmd_tx else {
            return;
        };
        if tx.send(cmd).is_err() {
            self.state.pending = false;
            self.state.push_log("[WARN] Scoring worker is gone");
        }
    }

    /// Sends a command that answers with a reply delta; refused while one is
    /// still outstanding.
    fn send_tracked(&mut self, cmd: ScorerCommand) {
        if self.state.begin_command() {
            self.send(cmd);
        }
    }

    fn on_key(&mut self, key: KeyEvent) {
        if self.state.toss.is_some() {
            self.state.toss = None;
            return;
        }
        if self.state.help_overlay {
            if matches!(key.code, KeyCode::Char('?') | KeyCode::Esc) {
                self.state.help_overlay = false;
            }
            return;
        }
        match self.state.screen {
            Screen::Browser => self.on_browser_key(key),
            Screen::Setup => self.on_setup_key(key),
            Screen::Scoring => self.on_scoring_key(key),
            Screen::Watch => self.on_watch_key(key),
        }
    }

    fn on_browser_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('?') => self.state.help_overlay = true,
            KeyCode::Char('j') | KeyCode::Down => self.state.select_next(),
            KeyCode::Char('k') | KeyCode::Up => self.state.select_prev(),
            KeyCode::Char('n') => self.state.open_setup(),
            KeyCode::Char('r') => self.send(ScorerCommand::ListMatches),
            KeyCode::Enter | KeyCode::Char('s') => {
                if let Some(match_id) = self.state.selected_match_id() {
                    self.send_tracked(ScorerCommand::OpenMatch { match_id });
                }
            }
            KeyCode::Char('w') => {
                if let Some(match_id) = self.state.selected_match_id() {
                    self.send_tracked(ScorerCommand::Watch { match_id });
                }
            }
            KeyCode::Char('D') => {
                if let Some(match_id) = self.state.selected_match_id() {
                    self.send_tracked(ScorerCommand::DeleteMatch { match_id });
                }
            }
            _ => {}
        }
    }

    fn on_setup_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => self.state.screen = Screen::Browser,
            KeyCode::Tab | KeyCode::BackTab | KeyCode::Down | KeyCode::Up => {
                self.state.setup_toggle_field()
            }
            KeyCode::Backspace => self.state.setup_backspace(),
            KeyCode::Enter => match self.state.setup_command() {
                Ok(cmd) => self.send_tracked(cmd),
                Err(message) => self.state.last_error = Some(message),
            },
            KeyCode::Char(ch) => self.state.setup_input(ch),
            _ => {}
        }
    }

    fn on_scoring_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc if self.state.prompt.is_some() => self.state.prompt = None,
            KeyCode::Esc | KeyCode::Char('b') => self.leave_match(),
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('?') => self.state.help_overlay = true,
            KeyCode::Char('t') => self.toss(),
            KeyCode::Char('r') => self.send(ScorerCommand::Refresh),
            KeyCode::Char(ch) => {
                // Keys typed while a command is in flight are dropped, not queued.
                if !self.state.accepts_scoring_input() {
                    return;
                }
                if let Some(cmd) = self.state.scoring_key(ch) {
                    self.send_tracked(cmd);
                }
            }
            _ => {}
        }
    }

    fn on_watch_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc | KeyCode::Char('b') => self.leave_match(),
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('?') => self.state.help_overlay = true,
            KeyCode::Char('r') => self.send(ScorerCommand::Refresh),
            _ => {}
        }
    }

    fn leave_match(&mut self) {
        self.state.close_match();
        self.send(ScorerCommand::CloseMatch);
        self.send(ScorerCommand::ListMatches);
    }

    fn toss(&mut self) {
        let fresh = self.state.live.as_ref().is_some_and(|live| {
            live.state.phase() == MatchPhase::InInnings1
                && live.state.innings1.overs.iter().all(|over| over.balls.is_empty())
        });
        if !fresh {
            self.state.push_log("[INFO] The toss happens before the first ball");
            return;
        }
        let face = flip_coin(&mut rand::thread_rng());
        self.state.push_log(format!("[INFO] Toss: {face}"));
        self.state.toss = Some(face);
    }
}

fn main() -> Result<()> {
    AppConfig::load_env_files();
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let config = match config::db_path_arg(&args) {
        Some(path) => AppConfig::for_db(path),
        None => AppConfig::from_env()?,
    };
    logging::init_file_logging(&config.log_path)?;
    info!(db = %config.db_path.display(), "cricket terminal starting");

    let (tx, rx) = mpsc::channel();
    let (cmd_tx, cmd_rx) = mpsc::channel();
    let default_overs = config.default_overs;
    spawn_scoring_worker(config, tx, cmd_rx);

    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("enter alternate screen")?;
    let backend = ratatui::backend::CrosstermBackend::new(stdout);
    let mut terminal = ratatui::Terminal::new(backend)?;

    let mut app = App::new(default_overs, Some(cmd_tx));
    let res = run_app(&mut terminal, &mut app, rx);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        eprintln!("error: {err}");
    }
    Ok(())
}

fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    rx: mpsc::Receiver<Delta>,
) -> io::Result<()> {
    let tick_rate = Duration::from_millis(250);
    let mut last_tick = Instant::now();

    loop {
        while let Ok(delta) = rx.try_recv() {
            apply_delta(&mut app.state, delta);
        }

        terminal.draw(|f| ui(f, app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);
        if event::poll(timeout)?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            app.on_key(key);
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

fn ui(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(4),
        ])
        .split(frame.size());

    let header = Paragraph::new(header_text(&app.state))
        .block(Block::default().borders(Borders::BOTTOM));
    frame.render_widget(header, chunks[0]);

    match app.state.screen {
        Screen::Browser => render_browser(frame, chunks[1], &app.state),
        Screen::Setup => render_setup(frame, chunks[1], &app.state),
        Screen::Scoring | Screen::Watch => render_match(frame, chunks[1], &app.state),
    }

    render_footer(frame, chunks[2], &app.state);

    if app.state.help_overlay {
        render_help_overlay(frame, frame.size());
    }
    if let Some(face) = app.state.toss {
        let area = centered_rect(30, 20, frame.size());
        frame.render_widget(Clear, area);
        let text = format!("\n{face}\n\nany key to continue");
        let popup = Paragraph::new(text)
            .alignment(Alignment::Center)
            .block(Block::default().title("Toss").borders(Borders::ALL));
        frame.render_widget(popup, area);
    }
}

fn header_text(state: &AppState) -> String {
    let title = match (state.screen, state.live.as_ref()) {
        (Screen::Browser, _) => format!("CRICKET | {} matches", state.matches.len()),
        (Screen::Setup, _) => "CRICKET | New match".to_string(),
        (Screen::Scoring, Some(live)) => format!("CRICKET | Scoring {}", live.title()),
        (Screen::Watch, Some(live)) => {
            format!("CRICKET | Watching {} (rev {})", live.title(), live.revision)
        }
        (_, None) => "CRICKET".to_string(),
    };
    let status = if state.pending { " | saving..." } else { "" };
    let line1 = format!("   ()   {title}{status}");
    let line2 = "  |||".to_string();
    let line3 = "  |||".to_string();
    format!("{line1}\n{line2}\n{line3}")
}

fn footer_keys(state: &AppState) -> &'static str {
    match state.screen {
        Screen::Browser => {
            concat!(
                "j/k/↑/↓ Move | n New | Enter/s Score | w Watch ",
                "| D Delete | r Refresh | ? Help | q Quit"
            )
        }
        Screen::Setup => "Tab Field | Enter Create | Esc Back",
        Screen::Scoring if state.prompt.is_some() => "No-ball: runs off the bat 0-6 | Esc Cancel",
        Screen::Scoring => {
            concat!(
                "0-6 Runs | w Wide | n No-ball | x Wicket | u Undo ",
                "| e End inns | s Start inns 2 | t Toss | b Back"
            )
        }
        Screen::Watch => "r Refresh | b/Esc Back | ? Help | q Quit",
    }
}

fn render_footer(frame: &mut Frame, area: Rect, state: &AppState) {
    let mut lines = vec![Line::from(footer_keys(state))];
    if let Some(err) = &state.last_error {
        lines.push(Line::styled(err.clone(), Style::default().fg(Color::Red)));
    }
    let room = (area.height as usize).saturating_sub(1 + lines.len());
    let start = state.logs.len().saturating_sub(room);
    for log in state.logs.iter().skip(start) {
        lines.push(Line::styled(log.clone(), Style::default().fg(Color::DarkGray)));
    }
    let footer = Paragraph::new(lines).block(Block::default().borders(Borders::TOP));
    frame.render_widget(footer, area);
}

fn render_browser(frame: &mut Frame, area: Rect, state: &AppState) {
    let sections = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(1)])
        .split(area);

    let widths = browser_columns();
    let header_cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(widths)
        .split(sections[0]);
    let header_style = Style::default().add_modifier(Modifier::BOLD);
    for (col, label) in header_cols
        .iter()
        .zip(["Match", "Score", "Overs", "Status", "Created"])
    {
        render_cell_text(frame, *col, label, header_style);
    }

    let list_area = sections[1];
    if state.matches.is_empty() {
        let empty = Paragraph::new("No matches yet. Press n to start one.")
            .style(Style::default().fg(Color::DarkGray));
        frame.render_widget(empty, list_area);
        return;
    }

    let visible = list_area.height as usize;
    let (start, end) = visible_range(state.selected, state.matches.len(), visible);
    for (i, idx) in (start..end).enumerate() {
        let row_area = Rect {
            x: list_area.x,
            y: list_area.y + i as u16,
            width: list_area.width,
            height: 1,
        };
        let selected = idx == state.selected;
        let row_style = if selected {
            Style::default().fg(Color::White).bg(Color::DarkGray)
        } else {
            Style::default()
        };
        if selected {
            frame.render_widget(Block::default().style(row_style), row_area);
        }

        let cols = Layout::default()
            .direction(Direction::Horizontal)
            .constraints(widths)
            .split(row_area);
        let m = &state.matches[idx];
        let status = if m.is_match_complete {
            "Complete".to_string()
        } else {
            format!("Innings {}", m.current_innings)
        };
        let created = m
            .created_at
            .get(..16)
            .unwrap_or(m.created_at.as_str())
            .replace('T', " ");

        render_cell_text(frame, cols[0], &m.display_name(), row_style);
        render_cell_text(frame, cols[1], &m.score_line(), row_style);
        render_cell_text(frame, cols[2], &m.total_overs.to_string(), row_style);
        render_cell_text(frame, cols[3], &status, row_style);
        render_cell_text(frame, cols[4], &created, row_style);
    }
}

fn browser_columns() -> [Constraint; 5] {
    [
        Constraint::Min(20),
        Constraint::Length(16),
        Constraint::Length(7),
        Constraint::Length(12),
        Constraint::Length(18),
    ]
}

fn render_setup(frame: &mut Frame, area: Rect, state: &AppState) {
    let field_style = |field: SetupField| {
        if state.setup.field == field {
            Style::default().fg(Color::Black).bg(Color::Yellow)
        } else {
            Style::default()
        }
    };
    let lines = vec![
        Line::from(""),
        Line::from(vec![
            Span::raw("  Name (optional): "),
            Span::styled(format!(" {} ", state.setup.name), field_style(SetupField::Name)),
        ]),
        Line::from(""),
        Line::from(vec![
            Span::raw("  Overs per innings: "),
            Span::styled(format!(" {} ", state.setup.overs), field_style(SetupField::Overs)),
            Span::styled(
                format!("  (1-{})", config::MAX_OVERS),
                Style::default().fg(Color::DarkGray),
            ),
        ]),
    ];
    let form = Paragraph::new(lines)
        .block(Block::default().title("New match").borders(Borders::ALL));
    frame.render_widget(form, area);
}

fn render_match(frame: &mut Frame, area: Rect, state: &AppState) {
    let (Some(live), Some(board)) = (state.live.as_ref(), state.scoreboard()) else {
        let empty = Paragraph::new("Loading match...").style(Style::default().fg(Color::DarkGray));
        frame.render_widget(empty, area);
        return;
    };

    let sections = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(area);

    let mut lines = vec![
        Line::from(vec![
            Span::styled(
                format!("Innings {}  ", board.batting_innings),
                Style::default().add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                board.score.clone(),
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            ),
            Span::raw(format!("  ({} ov)", board.overs)),
        ]),
        Line::from(format!("Run rate {}", board.run_rate)),
    ];
    if let Some(chase) = &board.chase {
        lines.push(Line::from(format!(
            "Target {} | need {} off {} | RRR {}",
            chase.target, chase.runs_required, chase.balls_remaining, chase.required_rate
        )));
    }
    if let Some(first) = &board.first_innings {
        lines.push(Line::from(format!("Innings 1: {first}")));
    }
    lines.push(Line::from(""));
    let mut strip = vec![Span::raw("This over: ")];
    strip.extend(ball_spans(&board.this_over));
    lines.push(Line::from(strip));
    lines.push(Line::from(""));
    lines.push(Line::styled(
        phase_hint(&board, state.screen),
        Style::default().fg(Color::Yellow),
    ));
    if let Some(result) = &board.result {
        lines.push(Line::styled(
            result.clone(),
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        ));
    }
    if state.screen == Screen::Scoring {
        lines.push(Line::from(""));
        lines.push(Line::styled(
            format!(
                "Undo: {} ({} step(s))",
                if live.can_undo { "available" } else { "none" },
                live.history_depth
            ),
            Style::default().fg(Color::DarkGray),
        ));
    }
    lines.push(Line::styled(
        format!("id {}", short_id(&live.match_id)),
        Style::default().fg(Color::DarkGray),
    ));

    let title = if state.screen == Screen::Watch {
        "Scoreboard (read-only)"
    } else {
        "Scoreboard"
    };
    let scoreboard = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().title(title).borders(Borders::ALL));
    frame.render_widget(scoreboard, sections[0]);

    let inner_height = sections[1].height.saturating_sub(2) as usize;
    let skip = board.completed_overs.len().saturating_sub(inner_height);
    let over_lines: Vec<Line> = board
        .completed_overs
        .iter()
        .skip(skip)
        .map(|over| {
            let mut spans = vec![Span::raw(format!("{}  ", over.summary()))];
            spans.extend(ball_spans(&over.balls));
            Line::from(spans)
        })
        .collect();
    let overs = Paragraph::new(over_lines)
        .block(Block::default().title("Overs").borders(Borders::ALL));
    frame.render_widget(overs, sections[1]);
}

fn phase_hint(board: &Scoreboard, screen: Screen) -> String {
    match (board.phase, screen) {
        (MatchPhase::Innings1Complete, Screen::Scoring) => {
            "Innings break. Press s to start innings 2.".to_string()
        }
        (MatchPhase::Innings1Complete, _) => "Innings break".to_string(),
        (MatchPhase::MatchComplete, _) => "Match complete".to_string(),
        (phase, _) => format!("{phase}"),
    }
}

fn ball_spans(balls: &[BallChip]) -> Vec<Span<'static>> {
    balls
        .iter()
        .map(|ball| {
            let style = match ball.label.as_str() {
                "W" => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                "4" | "6" => Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
                _ if ball.highlight => Style::default().fg(Color::Yellow),
                _ => Style::default(),
            };
            Span::styled(format!("{} ", ball.label), style)
        })
        .collect()
}

fn render_cell_text(frame: &mut Frame, area: Rect, text: &str, style: Style) {
    let cell = Paragraph::new(text.to_string()).style(style);
    frame.render_widget(cell, area);
}

fn visible_range(selected: usize, total: usize, visible: usize) -> (usize, usize) {
    if total == 0 || visible == 0 {
        return (0, 0);
    }
    let start = selected.saturating_sub(visible.saturating_sub(1)).min(total - 1);
    let end = (start + visible).min(total);
    (start, end)
}

fn render_help_overlay(frame: &mut Frame, area: Rect) {
    let popup_area = centered_rect(60, 70, area);
    frame.render_widget(Clear, popup_area);

    let text = [
        "Cricket Terminal - Help",
        "",
        "Matches:",
        "  j/k or ↑/↓   Move",
        "  n            New match",
        "  Enter / s    Score selected match",
        "  w            Watch selected match",
        "  D            Delete selected match",
        "",
        "Scoring:",
        "  0-6          Runs off the bat",
        "  w            Wide (1 run, ball re-bowled)",
        "  n then 0-6   No-ball plus runs",
        "  x            Wicket",
        "  u            Undo last action",
        "  e            End innings 1 early",
        "  s            Start innings 2",
        "  t            Coin toss",
        "",
        "  r            Refresh",
        "  b / Esc      Back",
        "  ?            Toggle help",
        "  q            Quit",
    ]
    .join("\n");

    let help = Paragraph::new(text)
        .block(Block::default().title("Help").borders(Borders::ALL))
        .style(Style::default());
    frame.render_widget(help, popup_area);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1]);

    horizontal[1]
}
