use std::path::Path;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{info, warn};

use cricket_terminal::config::{self, AppConfig};
use cricket_terminal::demo_feed::play_demo_match;
use cricket_terminal::logging;
use cricket_terminal::notify::MatchChanged;
use cricket_terminal::persist::SqliteGateway;
use cricket_terminal::scorer::Scorer;
use cricket_terminal::spectator::Spectator;

fn main() -> Result<()> {
    AppConfig::load_env_files();
    logging::init_stderr_logging()?;

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let config = match config::db_path_arg(&args) {
        Some(path) => AppConfig::for_db(path),
        None => AppConfig::from_env()?,
    };
    let overs = parse_u64_arg(&args, "--overs")?
        .map(|v| v.clamp(1, u64::from(config::MAX_OVERS)) as u32)
        .unwrap_or(config.default_overs);
    let pace = Duration::from_millis(parse_u64_arg(&args, "--pace-ms")?.unwrap_or(1500));
    let seed = parse_u64_arg(&args, "--seed")?;
    let name = parse_str_arg(&args, "--name").unwrap_or_else(|| "Demo match".to_string());

    let mut gateway = SqliteGateway::open(&config.db_path)
        .with_context(|| format!("open match store {}", config.db_path.display()))?;

    let (change_tx, change_rx) = mpsc::channel();
    let mut scorer = Scorer::create_with(&mut gateway, overs, Some(&name), change_tx)
        .context("create demo match")?;
    println!("Demo match {} ({overs} overs)", scorer.match_id());
    println!("Watch it from the terminal app, or: match_admin show {}", scorer.match_id());

    let printer = spawn_printer(&config.db_path, scorer.match_id().to_string(), change_rx)?;

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let result = play_demo_match(&mut scorer, &mut gateway, &mut rng, pace)
        .context("play demo match")?;
    info!(match_id = %scorer.match_id(), %result, "demo match finished");

    // Closing the notifier ends the printer.
    drop(scorer);
    if printer.join().is_err() {
        warn!("scoreboard printer panicked");
    }
    println!("{result}");
    Ok(())
}

/// Follows the match through its own connection, the way a separate
/// spectator process would.
fn spawn_printer(
    db_path: &Path,
    match_id: String,
    change_rx: mpsc::Receiver<MatchChanged>,
) -> Result<thread::JoinHandle<()>> {
    let gateway = SqliteGateway::open(db_path)
        .with_context(|| format!("open spectator connection {}", db_path.display()))?;
    Ok(thread::spawn(move || {
        let mut spectator = Spectator::new(match_id);
        for event in change_rx {
            match spectator.on_change(&event, &gateway) {
                Ok(true) => {
                    if let Some(board) = spectator.scoreboard() {
                        let last = board
                            .this_over
                            .last()
                            .map(|b| b.label.clone())
                            .unwrap_or_default();
                        println!("{:<4} {}", last, board.headline());
                    }
                }
                Ok(false) => {}
                Err(err) => warn!(error = %err, "spectator reload failed"),
            }
        }
    }))
}

fn parse_u64_arg(args: &[String], flag: &str) -> Result<Option<u64>> {
    let Some(raw) = parse_str_arg(args, flag) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<u64>()
        .map(Some)
        .map_err(|_| anyhow!("{flag} expects a number, got {raw:?}"))
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    let prefix = format!("{flag}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(value) = arg.strip_prefix(&prefix) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == flag {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() {
                return Some(next.clone());
            }
        }
    }
    None
}
