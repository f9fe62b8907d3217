use anyhow::{Context, Result, anyhow, bail};

use cricket_terminal::config::{self, AppConfig};
use cricket_terminal::gateway::{PersistenceGateway, short_id};
use cricket_terminal::logging;
use cricket_terminal::persist::SqliteGateway;
use cricket_terminal::scoreboard::Scoreboard;

const USAGE: &str =
    "usage: match_admin [--db PATH] <list | show MATCH_ID [--json] | delete MATCH_ID>";

fn main() -> Result<()> {
    AppConfig::load_env_files();
    logging::init_stderr_logging()?;

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let db_path = match config::db_path_arg(&args) {
        Some(path) => path,
        None => AppConfig::from_env()?.db_path,
    };
    let positional = positional_args(&args);
    let json = args.iter().any(|a| a == "--json");

    let mut gateway = SqliteGateway::open(&db_path)
        .with_context(|| format!("open match store {}", db_path.display()))?;

    match positional.as_slice() {
        ["list"] | [] => list(&gateway),
        ["show", id] => show(&gateway, &resolve_id(&gateway, id)?, json),
        ["delete", id] => {
            let match_id = resolve_id(&gateway, id)?;
            gateway
                .delete_match(&match_id)
                .with_context(|| format!("delete match {match_id}"))?;
            println!("Deleted {match_id}");
            Ok(())
        }
        _ => bail!("{USAGE}"),
    }
}

fn list(gateway: &SqliteGateway) -> Result<()> {
    let matches = gateway.list_matches().context("list matches")?;
    if matches.is_empty() {
        println!("No matches stored");
        return Ok(());
    }
    for m in matches {
        let status = if m.is_match_complete {
            "complete".to_string()
        } else {
            format!("innings {}", m.current_innings)
        };
        println!(
            "{}  {:<24} {:>14}  {:>2} ov  {:<10} {}",
            short_id(&m.match_id),
            m.display_name(),
            m.score_line(),
            m.total_overs,
            status,
            m.created_at
        );
    }
    Ok(())
}

fn show(gateway: &SqliteGateway, match_id: &str, json: bool) -> Result<()> {
    let snapshot = gateway
        .load_match(match_id)
        .with_context(|| format!("load match {match_id}"))?;
    let board = Scoreboard::from_state(&snapshot.state);

    if json {
        let out = serde_json::json!({
            "match": snapshot,
            "scoreboard": board,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Match {} (revision {})", snapshot.match_id, snapshot.revision);
    if let Some(name) = &snapshot.name {
        println!("Name: {name}");
    }
    println!("{}", board.headline());
    println!("Run rate: {}", board.run_rate);
    if let Some(first) = &board.first_innings {
        println!("Innings 1: {first}");
    }
    if let Some(chase) = &board.chase {
        println!(
            "Target {}: need {} off {} balls (RRR {})",
            chase.target, chase.runs_required, chase.balls_remaining, chase.required_rate
        );
    }
    for over in &board.completed_overs {
        let balls = over
            .balls
            .iter()
            .map(|b| b.label.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        println!("  {}  [{balls}]", over.summary());
    }
    if !board.this_over.is_empty() {
        let balls = board
            .this_over
            .iter()
            .map(|b| b.label.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        println!("  This over: [{balls}]");
    }
    match &board.result {
        Some(result) => println!("Result: {result}"),
        None => println!("Status: {}", board.phase),
    }
    Ok(())
}

/// Accepts a full id or the 8-character prefix the listings print.
fn resolve_id(gateway: &SqliteGateway, raw: &str) -> Result<String> {
    let raw = raw.trim();
    let hits = gateway
        .list_matches()
        .context("list matches")?
        .into_iter()
        .filter(|m| m.match_id == raw || m.match_id.starts_with(raw))
        .map(|m| m.match_id)
        .collect::<Vec<_>>();
    match hits.as_slice() {
        [one] => Ok(one.clone()),
        [] => Err(anyhow!("no match with id {raw}")),
        _ => Err(anyhow!("id prefix {raw} is ambiguous")),
    }
}

fn positional_args(args: &[String]) -> Vec<&str> {
    let mut out = Vec::new();
    let mut skip_next = false;
    for arg in args {
        if skip_next {
            skip_next = false;
            continue;
        }
        if arg == "--db" {
            skip_next = true;
            continue;
        }
        if arg.starts_with("--") {
            continue;
        }
        out.push(arg.as_str());
    }
    out
}
