use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

const APP_DIR: &str = "cricket_terminal";
const DB_FILE: &str = "matches.sqlite";
const LOG_FILE: &str = "cricket_terminal.log";

pub const DEFAULT_OVERS: u32 = 20;
pub const MAX_OVERS: u32 = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub log_path: PathBuf,
    pub watch_poll: Duration,
    pub default_overs: u32,
}

impl AppConfig {
    /// Reads `.env.local` then `.env`; variables already set win.
    pub fn load_env_files() {
        let _ = dotenvy::from_filename(".env.local");
        let _ = dotenvy::from_filename(".env");
    }

    pub fn from_env() -> Result<Self> {
        let db_path = opt_env("CRICKET_DB")
            .map(PathBuf::from)
            .or_else(default_db_path)
            .context("unable to resolve sqlite path; set CRICKET_DB")?;
        Ok(Self::for_db(db_path))
    }

    /// Builds the config around an explicit database path; the rest still
    /// comes from the environment.
    pub fn for_db(db_path: PathBuf) -> Self {
        let log_path = opt_env("CRICKET_LOG_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| db_path.with_file_name(LOG_FILE));
        let watch_poll = Duration::from_secs(
            env::var("WATCH_POLL_SECS")
                .ok()
                .and_then(|val| val.parse::<u64>().ok())
                .unwrap_or(15)
                .max(5),
        );
        let default_overs = env::var("DEFAULT_OVERS")
            .ok()
            .and_then(|val| val.parse::<u32>().ok())
            .unwrap_or(DEFAULT_OVERS)
            .clamp(1, MAX_OVERS);
        Self {
            db_path,
            log_path,
            watch_poll,
            default_overs,
        }
    }
}

pub fn app_data_dir() -> Option<PathBuf> {
    if let Some(base) = opt_env("XDG_CACHE_HOME") {
        return Some(PathBuf::from(base).join(APP_DIR));
    }
    let home = opt_env("HOME")?;
    Some(PathBuf::from(home).join(".cache").join(APP_DIR))
}

pub fn default_db_path() -> Option<PathBuf> {
    app_data_dir().map(|dir| dir.join(DB_FILE))
}

/// `--db <path>` or `--db=<path>`.
pub fn db_path_arg(args: &[String]) -> Option<PathBuf> {
    for (idx, arg) in args.iter().enumerate() {
        if let Some(path) = arg.strip_prefix("--db=") {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Some(PathBuf::from(trimmed));
            }
        }
        if arg == "--db" {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() {
                return Some(PathBuf::from(next));
            }
        }
    }
    None
}

fn opt_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .and_then(|val| if val.trim().is_empty() { None } else { Some(val) })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn db_flag_accepts_both_forms() {
        assert_eq!(
            db_path_arg(&args(&["list", "--db", "/tmp/a.sqlite"])),
            Some(PathBuf::from("/tmp/a.sqlite"))
        );
        assert_eq!(
            db_path_arg(&args(&["--db=/tmp/b.sqlite", "show"])),
            Some(PathBuf::from("/tmp/b.sqlite"))
        );
        assert_eq!(db_path_arg(&args(&["--db"])), None);
        assert_eq!(db_path_arg(&args(&["--db=  "])), None);
    }

    #[test]
    fn log_file_defaults_next_to_the_database() {
        let config = AppConfig::for_db(PathBuf::from("/data/cricket/matches.sqlite"));
        if env::var("CRICKET_LOG_FILE").is_err() {
            assert_eq!(
                config.log_path,
                PathBuf::from("/data/cricket/cricket_terminal.log")
            );
        }
        assert!(config.watch_poll >= Duration::from_secs(5));
        assert!((1..=MAX_OVERS).contains(&config.default_overs));
    }
}
