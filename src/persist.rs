use std::path::Path;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::ball::{Delivery, DeliveryKind};
use crate::error::PersistenceError;
use crate::gateway::{
    MatchAggregates, MatchId, MatchListing, MatchSnapshot, PersistenceGateway, WriteOp,
};
use crate::innings::Innings;
use crate::match_state::MatchState;
use crate::over::Over;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed store. One connection per process; readers in other
/// processes see committed batches only.
pub struct SqliteGateway {
    conn: Connection,
}

impl SqliteGateway {
    pub fn open(path: &Path) -> Result<Self, PersistenceError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path).map_err(|e| {
            PersistenceError::storage("open database", format!("{}: {e}", path.display()))
        })?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, PersistenceError> {
        let conn = Connection::open_in_memory().map_err(db("open database"))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, PersistenceError> {
        conn.busy_timeout(BUSY_TIMEOUT).map_err(db("set busy timeout"))?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Raw access for maintenance tooling and tests.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

pub fn init_schema(conn: &Connection) -> Result<(), PersistenceError> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS matches (
            id TEXT PRIMARY KEY,
            match_name TEXT NULL,
            total_overs INTEGER NOT NULL,
            current_innings INTEGER NOT NULL DEFAULT 1,
            innings1_total_runs INTEGER NOT NULL DEFAULT 0,
            innings1_wickets INTEGER NOT NULL DEFAULT 0,
            innings1_current_over INTEGER NOT NULL DEFAULT 0,
            innings1_current_ball INTEGER NOT NULL DEFAULT 0,
            innings1_is_complete INTEGER NOT NULL DEFAULT 0,
            innings2_total_runs INTEGER NOT NULL DEFAULT 0,
            innings2_wickets INTEGER NOT NULL DEFAULT 0,
            innings2_current_over INTEGER NOT NULL DEFAULT 0,
            innings2_current_ball INTEGER NOT NULL DEFAULT 0,
            innings2_is_complete INTEGER NOT NULL DEFAULT 0,
            is_match_complete INTEGER NOT NULL DEFAULT 0,
            revision INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS overs (
            match_id TEXT NOT NULL,
            innings INTEGER NOT NULL,
            over_number INTEGER NOT NULL,
            total_runs INTEGER NOT NULL DEFAULT 0,
            legal_balls INTEGER NOT NULL DEFAULT 0,
            wickets INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (match_id, innings, over_number)
        );
        CREATE TABLE IF NOT EXISTS deliveries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            match_id TEXT NOT NULL,
            innings INTEGER NOT NULL,
            over_number INTEGER NOT NULL,
            runs INTEGER NOT NULL,
            is_wide INTEGER NOT NULL,
            is_no_ball INTEGER NOT NULL,
            is_wicket INTEGER NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_deliveries_over
            ON deliveries(match_id, innings, over_number);
        CREATE INDEX IF NOT EXISTS idx_matches_created ON matches(created_at);
        "#,
    )
    .map_err(db("init schema"))
}

impl PersistenceGateway for SqliteGateway {
    fn create_match(
        &mut self,
        total_overs: u32,
        name: Option<&str>,
    ) -> Result<MatchId, PersistenceError> {
        let match_id = Uuid::new_v4().to_string();
        let now = timestamp();
        let name = name.map(str::trim).filter(|n| !n.is_empty());

        let tx = self.conn.transaction().map_err(db("begin create match"))?;
        tx.execute(
            "INSERT INTO matches (id, match_name, total_overs, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![match_id, name, total_overs, now],
        )
        .map_err(db("insert match"))?;
        tx.execute(
            "INSERT INTO overs (match_id, innings, over_number) VALUES (?1, 1, 0)",
            params![match_id],
        )
        .map_err(db("insert first over"))?;
        tx.commit().map_err(db("commit create match"))?;

        info!(match_id = %match_id, total_overs, "match created");
        Ok(match_id)
    }

    fn load_match(&self, match_id: &str) -> Result<MatchSnapshot, PersistenceError> {
        let row = self
            .conn
            .query_row(
                r#"
                SELECT
                    id, match_name, total_overs, current_innings,
                    innings1_total_runs, innings1_wickets, innings1_current_over,
                    innings1_current_ball, innings1_is_complete,
                    innings2_total_runs, innings2_wickets, innings2_current_over,
                    innings2_current_ball, innings2_is_complete,
                    is_match_complete, revision, created_at
                FROM matches
                WHERE id = ?1
                "#,
                params![match_id],
                |row| {
                    Ok(MatchRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        total_overs: row.get(2)?,
                        current_innings: row.get(3)?,
                        innings: [
                            InningsRow {
                                total_runs: row.get(4)?,
                                wickets: row.get(5)?,
                                current_over: row.get(6)?,
                                current_ball: row.get(7)?,
                                is_complete: row.get(8)?,
                            },
                            InningsRow {
                                total_runs: row.get(9)?,
                                wickets: row.get(10)?,
                                current_over: row.get(11)?,
                                current_ball: row.get(12)?,
                                is_complete: row.get(13)?,
                            },
                        ],
                        is_match_complete: row.get(14)?,
                        revision: row.get(15)?,
                        created_at: row.get(16)?,
                    })
                },
            )
            .optional()
            .map_err(db("load match"))?
            .ok_or_else(|| not_found(match_id))?;

        let overs = load_over_rows(&self.conn, match_id)?;
        let deliveries = load_delivery_rows(&self.conn, match_id)?;
        let snapshot = convert_match(row, &overs, &deliveries)?;
        debug!(match_id, revision = snapshot.revision, "match loaded");
        Ok(snapshot)
    }

    fn list_matches(&self) -> Result<Vec<MatchListing>, PersistenceError> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT
                    id, match_name, total_overs, current_innings,
                    innings1_total_runs, innings1_wickets,
                    innings2_total_runs, innings2_wickets,
                    is_match_complete, created_at
                FROM matches
                ORDER BY created_at DESC, rowid DESC
                "#,
            )
            .map_err(db("prepare list matches"))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    [
                        row.get::<_, i64>(4)?,
                        row.get::<_, i64>(5)?,
                        row.get::<_, i64>(6)?,
                        row.get::<_, i64>(7)?,
                    ],
                    row.get::<_, i64>(8)?,
                    row.get::<_, String>(9)?,
                ))
            })
            .map_err(db("query list matches"))?;

        let mut out = Vec::new();
        for row in rows {
            let (match_id, name, total_overs, current_innings, scores, complete, created_at) =
                row.map_err(db("decode match listing"))?;
            out.push(MatchListing {
                match_id,
                name,
                total_overs: to_u32(total_overs, "total overs")?,
                current_innings: to_innings(current_innings)?,
                innings1_runs: to_u32(scores[0], "innings 1 runs")?,
                innings1_wickets: to_u32(scores[1], "innings 1 wickets")?,
                innings2_runs: to_u32(scores[2], "innings 2 runs")?,
                innings2_wickets: to_u32(scores[3], "innings 2 wickets")?,
                is_match_complete: to_flag(complete, "match complete flag")?,
                created_at,
            });
        }
        Ok(out)
    }

    fn delete_match(&mut self, match_id: &str) -> Result<(), PersistenceError> {
        let tx = self.conn.transaction().map_err(db("begin delete match"))?;
        tx.execute("DELETE FROM deliveries WHERE match_id = ?1", params![match_id])
            .map_err(db("delete deliveries"))?;
        tx.execute("DELETE FROM overs WHERE match_id = ?1", params![match_id])
            .map_err(db("delete overs"))?;
        let removed = tx
            .execute("DELETE FROM matches WHERE id = ?1", params![match_id])
            .map_err(db("delete match"))?;
        if removed == 0 {
            return Err(not_found(match_id));
        }
        tx.commit().map_err(db("commit delete match"))?;
        info!(match_id, "match deleted");
        Ok(())
    }

    fn revision(&self, match_id: &str) -> Result<u64, PersistenceError> {
        let revision = self
            .conn
            .query_row(
                "SELECT revision FROM matches WHERE id = ?1",
                params![match_id],
                |row| row.get::<_, i64>(0),
            )
            .optional()
            .map_err(db("read revision"))?
            .ok_or_else(|| not_found(match_id))?;
        to_u64(revision, "revision")
    }

    fn apply_writes(
        &mut self,
        match_id: &str,
        expected_revision: Option<u64>,
        ops: &[WriteOp],
    ) -> Result<u64, PersistenceError> {
        let now = timestamp();
        let expected = expected_revision
            .map(|rev| {
                i64::try_from(rev).map_err(|_| {
                    PersistenceError::malformed("revision", format!("{rev} too large"))
                })
            })
            .transpose()?;
        let tx = self.conn.transaction().map_err(db("begin write batch"))?;

        // Check and bump in one statement.
        let bumped = tx
            .execute(
                "UPDATE matches SET revision = revision + 1, updated_at = ?2
                 WHERE id = ?1 AND (?3 IS NULL OR revision = ?3)",
                params![match_id, now, expected],
            )
            .map_err(db("bump revision"))?;
        if bumped == 0 {
            let found = tx
                .query_row(
                    "SELECT revision FROM matches WHERE id = ?1",
                    params![match_id],
                    |row| row.get::<_, i64>(0),
                )
                .optional()
                .map_err(db("read revision"))?;
            return Err(match (found, expected_revision) {
                (Some(found), Some(expected)) => PersistenceError::Conflict {
                    match_id: match_id.to_string(),
                    expected,
                    found: to_u64(found, "revision")?,
                },
                _ => not_found(match_id),
            });
        }
        for op in ops {
            apply_op(&tx, match_id, op, &now)?;
        }
        let revision: i64 = tx
            .query_row(
                "SELECT revision FROM matches WHERE id = ?1",
                params![match_id],
                |row| row.get(0),
            )
            .map_err(db("read revision"))?;
        tx.commit().map_err(db("commit write batch"))?;

        debug!(match_id, ops = ops.len(), revision, "write batch committed");
        to_u64(revision, "revision")
    }
}

fn apply_op(
    conn: &Connection,
    match_id: &str,
    op: &WriteOp,
    now: &str,
) -> Result<(), PersistenceError> {
    match op {
        WriteOp::AppendDelivery {
            innings,
            over_number,
            delivery,
            updated_over,
        } => {
            let updated = conn
                .execute(
                    "UPDATE overs SET total_runs = ?4, legal_balls = ?5, wickets = ?6
                     WHERE match_id = ?1 AND innings = ?2 AND over_number = ?3",
                    params![
                        match_id,
                        innings,
                        over_number,
                        updated_over.total_runs,
                        updated_over.legal_balls,
                        updated_over.wickets
                    ],
                )
                .map_err(db("update over"))?;
            if updated == 0 {
                return Err(missing_over(*innings, *over_number));
            }
            conn.execute(
                "INSERT INTO deliveries
                    (match_id, innings, over_number, runs,
                     is_wide, is_no_ball, is_wicket, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    match_id,
                    innings,
                    over_number,
                    delivery.runs,
                    delivery.kind == DeliveryKind::Wide,
                    delivery.kind == DeliveryKind::NoBall,
                    delivery.kind == DeliveryKind::Wicket,
                    now
                ],
            )
            .map_err(db("insert delivery"))?;
        }
        WriteOp::StartOver {
            innings,
            over_number,
        } => {
            conn.execute(
                "INSERT INTO overs (match_id, innings, over_number) VALUES (?1, ?2, ?3)",
                params![match_id, innings, over_number],
            )
            .map_err(db("insert over"))?;
        }
        WriteOp::DeleteLastDelivery {
            innings,
            over_number,
        } => {
            let last: Option<i64> = conn
                .query_row(
                    "SELECT id FROM deliveries
                     WHERE match_id = ?1 AND innings = ?2 AND over_number = ?3
                     ORDER BY id DESC LIMIT 1",
                    params![match_id, innings, over_number],
                    |row| row.get(0),
                )
                .optional()
                .map_err(db("find last delivery"))?;
            let Some(id) = last else {
                return Err(PersistenceError::malformed(
                    "over",
                    format!("innings {innings} over {over_number} has no delivery to delete"),
                ));
            };
            conn.execute("DELETE FROM deliveries WHERE id = ?1", params![id])
                .map_err(db("delete delivery"))?;
            conn.execute(
                r#"
                UPDATE overs SET
                    total_runs = (
                        SELECT COALESCE(SUM(CASE
                            WHEN d.is_wide = 1 THEN 1
                            WHEN d.is_no_ball = 1 THEN d.runs + 1
                            ELSE d.runs END), 0)
                        FROM deliveries d
                        WHERE d.match_id = overs.match_id
                          AND d.innings = overs.innings
                          AND d.over_number = overs.over_number),
                    legal_balls = (
                        SELECT COUNT(*) FROM deliveries d
                        WHERE d.match_id = overs.match_id
                          AND d.innings = overs.innings
                          AND d.over_number = overs.over_number
                          AND d.is_wide = 0 AND d.is_no_ball = 0),
                    wickets = (
                        SELECT COUNT(*) FROM deliveries d
                        WHERE d.match_id = overs.match_id
                          AND d.innings = overs.innings
                          AND d.over_number = overs.over_number
                          AND d.is_wicket = 1)
                WHERE match_id = ?1 AND innings = ?2 AND over_number = ?3
                "#,
                params![match_id, innings, over_number],
            )
            .map_err(db("recompute over"))?;
        }
        WriteOp::DiscardOver {
            innings,
            over_number,
        } => {
            conn.execute(
                "DELETE FROM deliveries WHERE match_id = ?1 AND innings = ?2 AND over_number = ?3",
                params![match_id, innings, over_number],
            )
            .map_err(db("discard deliveries"))?;
            let removed = conn
                .execute(
                    "DELETE FROM overs WHERE match_id = ?1 AND innings = ?2 AND over_number = ?3",
                    params![match_id, innings, over_number],
                )
                .map_err(db("discard over"))?;
            if removed == 0 {
                return Err(missing_over(*innings, *over_number));
            }
        }
        WriteOp::UpdateAggregates(aggregates) => {
            update_aggregates(conn, match_id, aggregates, now)?
        }
        WriteOp::MarkInningsComplete { innings } => {
            let sql = match innings {
                1 => "UPDATE matches SET innings1_is_complete = 1, updated_at = ?2 WHERE id = ?1",
                2 => "UPDATE matches SET innings2_is_complete = 1, updated_at = ?2 WHERE id = ?1",
                other => return Err(bad_innings(i64::from(*other))),
            };
            conn.execute(sql, params![match_id, now])
                .map_err(db("mark innings complete"))?;
        }
        WriteOp::MarkMatchComplete => {
            conn.execute(
                "UPDATE matches SET is_match_complete = 1, updated_at = ?2 WHERE id = ?1",
                params![match_id, now],
            )
            .map_err(db("mark match complete"))?;
        }
    }
    Ok(())
}

fn update_aggregates(
    conn: &Connection,
    match_id: &str,
    aggregates: &MatchAggregates,
    now: &str,
) -> Result<(), PersistenceError> {
    let sql = match aggregates.innings.innings {
        1 => {
            "UPDATE matches SET current_innings = ?2, is_match_complete = ?3,
                innings1_total_runs = ?4, innings1_wickets = ?5, innings1_current_over = ?6,
                innings1_current_ball = ?7, innings1_is_complete = ?8, updated_at = ?9
             WHERE id = ?1"
        }
        2 => {
            "UPDATE matches SET current_innings = ?2, is_match_complete = ?3,
                innings2_total_runs = ?4, innings2_wickets = ?5, innings2_current_over = ?6,
                innings2_current_ball = ?7, innings2_is_complete = ?8, updated_at = ?9
             WHERE id = ?1"
        }
        other => return Err(bad_innings(i64::from(other))),
    };
    let inn = &aggregates.innings;
    let updated = conn
        .execute(
            sql,
            params![
                match_id,
                aggregates.current_innings,
                aggregates.is_match_complete,
                inn.total_runs,
                inn.wickets,
                inn.current_over,
                inn.current_ball,
                inn.is_complete,
                now
            ],
        )
        .map_err(db("update aggregates"))?;
    if updated == 0 {
        return Err(not_found(match_id));
    }
    Ok(())
}

struct MatchRow {
    id: String,
    name: Option<String>,
    total_overs: i64,
    current_innings: i64,
    innings: [InningsRow; 2],
    is_match_complete: i64,
    revision: i64,
    created_at: String,
}

struct InningsRow {
    total_runs: i64,
    wickets: i64,
    current_over: i64,
    current_ball: i64,
    is_complete: i64,
}

struct OverRow {
    innings: i64,
    over_number: i64,
    total_runs: i64,
    legal_balls: i64,
    wickets: i64,
}

struct DeliveryRow {
    innings: i64,
    over_number: i64,
    runs: i64,
    is_wide: i64,
    is_no_ball: i64,
    is_wicket: i64,
}

fn load_over_rows(conn: &Connection, match_id: &str) -> Result<Vec<OverRow>, PersistenceError> {
    let mut stmt = conn
        .prepare(
            "SELECT innings, over_number, total_runs, legal_balls, wickets
             FROM overs WHERE match_id = ?1
             ORDER BY innings ASC, over_number ASC",
        )
        .map_err(db("prepare load overs"))?;
    let rows = stmt
        .query_map(params![match_id], |row| {
            Ok(OverRow {
                innings: row.get(0)?,
                over_number: row.get(1)?,
                total_runs: row.get(2)?,
                legal_balls: row.get(3)?,
                wickets: row.get(4)?,
            })
        })
        .map_err(db("query overs"))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(db("decode over row"))?);
    }
    Ok(out)
}

fn load_delivery_rows(
    conn: &Connection,
    match_id: &str,
) -> Result<Vec<DeliveryRow>, PersistenceError> {
    let mut stmt = conn
        .prepare(
            "SELECT innings, over_number, runs, is_wide, is_no_ball, is_wicket
             FROM deliveries WHERE match_id = ?1
             ORDER BY id ASC",
        )
        .map_err(db("prepare load deliveries"))?;
    let rows = stmt
        .query_map(params![match_id], |row| {
            Ok(DeliveryRow {
                innings: row.get(0)?,
                over_number: row.get(1)?,
                runs: row.get(2)?,
                is_wide: row.get(3)?,
                is_no_ball: row.get(4)?,
                is_wicket: row.get(5)?,
            })
        })
        .map_err(db("query deliveries"))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(db("decode delivery row"))?);
    }
    Ok(out)
}

fn convert_match(
    row: MatchRow,
    overs: &[OverRow],
    deliveries: &[DeliveryRow],
) -> Result<MatchSnapshot, PersistenceError> {
    let total_overs = to_u32(row.total_overs, "total overs")?;
    if total_overs == 0 {
        return Err(PersistenceError::malformed("total overs", "must be at least 1"));
    }
    let [first, second] = &row.innings;
    let innings1 = convert_innings(1, first, overs, deliveries)?;
    let innings2 = convert_innings(2, second, overs, deliveries)?;
    let target_runs = innings1.is_complete.then_some(innings1.total_runs + 1);

    let state = MatchState {
        total_overs,
        current_innings: to_innings(row.current_innings)?,
        innings1,
        innings2,
        target_runs,
        is_match_complete: to_flag(row.is_match_complete, "match complete flag")?,
    };
    state
        .validate()
        .map_err(|err| PersistenceError::malformed("match", err.to_string()))?;

    Ok(MatchSnapshot {
        match_id: row.id,
        name: row.name,
        created_at: row.created_at,
        revision: to_u64(row.revision, "revision")?,
        state,
    })
}

fn convert_innings(
    number: u8,
    row: &InningsRow,
    overs: &[OverRow],
    deliveries: &[DeliveryRow],
) -> Result<Innings, PersistenceError> {
    let key = i64::from(number);

    let mut stored = Vec::new();
    for over in overs.iter().filter(|o| o.innings == key) {
        let over_number = to_u32(over.over_number, "over number")?;
        if over_number as usize != stored.len() {
            return Err(PersistenceError::malformed(
                "over",
                format!(
                    "innings {number} expected over {} but found {over_number}",
                    stored.len()
                ),
            ));
        }
        stored.push((over, Vec::new()));
    }

    for delivery in deliveries.iter().filter(|d| d.innings == key) {
        let over_number = to_u32(delivery.over_number, "delivery over number")?;
        let Some((_, balls)) = stored.get_mut(over_number as usize) else {
            return Err(PersistenceError::malformed(
                "delivery",
                format!("innings {number} delivery refers to missing over {over_number}"),
            ));
        };
        balls.push(convert_delivery(delivery)?);
    }

    let mut rebuilt = Vec::with_capacity(stored.len());
    for (idx, (row, balls)) in stored.into_iter().enumerate() {
        let over = Over::from_balls(balls);
        let persisted = (
            to_u32(row.total_runs, "over runs")?,
            to_u32(row.legal_balls, "over legal balls")?,
            to_u32(row.wickets, "over wickets")?,
        );
        if persisted != (over.total_runs, over.legal_balls, over.wickets) {
            return Err(PersistenceError::malformed(
                "over",
                format!("innings {number} over {idx} totals disagree with its deliveries"),
            ));
        }
        rebuilt.push(over);
    }

    Ok(Innings {
        overs: rebuilt,
        total_runs: to_u32(row.total_runs, "innings runs")?,
        wickets: to_u32(row.wickets, "innings wickets")?,
        current_over: to_u32(row.current_over, "current over")?,
        current_ball: to_u32(row.current_ball, "current ball")?,
        is_complete: to_flag(row.is_complete, "innings complete flag")?,
    })
}

fn convert_delivery(row: &DeliveryRow) -> Result<Delivery, PersistenceError> {
    let flags = (
        to_flag(row.is_wide, "wide flag")?,
        to_flag(row.is_no_ball, "no-ball flag")?,
        to_flag(row.is_wicket, "wicket flag")?,
    );
    let kind = match flags {
        (false, false, false) => DeliveryKind::Normal,
        (true, false, false) => DeliveryKind::Wide,
        (false, true, false) => DeliveryKind::NoBall,
        (false, false, true) => DeliveryKind::Wicket,
        (wide, no_ball, wicket) => {
            return Err(PersistenceError::malformed(
                "delivery",
                format!("contradictory flags wide={wide} no_ball={no_ball} wicket={wicket}"),
            ));
        }
    };
    Delivery::try_new(to_u32(row.runs, "delivery runs")?, kind)
        .map_err(|err| PersistenceError::malformed("delivery", err.to_string()))
}

fn to_u32(value: i64, what: &'static str) -> Result<u32, PersistenceError> {
    u32::try_from(value)
        .map_err(|_| PersistenceError::malformed(what, format!("{value} out of range")))
}

fn to_u64(value: i64, what: &'static str) -> Result<u64, PersistenceError> {
    u64::try_from(value)
        .map_err(|_| PersistenceError::malformed(what, format!("{value} out of range")))
}

fn to_flag(value: i64, what: &'static str) -> Result<bool, PersistenceError> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(PersistenceError::malformed(what, format!("{other} is not 0 or 1"))),
    }
}

fn to_innings(value: i64) -> Result<u8, PersistenceError> {
    match value {
        1 => Ok(1),
        2 => Ok(2),
        other => Err(bad_innings(other)),
    }
}

fn bad_innings(value: i64) -> PersistenceError {
    PersistenceError::malformed("innings number", format!("{value} is not 1 or 2"))
}

fn missing_over(innings: u8, over_number: u32) -> PersistenceError {
    PersistenceError::malformed(
        "over",
        format!("innings {innings} over {over_number} is not stored"),
    )
}

fn not_found(match_id: &str) -> PersistenceError {
    PersistenceError::NotFound {
        match_id: match_id.to_string(),
    }
}

fn db(op: &'static str) -> impl FnOnce(rusqlite::Error) -> PersistenceError {
    move |err| PersistenceError::storage(op, err)
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_match_loads_as_fresh_start() {
        let mut gateway = SqliteGateway::open_in_memory().unwrap();
        let id = gateway.create_match(5, Some(" Final ")).unwrap();
        let snapshot = gateway.load_match(&id).unwrap();
        assert_eq!(snapshot.state, MatchState::start(5).unwrap());
        assert_eq!(snapshot.name.as_deref(), Some("Final"));
        assert_eq!(snapshot.revision, 0);
    }

    #[test]
    fn unknown_match_is_not_found() {
        let mut gateway = SqliteGateway::open_in_memory().unwrap();
        assert!(matches!(
            gateway.load_match("nope").unwrap_err(),
            PersistenceError::NotFound { .. }
        ));
        assert!(matches!(
            gateway.revision("nope").unwrap_err(),
            PersistenceError::NotFound { .. }
        ));
        assert!(matches!(
            gateway.mark_match_complete("nope").unwrap_err(),
            PersistenceError::NotFound { .. }
        ));
    }

    #[test]
    fn each_batch_bumps_revision_once() {
        let mut gateway = SqliteGateway::open_in_memory().unwrap();
        let id = gateway.create_match(2, None).unwrap();
        let ball = Delivery::normal(2);
        let ops = vec![
            WriteOp::AppendDelivery {
                innings: 1,
                over_number: 0,
                delivery: ball,
                updated_over: Over::from_balls(vec![ball]),
            },
            WriteOp::UpdateAggregates(MatchAggregates {
                current_innings: 1,
                is_match_complete: false,
                innings: crate::gateway::InningsAggregates::of(
                    1,
                    MatchState::start(2).unwrap().with_delivery(ball).unwrap().batting(),
                ),
            }),
        ];
        assert_eq!(gateway.apply_writes(&id, Some(0), &ops).unwrap(), 1);
        assert_eq!(gateway.revision(&id).unwrap(), 1);
        assert_eq!(gateway.load_match(&id).unwrap().state.innings1.total_runs, 2);
    }

    #[test]
    fn stale_revision_writes_nothing() {
        let mut gateway = SqliteGateway::open_in_memory().unwrap();
        let id = gateway.create_match(2, None).unwrap();
        gateway.start_over(&id, 1, 1).unwrap();

        let ball = Delivery::normal(4);
        let ops = [WriteOp::AppendDelivery {
            innings: 1,
            over_number: 0,
            delivery: ball,
            updated_over: Over::from_balls(vec![ball]),
        }];
        let err = gateway.apply_writes(&id, Some(0), &ops).unwrap_err();
        assert_eq!(
            err,
            PersistenceError::Conflict {
                match_id: id.clone(),
                expected: 0,
                found: 1,
            }
        );
        assert_eq!(gateway.revision(&id).unwrap(), 1);
        let deliveries: i64 = gateway
            .connection()
            .query_row(
                "SELECT COUNT(*) FROM deliveries WHERE match_id = ?1",
                params![id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(deliveries, 0);

        let err = gateway.apply_writes("missing", Some(0), &ops).unwrap_err();
        assert!(matches!(err, PersistenceError::NotFound { .. }));
    }

    #[test]
    fn contradictory_flags_are_malformed() {
        let mut gateway = SqliteGateway::open_in_memory().unwrap();
        let id = gateway.create_match(2, None).unwrap();
        gateway
            .connection()
            .execute(
                "INSERT INTO deliveries
                    (match_id, innings, over_number, runs,
                     is_wide, is_no_ball, is_wicket, created_at)
                 VALUES (?1, 1, 0, 0, 1, 1, 0, 'x')",
                params![id],
            )
            .unwrap();
        let err = gateway.load_match(&id).unwrap_err();
        assert!(matches!(err, PersistenceError::Malformed { what: "delivery", .. }));
    }

    #[test]
    fn deleted_match_is_gone() {
        let mut gateway = SqliteGateway::open_in_memory().unwrap();
        let id = gateway.create_match(2, None).unwrap();
        assert_eq!(gateway.list_matches().unwrap().len(), 1);
        gateway.delete_match(&id).unwrap();
        assert!(gateway.list_matches().unwrap().is_empty());
        assert!(matches!(
            gateway.delete_match(&id).unwrap_err(),
            PersistenceError::NotFound { .. }
        ));
    }
}
