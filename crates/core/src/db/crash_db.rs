use std::path::Path;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use thiserror::Error;

use crate::db::{CrashHistoryRecord, CrashStatistics};
use crate::model::AnalysisResult;

/// Minimum schema version we know how to handle.
///
/// `0` means "no schema yet" (fresh DB).
const MIN_SUPPORTED_SCHEMA_VERSION: i32 = 0;

/// Latest schema version this crate knows about.
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

const TOP_N: i64 = 5;

/// Error type for crash history database operations.
#[derive(Debug, Error)]
pub enum DbError {
    /// Underlying SQLite error.
    #[error("SQLite error: {0}")]
    Sql(#[from] rusqlite::Error),

    /// Stored analysis could not be (de)serialized.
    #[error("Failed to encode analysis result: {0}")]
    Json(#[from] serde_json::Error),

    /// The database was created with a newer schema version than we support.
    #[error(
        "Unsupported schema version {found}; supported range is {min_supported}..={max_supported}"
    )]
    UnsupportedSchemaVersion { found: i32, min_supported: i32, max_supported: i32 },
}

/// Convenience result type for DB operations.
pub type DbResult<T> = Result<T, DbError>;

/// Timestamps are stored as second-precision RFC 3339 in UTC so that string
/// comparison in SQL matches chronological order.
pub fn format_timestamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn cutoff(days: u32) -> String {
    format_timestamp(Utc::now() - Duration::days(i64::from(days)))
}

/// SQLite-backed crash history.
///
/// Thin wrapper around `rusqlite::Connection` that opens/creates the file,
/// applies schema migrations and exposes small query helpers.
#[derive(Debug)]
pub struct CrashDb {
    conn: Connection,
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, dump_file_path, dump_hash, crash_time, bugcheck_code, bugcheck_name,
           suspected_driver, confidence, analysis_result, ai_analysis, created_at
    FROM crash_history
"#;

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<CrashHistoryRecord> {
    let code: i64 = row.get(4)?;
    Ok(CrashHistoryRecord {
        id: row.get(0)?,
        dump_file_path: row.get(1)?,
        dump_hash: row.get(2)?,
        crash_time: row.get(3)?,
        bugcheck_code: code as u32,
        bugcheck_name: row.get(5)?,
        suspected_driver: row.get(6)?,
        confidence: row.get(7)?,
        analysis_result: row.get(8)?,
        ai_analysis: row.get(9)?,
        created_at: row.get(10)?,
    })
}

impl CrashDb {
    /// Open (or create) a crash database at the given path and ensure the schema exists.
    pub fn open(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        apply_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// In-memory database, mostly for tests.
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        apply_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Expose a reference to the underlying connection for advanced callers.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Persist an analysis and return its row id.
    pub fn save_analysis(&self, result: &AnalysisResult, dump_hash: Option<&str>) -> DbResult<i64> {
        let json = serde_json::to_string(result)?;
        self.conn.execute(
            r#"
            INSERT INTO crash_history (
                dump_file_path, dump_hash, crash_time, bugcheck_code, bugcheck_name,
                suspected_driver, confidence, analysis_result, ai_analysis, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                result.dump_file,
                dump_hash,
                format_timestamp(result.system_info.timestamp),
                i64::from(result.crash_info.bugcheck_code),
                result.crash_info.bugcheck_name,
                result.suspected_driver.as_ref().map(|m| m.name.as_str()),
                result.confidence,
                json,
                result.ai_analysis,
                format_timestamp(Utc::now()),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Most recent crashes first, optionally restricted to the last `days` days.
    pub fn crash_history(&self, limit: usize, days: Option<u32>) -> DbResult<Vec<CrashHistoryRecord>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut out = Vec::new();
        match days {
            Some(days) => {
                let sql = format!(
                    "{SELECT_COLUMNS} WHERE crash_time >= ?1 ORDER BY crash_time DESC, id DESC LIMIT ?2"
                );
                let mut stmt = self.conn.prepare(&sql)?;
                let rows = stmt.query_map(params![cutoff(days), limit], record_from_row)?;
                for row in rows {
                    out.push(row?);
                }
            }
            None => {
                let sql = format!("{SELECT_COLUMNS} ORDER BY crash_time DESC, id DESC LIMIT ?1");
                let mut stmt = self.conn.prepare(&sql)?;
                let rows = stmt.query_map(params![limit], record_from_row)?;
                for row in rows {
                    out.push(row?);
                }
            }
        }
        Ok(out)
    }

    pub fn get_by_id(&self, id: i64) -> DbResult<Option<CrashHistoryRecord>> {
        let sql = format!("{SELECT_COLUMNS} WHERE id = ?1");
        let record = self.conn.query_row(&sql, params![id], record_from_row).optional()?;
        Ok(record)
    }

    /// Whether a dump with this content hash was already recorded.
    pub fn contains_hash(&self, dump_hash: &str) -> DbResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM crash_history WHERE dump_hash = ?1",
            params![dump_hash],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Totals and top bugchecks/drivers over the last `days` days.
    pub fn statistics(&self, days: u32) -> DbResult<CrashStatistics> {
        let since = cutoff(days);
        let total: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM crash_history WHERE crash_time >= ?1",
            params![since],
            |row| row.get(0),
        )?;

        let mut top_bugchecks = Vec::new();
        {
            let mut stmt = self.conn.prepare(
                r#"
                SELECT bugcheck_code, bugcheck_name, COUNT(*) AS count
                FROM crash_history
                WHERE crash_time >= ?1
                GROUP BY bugcheck_code, bugcheck_name
                ORDER BY count DESC, bugcheck_code
                LIMIT ?2
                "#,
            )?;
            let rows = stmt.query_map(params![since, TOP_N], |row| {
                let code: i64 = row.get(0)?;
                let count: i64 = row.get(2)?;
                Ok((code as u32, row.get::<_, String>(1)?, count as usize))
            })?;
            for row in rows {
                top_bugchecks.push(row?);
            }
        }

        let mut top_drivers = Vec::new();
        {
            let mut stmt = self.conn.prepare(
                r#"
                SELECT suspected_driver, COUNT(*) AS count
                FROM crash_history
                WHERE crash_time >= ?1 AND suspected_driver IS NOT NULL
                GROUP BY suspected_driver
                ORDER BY count DESC, suspected_driver
                LIMIT ?2
                "#,
            )?;
            let rows = stmt.query_map(params![since, TOP_N], |row| {
                let count: i64 = row.get(1)?;
                Ok((row.get::<_, String>(0)?, count as usize))
            })?;
            for row in rows {
                top_drivers.push(row?);
            }
        }

        Ok(CrashStatistics { total_crashes: total as usize, top_bugchecks, top_drivers, days })
    }

    /// Delete crashes older than `days` days; returns the number of rows removed.
    pub fn clear_old_records(&self, days: u32) -> DbResult<usize> {
        let deleted = self
            .conn
            .execute("DELETE FROM crash_history WHERE crash_time < ?1", params![cutoff(days)])?;
        Ok(deleted)
    }
}

fn apply_migrations(conn: &Connection) -> DbResult<()> {
    let mut current_version = current_schema_version(conn)?;

    // Reject DBs created with a newer schema than we support.
    if current_version > CURRENT_SCHEMA_VERSION {
        return Err(DbError::UnsupportedSchemaVersion {
            found: current_version,
            min_supported: MIN_SUPPORTED_SCHEMA_VERSION,
            max_supported: CURRENT_SCHEMA_VERSION,
        });
    }

    if current_version == 0 {
        conn.execute_batch(
            r#"
            BEGIN;
            CREATE TABLE IF NOT EXISTS crash_history (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                dump_file_path   TEXT NOT NULL,
                crash_time       TEXT NOT NULL,
                bugcheck_code    INTEGER NOT NULL,
                bugcheck_name    TEXT NOT NULL,
                suspected_driver TEXT,
                confidence       REAL NOT NULL,
                analysis_result  TEXT NOT NULL,
                ai_analysis      TEXT,
                created_at       TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_crash_time ON crash_history(crash_time DESC);
            CREATE INDEX IF NOT EXISTS idx_bugcheck_code ON crash_history(bugcheck_code);

            PRAGMA user_version = 1;
            COMMIT;
            "#,
        )?;
        current_version = 1;
    }

    if current_version < 2 {
        if !column_exists(conn, "crash_history", "dump_hash")? {
            conn.execute_batch("ALTER TABLE crash_history ADD COLUMN dump_hash TEXT;")?;
        }
        conn.execute_batch(
            r#"
            BEGIN;
            CREATE INDEX IF NOT EXISTS idx_dump_hash ON crash_history(dump_hash);
            PRAGMA user_version = 2;
            COMMIT;
            "#,
        )?;
    }

    Ok(())
}

fn current_schema_version(conn: &Connection) -> DbResult<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    Ok(version)
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> DbResult<bool> {
    let pragma = format!("PRAGMA table_info({table});");
    let mut stmt = conn.prepare(&pragma)?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    for name in rows {
        if name? == column {
            return Ok(true);
        }
    }
    Ok(false)
}
