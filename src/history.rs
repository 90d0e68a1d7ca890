use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;
use uuid::Uuid;

use crate::app_dirs::AppDirs;
use crate::error::Result;
use crate::summary::RunSummary;

/// Receives completed run summaries for durable storage.
pub trait HistoryStore {
    /// Saving the same summary twice keeps a single entry.
    fn save(&mut self, summary: &RunSummary) -> Result<()>;
    /// Newest first.
    fn list(&self, limit: Option<usize>) -> Result<Vec<RunSummary>>;
    fn get(&self, id: Uuid) -> Result<Option<RunSummary>>;
    fn clear(&mut self) -> Result<()>;
}

/// SQLite-backed run history
#[derive(Debug)]
pub struct SqliteHistory {
    conn: Connection,
}

impl SqliteHistory {
    /// Open the history database at the default application path
    pub fn new() -> Result<Self> {
        let path = AppDirs::db_path().unwrap_or_else(|| "runtrack_history.db".into());
        Self::open(path)
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        debug!(path = %path.display(), "opening run history");
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                distance_m REAL NOT NULL,
                duration_s REAL NOT NULL,
                started_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_runs_started_at ON runs(started_at)",
            [],
        )?;

        Ok(Self { conn })
    }

    fn row_to_summary(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunSummary> {
        let id_str: String = row.get(0)?;
        let id = Uuid::parse_str(&id_str).map_err(|_| {
            rusqlite::Error::InvalidColumnType(0, "id".to_string(), rusqlite::types::Type::Text)
        })?;
        let started_str: String = row.get(3)?;
        let started_at = DateTime::parse_from_rfc3339(&started_str)
            .map_err(|_| {
                rusqlite::Error::InvalidColumnType(
                    3,
                    "started_at".to_string(),
                    rusqlite::types::Type::Text,
                )
            })?
            .with_timezone(&Utc);

        Ok(RunSummary::from_parts(id, row.get(1)?, row.get(2)?, started_at))
    }
}

impl HistoryStore for SqliteHistory {
    fn save(&mut self, summary: &RunSummary) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT OR REPLACE INTO runs (id, distance_m, duration_s, started_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                summary.id().to_string(),
                summary.distance(),
                summary.duration(),
                // fixed width so text order is time order
                summary.timestamp().to_rfc3339_opts(SecondsFormat::Nanos, true),
            ],
        )?;
        Ok(())
    }

    fn list(&self, limit: Option<usize>) -> Result<Vec<RunSummary>> {
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, distance_m, duration_s, started_at
            FROM runs
            ORDER BY started_at DESC
            LIMIT ?1
            "#,
        )?;

        let rows = stmt.query_map([limit], Self::row_to_summary)?;
        let mut runs = Vec::new();
        for run in rows {
            runs.push(run?);
        }
        Ok(runs)
    }

    fn get(&self, id: Uuid) -> Result<Option<RunSummary>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, distance_m, duration_s, started_at FROM runs WHERE id = ?1",
                [id.to_string()],
                Self::row_to_summary,
            )
            .optional()?;
        Ok(run)
    }

    fn clear(&mut self) -> Result<()> {
        self.conn.execute("DELETE FROM runs", [])?;
        Ok(())
    }
}

/// In-process history, for tests and embedders without storage.
#[derive(Debug, Default, Clone)]
pub struct MemoryHistory {
    runs: Vec<RunSummary>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoryStore for MemoryHistory {
    fn save(&mut self, summary: &RunSummary) -> Result<()> {
        self.runs.retain(|r| r.id() != summary.id());
        self.runs.push(summary.clone());
        Ok(())
    }

    fn list(&self, limit: Option<usize>) -> Result<Vec<RunSummary>> {
        let mut runs = self.runs.clone();
        runs.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));
        runs.truncate(limit.unwrap_or(usize::MAX));
        Ok(runs)
    }

    fn get(&self, id: Uuid) -> Result<Option<RunSummary>> {
        Ok(self.runs.iter().find(|r| r.id() == id).cloned())
    }

    fn clear(&mut self) -> Result<()> {
        self.runs.clear();
        Ok(())
    }
}
