// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// SQLite-backed job store.
//
// Live jobs and completed jobs live in two tables with identical columns.
// Nested values (options, colour analysis, enums) are stored as JSON text.
// rusqlite is synchronous, so every trait method hops onto the blocking pool
// and serialises access through a single connection mutex.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument};

use kioskprint_core::error::{KioskError, Result};
use kioskprint_core::types::{JobId, JobPatch, PrintJob};

use super::{JobStore, UpdateGuard};

/// Schema for both tables. `completed_jobs` mirrors `jobs`.
const CREATE_TABLES_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS jobs (
        id TEXT PRIMARY KEY,
        document_ref TEXT NOT NULL,
        document_name TEXT NOT NULL,
        media_kind TEXT NOT NULL,
        device TEXT NOT NULL,
        options TEXT NOT NULL,
        total_pages INTEGER,
        progress INTEGER NOT NULL DEFAULT 0,
        status TEXT NOT NULL,
        status_message TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        completed_at TEXT,
        color_analysis TEXT,
        document_hash TEXT,
        dispatch_method TEXT
    );
    CREATE TABLE IF NOT EXISTS completed_jobs (
        id TEXT PRIMARY KEY,
        document_ref TEXT NOT NULL,
        document_name TEXT NOT NULL,
        media_kind TEXT NOT NULL,
        device TEXT NOT NULL,
        options TEXT NOT NULL,
        total_pages INTEGER,
        progress INTEGER NOT NULL DEFAULT 0,
        status TEXT NOT NULL,
        status_message TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        completed_at TEXT,
        color_analysis TEXT,
        document_hash TEXT,
        dispatch_method TEXT
    );
"#;

const JOB_COLUMNS: &str = "id, document_ref, document_name, media_kind, device, options, \
     total_pages, progress, status, status_message, created_at, updated_at, completed_at, \
     color_analysis, document_hash, dispatch_method";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Table {
    Jobs,
    Completed,
}

impl Table {
    fn name(self) -> &'static str {
        match self {
            Self::Jobs => "jobs",
            Self::Completed => "completed_jobs",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    /// Plain insert; a duplicate id is an error.
    Insert,
    /// Insert or overwrite the existing row.
    Replace,
}

/// Job store backed by a local SQLite database.
#[derive(Clone)]
pub struct SqliteJobStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteJobStore {
    /// Open (or create) the store at `path`, in WAL mode.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| KioskError::Database(format!("open: {e}")))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| KioskError::Database(format!("WAL pragma: {e}")))?;

        conn.execute_batch(CREATE_TABLES_SQL)
            .map_err(|e| KioskError::Database(format!("create tables: {e}")))?;

        info!("job store database opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| KioskError::Database(format!("open in-memory: {e}")))?;

        conn.execute_batch(CREATE_TABLES_SQL)
            .map_err(|e| KioskError::Database(format!("create tables: {e}")))?;

        debug!("in-memory job store opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `op` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| KioskError::Database("connection lock poisoned".into()))?;
            op(&guard)
        })
        .await
        .map_err(|e| KioskError::Internal(format!("store task failed: {e}")))?
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn get(&self, job_id: &JobId) -> Result<Option<PrintJob>> {
        let id = job_id.clone();
        self.with_conn(move |conn| select_job(conn, Table::Jobs, &id)).await
    }

    async fn insert(&self, job: &PrintJob) -> Result<()> {
        let job = job.clone();
        self.with_conn(move |conn| {
            write_job(conn, Table::Jobs, &job, WriteMode::Insert)?;
            info!(job_id = %job.job_id, "job inserted into store");
            Ok(())
        })
        .await
    }

    async fn update(&self, job_id: &JobId, patch: &JobPatch) -> Result<()> {
        let id = job_id.clone();
        let patch = patch.clone();
        self.with_conn(move |conn| {
            let mut job = select_job(conn, Table::Jobs, &id)?
                .ok_or_else(|| KioskError::Database(format!("job {id} not found")))?;
            patch.apply_to(&mut job);
            write_job(conn, Table::Jobs, &job, WriteMode::Replace)?;
            debug!(job_id = %id, progress = job.progress, status = job.status.as_str(), "job updated");
            Ok(())
        })
        .await
    }

    async fn update_if(
        &self,
        job_id: &JobId,
        patch: &JobPatch,
        guard: UpdateGuard,
    ) -> Result<Option<PrintJob>> {
        let id = job_id.clone();
        let patch = patch.clone();
        self.with_conn(move |conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(|e| KioskError::Database(format!("begin: {e}")))?;
            let mut job = select_job(&tx, Table::Jobs, &id)?
                .ok_or_else(|| KioskError::Database(format!("job {id} not found")))?;
            if !guard(&job) {
                debug!(job_id = %id, status = job.status.as_str(), "guarded update refused");
                return Ok(None);
            }
            patch.apply_to(&mut job);
            write_job(&tx, Table::Jobs, &job, WriteMode::Replace)?;
            tx.commit()
                .map_err(|e| KioskError::Database(format!("commit: {e}")))?;
            Ok(Some(job))
        })
        .await
    }

    async fn insert_completed(&self, job: &PrintJob) -> Result<()> {
        let job = job.clone();
        self.with_conn(move |conn| write_job(conn, Table::Completed, &job, WriteMode::Replace))
            .await
    }

    async fn get_completed(&self, job_id: &JobId) -> Result<Option<PrintJob>> {
        let id = job_id.clone();
        self.with_conn(move |conn| select_job(conn, Table::Completed, &id))
            .await
    }
}

// ---------------------------------------------------------------------------
// Row access
// ---------------------------------------------------------------------------

fn write_job(conn: &Connection, table: Table, job: &PrintJob, mode: WriteMode) -> Result<()> {
    let verb = match mode {
        WriteMode::Insert => "INSERT",
        WriteMode::Replace => "INSERT OR REPLACE",
    };
    let sql = format!(
        "{verb} INTO {} ({JOB_COLUMNS})
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        table.name()
    );

    let media_kind = to_json("media_kind", &job.media_kind)?;
    let options = to_json("options", &job.options)?;
    let status = to_json("status", &job.status)?;
    let color_analysis = job
        .color_analysis
        .as_ref()
        .map(|analysis| to_json("color_analysis", analysis))
        .transpose()?;

    conn.execute(
        &sql,
        params![
            job.job_id.as_str(),
            job.document_ref,
            job.document_name,
            media_kind,
            job.device,
            options,
            job.total_pages,
            job.progress,
            status,
            job.status_message,
            job.created_at.to_rfc3339(),
            job.updated_at.to_rfc3339(),
            job.completed_at.map(|at| at.to_rfc3339()),
            color_analysis,
            job.document_hash,
            job.dispatch_method,
        ],
    )
    .map_err(|e| KioskError::Database(format!("write {}: {e}", table.name())))?;
    Ok(())
}

fn to_json<T: Serialize>(field: &str, value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| KioskError::Database(format!("serialize {field}: {e}")))
}

fn select_job(conn: &Connection, table: Table, job_id: &JobId) -> Result<Option<PrintJob>> {
    let sql = format!("SELECT {JOB_COLUMNS} FROM {} WHERE id = ?1", table.name());
    conn.query_row(&sql, params![job_id.as_str()], row_to_print_job)
        .optional()
        .map_err(|e| KioskError::Database(format!("read {}: {e}", table.name())))
}

/// Map a SQLite row to a `PrintJob`. Column indices follow `JOB_COLUMNS`.
fn row_to_print_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<PrintJob> {
    let color_analysis_json: Option<String> = row.get(13)?;
    let color_analysis = match color_analysis_json {
        Some(json) => Some(parse_json(13, &json)?),
        None => None,
    };
    let completed_at: Option<String> = row.get(12)?;

    Ok(PrintJob {
        job_id: JobId(row.get(0)?),
        document_ref: row.get(1)?,
        document_name: row.get(2)?,
        media_kind: parse_json(3, &row.get::<_, String>(3)?)?,
        device: row.get(4)?,
        options: parse_json(5, &row.get::<_, String>(5)?)?,
        total_pages: row.get(6)?,
        progress: row.get(7)?,
        status: parse_json(8, &row.get::<_, String>(8)?)?,
        status_message: row.get(9)?,
        created_at: parse_time(10, &row.get::<_, String>(10)?)?,
        updated_at: parse_time(11, &row.get::<_, String>(11)?)?,
        completed_at: completed_at.map(|at| parse_time(12, &at)).transpose()?,
        color_analysis,
        document_hash: row.get(14)?,
        dispatch_method: row.get(15)?,
    })
}

fn parse_json<T: DeserializeOwned>(column: usize, raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn parse_time(column: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
        })
}
