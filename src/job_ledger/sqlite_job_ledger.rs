use super::models::{JobLedgerRow, NewLedgerRow};
use super::schema::JOB_LEDGER_VERSIONED_SCHEMAS;
use super::JobLedger;
use crate::sqlite_persistence::{
    format_datetime, initialize_database, open_connection, parse_datetime,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

const ROW_COLUMNS: &str = "id, job_type_name, arguments_type_name, serialized_arguments, \
     start_time, finish_time, success";
const START_TIME_COLUMN: usize = 4;
const FINISH_TIME_COLUMN: usize = 5;

/// Parses a stored timestamp. Recovery order depends on `start_time`, so an
/// unreadable value is an error rather than a guess.
fn timestamp_column(column: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    parse_datetime(value).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            Type::Text,
            format!("Invalid timestamp {:?}", value).into(),
        )
    })
}

pub struct SqliteJobLedger {
    conn: Mutex<Connection>,
}

impl SqliteJobLedger {
    /// Creates or migrates the ledger database. Call once at startup.
    pub fn initialize<P: AsRef<Path>>(db_path: P) -> Result<()> {
        initialize_database(db_path.as_ref(), JOB_LEDGER_VERSIONED_SCHEMAS, "job ledger")
    }

    /// Opens a new connection to an already initialized ledger database.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_connection(db_path.as_ref()).context("Failed to open job ledger")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Initializes the database if needed and opens it.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        Self::initialize(db_path.as_ref())?;
        Self::open(db_path)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("Job ledger connection mutex poisoned"))
    }

    fn row_to_ledger_row(row: &rusqlite::Row) -> rusqlite::Result<JobLedgerRow> {
        let start_time_str: String = row.get("start_time")?;
        let finish_time_str: Option<String> = row.get("finish_time")?;
        let success: Option<i64> = row.get("success")?;
        let finish_time = finish_time_str
            .as_deref()
            .map(|value| timestamp_column(FINISH_TIME_COLUMN, value))
            .transpose()?;

        Ok(JobLedgerRow {
            id: row.get("id")?,
            job_type_name: row.get("job_type_name")?,
            arguments_type_name: row.get("arguments_type_name")?,
            serialized_arguments: row.get("serialized_arguments")?,
            start_time: timestamp_column(START_TIME_COLUMN, &start_time_str)?,
            finish_time,
            success: success.map(|v| v != 0),
        })
    }
}

impl JobLedger for SqliteJobLedger {
    fn create_row(&self, row: &NewLedgerRow) -> Result<JobLedgerRow> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO job_ledger
                (job_type_name, arguments_type_name, serialized_arguments, start_time)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                row.job_type_name,
                row.arguments_type_name,
                row.serialized_arguments,
                format_datetime(&row.start_time)
            ],
        )?;

        Ok(JobLedgerRow {
            id: conn.last_insert_rowid(),
            job_type_name: row.job_type_name.clone(),
            arguments_type_name: row.arguments_type_name.clone(),
            serialized_arguments: row.serialized_arguments.clone(),
            start_time: row.start_time,
            finish_time: None,
            success: None,
        })
    }

    fn finalize_row(&self, id: i64, success: bool) -> Result<bool> {
        let conn = self.lock()?;
        let now = format_datetime(&Utc::now());

        let updated = conn.execute(
            "UPDATE job_ledger SET finish_time = ?1, success = ?2
             WHERE id = ?3 AND finish_time IS NULL",
            params![now, success as i64, id],
        )?;

        Ok(updated == 1)
    }

    fn get_pending_rows(&self) -> Result<Vec<JobLedgerRow>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM job_ledger WHERE finish_time IS NULL
             ORDER BY start_time ASC, id ASC",
            ROW_COLUMNS
        ))?;

        let rows = stmt
            .query_map([], Self::row_to_ledger_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
    }

    fn get_row(&self, id: i64) -> Result<Option<JobLedgerRow>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM job_ledger WHERE id = ?1",
            ROW_COLUMNS
        ))?;

        let row = stmt
            .query_row(params![id], Self::row_to_ledger_row)
            .optional()?;

        Ok(row)
    }

    fn get_recent_rows(&self, limit: usize) -> Result<Vec<JobLedgerRow>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM job_ledger ORDER BY start_time DESC, id DESC LIMIT ?1",
            ROW_COLUMNS
        ))?;

        let rows = stmt
            .query_map(params![limit as i64], Self::row_to_ledger_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
    }
}
