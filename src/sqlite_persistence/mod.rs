//! Shared SQLite helpers: declarative table definitions, schema validation
//! and versioned migrations.

mod versioned_schema;

pub use versioned_schema::{Column, SqlType, Table, VersionedSchema};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Offset added to schema versions before they are stored in `PRAGMA user_version`,
/// so a foreign SQLite file is never mistaken for one of ours.
pub const BASE_DB_VERSION: usize = 3000;

/// How long a connection waits on a locked database before giving up.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Formats a timestamp for storage. Fixed width, so text ordering in SQL
/// matches chronological ordering.
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// Opens a connection with the pragmas every store relies on.
pub fn open_connection(path: &Path) -> Result<Connection> {
    let conn =
        Connection::open(path).with_context(|| format!("Failed to open database {:?}", path))?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute("PRAGMA foreign_keys = ON;", [])?;
    // journal_mode answers with a row, so it cannot go through execute()
    conn.query_row("PRAGMA journal_mode = WAL;", [], |_| Ok(()))?;
    Ok(conn)
}

/// Creates the database with the latest schema if missing, otherwise validates
/// the stored version and runs pending migrations in a single transaction.
pub fn initialize_database(path: &Path, schemas: &[VersionedSchema], label: &str) -> Result<()> {
    let Some(latest) = schemas.last() else {
        bail!("No schema versions defined for {} database", label);
    };
    let is_new_db = !path.exists();
    let mut conn = open_connection(path)?;

    if is_new_db {
        info!("Creating new {} database at {:?}", label, path);
        let tx = conn.transaction()?;
        latest.create(&tx)?;
        tx.commit()?;
        return Ok(());
    }

    let raw_version: i64 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    let db_version = raw_version - BASE_DB_VERSION as i64;
    if db_version < 1 {
        bail!(
            "{} database version {} is invalid (expected >= 1)",
            label,
            db_version
        );
    }
    let db_version = db_version as usize;

    let schema = schemas
        .iter()
        .find(|s| s.version == db_version)
        .with_context(|| format!("Unknown {} database version {}", label, db_version))?;
    schema.validate(&conn).with_context(|| {
        format!(
            "{} database schema validation failed for version {}",
            label, db_version
        )
    })?;

    if db_version < latest.version {
        info!(
            "Migrating {} database from version {} to {}",
            label, db_version, latest.version
        );
        let tx = conn.transaction()?;
        for schema in schemas.iter().filter(|s| s.version > db_version) {
            if let Some(migration_fn) = schema.migration {
                migration_fn(&tx).with_context(|| {
                    format!("Failed to run migration to version {}", schema.version)
                })?;
            }
        }
        tx.execute(
            &format!("PRAGMA user_version = {}", BASE_DB_VERSION + latest.version),
            [],
        )?;
        tx.commit()?;
    }
    Ok(())
}
