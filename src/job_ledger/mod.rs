//! Persisted ledger of background job attempts.
//!
//! The ledger is the source of truth for crash recovery: every attempt gets a
//! row when it starts and the row is finalized once when it ends. Rows left
//! unfinished by a crash are picked up again at the next startup.

mod models;
mod schema;
mod sqlite_job_ledger;

pub use models::{JobLedgerRow, NewLedgerRow};
pub use schema::JOB_LEDGER_VERSIONED_SCHEMAS;
pub use sqlite_job_ledger::SqliteJobLedger;

use anyhow::Result;

pub trait JobLedger: Send + Sync {
    /// Inserts a new pending row and returns it with its assigned id.
    fn create_row(&self, row: &NewLedgerRow) -> Result<JobLedgerRow>;

    /// Writes `finish_time = now` and `success` on a pending row.
    ///
    /// Returns `false` if the row does not exist or was already finalized;
    /// a finalized row is never overwritten.
    fn finalize_row(&self, id: i64, success: bool) -> Result<bool>;

    /// Rows with no finish time, oldest start first.
    fn get_pending_rows(&self) -> Result<Vec<JobLedgerRow>>;

    fn get_row(&self, id: i64) -> Result<Option<JobLedgerRow>>;

    /// Most recent rows first.
    fn get_recent_rows(&self, limit: usize) -> Result<Vec<JobLedgerRow>>;
}
