//! SQLite schema for the job ledger database.

use crate::sqlite_column;
use crate::sqlite_persistence::{SqlType, Table, VersionedSchema};

// =============================================================================
// Version 1 - Job ledger
// =============================================================================

/// One row per job execution attempt. Rows are never deleted.
const JOB_LEDGER_TABLE_V1: Table = Table {
    name: "job_ledger",
    columns: &[
        sqlite_column!(
            "id",
            &SqlType::Integer,
            is_primary_key = true,
            autoincrement = true
        ),
        sqlite_column!("job_type_name", &SqlType::Text, non_null = true),
        sqlite_column!("arguments_type_name", &SqlType::Text),
        sqlite_column!("serialized_arguments", &SqlType::Text),
        sqlite_column!("start_time", &SqlType::Text, non_null = true),
        sqlite_column!("finish_time", &SqlType::Text),
        sqlite_column!("success", &SqlType::Integer),
    ],
    indices: &[
        ("idx_job_ledger_pending", "finish_time, start_time"),
        ("idx_job_ledger_type", "job_type_name"),
    ],
    unique_constraints: &[],
};

pub const JOB_LEDGER_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[JOB_LEDGER_TABLE_V1],
    migration: None,
}];
