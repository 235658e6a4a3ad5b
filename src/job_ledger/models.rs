use chrono::{DateTime, Utc};

/// One persisted attempt at running a job.
///
/// `finish_time == None` means the attempt never completed and must be run
/// again at the next startup.
#[derive(Debug, Clone, PartialEq)]
pub struct JobLedgerRow {
    pub id: i64,
    pub job_type_name: String,
    pub arguments_type_name: Option<String>,
    pub serialized_arguments: Option<String>,
    pub start_time: DateTime<Utc>,
    pub finish_time: Option<DateTime<Utc>>,
    /// Only meaningful once `finish_time` is set.
    pub success: Option<bool>,
}

impl JobLedgerRow {
    pub fn is_pending(&self) -> bool {
        self.finish_time.is_none()
    }
}

/// Values needed to open a new ledger row.
#[derive(Debug, Clone)]
pub struct NewLedgerRow {
    pub job_type_name: String,
    pub arguments_type_name: Option<String>,
    pub serialized_arguments: Option<String>,
    pub start_time: DateTime<Utc>,
}

impl NewLedgerRow {
    pub fn now(
        job_type_name: &str,
        arguments_type_name: Option<&str>,
        serialized_arguments: Option<String>,
    ) -> Self {
        Self {
            job_type_name: job_type_name.to_string(),
            arguments_type_name: arguments_type_name.map(str::to_string),
            serialized_arguments,
            start_time: Utc::now(),
        }
    }
}
