use super::context::JobContext;
use serde::{de::DeserializeOwned, Serialize};
use std::any::Any;
use std::marker::PhantomData;
use thiserror::Error;

/// Type-erased job arguments, as held by the runner.
pub type JobArgs = dyn Any + Send + Sync;

/// Errors that can occur while preparing or executing a job.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Unknown job type: {0}")]
    UnknownJobType(String),

    #[error("Job arguments mismatch: {0}")]
    ArgumentMismatch(String),

    #[error("Failed to encode or decode job arguments: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Job ledger error: {0}")]
    Ledger(anyhow::Error),

    #[error("Failed to open job scope: {0}")]
    Scope(anyhow::Error),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Job was cancelled")]
    Cancelled,
}

/// Terminal state of one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed(String),
    Cancelled,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Succeeded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobOutcome::Succeeded => "success",
            JobOutcome::Failed(_) => "failed",
            JobOutcome::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobOutcome::Failed(reason) => write!(f, "failed: {}", reason),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

/// A strongly typed background job.
///
/// Jobs run synchronously on the blocking thread pool. Long-running bodies
/// must check `ctx.is_cancelled()` at reasonable intervals and return
/// `JobError::Cancelled` when they stop because of it; nothing interrupts a
/// body that never checks.
///
/// The runner may execute the same arguments more than once (a crash before
/// the ledger row is finalized re-runs the job at startup), so `run` must be
/// idempotent.
pub trait Job: Send + Sync + 'static {
    type Args: Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Identifier stored in the ledger, must never change once released.
    const TYPE_NAME: &'static str;

    /// Identifier of the serialized arguments format.
    const ARGS_TYPE_NAME: &'static str;

    fn description(&self) -> &'static str;

    /// Groups executions for targeted cancellation.
    ///
    /// Must be a pure function of `args`. Never used for locking or dedup.
    fn resource_key(&self, _args: &Self::Args) -> Option<String> {
        None
    }

    fn run(&self, args: &Self::Args, ctx: &JobContext) -> Result<(), JobError>;
}

/// Object-safe view of a [`Job`], so the runner can hold heterogeneous jobs.
pub trait ErasedJob: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn resource_key(&self, args: &JobArgs) -> Result<Option<String>, JobError>;

    fn run(&self, args: &JobArgs, ctx: &JobContext) -> Result<(), JobError>;
}

/// Adapts a typed job to [`ErasedJob`] by downcasting the argument bag.
pub struct TypedJob<J: Job> {
    job: J,
    _args: PhantomData<fn() -> J::Args>,
}

impl<J: Job> TypedJob<J> {
    pub fn new(job: J) -> Self {
        Self {
            job,
            _args: PhantomData,
        }
    }

    fn downcast<'a>(&self, args: &'a JobArgs) -> Result<&'a J::Args, JobError> {
        args.downcast_ref::<J::Args>().ok_or_else(|| {
            JobError::ArgumentMismatch(format!(
                "job {} expects arguments of type {}",
                J::TYPE_NAME,
                J::ARGS_TYPE_NAME
            ))
        })
    }
}

impl<J: Job> ErasedJob for TypedJob<J> {
    fn type_name(&self) -> &'static str {
        J::TYPE_NAME
    }

    fn resource_key(&self, args: &JobArgs) -> Result<Option<String>, JobError> {
        Ok(self.job.resource_key(self.downcast(args)?))
    }

    fn run(&self, args: &JobArgs, ctx: &JobContext) -> Result<(), JobError> {
        self.job.run(self.downcast(args)?, ctx)
    }
}
