use super::context::JobContext;
use super::job::{ErasedJob, Job, JobArgs, JobError, JobOutcome};
use super::registry::JobRegistry;
use super::scope::ScopeFactory;
use crate::job_ledger::{JobLedgerRow, NewLedgerRow};
use crate::metrics;
use anyhow::anyhow;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn};

/// In-memory handle of one active execution. Never persisted.
#[derive(Clone)]
pub struct JobDescriptor {
    pub ledger_id: i64,
    pub job_type: &'static str,
    pub resource_key: Option<String>,
    pub cancellation_token: CancellationToken,
    job: Arc<dyn ErasedJob>,
    args: Arc<JobArgs>,
}

/// Snapshot of a running execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunningJobInfo {
    pub ledger_id: i64,
    pub job_type: String,
    pub resource_key: Option<String>,
    pub cancel_requested: bool,
}

/// Detached execution, awaitable for its outcome.
pub struct JobHandle {
    pub ledger_id: i64,
    pub job_type: &'static str,
    pub resource_key: Option<String>,
    join: JoinHandle<JobOutcome>,
}

impl JobHandle {
    /// Waits until the body finished and the ledger row was finalized.
    pub async fn outcome(self) -> JobOutcome {
        self.join
            .await
            .unwrap_or_else(|e| JobOutcome::Failed(format!("Execution task failed: {}", e)))
    }
}

/// A pending ledger row that recovery could not schedule.
#[derive(Debug, Clone)]
pub struct SkippedRow {
    pub ledger_id: i64,
    pub job_type_name: String,
    pub reason: String,
}

pub struct RecoveryReport {
    /// Rescheduled executions, in ledger start order.
    pub scheduled: Vec<JobHandle>,
    /// Rows left pending because they could not be rehydrated.
    pub skipped: Vec<SkippedRow>,
}

struct RunnerInner {
    registry: JobRegistry,
    scopes: Arc<dyn ScopeFactory>,
    running: RwLock<HashMap<i64, JobDescriptor>>,
    idle: Notify,
    shutdown_token: CancellationToken,
}

/// Executes jobs, tracks them while they run and persists their outcome in
/// the job ledger.
///
/// Every execution is backed by exactly one ledger row, finalized once when
/// the body ends. Rows a crash left unfinished are re-executed by
/// [`JobRunner::recover_on_startup`].
#[derive(Clone)]
pub struct JobRunner {
    inner: Arc<RunnerInner>,
}

impl JobRunner {
    pub fn new(registry: JobRegistry, scopes: Arc<dyn ScopeFactory>) -> Self {
        Self {
            inner: Arc::new(RunnerInner {
                registry,
                scopes,
                running: RwLock::new(HashMap::new()),
                idle: Notify::new(),
                shutdown_token: CancellationToken::new(),
            }),
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.inner.registry
    }

    /// Runs `J` with `args` and returns once its ledger row was finalized.
    pub async fn submit<J: Job>(&self, args: J::Args) -> Result<JobOutcome, JobError> {
        Ok(self.spawn::<J>(args).await?.outcome().await)
    }

    /// Same as [`JobRunner::submit`] for callers holding a type name and JSON
    /// arguments.
    pub async fn submit_by_name(
        &self,
        type_name: &str,
        args_json: &str,
    ) -> Result<JobOutcome, JobError> {
        Ok(self
            .spawn_by_name(type_name, args_json)
            .await?
            .outcome()
            .await)
    }

    /// Creates the ledger row, then runs `J` in the background.
    pub async fn spawn<J: Job>(&self, args: J::Args) -> Result<JobHandle, JobError> {
        let entry = self
            .inner
            .registry
            .resolve(J::TYPE_NAME)
            .ok_or_else(|| JobError::UnknownJobType(J::TYPE_NAME.to_string()))?;
        let serialized = serde_json::to_string(&args)?;
        let job: Arc<dyn ErasedJob> = Arc::from(entry.instantiate());
        let args: Arc<JobArgs> = Arc::new(args);
        self.launch(job, args, entry.args_type_name, serialized).await
    }

    pub async fn spawn_by_name(
        &self,
        type_name: &str,
        args_json: &str,
    ) -> Result<JobHandle, JobError> {
        let entry = self
            .inner
            .registry
            .resolve(type_name)
            .ok_or_else(|| JobError::UnknownJobType(type_name.to_string()))?;
        let args = entry.decode_args(Some(entry.args_type_name), Some(args_json))?;
        let job: Arc<dyn ErasedJob> = Arc::from(entry.instantiate());
        self.launch(job, args, entry.args_type_name, args_json.to_string())
            .await
    }

    async fn launch(
        &self,
        job: Arc<dyn ErasedJob>,
        args: Arc<JobArgs>,
        args_type_name: &'static str,
        serialized: String,
    ) -> Result<JobHandle, JobError> {
        let resource_key = job.resource_key(args.as_ref())?;
        let row = self
            .create_ledger_row(NewLedgerRow::now(
                job.type_name(),
                Some(args_type_name),
                Some(serialized),
            ))
            .await?;
        info!(
            "Starting job {} (ledger_id: {}, resource_key: {:?})",
            job.type_name(),
            row.id,
            resource_key
        );
        let descriptor = self.register(row.id, job, args, resource_key).await;
        Ok(self.start(descriptor))
    }

    async fn create_ledger_row(&self, row: NewLedgerRow) -> Result<JobLedgerRow, JobError> {
        let scopes = Arc::clone(&self.inner.scopes);
        tokio::task::spawn_blocking(move || {
            let scope = scopes.open().map_err(JobError::Scope)?;
            scope.ledger.create_row(&row).map_err(JobError::Ledger)
        })
        .await
        .map_err(|e| JobError::Ledger(anyhow!("Ledger task failed: {}", e)))?
    }

    async fn register(
        &self,
        ledger_id: i64,
        job: Arc<dyn ErasedJob>,
        args: Arc<JobArgs>,
        resource_key: Option<String>,
    ) -> JobDescriptor {
        let descriptor = JobDescriptor {
            ledger_id,
            job_type: job.type_name(),
            resource_key,
            cancellation_token: self.inner.shutdown_token.child_token(),
            job,
            args,
        };
        self.inner
            .running
            .write()
            .await
            .insert(ledger_id, descriptor.clone());
        metrics::background_job_started(descriptor.job_type);
        descriptor
    }

    fn start(&self, descriptor: JobDescriptor) -> JobHandle {
        let ledger_id = descriptor.ledger_id;
        let job_type = descriptor.job_type;
        let resource_key = descriptor.resource_key.clone();
        let inner = Arc::clone(&self.inner);
        let join = tokio::spawn(async move { execute(inner, descriptor).await });
        JobHandle {
            ledger_id,
            job_type,
            resource_key,
            join,
        }
    }

    /// Signals cancellation to every running execution keyed `resource_key`.
    ///
    /// Returns how many executions were signalled.
    pub async fn cancel(&self, resource_key: &str) -> usize {
        let running = self.inner.running.read().await;
        let mut signalled = 0;
        for descriptor in running.values() {
            if descriptor.resource_key.as_deref() == Some(resource_key) {
                debug!(
                    "Cancelling job {} (ledger_id: {})",
                    descriptor.job_type, descriptor.ledger_id
                );
                descriptor.cancellation_token.cancel();
                signalled += 1;
            }
        }
        if signalled > 0 {
            info!(
                "Requested cancellation of {} job(s) for {}",
                signalled, resource_key
            );
        }
        signalled
    }

    /// Re-executes every unfinished ledger row, oldest first.
    ///
    /// Returns as soon as executions are scheduled. Rows that cannot be
    /// rehydrated are logged, left pending and reported as skipped.
    pub async fn recover_on_startup(&self) -> anyhow::Result<RecoveryReport> {
        let scopes = Arc::clone(&self.inner.scopes);
        let pending = tokio::task::spawn_blocking(move || {
            let scope = scopes.open()?;
            scope.ledger.get_pending_rows()
        })
        .await??;

        let mut report = RecoveryReport {
            scheduled: Vec::new(),
            skipped: Vec::new(),
        };
        if pending.is_empty() {
            debug!("No unfinished jobs to recover");
            return Ok(report);
        }
        info!("Recovering {} unfinished job(s)", pending.len());

        for row in pending {
            if self.inner.running.read().await.contains_key(&row.id) {
                debug!("Ledger row {} is already running, not recovering", row.id);
                continue;
            }
            match self.rehydrate(&row) {
                Ok((job, args, resource_key)) => {
                    info!(
                        "Recovering job {} (ledger_id: {}, started: {})",
                        row.job_type_name, row.id, row.start_time
                    );
                    let descriptor = self.register(row.id, job, args, resource_key).await;
                    report.scheduled.push(self.start(descriptor));
                }
                Err(e) => {
                    warn!(
                        "Skipping recovery of ledger row {} ({}): {}",
                        row.id, row.job_type_name, e
                    );
                    report.skipped.push(SkippedRow {
                        ledger_id: row.id,
                        job_type_name: row.job_type_name.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok(report)
    }

    #[allow(clippy::type_complexity)]
    fn rehydrate(
        &self,
        row: &JobLedgerRow,
    ) -> Result<(Arc<dyn ErasedJob>, Arc<JobArgs>, Option<String>), JobError> {
        let entry = self
            .inner
            .registry
            .resolve(&row.job_type_name)
            .ok_or_else(|| JobError::UnknownJobType(row.job_type_name.clone()))?;
        let args = entry.decode_args(
            row.arguments_type_name.as_deref(),
            row.serialized_arguments.as_deref(),
        )?;
        let job: Arc<dyn ErasedJob> = Arc::from(entry.instantiate());
        let resource_key = job.resource_key(args.as_ref())?;
        Ok((job, args, resource_key))
    }

    /// Signals cancellation to every running execution and returns without
    /// waiting. Executions started afterwards begin already cancelled.
    pub async fn shutdown(&self) -> usize {
        let count = self.inner.running.read().await.len();
        info!("Shutting down job runner, cancelling {} job(s)", count);
        self.inner.shutdown_token.cancel();
        count
    }

    /// Waits until nothing is running. Returns false if `timeout` elapsed first.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.inner.running.read().await.is_empty() {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.inner.running.read().await.is_empty();
            }
        }
    }

    pub async fn running_jobs(&self) -> Vec<RunningJobInfo> {
        let running = self.inner.running.read().await;
        let mut jobs: Vec<RunningJobInfo> = running
            .values()
            .map(|d| RunningJobInfo {
                ledger_id: d.ledger_id,
                job_type: d.job_type.to_string(),
                resource_key: d.resource_key.clone(),
                cancel_requested: d.cancellation_token.is_cancelled(),
            })
            .collect();
        jobs.sort_by_key(|j| j.ledger_id);
        jobs
    }

    pub async fn is_running(&self, resource_key: &str) -> bool {
        self.inner
            .running
            .read()
            .await
            .values()
            .any(|d| d.resource_key.as_deref() == Some(resource_key))
    }
}

/// Runs one registered execution to its end. Never fails and never panics.
async fn execute(inner: Arc<RunnerInner>, descriptor: JobDescriptor) -> JobOutcome {
    let ledger_id = descriptor.ledger_id;
    let job_type = descriptor.job_type;
    let resource_key = descriptor.resource_key.clone();
    let start_time = Instant::now();

    let scopes = Arc::clone(&inner.scopes);
    let job = Arc::clone(&descriptor.job);
    let args = Arc::clone(&descriptor.args);
    let token = descriptor.cancellation_token.clone();
    let result = tokio::task::spawn_blocking(move || {
        let _span = info_span!("background_job", job_type, ledger_id).entered();
        let scope = scopes.open().map_err(JobError::Scope)?;
        let ctx = JobContext::new(token, ledger_id, scope);
        job.run(args.as_ref(), &ctx)
    })
    .await;
    let elapsed = start_time.elapsed();

    let outcome = match result {
        Ok(Ok(())) => {
            info!(
                "Job {} (ledger_id: {}) completed successfully in {:?}",
                job_type, ledger_id, elapsed
            );
            JobOutcome::Succeeded
        }
        Ok(Err(JobError::Cancelled)) => {
            info!(
                "Job {} (ledger_id: {}) was cancelled after {:?}",
                job_type, ledger_id, elapsed
            );
            JobOutcome::Cancelled
        }
        Ok(Err(e)) => {
            error!(
                "Job {} (ledger_id: {}, resource_key: {:?}) failed after {:?}: {}",
                job_type, ledger_id, resource_key, elapsed, e
            );
            JobOutcome::Failed(e.to_string())
        }
        Err(e) => {
            error!(
                "Job {} (ledger_id: {}, resource_key: {:?}) panicked after {:?}: {}",
                job_type, ledger_id, resource_key, elapsed, e
            );
            JobOutcome::Failed(format!("Task panic: {}", e))
        }
    };

    let success = outcome.is_success();
    let scopes = Arc::clone(&inner.scopes);
    let finalized = tokio::task::spawn_blocking(move || {
        let scope = scopes.open()?;
        scope.ledger.finalize_row(ledger_id, success)
    })
    .await;
    match finalized {
        Ok(Ok(true)) => {}
        Ok(Ok(false)) => {
            warn!(
                "Ledger row {} for job {} was already finalized",
                ledger_id, job_type
            );
        }
        Ok(Err(e)) => {
            error!(
                "Failed to record job finish for {} (ledger_id: {}): {:#}",
                job_type, ledger_id, e
            );
            metrics::record_ledger_write_failure(job_type);
        }
        Err(e) => {
            error!(
                "Ledger finalize task for {} (ledger_id: {}) failed: {}",
                job_type, ledger_id, e
            );
            metrics::record_ledger_write_failure(job_type);
        }
    }

    inner.running.write().await.remove(&ledger_id);
    inner.idle.notify_waiters();

    metrics::record_background_job_execution(job_type, outcome.as_str(), elapsed);
    metrics::background_job_finished(job_type);
    outcome
}
