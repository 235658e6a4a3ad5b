//! Persistent background job execution.
//!
//! Jobs are recorded in the job ledger when they start and finalized when
//! they end; unfinished ledger rows are executed again at the next startup.
//! Each execution gets its own dependency scope and a cancellation token
//! that can be signalled by resource key or at shutdown.

mod context;
mod job;
pub mod jobs;
mod registry;
mod runner;
mod scope;

pub use context::JobContext;
pub use job::{ErasedJob, Job, JobArgs, JobError, JobOutcome, TypedJob};
pub use registry::{JobRegistry, RegisteredJob};
pub use runner::{
    JobDescriptor, JobHandle, JobRunner, RecoveryReport, RunningJobInfo, SkippedRow,
};
pub use scope::{CodecFactory, JobScope, ScopeFactory, SqliteScopeFactory};

use crate::config::AppConfig;
use jobs::{ExtractMetadataJob, RebuildInheritedTagsJob, RegenerateThumbnailJob};
use std::sync::Arc;

/// Registry holding every job this server knows how to run.
pub fn create_job_registry(config: &AppConfig) -> JobRegistry {
    let mut registry = JobRegistry::new();

    let media_root = config.media_path.clone();
    let batch_size = config.background_jobs.metadata_batch_size;
    registry.register(move || ExtractMetadataJob::new(media_root.clone(), batch_size));

    registry.register(RebuildInheritedTagsJob::new);

    let media_root = config.media_path.clone();
    let thumbnails_dir = config.thumbnails_dir.clone();
    let max_edge = config.background_jobs.thumbnail_max_edge;
    registry.register(move || {
        RegenerateThumbnailJob::new(media_root.clone(), thumbnails_dir.clone(), max_edge)
    });

    registry
}

/// Runner over the configured databases. They must already be initialized.
pub fn create_job_runner(config: &AppConfig, codec_factory: CodecFactory) -> JobRunner {
    let scopes = SqliteScopeFactory::new(
        config.gallery_db_path(),
        config.jobs_db_path(),
        codec_factory,
    );
    JobRunner::new(create_job_registry(config), Arc::new(scopes))
}
