//! Metadata extraction background job.
//!
//! Walks every media item not yet processed in fixed-size batches, reads
//! its metadata through the codec and persists each batch in one
//! transaction. Progress lives in the data itself (`metadata_extracted_at`),
//! so an interrupted run simply continues where it stopped.

use super::resolve_media_path;
use crate::background_jobs::{
    context::JobContext,
    job::{Job, JobError},
};
use crate::gallery_store::MetadataUpdate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractMetadataArgs {
    /// Falls back to the configured batch size.
    #[serde(default)]
    pub batch_size: Option<usize>,
}

pub struct ExtractMetadataJob {
    media_root: PathBuf,
    default_batch_size: usize,
}

impl ExtractMetadataJob {
    pub fn new(media_root: impl Into<PathBuf>, default_batch_size: usize) -> Self {
        Self {
            media_root: media_root.into(),
            default_batch_size,
        }
    }
}

impl Job for ExtractMetadataJob {
    type Args = ExtractMetadataArgs;
    const TYPE_NAME: &'static str = "extract_media_metadata";
    const ARGS_TYPE_NAME: &'static str = "extract_media_metadata_args";

    fn description(&self) -> &'static str {
        "Extract metadata for media items that were never processed"
    }

    fn run(&self, args: &ExtractMetadataArgs, ctx: &JobContext) -> Result<(), JobError> {
        let batch_size = args.batch_size.unwrap_or(self.default_batch_size).max(1);
        let remaining = ctx
            .gallery()
            .count_media_needing_metadata()
            .map_err(|e| JobError::ExecutionFailed(e.to_string()))?;
        info!(
            "Extracting metadata for {} media item(s), batch size {}",
            remaining, batch_size
        );

        let mut processed = 0usize;
        let mut without_metadata = 0usize;
        loop {
            if ctx.is_cancelled() {
                info!("Metadata extraction cancelled after {} item(s)", processed);
                return Err(JobError::Cancelled);
            }

            let batch = ctx
                .gallery()
                .get_media_needing_metadata(batch_size)
                .map_err(|e| JobError::ExecutionFailed(e.to_string()))?;
            if batch.is_empty() {
                break;
            }

            let mut updates = Vec::with_capacity(batch.len());
            let mut cancelled = false;
            for item in &batch {
                if ctx.is_cancelled() {
                    cancelled = true;
                    break;
                }
                let path = resolve_media_path(&self.media_root, &item.file_path);
                let metadata = match ctx.codec().extract_metadata(&path) {
                    Ok(metadata) => metadata,
                    Err(e) => {
                        warn!(
                            "Failed to extract metadata for media {} ({:?}): {:#}",
                            item.id, path, e
                        );
                        None
                    }
                };
                if metadata.is_none() {
                    without_metadata += 1;
                }
                updates.push(MetadataUpdate {
                    media_id: item.id,
                    metadata,
                });
            }

            // Records handled before a cancellation are kept
            if !updates.is_empty() {
                let stored = ctx
                    .gallery()
                    .store_metadata_batch(&updates)
                    .map_err(|e| JobError::ExecutionFailed(e.to_string()))?;
                processed += stored;
                debug!("Stored metadata batch of {} item(s)", stored);
            }

            if cancelled {
                info!("Metadata extraction cancelled after {} item(s)", processed);
                return Err(JobError::Cancelled);
            }
        }

        info!(
            "Metadata extraction complete: {} item(s) processed, {} without usable metadata",
            processed, without_metadata
        );
        Ok(())
    }
}
