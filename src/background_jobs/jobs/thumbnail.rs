//! Thumbnail regeneration background job.
//!
//! Re-renders the thumbnail of one media item, optionally with a new crop,
//! and records the result on the media row.

use super::resolve_media_path;
use crate::background_jobs::{
    context::JobContext,
    job::{Job, JobError},
};
use crate::media_codec::CropRect;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

const DEFAULT_THUMBNAIL_EXTENSION: &str = "jpg";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegenerateThumbnailArgs {
    pub media_id: i64,
    #[serde(default)]
    pub crop: Option<CropRect>,
}

pub struct RegenerateThumbnailJob {
    media_root: PathBuf,
    thumbnails_dir: PathBuf,
    max_edge: u32,
}

impl RegenerateThumbnailJob {
    pub fn new(
        media_root: impl Into<PathBuf>,
        thumbnails_dir: impl Into<PathBuf>,
        max_edge: u32,
    ) -> Self {
        Self {
            media_root: media_root.into(),
            thumbnails_dir: thumbnails_dir.into(),
            max_edge,
        }
    }

    fn thumbnail_path(&self, media_id: i64, source: &Path) -> PathBuf {
        let extension = source
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_else(|| DEFAULT_THUMBNAIL_EXTENSION.to_string());
        self.thumbnails_dir
            .join(format!("{}.{}", media_id, extension))
    }
}

impl Job for RegenerateThumbnailJob {
    type Args = RegenerateThumbnailArgs;
    const TYPE_NAME: &'static str = "regenerate_thumbnail";
    const ARGS_TYPE_NAME: &'static str = "regenerate_thumbnail_args";

    fn description(&self) -> &'static str {
        "Render the thumbnail of a single media item"
    }

    fn resource_key(&self, args: &RegenerateThumbnailArgs) -> Option<String> {
        Some(format!("media-{}", args.media_id))
    }

    fn run(&self, args: &RegenerateThumbnailArgs, ctx: &JobContext) -> Result<(), JobError> {
        let media = ctx
            .gallery()
            .get_media(args.media_id)
            .map_err(|e| JobError::ExecutionFailed(e.to_string()))?
            .ok_or_else(|| {
                JobError::ExecutionFailed(format!("Media {} not found", args.media_id))
            })?;

        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let source = resolve_media_path(&self.media_root, &media.file_path);
        let destination = self.thumbnail_path(media.id, &source);
        ctx.codec()
            .render_thumbnail(&source, args.crop.as_ref(), &destination, self.max_edge)
            .map_err(|e| {
                JobError::ExecutionFailed(format!(
                    "Rendering thumbnail for media {}: {:#}",
                    media.id, e
                ))
            })?;

        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let updated = ctx
            .gallery()
            .update_thumbnail(
                media.id,
                args.crop.as_ref(),
                &destination.to_string_lossy(),
            )
            .map_err(|e| JobError::ExecutionFailed(e.to_string()))?;
        if !updated {
            return Err(JobError::ExecutionFailed(format!(
                "Media {} was removed while rendering its thumbnail",
                media.id
            )));
        }

        info!("Regenerated thumbnail for media {} at {:?}", media.id, destination);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background_jobs::jobs::test_support::{JobTestEnv, ScriptedCodec};
    use crate::gallery_store::GalleryStore;
    use tokio_util::sync::CancellationToken;

    fn job(env: &JobTestEnv) -> RegenerateThumbnailJob {
        RegenerateThumbnailJob::new(
            env.temp_dir.path().join("media"),
            env.temp_dir.path().join("thumbs"),
            256,
        )
    }

    #[test]
    fn test_resource_key_is_per_media() {
        let env = JobTestEnv::new();
        let job = job(&env);
        let args = RegenerateThumbnailArgs {
            media_id: 42,
            crop: None,
        };
        assert_eq!(job.resource_key(&args), Some("media-42".to_string()));
        assert_eq!(job.resource_key(&args), job.resource_key(&args));
    }

    #[test]
    fn test_renders_and_records_crop() {
        let env = JobTestEnv::new();
        let store = env.store();
        let folder = store.create_folder("/", "root").unwrap();
        let media = store.create_media(folder, "2024/Beach.PNG").unwrap();
        let codec = ScriptedCodec::default();
        let ctx = env.context(codec.clone(), CancellationToken::new());
        let crop = CropRect {
            x: 5,
            y: 5,
            width: 100,
            height: 80,
        };

        job(&env)
            .run(
                &RegenerateThumbnailArgs {
                    media_id: media,
                    crop: Some(crop),
                },
                &ctx,
            )
            .unwrap();

        let rendered = codec.rendered.lock().unwrap().clone();
        assert_eq!(rendered.len(), 1);
        let (source, used_crop, destination) = &rendered[0];
        assert_eq!(source, &env.temp_dir.path().join("media/2024/Beach.PNG"));
        assert_eq!(used_crop, &Some(crop));
        assert_eq!(
            destination,
            &env.temp_dir.path().join("thumbs").join(format!("{}.png", media))
        );

        let stored = store.get_media(media).unwrap().unwrap();
        assert_eq!(stored.crop, Some(crop));
        assert_eq!(
            stored.thumbnail_path.as_deref(),
            Some(destination.to_string_lossy().as_ref())
        );
        assert!(stored.thumbnail_updated_at.is_some());
    }

    #[test]
    fn test_missing_media_is_a_failure() {
        let env = JobTestEnv::new();
        let ctx = env.context(ScriptedCodec::default(), CancellationToken::new());

        let result = job(&env).run(
            &RegenerateThumbnailArgs {
                media_id: 999,
                crop: None,
            },
            &ctx,
        );
        assert!(matches!(result, Err(JobError::ExecutionFailed(_))));
    }

    #[test]
    fn test_render_failure_is_a_failure() {
        let env = JobTestEnv::new();
        let store = env.store();
        let folder = store.create_folder("/", "root").unwrap();
        let media = store.create_media(folder, "broken.jpg").unwrap();
        let ctx = env.context(ScriptedCodec::default(), CancellationToken::new());

        let result = job(&env).run(
            &RegenerateThumbnailArgs {
                media_id: media,
                crop: None,
            },
            &ctx,
        );
        assert!(matches!(result, Err(JobError::ExecutionFailed(_))));
        assert_eq!(store.get_media(media).unwrap().unwrap().thumbnail_path, None);
    }

    #[test]
    fn test_cancelled_job_does_not_render() {
        let env = JobTestEnv::new();
        let store = env.store();
        let folder = store.create_folder("/", "root").unwrap();
        let media = store.create_media(folder, "a.jpg").unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let codec = ScriptedCodec::default();
        let ctx = env.context(codec.clone(), token);

        let result = job(&env).run(
            &RegenerateThumbnailArgs {
                media_id: media,
                crop: None,
            },
            &ctx,
        );
        assert!(matches!(result, Err(JobError::Cancelled)));
        assert!(codec.rendered.lock().unwrap().is_empty());
    }

    #[test]
    fn test_args_without_crop() {
        let args: RegenerateThumbnailArgs = serde_json::from_str(r#"{"media_id":3}"#).unwrap();
        assert_eq!(args.media_id, 3);
        assert_eq!(args.crop, None);
    }
}
