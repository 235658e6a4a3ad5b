use gallery_server::background_jobs::{create_job_runner, CodecFactory, JobRunner};
use gallery_server::config::{AppConfig, BackgroundJobsConfig, CliConfig, FileConfig};
use gallery_server::media_codec::{FileProbeCodec, MediaCodec};
use gallery_server::{SqliteGalleryStore, SqliteJobLedger};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Smallest byte prefix recognized as a PNG image.
pub const PNG_HEADER: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

/// A gallery living in a temporary directory: `db/` holds the databases,
/// `media/` the media files.
pub struct TestGallery {
    _temp_dir: TempDir,
    pub config: AppConfig,
}

impl TestGallery {
    pub fn new() -> Self {
        Self::with_batch_size(100)
    }

    pub fn with_batch_size(batch_size: usize) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let db_dir = temp_dir.path().join("db");
        let media_dir = temp_dir.path().join("media");
        std::fs::create_dir_all(&db_dir).unwrap();
        std::fs::create_dir_all(&media_dir).unwrap();

        let cli = CliConfig {
            db_dir: Some(db_dir),
            media_path: Some(media_dir),
            ..Default::default()
        };
        let file_config = FileConfig {
            background_jobs: Some(BackgroundJobsConfig {
                metadata_batch_size: Some(batch_size),
                ..Default::default()
            }),
            ..Default::default()
        };
        let config = AppConfig::resolve(&cli, Some(file_config)).unwrap();

        SqliteJobLedger::initialize(config.jobs_db_path()).unwrap();
        SqliteGalleryStore::initialize(config.gallery_db_path()).unwrap();

        Self {
            _temp_dir: temp_dir,
            config,
        }
    }

    /// A fresh runner, as built by a newly started process.
    pub fn runner(&self) -> JobRunner {
        let codec_factory: CodecFactory =
            Arc::new(|| Box::new(FileProbeCodec::new()) as Box<dyn MediaCodec>);
        self.runner_with_codec(codec_factory)
    }

    pub fn runner_with_codec(&self, codec_factory: CodecFactory) -> JobRunner {
        create_job_runner(&self.config, codec_factory)
    }

    pub fn store(&self) -> SqliteGalleryStore {
        SqliteGalleryStore::open(self.config.gallery_db_path()).unwrap()
    }

    pub fn ledger(&self) -> SqliteJobLedger {
        SqliteJobLedger::open(self.config.jobs_db_path()).unwrap()
    }

    /// Writes a media file under the media root and returns its relative path.
    pub fn write_media_file(&self, relative: &str, contents: &[u8]) -> String {
        let path: PathBuf = self.config.media_path.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, contents).unwrap();
        relative.to_string()
    }
}
