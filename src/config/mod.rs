mod file_config;

pub use file_config::{BackgroundJobsConfig, FileConfig};

use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub media_path: Option<PathBuf>,
    pub thumbnails_dir: Option<PathBuf>,
    pub metrics_port: u16,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    pub media_path: PathBuf,
    pub thumbnails_dir: PathBuf,
    pub metrics_port: u16,

    pub background_jobs: BackgroundJobsSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let media_path = file
            .media_path
            .map(PathBuf::from)
            .or_else(|| cli.media_path.clone())
            .unwrap_or_else(|| db_dir.clone());

        let thumbnails_dir = file
            .thumbnails_dir
            .map(PathBuf::from)
            .or_else(|| cli.thumbnails_dir.clone())
            .unwrap_or_else(|| db_dir.join("thumbnails"));

        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);

        let jobs_file = file.background_jobs.unwrap_or_default();
        let defaults = BackgroundJobsSettings::default();
        let background_jobs = BackgroundJobsSettings {
            metadata_batch_size: jobs_file
                .metadata_batch_size
                .unwrap_or(defaults.metadata_batch_size),
            thumbnail_max_edge: jobs_file
                .thumbnail_max_edge
                .unwrap_or(defaults.thumbnail_max_edge),
            shutdown_grace_period_secs: jobs_file
                .shutdown_grace_period_secs
                .unwrap_or(defaults.shutdown_grace_period_secs),
            rebuild_tags_on_startup: jobs_file
                .rebuild_tags_on_startup
                .unwrap_or(defaults.rebuild_tags_on_startup),
            extract_metadata_on_startup: jobs_file
                .extract_metadata_on_startup
                .unwrap_or(defaults.extract_metadata_on_startup),
        };
        if background_jobs.metadata_batch_size == 0 {
            bail!("background_jobs.metadata_batch_size must be greater than 0");
        }
        if background_jobs.thumbnail_max_edge == 0 {
            bail!("background_jobs.thumbnail_max_edge must be greater than 0");
        }

        Ok(Self {
            db_dir,
            media_path,
            thumbnails_dir,
            metrics_port,
            background_jobs,
        })
    }

    pub fn jobs_db_path(&self) -> PathBuf {
        self.db_dir.join("jobs.db")
    }

    pub fn gallery_db_path(&self) -> PathBuf {
        self.db_dir.join("gallery.db")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackgroundJobsSettings {
    pub metadata_batch_size: usize,
    pub thumbnail_max_edge: u32,
    pub shutdown_grace_period_secs: u64,
    pub rebuild_tags_on_startup: bool,
    pub extract_metadata_on_startup: bool,
}

impl BackgroundJobsSettings {
    pub fn shutdown_grace_period(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_period_secs)
    }
}

impl Default for BackgroundJobsSettings {
    fn default() -> Self {
        Self {
            metadata_batch_size: 100,
            thumbnail_max_edge: 512,
            shutdown_grace_period_secs: 30,
            rebuild_tags_on_startup: false,
            extract_metadata_on_startup: true,
        }
    }
}
