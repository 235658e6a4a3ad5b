use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub media_path: Option<String>,
    pub thumbnails_dir: Option<String>,
    pub metrics_port: Option<u16>,

    pub background_jobs: Option<BackgroundJobsConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct BackgroundJobsConfig {
    pub metadata_batch_size: Option<usize>,
    pub thumbnail_max_edge: Option<u32>,
    pub shutdown_grace_period_secs: Option<u64>,
    pub rebuild_tags_on_startup: Option<bool>,
    pub extract_metadata_on_startup: Option<bool>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
