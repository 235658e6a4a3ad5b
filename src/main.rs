use anyhow::{Context, Result};
use clap::Parser;
use gallery_server::background_jobs::jobs::{
    ExtractMetadataArgs, ExtractMetadataJob, RebuildInheritedTagsArgs, RebuildInheritedTagsJob,
};
use gallery_server::background_jobs::{create_job_runner, CodecFactory};
use gallery_server::config::{AppConfig, CliConfig, FileConfig};
use gallery_server::media_codec::{FileProbeCodec, MediaCodec};
use gallery_server::{metrics, SqliteGalleryStore, SqliteJobLedger};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Directory holding jobs.db and gallery.db.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// Root directory of the media files.
    #[clap(long, value_parser = parse_path)]
    pub media_path: Option<PathBuf>,

    /// Where rendered thumbnails are written. Defaults to <db_dir>/thumbnails.
    #[clap(long, value_parser = parse_path)]
    pub thumbnails_dir: Option<PathBuf>,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// Optional TOML config file. Its values override the CLI.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            db_dir: self.db_dir.clone(),
            media_path: self.media_path.clone(),
            thumbnails_dir: self.thumbnails_dir.clone(),
            metrics_port: self.metrics_port,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config file {:?}...", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;

    info!("Opening job ledger at {:?}...", config.jobs_db_path());
    SqliteJobLedger::initialize(config.jobs_db_path())?;
    info!("Opening gallery database at {:?}...", config.gallery_db_path());
    SqliteGalleryStore::initialize(config.gallery_db_path())?;
    std::fs::create_dir_all(&config.thumbnails_dir).with_context(|| {
        format!(
            "Failed to create thumbnails directory {:?}",
            config.thumbnails_dir
        )
    })?;

    info!("Initializing metrics...");
    metrics::init_metrics();
    let shutdown_token = CancellationToken::new();
    let metrics_port = config.metrics_port;
    let metrics_shutdown = shutdown_token.clone();
    let metrics_server = tokio::spawn(async move {
        if let Err(e) = metrics::serve_metrics(metrics_port, metrics_shutdown).await {
            error!("Metrics server error: {:#}", e);
        }
    });

    let codec_factory: CodecFactory =
        Arc::new(|| Box::new(FileProbeCodec::new()) as Box<dyn MediaCodec>);
    let runner = create_job_runner(&config, codec_factory);
    info!(
        "Job runner ready with {} registered job types",
        runner.registry().type_names().len()
    );

    let report = runner.recover_on_startup().await?;
    if !report.skipped.is_empty() {
        warn!(
            "{} unfinished job(s) could not be recovered and stay pending",
            report.skipped.len()
        );
    }
    info!("Recovered {} unfinished job(s)", report.scheduled.len());

    if config.background_jobs.extract_metadata_on_startup {
        if let Err(e) = runner
            .spawn::<ExtractMetadataJob>(ExtractMetadataArgs::default())
            .await
        {
            error!("Failed to start metadata extraction: {}", e);
        }
    }
    if config.background_jobs.rebuild_tags_on_startup {
        if let Err(e) = runner
            .spawn::<RebuildInheritedTagsJob>(RebuildInheritedTagsArgs {})
            .await
        {
            error!("Failed to start inherited tag rebuild: {}", e);
        }
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    runner.shutdown().await;
    let grace = config.background_jobs.shutdown_grace_period();
    if !runner.wait_idle(grace).await {
        warn!(
            "Jobs still running after {:?}; their ledger rows will be recovered on next start",
            grace
        );
    }

    shutdown_token.cancel();
    let _ = metrics_server.await;
    info!("Shutdown complete");
    Ok(())
}
