use crate::gallery_store::{GalleryStore, SqliteGalleryStore};
use crate::job_ledger::{JobLedger, SqliteJobLedger};
use crate::media_codec::MediaCodec;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

/// Stateful collaborators owned by exactly one job execution.
///
/// Every field holds its own connection, so no two executions ever share
/// one. Dropping the scope closes everything it opened.
pub struct JobScope {
    pub gallery: Box<dyn GalleryStore>,
    pub ledger: Box<dyn JobLedger>,
    pub codec: Box<dyn MediaCodec>,
}

/// Produces a fresh [`JobScope`] per execution.
pub trait ScopeFactory: Send + Sync {
    fn open(&self) -> Result<JobScope>;
}

pub type CodecFactory = Arc<dyn Fn() -> Box<dyn MediaCodec> + Send + Sync>;

/// Opens new SQLite connections to already initialized databases.
pub struct SqliteScopeFactory {
    gallery_db_path: PathBuf,
    ledger_db_path: PathBuf,
    codec_factory: CodecFactory,
}

impl SqliteScopeFactory {
    pub fn new(
        gallery_db_path: impl Into<PathBuf>,
        ledger_db_path: impl Into<PathBuf>,
        codec_factory: CodecFactory,
    ) -> Self {
        Self {
            gallery_db_path: gallery_db_path.into(),
            ledger_db_path: ledger_db_path.into(),
            codec_factory,
        }
    }
}

impl ScopeFactory for SqliteScopeFactory {
    fn open(&self) -> Result<JobScope> {
        let gallery = SqliteGalleryStore::open(&self.gallery_db_path)
            .with_context(|| format!("Opening gallery store {:?}", self.gallery_db_path))?;
        let ledger = SqliteJobLedger::open(&self.ledger_db_path)
            .with_context(|| format!("Opening job ledger {:?}", self.ledger_db_path))?;
        Ok(JobScope {
            gallery: Box::new(gallery),
            ledger: Box::new(ledger),
            codec: (self.codec_factory)(),
        })
    }
}
