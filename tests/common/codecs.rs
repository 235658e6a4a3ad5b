use anyhow::Result;
use gallery_server::media_codec::{CropRect, ExtractedMetadata, MediaCodec};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Codec whose thumbnail rendering blocks until the gate opens.
#[derive(Clone, Default)]
pub struct GatedCodec {
    pub gate: Arc<AtomicBool>,
    /// Renders that reached the gate.
    pub entered: Arc<AtomicUsize>,
    pub renders: Arc<AtomicUsize>,
}

impl GatedCodec {
    pub fn open(&self) {
        self.gate.store(true, Ordering::SeqCst);
    }

    /// Waits until `count` renders are blocked on the gate.
    pub async fn wait_entered(&self, count: usize) {
        while self.entered.load(Ordering::SeqCst) < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl MediaCodec for GatedCodec {
    fn extract_metadata(&self, _path: &Path) -> Result<Option<ExtractedMetadata>> {
        Ok(None)
    }

    fn render_thumbnail(
        &self,
        _source: &Path,
        _crop: Option<&CropRect>,
        _destination: &Path,
        _max_edge: u32,
    ) -> Result<()> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        while !self.gate.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(5));
        }
        self.renders.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
