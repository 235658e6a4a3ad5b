use super::{CropRect, ExtractedMetadata, MediaCodec};
use anyhow::{bail, Context, Result};
use infer::MatcherType;
use std::path::Path;
use tracing::debug;

/// Codec that identifies media by sniffing magic bytes.
///
/// Metadata is limited to container type and size; no capture time is read
/// since magic bytes carry none.
/// Thumbnails are written as a copy of the source; the crop rectangle is
/// persisted alongside so clients can apply it when displaying.
#[derive(Debug, Default, Clone)]
pub struct FileProbeCodec;

impl FileProbeCodec {
    pub fn new() -> Self {
        Self
    }
}

impl MediaCodec for FileProbeCodec {
    fn extract_metadata(&self, path: &Path) -> Result<Option<ExtractedMetadata>> {
        let kind = infer::get_from_path(path)
            .with_context(|| format!("Failed to read media file {:?}", path))?;

        let Some(kind) = kind else {
            debug!("Unrecognized media type for {:?}", path);
            return Ok(None);
        };
        if !matches!(kind.matcher_type(), MatcherType::Image | MatcherType::Video) {
            debug!("{:?} is not an image or video ({})", path, kind.mime_type());
            return Ok(None);
        }

        let fs_metadata = std::fs::metadata(path)
            .with_context(|| format!("Failed to stat media file {:?}", path))?;

        Ok(Some(ExtractedMetadata {
            mime_type: Some(kind.mime_type().to_string()),
            byte_size: fs_metadata.len(),
            taken_at: None,
            width: None,
            height: None,
        }))
    }

    fn render_thumbnail(
        &self,
        source: &Path,
        crop: Option<&CropRect>,
        destination: &Path,
        max_edge: u32,
    ) -> Result<()> {
        if max_edge == 0 {
            bail!("Thumbnail max edge must be positive");
        }
        if let Some(crop) = crop {
            crop.validate()?;
        }
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create thumbnail dir {:?}", parent))?;
        }
        std::fs::copy(source, destination).with_context(|| {
            format!(
                "Failed to write thumbnail {:?} from {:?}",
                destination, source
            )
        })?;
        Ok(())
    }
}
