//! Image codec boundary.
//!
//! Jobs only see the `MediaCodec` trait: "extract embedded metadata" and
//! "render a (cropped) thumbnail". Pixel-level work lives behind it.

mod file_probe;

pub use file_probe::FileProbeCodec;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Metadata read from a media file.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedMetadata {
    pub mime_type: Option<String>,
    pub byte_size: u64,
    pub taken_at: Option<DateTime<Utc>>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Crop rectangle in source pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            bail!(
                "Crop rectangle must have a non-zero area, got {}x{}",
                self.width,
                self.height
            );
        }
        Ok(())
    }
}

pub trait MediaCodec: Send + Sync {
    /// Reads embedded metadata.
    ///
    /// `Ok(None)` means the file was readable but carries nothing we can use.
    fn extract_metadata(&self, path: &Path) -> Result<Option<ExtractedMetadata>>;

    /// Renders the thumbnail for `source` into `destination`, applying `crop`
    /// first and bounding the longest edge to `max_edge`.
    fn render_thumbnail(
        &self,
        source: &Path,
        crop: Option<&CropRect>,
        destination: &Path,
        max_edge: u32,
    ) -> Result<()>;
}
