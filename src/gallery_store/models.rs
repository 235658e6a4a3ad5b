use crate::media_codec::{CropRect, ExtractedMetadata};
use chrono::{DateTime, Utc};

/// A folder of the gallery hierarchy.
///
/// `path` is a materialized path (see [`normalize_folder_path`]); a folder's
/// descendants are exactly the folders whose path starts with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folder {
    pub id: i64,
    pub path: String,
    pub name: String,
}

impl Folder {
    /// Number of path segments, 0 for the root.
    pub fn depth(&self) -> usize {
        folder_depth(&self.path)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaItem {
    pub id: i64,
    pub folder_id: i64,
    pub file_path: String,
    /// Set once metadata extraction processed this item, even if it found nothing.
    pub metadata_extracted_at: Option<DateTime<Utc>>,
    pub mime_type: Option<String>,
    pub byte_size: Option<u64>,
    pub taken_at: Option<DateTime<Utc>>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub crop: Option<CropRect>,
    pub thumbnail_path: Option<String>,
    pub thumbnail_updated_at: Option<DateTime<Utc>>,
}

/// Result of processing one media item in a metadata batch.
///
/// `metadata: None` is the sentinel "processed, no data" marker.
#[derive(Debug, Clone)]
pub struct MetadataUpdate {
    pub media_id: i64,
    pub metadata: Option<ExtractedMetadata>,
}

/// Everything the inherited tag rebuild reads, taken from a single read
/// transaction so the three lists agree with each other.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagInheritanceSnapshot {
    pub folders: Vec<Folder>,
    /// `(folder_id, tag_id)` pairs of tags attached directly to folders.
    pub folder_tags: Vec<(i64, i64)>,
    /// `(media_id, folder_id)` ownership pairs.
    pub media_folders: Vec<(i64, i64)>,
}

/// A tag a media item inherits from one of its containing folders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InheritedTagBinding {
    pub media_id: i64,
    pub tag_id: i64,
}

/// Normalizes a folder path to `/seg1/seg2/` form.
///
/// Empty and `.` segments are dropped, the root is `/`. The trailing slash
/// keeps prefix tests honest: `/a/` is not a prefix of `/ab/`.
pub fn normalize_folder_path(raw: &str) -> String {
    let segments: Vec<&str> = raw
        .split(['/', '\\'])
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();
    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", segments.join("/"))
    }
}

/// Depth of a normalized folder path.
pub fn folder_depth(path: &str) -> usize {
    path.matches('/').count().saturating_sub(1)
}
