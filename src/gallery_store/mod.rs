//! Gallery domain tables touched by background jobs.

mod models;
mod schema;
mod sqlite_gallery_store;

pub use models::{
    folder_depth, normalize_folder_path, Folder, InheritedTagBinding, MediaItem, MetadataUpdate,
    TagInheritanceSnapshot,
};
pub use schema::GALLERY_VERSIONED_SCHEMAS;
pub use sqlite_gallery_store::SqliteGalleryStore;

use crate::media_codec::CropRect;
use anyhow::Result;

pub trait GalleryStore: Send + Sync {
    // Folders, media and tags
    /// Inserts a folder, normalizing `path`. Returns the folder id.
    fn create_folder(&self, path: &str, name: &str) -> Result<i64>;
    fn get_folders(&self) -> Result<Vec<Folder>>;
    fn create_media(&self, folder_id: i64, file_path: &str) -> Result<i64>;
    fn get_media(&self, media_id: i64) -> Result<Option<MediaItem>>;
    fn create_tag(&self, name: &str) -> Result<i64>;
    fn add_folder_tag(&self, folder_id: i64, tag_id: i64) -> Result<()>;

    // Metadata extraction
    /// Media not yet processed by metadata extraction, lowest id first.
    fn get_media_needing_metadata(&self, limit: usize) -> Result<Vec<MediaItem>>;
    fn count_media_needing_metadata(&self) -> Result<usize>;
    /// Persists a whole batch in one transaction. Returns rows updated.
    fn store_metadata_batch(&self, updates: &[MetadataUpdate]) -> Result<usize>;

    // Inherited tags
    /// Folders, folder tags and media ownership read in one transaction.
    fn get_tag_inheritance_snapshot(&self) -> Result<TagInheritanceSnapshot>;
    /// Atomically replaces every inherited binding with `bindings`.
    ///
    /// Bindings for media deleted since the snapshot was taken are skipped.
    fn replace_inherited_tags(&self, bindings: &[InheritedTagBinding]) -> Result<()>;
    fn get_inherited_tags(&self, media_id: i64) -> Result<Vec<i64>>;
    fn count_inherited_tags(&self) -> Result<usize>;

    // Thumbnails
    /// Records a freshly rendered thumbnail. Returns false if the media is gone.
    fn update_thumbnail(
        &self,
        media_id: i64,
        crop: Option<&CropRect>,
        thumbnail_path: &str,
    ) -> Result<bool>;
}
