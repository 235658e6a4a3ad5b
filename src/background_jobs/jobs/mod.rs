//! Concrete background jobs.
//!
//! One job per maintenance pattern: a restartable batch pass over
//! unprocessed media, a full recompute of derived tags, and a
//! single-resource thumbnail refresh.

pub mod metadata_extraction;
pub mod tag_inheritance;
pub mod thumbnail;

pub use metadata_extraction::{ExtractMetadataArgs, ExtractMetadataJob};
pub use tag_inheritance::{
    compute_inherited_bindings, RebuildInheritedTagsArgs, RebuildInheritedTagsJob,
};
pub use thumbnail::{RegenerateThumbnailArgs, RegenerateThumbnailJob};

use std::path::{Path, PathBuf};

/// Media rows store paths relative to the media root, absolute ones are
/// used as they are.
fn resolve_media_path(media_root: &Path, file_path: &str) -> PathBuf {
    let path = Path::new(file_path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        media_root.join(path)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_media_path() {
        let root = Path::new("/srv/photos");
        assert_eq!(
            resolve_media_path(root, "2024/beach.jpg"),
            PathBuf::from("/srv/photos/2024/beach.jpg")
        );
        assert_eq!(
            resolve_media_path(root, "/mnt/usb/cat.png"),
            PathBuf::from("/mnt/usb/cat.png")
        );
    }
}
