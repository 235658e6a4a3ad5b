//! Common test infrastructure
//!
//! Builds a throwaway gallery (databases, media files, config) and job
//! runners over it. Tests should only import from this module.

mod codecs;
mod fixtures;

pub use codecs::GatedCodec;
pub use fixtures::{TestGallery, PNG_HEADER};
