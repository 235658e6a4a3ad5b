//! Gallery Server Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod background_jobs;
pub mod config;
pub mod gallery_store;
pub mod job_ledger;
pub mod media_codec;
pub mod metrics;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use background_jobs::{JobRegistry, JobRunner};
pub use gallery_store::{GalleryStore, SqliteGalleryStore};
pub use job_ledger::{JobLedger, SqliteJobLedger};
