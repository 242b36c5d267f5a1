pub mod auth;
pub mod blob;
pub mod cache;
pub mod cli;
pub mod clock;
pub mod config;
pub mod database;
pub mod drafts;
pub mod storage;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use blob::{BlobBackend, BlobError, StoredBlob};
pub use database::ContentDb;
