//! Source of the blob URLs content rows currently reference.

use async_trait::async_trait;
use common::ContentDb;
use std::collections::HashSet;

/// Snapshot of referenced blob keys.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReferenceSource: Send + Sync {
    async fn referenced_urls(&self) -> anyhow::Result<HashSet<String>>;
}

/// References held in the `images` and `media` tables.
///
/// Only URLs under `url_prefix` (the storage public URL) count, so rows
/// pointing at third-party hosts never match a stored key.
#[derive(Debug, Clone)]
pub struct DatabaseReferences {
    db: ContentDb,
    url_prefix: String,
}

impl DatabaseReferences {
    pub fn new(db: ContentDb, public_url: &str) -> Self {
        Self {
            db,
            url_prefix: format!("{}/", public_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl ReferenceSource for DatabaseReferences {
    async fn referenced_urls(&self) -> anyhow::Result<HashSet<String>> {
        Ok(self.db.referenced_blob_urls(&self.url_prefix).await?)
    }
}

/// A fixed reference set.
#[async_trait]
impl ReferenceSource for HashSet<String> {
    async fn referenced_urls(&self) -> anyhow::Result<HashSet<String>> {
        Ok(self.clone())
    }
}
