//! Blob storage backend abstraction.
//!
//! Blobs are identified by their public URL (`{public_url}/{path}`), which is
//! the value content rows store in their `url` column. The backend lists blobs
//! page by page through an opaque cursor and deletes them either in bulk or one
//! at a time.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use object_store::ObjectStore;
use object_store::path::Path as ObjectPath;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A blob as seen by listing the storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredBlob {
    /// Public URL; the key content rows reference.
    pub url: String,
    /// Path inside the store.
    pub pathname: String,
    pub uploaded_at: DateTime<Utc>,
    pub size: u64,
}

/// One page of a blob listing.
#[derive(Debug, Clone, Default)]
pub struct BlobPage {
    pub blobs: Vec<StoredBlob>,
    /// Cursor for the next page, `None` when the listing is exhausted.
    pub cursor: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("Blob key '{0}' is not under the configured public URL")]
    ForeignKey(String),

    #[error("Invalid blob path '{path}': {message}")]
    InvalidPath { path: String, message: String },

    #[error("Bulk delete failed for {failed} of {total} blobs")]
    BulkDelete { failed: usize, total: usize },

    #[error("Object store error: {0}")]
    Store(#[from] object_store::Error),

    #[error("{0}")]
    Backend(String),
}

#[async_trait]
pub trait BlobBackend: Send + Sync {
    /// List up to `page_size` blobs, starting after `cursor`.
    async fn list_page(&self, cursor: Option<&str>, page_size: usize)
    -> Result<BlobPage, BlobError>;

    /// Delete all `urls` in one request. Fails as a whole if any key fails.
    async fn delete_many(&self, urls: &[String]) -> Result<(), BlobError>;

    /// Delete a single blob.
    async fn delete(&self, url: &str) -> Result<(), BlobError>;
}

/// [`BlobBackend`] over any `object_store` implementation.
///
/// Pagination needs listings in lexicographic key order. S3 and the in-memory
/// store list that way; for stores that don't (the local filesystem) the
/// backend is built with [`ObjectStoreBackend::unordered`] and sorts each
/// listing itself.
pub struct ObjectStoreBackend {
    store: Arc<dyn ObjectStore>,
    public_url: String,
    sorted_listing: bool,
}

impl std::fmt::Debug for ObjectStoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStoreBackend")
            .field("store", &self.store.to_string())
            .field("public_url", &self.public_url)
            .field("sorted_listing", &self.sorted_listing)
            .finish()
    }
}

impl ObjectStoreBackend {
    pub fn new(store: Arc<dyn ObjectStore>, public_url: &str) -> anyhow::Result<Self> {
        let public_url = public_url.trim_end_matches('/').to_string();
        if public_url.is_empty() {
            anyhow::bail!("Storage public_url must not be empty");
        }
        Ok(Self {
            store,
            public_url,
            sorted_listing: true,
        })
    }

    /// Backend for a store whose listing order is unspecified.
    ///
    /// Every page lists the whole store, so this is only suitable for small
    /// local stores.
    pub fn unordered(store: Arc<dyn ObjectStore>, public_url: &str) -> anyhow::Result<Self> {
        Ok(Self {
            sorted_listing: false,
            ..Self::new(store, public_url)?
        })
    }

    pub fn url_for(&self, path: &ObjectPath) -> String {
        format!("{}/{}", self.public_url, path)
    }

    pub fn path_for(&self, url: &str) -> Result<ObjectPath, BlobError> {
        let path = url
            .strip_prefix(&self.public_url)
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| BlobError::ForeignKey(url.to_string()))?;

        ObjectPath::parse(path).map_err(|e| BlobError::InvalidPath {
            path: path.to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl BlobBackend for ObjectStoreBackend {
    async fn list_page(
        &self,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<BlobPage, BlobError> {
        let offset = cursor
            .map(|offset| {
                ObjectPath::parse(offset).map_err(|e| BlobError::InvalidPath {
                    path: offset.to_string(),
                    message: e.to_string(),
                })
            })
            .transpose()?;

        // One extra entry tells us whether another page exists.
        let mut metas: Vec<_> = if self.sorted_listing {
            let stream = match &offset {
                Some(offset) => self.store.list_with_offset(None, offset),
                None => self.store.list(None),
            };
            stream.take(page_size + 1).try_collect().await?
        } else {
            let mut all: Vec<_> = self
                .store
                .list(None)
                .try_filter(|meta| {
                    let after = offset.as_ref().is_none_or(|offset| meta.location > *offset);
                    futures::future::ready(after)
                })
                .try_collect()
                .await?;
            all.sort_by(|a, b| a.location.cmp(&b.location));
            all.truncate(page_size + 1);
            all
        };

        let has_more = metas.len() > page_size;
        metas.truncate(page_size);

        let cursor = if has_more {
            metas.last().map(|meta| meta.location.to_string())
        } else {
            None
        };

        let blobs = metas
            .into_iter()
            .map(|meta| StoredBlob {
                url: self.url_for(&meta.location),
                pathname: meta.location.to_string(),
                uploaded_at: meta.last_modified,
                size: meta.size as u64,
            })
            .collect();

        Ok(BlobPage { blobs, cursor })
    }

    async fn delete_many(&self, urls: &[String]) -> Result<(), BlobError> {
        let paths = urls
            .iter()
            .map(|url| self.path_for(url))
            .collect::<Result<Vec<_>, _>>()?;

        let locations = futures::stream::iter(paths.into_iter().map(Ok)).boxed();
        let results: Vec<_> = self.store.delete_stream(locations).collect().await;

        let failed = results.iter().filter(|result| result.is_err()).count();
        if failed > 0 {
            return Err(BlobError::BulkDelete {
                failed,
                total: urls.len(),
            });
        }

        Ok(())
    }

    async fn delete(&self, url: &str) -> Result<(), BlobError> {
        let path = self.path_for(url)?;
        self.store.delete(&path).await?;
        Ok(())
    }
}
