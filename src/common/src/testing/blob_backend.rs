//! Scriptable in-memory [`BlobBackend`].

use crate::blob::{BlobBackend, BlobError, BlobPage, StoredBlob};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

/// A call recorded by [`FakeBlobBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobCall {
    List { cursor: Option<String> },
    DeleteMany(Vec<String>),
    Delete(String),
}

#[derive(Default)]
struct State {
    /// pathname -> blob, kept in listing order
    blobs: BTreeMap<String, StoredBlob>,
    fail_listing: Option<String>,
    fail_bulk: bool,
    failing_urls: HashSet<String>,
    calls: Vec<BlobCall>,
}

/// Blob backend with controllable upload times and failure injection.
///
/// Cloning yields a handle to the same state.
#[derive(Clone)]
pub struct FakeBlobBackend {
    public_url: String,
    state: Arc<Mutex<State>>,
}

impl FakeBlobBackend {
    pub fn new(public_url: &str) -> Self {
        Self {
            public_url: public_url.trim_end_matches('/').to_string(),
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// Add a blob, returning its URL.
    pub fn insert(&self, pathname: &str, uploaded_at: DateTime<Utc>, size: u64) -> String {
        let url = self.url_for(pathname);
        self.lock().blobs.insert(
            pathname.to_string(),
            StoredBlob {
                url: url.clone(),
                pathname: pathname.to_string(),
                uploaded_at,
                size,
            },
        );
        url
    }

    pub fn url_for(&self, pathname: &str) -> String {
        format!("{}/{}", self.public_url, pathname)
    }

    /// Make every `list_page` call fail with `message`.
    pub fn fail_listing(&self, message: &str) {
        self.lock().fail_listing = Some(message.to_string());
    }

    /// Make every `delete_many` call fail without deleting anything.
    pub fn fail_bulk_deletes(&self) {
        self.lock().fail_bulk = true;
    }

    /// Make single deletes of `url` fail.
    pub fn fail_delete_of(&self, url: &str) {
        self.lock().failing_urls.insert(url.to_string());
    }

    /// URLs currently stored, in listing order.
    pub fn urls(&self) -> Vec<String> {
        self.lock().blobs.values().map(|b| b.url.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn calls(&self) -> Vec<BlobCall> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn pathname_of<'a>(&self, url: &'a str) -> Result<&'a str, BlobError> {
        url.strip_prefix(&self.public_url)
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| BlobError::ForeignKey(url.to_string()))
    }
}

#[async_trait]
impl BlobBackend for FakeBlobBackend {
    async fn list_page(
        &self,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<BlobPage, BlobError> {
        let mut state = self.lock();
        state.calls.push(BlobCall::List {
            cursor: cursor.map(str::to_string),
        });

        if let Some(message) = &state.fail_listing {
            return Err(BlobError::Backend(message.clone()));
        }

        let mut remaining = state
            .blobs
            .iter()
            .filter(|(pathname, _)| cursor.is_none_or(|c| pathname.as_str() > c))
            .map(|(_, blob)| blob.clone());

        let blobs: Vec<StoredBlob> = remaining.by_ref().take(page_size).collect();
        let cursor = match remaining.next() {
            Some(_) => blobs.last().map(|b| b.pathname.clone()),
            None => None,
        };

        Ok(BlobPage { blobs, cursor })
    }

    async fn delete_many(&self, urls: &[String]) -> Result<(), BlobError> {
        let mut state = self.lock();
        state.calls.push(BlobCall::DeleteMany(urls.to_vec()));

        if state.fail_bulk {
            return Err(BlobError::Backend("bulk delete unavailable".to_string()));
        }

        let paths = urls
            .iter()
            .map(|url| self.pathname_of(url))
            .collect::<Result<Vec<_>, _>>()?;
        for path in paths {
            state.blobs.remove(path);
        }
        Ok(())
    }

    async fn delete(&self, url: &str) -> Result<(), BlobError> {
        let mut state = self.lock();
        state.calls.push(BlobCall::Delete(url.to_string()));

        if state.failing_urls.contains(url) {
            return Err(BlobError::Backend(format!("delete of {url} rejected")));
        }

        let path = self.pathname_of(url)?;
        state.blobs.remove(path);
        Ok(())
    }
}
