//! Debounced draft autosave.
//!
//! Admin forms push their in-progress state on every edit. The store keeps the
//! latest payload per [`DraftKey`] in memory and only writes it to the
//! [`DraftBackend`] once the key has been quiet for the debounce interval.
//! Persisted drafts older than the TTL are treated as absent.

use crate::clock::Clock;
use crate::database::{ContentDb, DraftRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Identifies a draft: which entity, which instance, edited from which page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftKey {
    pub entity: String,
    pub entity_id: String,
    pub route: String,
}

impl DraftKey {
    pub fn new(
        entity: impl Into<String>,
        entity_id: impl Into<String>,
        route: impl Into<String>,
    ) -> Self {
        Self {
            entity: entity.into(),
            entity_id: entity_id.into(),
            route: route.into(),
        }
    }
}

impl std::fmt::Display for DraftKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}@{}", self.entity, self.entity_id, self.route)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    #[serde(flatten)]
    pub key: DraftKey,
    pub payload: serde_json::Value,
    pub saved_at: DateTime<Utc>,
}

/// Persistence for drafts.
#[async_trait]
pub trait DraftBackend: Send + Sync {
    async fn write(&self, draft: &DraftRecord) -> anyhow::Result<()>;
    async fn read(&self, key: &DraftKey) -> anyhow::Result<Option<DraftRecord>>;
    async fn remove(&self, key: &DraftKey) -> anyhow::Result<bool>;
    async fn remove_all(&self) -> anyhow::Result<u64>;
}

#[async_trait]
impl DraftBackend for ContentDb {
    async fn write(&self, draft: &DraftRecord) -> anyhow::Result<()> {
        self.upsert_draft(draft).await?;
        Ok(())
    }

    async fn read(&self, key: &DraftKey) -> anyhow::Result<Option<DraftRecord>> {
        Ok(self
            .get_draft(&key.entity, &key.entity_id, &key.route)
            .await?)
    }

    async fn remove(&self, key: &DraftKey) -> anyhow::Result<bool> {
        Ok(self
            .delete_draft(&key.entity, &key.entity_id, &key.route)
            .await?)
    }

    async fn remove_all(&self) -> anyhow::Result<u64> {
        Ok(self.delete_all_drafts().await?)
    }
}

/// Process-local backend. Drafts are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryDraftBackend {
    drafts: Mutex<HashMap<DraftKey, DraftRecord>>,
    writes: AtomicUsize,
}

impl MemoryDraftBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of writes performed so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<DraftKey, DraftRecord>> {
        self.drafts.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl DraftBackend for MemoryDraftBackend {
    async fn write(&self, draft: &DraftRecord) -> anyhow::Result<()> {
        let key = DraftKey::new(&draft.entity, &draft.entity_id, &draft.route);
        self.lock().insert(key, draft.clone());
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn read(&self, key: &DraftKey) -> anyhow::Result<Option<DraftRecord>> {
        Ok(self.lock().get(key).cloned())
    }

    async fn remove(&self, key: &DraftKey) -> anyhow::Result<bool> {
        Ok(self.lock().remove(key).is_some())
    }

    async fn remove_all(&self) -> anyhow::Result<u64> {
        let mut drafts = self.lock();
        let count = drafts.len() as u64;
        drafts.clear();
        Ok(count)
    }
}

struct Pending {
    generation: u64,
    payload: serde_json::Value,
    saved_at: DateTime<Utc>,
}

struct Inner {
    backend: Arc<dyn DraftBackend>,
    clock: Arc<dyn Clock>,
    debounce: Duration,
    ttl: Duration,
    pending: Mutex<HashMap<DraftKey, Pending>>,
    next_generation: AtomicU64,
    /// Held across every backend write and removal. A dismiss waits for an
    /// in-flight write, so the write can never land after the removal.
    io: tokio::sync::Mutex<()>,
}

impl Inner {
    fn pending(&self) -> std::sync::MutexGuard<'_, HashMap<DraftKey, Pending>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Persist the pending payload for `key` if it still belongs to
    /// `generation`. A newer save or a dismiss invalidates older timers.
    ///
    /// On a backend failure the pending entry is kept: `restore` keeps serving
    /// it and the next `flush` retries it.
    async fn write_if_current(&self, key: &DraftKey, generation: u64) -> bool {
        let _io = self.io.lock().await;

        let record = {
            let pending = self.pending();
            match pending.get(key) {
                Some(p) if p.generation == generation => to_record(key, p),
                _ => return false,
            }
        };

        if let Err(e) = self.backend.write(&record).await {
            tracing::error!(draft = %key, error = %e, "Failed to persist draft, keeping it pending");
            return false;
        }
        tracing::debug!(draft = %key, "Draft persisted");

        let mut pending = self.pending();
        if pending.get(key).map(|p| p.generation) == Some(generation) {
            pending.remove(key);
        }
        true
    }
}

fn to_record(key: &DraftKey, pending: &Pending) -> DraftRecord {
    DraftRecord {
        entity: key.entity.clone(),
        entity_id: key.entity_id.clone(),
        route: key.route.clone(),
        payload: pending.payload.to_string(),
        saved_at: pending.saved_at,
    }
}

/// Keyed draft store with a debounce timer per key.
#[derive(Clone)]
pub struct DraftStore {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for DraftStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DraftStore")
            .field("debounce", &self.inner.debounce)
            .field("ttl", &self.inner.ttl)
            .finish()
    }
}

impl DraftStore {
    pub fn new(
        backend: Arc<dyn DraftBackend>,
        clock: Arc<dyn Clock>,
        debounce: Duration,
        ttl: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                clock,
                debounce,
                ttl,
                pending: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
                io: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Record the latest payload for `key` and (re)start its debounce timer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn save(&self, key: DraftKey, payload: serde_json::Value) {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let saved_at = self.inner.clock.now();

        self.inner.pending().insert(
            key.clone(),
            Pending {
                generation,
                payload,
                saved_at,
            },
        );

        let inner = self.inner.clone();
        tokio::spawn(async move {
            tokio::time::sleep(inner.debounce).await;
            inner.write_if_current(&key, generation).await;
        });
    }

    /// Latest draft for `key`: the pending payload if any, else the persisted
    /// one unless it has outlived the TTL.
    pub async fn restore(&self, key: &DraftKey) -> anyhow::Result<Option<Draft>> {
        if let Some(pending) = self.inner.pending().get(key) {
            return Ok(Some(Draft {
                key: key.clone(),
                payload: pending.payload.clone(),
                saved_at: pending.saved_at,
            }));
        }

        let Some(record) = self.inner.backend.read(key).await? else {
            return Ok(None);
        };

        if self.is_expired(record.saved_at) {
            tracing::debug!(draft = %key, saved_at = %record.saved_at, "Discarding expired draft");
            let _io = self.inner.io.lock().await;
            self.inner.backend.remove(key).await?;
            return Ok(None);
        }

        Ok(Some(Draft {
            key: key.clone(),
            payload: serde_json::from_str(&record.payload)?,
            saved_at: record.saved_at,
        }))
    }

    /// Cancel any pending write for `key` and delete its persisted draft.
    /// Returns whether there was anything to discard.
    pub async fn dismiss(&self, key: &DraftKey) -> anyhow::Result<bool> {
        let had_pending = self.inner.pending().remove(key).is_some();
        let _io = self.inner.io.lock().await;
        let had_persisted = self.inner.backend.remove(key).await?;
        Ok(had_pending || had_persisted)
    }

    /// Cancel every pending write and delete all persisted drafts.
    pub async fn clear(&self) -> anyhow::Result<u64> {
        let cancelled = {
            let mut pending = self.inner.pending();
            let count = pending.len();
            pending.clear();
            count
        };
        let removed = {
            let _io = self.inner.io.lock().await;
            self.inner.backend.remove_all().await?
        };
        tracing::info!(cancelled, removed, "Cleared drafts");
        Ok(removed)
    }

    /// Write every pending draft now, returning how many were written.
    pub async fn flush(&self) -> usize {
        let due: Vec<(DraftKey, u64)> = self
            .inner
            .pending()
            .iter()
            .map(|(key, p)| (key.clone(), p.generation))
            .collect();

        let mut written = 0;
        for (key, generation) in &due {
            if self.inner.write_if_current(key, *generation).await {
                written += 1;
            }
        }
        written
    }

    /// Number of drafts waiting for their debounce timer.
    pub fn pending_count(&self) -> usize {
        self.inner.pending().len()
    }

    fn is_expired(&self, saved_at: DateTime<Utc>) -> bool {
        let ttl = chrono::Duration::from_std(self.inner.ttl).unwrap_or(chrono::Duration::MAX);
        match saved_at.checked_add_signed(ttl) {
            Some(expires_at) => expires_at <= self.inner.clock.now(),
            None => false,
        }
    }
}
