//! Bounded in-memory cache of paper PDFs, backed by the API on miss.
//!
//! Eviction is strict LRU: inserting into a full cache drops exactly one
//! entry, the one that has gone longest without a [`get`](PdfCache::get)
//! hit. Only successful downloads are cached; a failed fetch leaves no
//! entry behind, so the next `get` for that paper fetches again.
//!
//! Concurrent misses for the same paper are coalesced: the first caller
//! downloads while the others wait on a per-paper gate and then read the
//! freshly cached entry.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use lru::LruCache;

use crate::api::{ApiError, PaperApi, PdfBlob};
use crate::lock;
use crate::models::PaperId;

/// Default number of PDFs kept in memory.
pub const DEFAULT_PDF_CACHE_CAPACITY: usize = 40;

pub struct PdfCache {
    api: Arc<dyn PaperApi>,
    entries: Mutex<LruCache<PaperId, PdfBlob>>,
    /// One gate per paper currently being downloaded.
    in_flight: DashMap<PaperId, Arc<tokio::sync::Mutex<()>>>,
    /// Bumped by [`clear`](PdfCache::clear); a download that started under
    /// an older generation is returned to its caller but not cached.
    generation: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl std::fmt::Debug for PdfCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("hits", &self.hits())
            .field("misses", &self.misses())
            .field("evictions", &self.evictions())
            .finish()
    }
}

impl PdfCache {
    /// Create an empty cache. A capacity of zero is treated as one.
    pub fn new(api: Arc<dyn PaperApi>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            api,
            entries: Mutex::new(LruCache::new(capacity)),
            in_flight: DashMap::new(),
            generation: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Return the PDF for `paper_id`, downloading it on a miss.
    ///
    /// A hit moves the entry to the most-recently-used position. Fetch
    /// errors are propagated unchanged and nothing is cached for them.
    pub async fn get(&self, paper_id: PaperId) -> Result<PdfBlob, ApiError> {
        if let Some(blob) = self.lookup(paper_id) {
            return Ok(blob);
        }

        let gate = self.in_flight.entry(paper_id).or_default().clone();
        let _permit = gate.lock().await;

        // Someone else may have finished the download while we waited.
        if let Some(blob) = self.lookup(paper_id) {
            return Ok(blob);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(paper_id, "pdf cache miss, fetching");
        let generation = self.generation.load(Ordering::SeqCst);
        let result = self.api.fetch_pdf(paper_id).await;

        match &result {
            Ok(blob) if self.generation.load(Ordering::SeqCst) == generation => {
                self.insert(paper_id, blob.clone());
            }
            Ok(_) => {
                tracing::trace!(paper_id, "cache cleared during fetch, not caching");
            }
            Err(e) => {
                tracing::debug!(paper_id, error = %e, "pdf fetch failed");
            }
        }

        self.in_flight
            .remove_if(&paper_id, |_, current| Arc::ptr_eq(current, &gate));
        result
    }

    /// Drop every cached PDF (e.g. on logout).
    pub fn clear(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let mut entries = lock(&self.entries);
        let dropped = entries.len();
        entries.clear();
        tracing::trace!(dropped, "pdf cache cleared");
    }

    /// Whether `paper_id` is cached, without touching its recency.
    pub fn contains(&self, paper_id: PaperId) -> bool {
        lock(&self.entries).contains(&paper_id)
    }

    /// Cached paper ids, least recently used first.
    pub fn cached_ids(&self) -> Vec<PaperId> {
        let entries = lock(&self.entries);
        let mut ids: Vec<PaperId> = entries.iter().map(|(id, _)| *id).collect();
        ids.reverse();
        ids
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        lock(&self.entries).cap().get()
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    fn lookup(&self, paper_id: PaperId) -> Option<PdfBlob> {
        let blob = lock(&self.entries).get(&paper_id).cloned()?;
        self.hits.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(paper_id, "pdf cache hit");
        Some(blob)
    }

    fn insert(&self, paper_id: PaperId, blob: PdfBlob) {
        let mut entries = lock(&self.entries);
        if let Some((evicted, _)) = entries.push(paper_id, blob)
            && evicted != paper_id
        {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(evicted, "evicted least recently used pdf");
        }
    }
}
