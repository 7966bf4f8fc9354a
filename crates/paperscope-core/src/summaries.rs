//! Per-paper AI summaries with request de-duplication.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use dashmap::DashMap;

use crate::api::PaperApi;
use crate::lock;
use crate::models::PaperId;

/// Error recorded when the backend answers with a blank summary.
pub const EMPTY_SUMMARY_ERROR: &str = "Empty summary returned from server.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SummaryStatus {
    #[default]
    Idle,
    Loading,
    Success,
    Error,
}

/// Snapshot of one paper's summary state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryEntry {
    pub status: SummaryStatus,
    pub summary: Option<String>,
    pub error: Option<String>,
    pub updated_at: Option<SystemTime>,
}

impl SummaryEntry {
    fn is_ready(&self) -> bool {
        self.status == SummaryStatus::Success && self.summary.is_some()
    }
}

struct Slot {
    entry: SummaryEntry,
    /// Identifies the request allowed to write this slot.
    ticket: u64,
}

pub struct SummaryStore {
    api: Arc<dyn PaperApi>,
    slots: Mutex<HashMap<PaperId, Slot>>,
    in_flight: DashMap<PaperId, Arc<tokio::sync::Mutex<()>>>,
    next_ticket: AtomicU64,
}

impl SummaryStore {
    pub fn new(api: Arc<dyn PaperApi>) -> Self {
        Self {
            api,
            slots: Mutex::new(HashMap::new()),
            in_flight: DashMap::new(),
            next_ticket: AtomicU64::new(1),
        }
    }

    /// Current state for `paper_id` (idle if never requested).
    pub fn entry(&self, paper_id: PaperId) -> SummaryEntry {
        lock(&self.slots)
            .get(&paper_id)
            .map(|slot| slot.entry.clone())
            .unwrap_or_default()
    }

    pub fn has_summary(&self, paper_id: PaperId) -> bool {
        lock(&self.slots)
            .get(&paper_id)
            .is_some_and(|slot| slot.entry.is_ready())
    }

    /// Request a summary and return the resulting state.
    ///
    /// A paper that already has a summary is left alone unless `force` is
    /// set. If a request for the paper is already running, this waits for it
    /// and returns its outcome instead of sending another.
    pub async fn summarise(&self, paper_id: PaperId, force: bool) -> SummaryEntry {
        if !force {
            let slots = lock(&self.slots);
            if let Some(slot) = slots.get(&paper_id)
                && slot.entry.is_ready()
            {
                return slot.entry.clone();
            }
        }

        let gate = self.in_flight.entry(paper_id).or_default().clone();
        let _permit = match gate.try_lock() {
            Ok(permit) => permit,
            Err(_) => {
                let _ = gate.lock().await;
                return self.entry(paper_id);
            }
        };

        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        {
            let mut slots = lock(&self.slots);
            let slot = slots.entry(paper_id).or_insert_with(|| Slot {
                entry: SummaryEntry::default(),
                ticket,
            });
            slot.ticket = ticket;
            slot.entry.status = SummaryStatus::Loading;
            slot.entry.error = None;
        }

        let outcome = match self.api.summarize(paper_id, "").await {
            Ok(summary) if summary.trim().is_empty() => Err(EMPTY_SUMMARY_ERROR.to_string()),
            Ok(summary) => Ok(summary),
            Err(e) => {
                tracing::warn!(paper_id, error = %e, "summary request failed");
                Err(e.to_string())
            }
        };

        let entry = {
            let mut slots = lock(&self.slots);
            match slots.get_mut(&paper_id) {
                Some(slot) if slot.ticket == ticket => {
                    match outcome {
                        Ok(summary) => {
                            slot.entry.status = SummaryStatus::Success;
                            slot.entry.summary = Some(summary);
                            slot.entry.updated_at = Some(SystemTime::now());
                        }
                        Err(message) => {
                            slot.entry.status = SummaryStatus::Error;
                            slot.entry.error = Some(message);
                        }
                    }
                    slot.entry.clone()
                }
                // Cleared while the request was running
                _ => SummaryEntry::default(),
            }
        };

        self.in_flight
            .remove_if(&paper_id, |_, current| Arc::ptr_eq(current, &gate));
        entry
    }

    /// Forget one paper's summary; a running request for it is discarded
    /// and the next `summarise` sends a fresh one.
    pub fn clear(&self, paper_id: PaperId) {
        lock(&self.slots).remove(&paper_id);
        self.in_flight.remove(&paper_id);
    }

    pub fn clear_all(&self) {
        lock(&self.slots).clear();
        self.in_flight.clear();
    }
}
