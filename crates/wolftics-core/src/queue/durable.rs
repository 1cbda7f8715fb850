//! Durable bounded queue.
//!
//! The in-memory `VecDeque` is the source of truth; storage is a best-effort
//! mirror rewritten after every mutation.

use std::collections::VecDeque;
use std::sync::Arc;

use serde_json::Value;

use super::record::{PersistedRecord, QueuedEvent};
use crate::domain::errors::StorageError;
use crate::ports::storage::Storage;

/// Storage key of the persisted queue for a property.
pub fn storage_key(property_key: &str) -> String {
    format!("wolftics:q:{property_key}")
}

/// FIFO of pending events, bounded by `capacity`.
///
/// Overflow always evicts from the front (oldest first), so the newest event
/// wins.
pub struct DurableQueue {
    records: VecDeque<QueuedEvent>,
    capacity: usize,
    max_persisted: usize,
    storage: Arc<dyn Storage>,
    key: String,
    storage_available: bool,
}

impl DurableQueue {
    /// Restore the queue from storage.
    ///
    /// Never fails: a missing, unreadable or corrupt blob yields an empty
    /// queue. Individual entries that do not parse are skipped.
    pub fn load(
        storage: Arc<dyn Storage>,
        key: impl Into<String>,
        capacity: usize,
        max_persisted: usize,
    ) -> Self {
        let key = key.into();
        let capacity = capacity.max(1);
        let mut storage_available = true;

        let mut records = match storage.get(&key) {
            Ok(Some(blob)) => parse_blob(&key, &blob),
            Ok(None) => VecDeque::new(),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "queue storage unreadable, starting empty");
                storage_available = false;
                VecDeque::new()
            }
        };

        while records.len() > capacity {
            records.pop_front();
        }

        if !records.is_empty() {
            tracing::debug!(key = %key, events = records.len(), "restored persisted queue");
        }

        Self {
            records,
            capacity,
            max_persisted,
            storage,
            key,
            storage_available,
        }
    }

    /// Append a record; returns the evicted oldest record when full.
    pub fn enqueue(&mut self, record: QueuedEvent) -> Option<QueuedEvent> {
        let evicted = if self.records.len() >= self.capacity {
            self.records.pop_front()
        } else {
            None
        };
        self.records.push_back(record);
        self.persist();
        evicted
    }

    /// Put records back at the front in their given order.
    ///
    /// Returns how many records were evicted (oldest first) to get back
    /// within capacity.
    pub fn requeue_front(&mut self, records: Vec<QueuedEvent>) -> usize {
        if records.is_empty() {
            return 0;
        }
        for record in records.into_iter().rev() {
            self.records.push_front(record);
        }

        let mut evicted = 0;
        while self.records.len() > self.capacity {
            self.records.pop_front();
            evicted += 1;
        }
        self.persist();
        evicted
    }

    /// Remove up to `n` records from the front.
    ///
    /// Taken records are no longer part of the durable state: a crash while
    /// they are in flight loses them.
    pub fn take_batch(&mut self, n: usize) -> Vec<QueuedEvent> {
        let n = n.min(self.records.len());
        if n == 0 {
            return Vec::new();
        }
        let batch: Vec<QueuedEvent> = self.records.drain(..n).collect();
        self.persist();
        batch
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueuedEvent> {
        self.records.iter()
    }

    /// False after the last write failed; the queue is memory-only until a
    /// write succeeds again.
    pub fn storage_available(&self) -> bool {
        self.storage_available
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    fn persist(&mut self) {
        match self.write_through() {
            Ok(()) => {
                if !self.storage_available {
                    tracing::info!(key = %self.key, "queue storage available again");
                }
                self.storage_available = true;
            }
            Err(e) => {
                if self.storage_available {
                    tracing::warn!(key = %self.key, error = %e, "queue storage failed, continuing in memory");
                } else {
                    tracing::debug!(key = %self.key, error = %e, "queue storage still unavailable");
                }
                self.storage_available = false;
            }
        }
    }

    fn write_through(&self) -> Result<(), StorageError> {
        let skip = self.records.len().saturating_sub(self.max_persisted);
        let trailing: Vec<&QueuedEvent> = self.records.iter().skip(skip).collect();
        if trailing.is_empty() {
            return self.storage.remove(&self.key);
        }
        let blob = serde_json::to_string(&trailing)?;
        self.storage.set(&self.key, &blob)
    }
}

fn parse_blob(key: &str, blob: &str) -> VecDeque<QueuedEvent> {
    let entries = match serde_json::from_str::<Value>(blob) {
        Ok(Value::Array(entries)) => entries,
        Ok(_) => {
            tracing::warn!(key = %key, "persisted queue is not a list, ignoring it");
            return VecDeque::new();
        }
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "persisted queue is corrupt, ignoring it");
            return VecDeque::new();
        }
    };

    let total = entries.len();
    let records: VecDeque<QueuedEvent> = entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value::<PersistedRecord>(entry).ok())
        .map(QueuedEvent::from)
        .collect();

    if records.len() < total {
        tracing::debug!(key = %key, skipped = total - records.len(), "skipped unreadable queue entries");
    }
    records
}
