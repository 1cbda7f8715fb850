//! Batcher: slices the queue head into delivery batches.

use super::durable::DurableQueue;
use super::record::QueuedEvent;
use crate::domain::event::Event;
use crate::domain::ids::BatchId;

/// Events taken from the queue for one delivery attempt.
#[derive(Debug, Clone)]
pub struct Batch {
    pub id: BatchId,
    pub records: Vec<QueuedEvent>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The events in batch order, as they go on the wire.
    pub fn events(&self) -> Vec<Event> {
        self.records.iter().map(|r| r.event.clone()).collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Batcher {
    batch_size: usize,
}

impl Batcher {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn next_batch(&self, queue: &mut DurableQueue, id: BatchId) -> Option<Batch> {
        let records = queue.take_batch(self.batch_size);
        if records.is_empty() {
            return None;
        }
        Some(Batch { id, records })
    }

    pub fn holds_full_batch(&self, queue: &DurableQueue) -> bool {
        queue.len() >= self.batch_size
    }

    /// The last append brought the queue up to exactly one batch.
    pub fn just_filled(&self, queue: &DurableQueue) -> bool {
        queue.len() == self.batch_size
    }
}
