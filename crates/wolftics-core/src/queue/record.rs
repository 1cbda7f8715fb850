//! Queue record: event + delivery bookkeeping.

use serde::{Deserialize, Serialize};

use crate::domain::event::Event;

/// An event as held by the queue.
///
/// The event itself never changes; only the failed-attempt counter does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedEvent {
    pub event: Event,

    /// Number of delivery attempts that ended with this event requeued.
    #[serde(default)]
    pub attempts: u32,
}

impl QueuedEvent {
    pub fn new(event: Event) -> Self {
        Self { event, attempts: 0 }
    }

    /// Record one more failed attempt.
    pub fn mark_failed_attempt(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
    }
}

/// Accepted shapes of a persisted queue entry.
///
/// Entries written by this crate carry the attempt counter; a bare event
/// (as written by the browser tracker) starts at zero attempts.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum PersistedRecord {
    Record(QueuedEvent),
    Bare(Event),
}

impl From<PersistedRecord> for QueuedEvent {
    fn from(record: PersistedRecord) -> Self {
        match record {
            PersistedRecord::Record(r) => r,
            PersistedRecord::Bare(event) => QueuedEvent::new(event),
        }
    }
}
