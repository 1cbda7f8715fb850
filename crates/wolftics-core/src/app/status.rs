//! Status - 配送状態のスナップショット
//!
//! エージェントの外から「いま何件溜まっていて、いつ次に送れるか」を
//! 説明するための読み取り専用ビューです。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Running totals since the engine was created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryCounters {
    pub enqueued: u64,
    /// Dropped on overflow (enqueue or requeue).
    pub evicted: u64,
    /// Accepted by the endpoint.
    pub delivered: u64,
    /// Definitively declined by the endpoint (permanent status or a
    /// non-retryable rejection).
    pub rejected: u64,
    pub requeued: u64,
    /// Dropped after reaching the per-event attempt ceiling.
    pub exhausted: u64,
    pub failed_attempts: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryStatus {
    pub queued: usize,
    pub capacity: usize,
    pub sending: bool,
    pub current_backoff_ms: u64,
    pub next_eligible_flush_at: Option<DateTime<Utc>>,
    pub storage_available: bool,
    pub counters: DeliveryCounters,
}

impl DeliveryStatus {
    /// Whether a non-forced flush would be held back at `now`.
    pub fn is_backing_off(&self, now: DateTime<Utc>) -> bool {
        self.next_eligible_flush_at.is_some_and(|at| now < at)
    }
}
