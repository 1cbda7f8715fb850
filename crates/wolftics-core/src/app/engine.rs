//! DeliveryEngine - 配送の状態機械
//!
//! キュー・バッチャー・バックオフ・配送状態をひとつの値にまとめたものです。
//! グローバル状態は持たず、endpoint 設定ごとに 1 インスタンス作ります。
//!
//! # 流れ
//! ```text
//! begin_flush(trigger) ──> InFlight ──(transport.send)──> complete_flush(in_flight, result)
//!        │                                                      │
//!        └─ FlushSkipped (InFlight / Empty / BackingOff)        └─ classify → decide → apply
//! ```
//!
//! `begin_flush` と `complete_flush` はどちらも同期処理です。送信の await を
//! 外に出すことで、エージェントは送信中も他のコマンドを受け付けられます。

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;

use super::status::{DeliveryCounters, DeliveryStatus};
use super::trigger::Trigger;
use crate::domain::decision::{Decider, Decision, DefaultDecider};
use crate::domain::errors::TransportError;
use crate::domain::event::Event;
use crate::domain::ids::{BatchId, EventId};
use crate::domain::outcome::{DeliveryOutcome, TransportReply, classify};
use crate::ports::clock::Clock;
use crate::ports::id_generator::IdGenerator;
use crate::ports::storage::Storage;
use crate::ports::transport::{DeliveryRequest, Transports};
use crate::queue::{Backoff, Batcher, DeliveryState, DurableQueue, QueuedEvent, storage_key};

/// Engine settings, derived from `AgentConfig`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryConfig {
    pub property_key: String,
    pub max_queue_size: usize,
    pub max_persisted_events: usize,
    pub batch_size: usize,
    pub initial_retry_delay: Duration,
    pub max_retry_delay: Duration,
    /// 0 disables the ceiling.
    pub max_attempts_per_event: u32,
}

impl DeliveryConfig {
    pub fn new(property_key: impl Into<String>) -> Self {
        Self {
            property_key: property_key.into(),
            max_queue_size: 500,
            max_persisted_events: 800,
            batch_size: 20,
            initial_retry_delay: Duration::from_millis(1000),
            max_retry_delay: Duration::from_millis(30_000),
            max_attempts_per_event: 10,
        }
    }
}

/// What an enqueue did besides appending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnqueueEffect {
    pub evicted: Option<EventId>,
    /// This append brought the queue up to the batch size from below.
    pub threshold_reached: bool,
}

/// Why a flush attempt did not start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushSkipped {
    InFlight,
    Empty,
    BackingOff { until: DateTime<Utc> },
}

/// A batch that has left the queue and awaits its transport result.
#[derive(Debug)]
pub struct InFlight {
    batch_id: BatchId,
    trigger: Trigger,
    attempts: Vec<u32>,
    request: Arc<DeliveryRequest>,
}

impl InFlight {
    pub fn batch_id(&self) -> BatchId {
        self.batch_id
    }

    pub fn trigger(&self) -> Trigger {
        self.trigger
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    pub fn request(&self) -> Arc<DeliveryRequest> {
        Arc::clone(&self.request)
    }

    fn record_at(&self, position: usize) -> Option<QueuedEvent> {
        let event = self.request.batch.get(position)?.clone();
        let attempts = self.attempts.get(position).copied().unwrap_or(0);
        Some(QueuedEvent { event, attempts })
    }
}

/// Result of one completed flush attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct FlushReport {
    pub batch_id: BatchId,
    pub trigger: Trigger,
    pub events: usize,
    pub outcome: DeliveryOutcome,
    pub delivered: usize,
    pub rejected: usize,
    pub requeued: usize,
    /// Dropped at the attempt ceiling instead of being requeued.
    pub exhausted: usize,
    /// Evicted from the queue to make room for the requeued events.
    pub evicted: usize,
    pub retry_in: Option<Duration>,
    /// The batch resolved and the queue still holds a full batch; another
    /// attempt should follow.
    pub follow_up: bool,
}

pub struct DeliveryEngine {
    config: DeliveryConfig,
    queue: DurableQueue,
    batcher: Batcher,
    state: DeliveryState,
    decider: Box<dyn Decider>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    rng: StdRng,
    counters: DeliveryCounters,
}

impl DeliveryEngine {
    /// Restores the queue for `config.property_key` from `storage`.
    pub fn new(
        config: DeliveryConfig,
        storage: Arc<dyn Storage>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        let queue = DurableQueue::load(
            storage,
            storage_key(&config.property_key),
            config.max_queue_size,
            config.max_persisted_events,
        );
        let batcher = Batcher::new(config.batch_size);
        let state = DeliveryState::new(Backoff::new(
            config.initial_retry_delay,
            config.max_retry_delay,
        ));

        Self {
            config,
            queue,
            batcher,
            state,
            decider: Box::new(DefaultDecider),
            clock,
            ids,
            rng: StdRng::from_entropy(),
            counters: DeliveryCounters::default(),
        }
    }

    /// Deterministic jitter.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn with_decider(mut self, decider: Box<dyn Decider>) -> Self {
        self.decider = decider;
        self
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    pub fn queue(&self) -> &DurableQueue {
        &self.queue
    }

    pub fn state(&self) -> &DeliveryState {
        &self.state
    }

    pub fn is_sending(&self) -> bool {
        self.state.is_sending()
    }

    pub fn enqueue(&mut self, event: Event) -> EnqueueEffect {
        let event_id = event.event_id();
        let evicted = self
            .queue
            .enqueue(QueuedEvent::new(event))
            .map(|record| record.event.event_id());

        self.counters.enqueued += 1;
        if let Some(evicted_id) = evicted {
            self.counters.evicted += 1;
            tracing::warn!(
                event_id = %event_id,
                evicted = %evicted_id,
                capacity = self.queue.capacity(),
                "queue full, evicted oldest event"
            );
        }

        EnqueueEffect {
            evicted,
            threshold_reached: evicted.is_none() && self.batcher.just_filled(&self.queue),
        }
    }

    /// Take the next batch and enter `Sending`.
    pub fn begin_flush(&mut self, trigger: Trigger) -> Result<InFlight, FlushSkipped> {
        if self.state.is_sending() {
            tracing::debug!(trigger = %trigger, "flush skipped, batch in flight");
            return Err(FlushSkipped::InFlight);
        }

        if self.queue.is_empty() {
            self.state.reset_delay();
            return Err(FlushSkipped::Empty);
        }

        if !trigger.is_forced()
            && let Some(until) = self.state.backing_off_until(self.clock.now())
        {
            tracing::debug!(trigger = %trigger, until = %until, "flush skipped, backing off");
            return Err(FlushSkipped::BackingOff { until });
        }

        let batch_id = self.ids.generate_batch_id();
        let Some(batch) = self.batcher.next_batch(&mut self.queue, batch_id) else {
            return Err(FlushSkipped::Empty);
        };

        let (events, attempts): (Vec<Event>, Vec<u32>) = batch
            .records
            .into_iter()
            .map(|record| (record.event, record.attempts))
            .unzip();

        self.state.start_sending();
        tracing::debug!(
            batch_id = %batch.id,
            trigger = %trigger,
            events = events.len(),
            "sending batch"
        );

        Ok(InFlight {
            batch_id: batch.id,
            trigger,
            attempts,
            request: Arc::new(DeliveryRequest {
                property_key: self.config.property_key.clone(),
                batch: events,
            }),
        })
    }

    /// Classify the transport result, apply the decision and return to `Idle`.
    pub fn complete_flush(
        &mut self,
        in_flight: InFlight,
        result: Result<TransportReply, TransportError>,
    ) -> FlushReport {
        let outcome = classify(&result);
        let events = in_flight.len();
        let decision = self.decider.decide(&outcome, events);

        let mut report = FlushReport {
            batch_id: in_flight.batch_id,
            trigger: in_flight.trigger,
            events,
            outcome,
            delivered: 0,
            rejected: 0,
            requeued: 0,
            exhausted: 0,
            evicted: 0,
            retry_in: None,
            follow_up: false,
        };

        let resolved = matches!(decision, Decision::Resolve);
        match decision {
            Decision::Resolve => {
                let (delivered, rejected) = tally(&report.outcome, events, &[]);
                report.delivered = delivered;
                report.rejected = rejected;
                self.state.reset_backoff();
            }
            Decision::Requeue(positions) => {
                let (delivered, rejected) = tally(&report.outcome, events, &positions);
                report.delivered = delivered;
                report.rejected = rejected;

                let mut retry = Vec::with_capacity(positions.len());
                for position in &positions {
                    let Some(mut record) = in_flight.record_at(*position) else {
                        continue;
                    };
                    record.mark_failed_attempt();
                    if self.config.max_attempts_per_event > 0
                        && record.attempts >= self.config.max_attempts_per_event
                    {
                        tracing::warn!(
                            event_id = %record.event.event_id(),
                            attempts = record.attempts,
                            "dropping event after too many failed attempts"
                        );
                        report.exhausted += 1;
                    } else {
                        retry.push(record);
                    }
                }

                report.requeued = retry.len();
                report.evicted = self.queue.requeue_front(retry);
                report.retry_in = Some(self.state.schedule_retry(self.clock.now(), &mut self.rng));
            }
        }

        self.state.finish_sending();
        report.follow_up = resolved && self.batcher.holds_full_batch(&self.queue);
        self.record(&report, result.as_ref().err());
        report
    }

    /// Run one attempt end to end on the current task.
    pub async fn flush(
        &mut self,
        trigger: Trigger,
        transports: &Transports,
    ) -> Result<FlushReport, FlushSkipped> {
        let in_flight = self.begin_flush(trigger)?;
        let transport = transports.select(trigger.prefers_best_effort());
        let request = in_flight.request();
        let result = transport.send(&request).await;
        Ok(self.complete_flush(in_flight, result))
    }

    /// Connectivity came back: backoff to initial, gate open.
    pub fn network_restored(&mut self) {
        self.state.reset_backoff();
        tracing::debug!("network restored, backoff cleared");
    }

    pub fn status(&self) -> DeliveryStatus {
        DeliveryStatus {
            queued: self.queue.len(),
            capacity: self.queue.capacity(),
            sending: self.state.is_sending(),
            current_backoff_ms: u64::try_from(self.state.backoff().current().as_millis())
                .unwrap_or(u64::MAX),
            next_eligible_flush_at: self.state.next_eligible_flush_at(),
            storage_available: self.queue.storage_available(),
            counters: self.counters.clone(),
        }
    }

    fn record(&mut self, report: &FlushReport, error: Option<&TransportError>) {
        let c = &mut self.counters;
        c.delivered += report.delivered as u64;
        c.rejected += report.rejected as u64;
        c.requeued += report.requeued as u64;
        c.exhausted += report.exhausted as u64;
        c.evicted += report.evicted as u64;

        match &report.outcome {
            DeliveryOutcome::Success => {
                tracing::info!(
                    batch_id = %report.batch_id,
                    trigger = %report.trigger,
                    events = report.events,
                    "batch delivered"
                );
            }
            DeliveryOutcome::Permanent { status } => {
                tracing::warn!(
                    batch_id = %report.batch_id,
                    status = *status,
                    events = report.events,
                    "batch rejected, dropping it"
                );
            }
            DeliveryOutcome::Partial(rejections) => {
                tracing::info!(
                    batch_id = %report.batch_id,
                    events = report.events,
                    rejections = rejections.len(),
                    requeued = report.requeued,
                    rejected = report.rejected,
                    "batch partially accepted"
                );
            }
            DeliveryOutcome::Transient { reason } => {
                c.failed_attempts += 1;
                let delay_ms = report.retry_in.map(|d| d.as_millis() as u64).unwrap_or(0);
                match error {
                    Some(e) => tracing::warn!(
                        batch_id = %report.batch_id,
                        events = report.events,
                        delay_ms,
                        error = %e,
                        "batch delivery failed, will retry"
                    ),
                    None => tracing::warn!(
                        batch_id = %report.batch_id,
                        events = report.events,
                        delay_ms,
                        reason = %reason,
                        "batch delivery failed, will retry"
                    ),
                }
            }
        }

        if report.evicted > 0 {
            tracing::warn!(
                batch_id = %report.batch_id,
                evicted = report.evicted,
                "queue full after requeue, evicted oldest events"
            );
        }
    }
}

/// Split a resolved or partially requeued batch into accepted and declined
/// counts.
fn tally(outcome: &DeliveryOutcome, events: usize, requeued: &[usize]) -> (usize, usize) {
    match outcome {
        DeliveryOutcome::Success => (events, 0),
        DeliveryOutcome::Permanent { .. } => (0, events),
        DeliveryOutcome::Transient { .. } => (0, 0),
        DeliveryOutcome::Partial(rejections) => {
            let declined: BTreeSet<usize> = rejections
                .iter()
                .filter_map(|r| r.position(events))
                .collect();
            let rejected = declined.iter().filter(|p| !requeued.contains(p)).count();
            (events - declined.len(), rejected)
        }
    }
}
