//! Delivery state machine for the engine.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;

use super::retry::Backoff;

/// Delivery phase.
///
/// State transitions:
/// - Idle -> Sending -> {Success | PartialFailure | TransientFailure | PermanentFailure} -> Idle
///
/// The outcome states are instantaneous: they are applied inside
/// `complete_flush` and the phase returns to Idle in the same step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryPhase {
    Idle,
    Sending,
}

/// Process-wide delivery state (one per engine).
#[derive(Debug, Clone)]
pub struct DeliveryState {
    phase: DeliveryPhase,
    backoff: Backoff,
    next_eligible_flush_at: Option<DateTime<Utc>>,
}

impl DeliveryState {
    pub fn new(backoff: Backoff) -> Self {
        Self {
            phase: DeliveryPhase::Idle,
            backoff,
            next_eligible_flush_at: None,
        }
    }

    pub fn phase(&self) -> DeliveryPhase {
        self.phase
    }

    pub fn is_sending(&self) -> bool {
        self.phase == DeliveryPhase::Sending
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    pub fn next_eligible_flush_at(&self) -> Option<DateTime<Utc>> {
        self.next_eligible_flush_at
    }

    /// The instant a non-forced flush must wait for, if it is still ahead.
    pub fn backing_off_until(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.next_eligible_flush_at.filter(|at| now < *at)
    }

    /// Idle -> Sending.
    pub fn start_sending(&mut self) {
        self.phase = DeliveryPhase::Sending;
    }

    /// Sending -> Idle.
    pub fn finish_sending(&mut self) {
        self.phase = DeliveryPhase::Idle;
    }

    /// Backoff to initial; an already scheduled gate stays in place.
    pub fn reset_delay(&mut self) {
        self.backoff.reset();
    }

    /// Backoff to initial and the gate open.
    pub fn reset_backoff(&mut self) {
        self.backoff.reset();
        self.next_eligible_flush_at = None;
    }

    /// Push the gate out by the next jittered delay; returns that delay.
    pub fn schedule_retry<R: Rng + ?Sized>(&mut self, now: DateTime<Utc>, rng: &mut R) -> Duration {
        let delay = self.backoff.next_delay(rng);
        let offset = chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        self.next_eligible_flush_at = Some(now + offset);
        delay
    }
}
