//! Decision model: what to do with a batch once its outcome is known.
//!
//! Deciding is a pure function of the outcome and the batch length. Applying
//! the decision (requeue, backoff, persistence) is the engine's job.

use super::outcome::DeliveryOutcome;

/// The next action for a delivered batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The batch is finished with: accepted, or definitively rejected.
    /// Backoff resets.
    Resolve,

    /// Put these in-batch positions (ascending, no duplicates) back at the
    /// front of the queue and back off.
    Requeue(Vec<usize>),
}

/// Trait for deciding the next action based on a batch outcome.
///
/// Deciders are pure: no side effects, no state mutation.
pub trait Decider: Send + Sync {
    fn decide(&self, outcome: &DeliveryOutcome, batch_len: usize) -> Decision;
}

/// Default decider: whole-batch requeue on transient failure, selective
/// requeue of retry-eligible rejections, resolve otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDecider;

impl Decider for DefaultDecider {
    fn decide(&self, outcome: &DeliveryOutcome, batch_len: usize) -> Decision {
        match outcome {
            DeliveryOutcome::Success | DeliveryOutcome::Permanent { .. } => Decision::Resolve,
            DeliveryOutcome::Transient { .. } => {
                if batch_len == 0 {
                    Decision::Resolve
                } else {
                    Decision::Requeue((0..batch_len).collect())
                }
            }
            DeliveryOutcome::Partial(rejections) => {
                let mut positions: Vec<usize> = rejections
                    .iter()
                    .filter(|r| r.reason.is_retryable())
                    .filter_map(|r| r.position(batch_len))
                    .collect();
                positions.sort_unstable();
                positions.dedup();

                if positions.is_empty() {
                    Decision::Resolve
                } else {
                    Decision::Requeue(positions)
                }
            }
        }
    }
}
