//! Queue module: durable queue, batching, backoff and delivery state.
//!
//! Everything here is synchronous `&mut self` code. The engine that owns
//! these values is driven by a single actor, so no locking is needed.

pub mod batcher;
pub mod durable;
pub mod record;
pub mod retry;
pub mod state;

pub use batcher::{Batch, Batcher};
pub use durable::{DurableQueue, storage_key};
pub use record::QueuedEvent;
pub use retry::{Backoff, jitter};
pub use state::{DeliveryPhase, DeliveryState};
