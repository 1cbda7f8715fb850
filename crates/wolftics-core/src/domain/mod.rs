//! Domain model (ids, events, page context, outcomes, decisions, errors).

pub mod context;
pub mod decision;
pub mod errors;
pub mod event;
pub mod ids;
pub mod outcome;

pub use context::{Campaign, Device, DeviceType, PageContext, PageInfo, Screen};
pub use decision::{Decider, Decision, DefaultDecider};
pub use errors::{ConfigError, FailureKind, StorageError, TrackError, TransportError};
pub use event::{Event, EventType, Identity, payload_from_value};
pub use ids::{BatchId, EventId, Id, IdMarker, SessionId, VisitorId};
pub use outcome::{
    DeliveryOutcome, Rejection, RejectionReason, TransportReply, classify, is_transient_status,
};
