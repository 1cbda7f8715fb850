//! Domain identifiers (strongly-typed IDs).
//!
//! # ULID ベースの ID + Phantom type
//! すべての ID は ULID (Universally Unique Lexicographically Sortable Identifier) です。
//! `Id<T>` というジェネリック型で共通実装を提供し、`T` はマーカー型として
//! コンパイル時の型安全性だけを提供します（EventId と BatchId は混同できない）。
//!
//! ## Wire format
//! JSON 上は素の ULID 文字列（`"01HV..."`）。`Display` はプレフィックス付き
//! （`evt-01HV...`）で、ログ出力用です。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックス（"evt-", "batch-" など）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// Parses the bare ULID form (as stored and sent on the wire), not the
/// prefixed `Display` form.
impl<T: IdMarker> FromStr for Id<T> {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s.trim()).map(Self::from_ulid)
    }
}

// ========================================
// マーカー型の定義
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventMarker {}

impl IdMarker for EventMarker {
    fn prefix() -> &'static str {
        "evt-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BatchMarker {}

impl IdMarker for BatchMarker {
    fn prefix() -> &'static str {
        "batch-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VisitorMarker {}

impl IdMarker for VisitorMarker {
    fn prefix() -> &'static str {
        "visitor-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SessionMarker {}

impl IdMarker for SessionMarker {
    fn prefix() -> &'static str {
        "session-"
    }
}

/// Identifier of a tracked event (assigned once, at creation).
pub type EventId = Id<EventMarker>;

/// Identifier of one delivery attempt's batch (log correlation only).
pub type BatchId = Id<BatchMarker>;

/// Long-lived pseudonymous visitor identity.
pub type VisitorId = Id<VisitorMarker>;

/// Activity window identity, renewed after inactivity.
pub type SessionId = Id<SessionMarker>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_types() {
        let ulid1 = Ulid::new();
        let ulid2 = Ulid::new();

        let event = EventId::from_ulid(ulid1);
        let batch = BatchId::from_ulid(ulid2);

        assert_eq!(event.as_ulid(), ulid1);
        assert_eq!(batch.as_ulid(), ulid2);

        assert!(event.to_string().starts_with("evt-"));
        assert!(batch.to_string().starts_with("batch-"));
        assert!(VisitorId::from_ulid(ulid1).to_string().starts_with("visitor-"));
        assert!(SessionId::from_ulid(ulid1).to_string().starts_with("session-"));
        // let _: EventId = batch; // <- does not compile
    }

    #[test]
    fn ids_serialize_as_bare_ulid_strings() {
        let ulid = Ulid::new();
        let id = EventId::from_ulid(ulid);

        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{ulid}\""));

        let back: EventId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn parse_accepts_stored_form_and_rejects_garbage() {
        let ulid = Ulid::new();
        let parsed: SessionId = ulid.to_string().parse().unwrap();
        assert_eq!(parsed.as_ulid(), ulid);

        assert!("not-a-ulid".parse::<SessionId>().is_err());
    }

    #[test]
    fn phantom_data_does_not_consume_memory() {
        use std::mem::size_of;
        assert_eq!(size_of::<EventId>(), size_of::<Ulid>());
        assert_eq!(size_of::<BatchId>(), 16);
    }
}
