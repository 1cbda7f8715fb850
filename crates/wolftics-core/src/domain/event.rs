//! Tracked events: the allow-listed kinds, identity and the immutable event record.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::context::PageContext;
use super::errors::TrackError;
use super::ids::{EventId, SessionId, VisitorId};

/// The fixed allow-list of event kinds.
///
/// Serialized as snake_case (`page_view`, `add_to_cart`, ...). Anything else
/// is rejected locally before it reaches the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PageView,
    ViewProduct,
    AddToCart,
    BeginCheckout,
    Purchase,
    Identify,
    ScrollDepth,
    TimeOnPage,
    CtaClick,
    ExitPage,
    CampaignView,
}

impl EventType {
    pub const ALL: [EventType; 11] = [
        EventType::PageView,
        EventType::ViewProduct,
        EventType::AddToCart,
        EventType::BeginCheckout,
        EventType::Purchase,
        EventType::Identify,
        EventType::ScrollDepth,
        EventType::TimeOnPage,
        EventType::CtaClick,
        EventType::ExitPage,
        EventType::CampaignView,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventType::PageView => "page_view",
            EventType::ViewProduct => "view_product",
            EventType::AddToCart => "add_to_cart",
            EventType::BeginCheckout => "begin_checkout",
            EventType::Purchase => "purchase",
            EventType::Identify => "identify",
            EventType::ScrollDepth => "scroll_depth",
            EventType::TimeOnPage => "time_on_page",
            EventType::CtaClick => "cta_click",
            EventType::ExitPage => "exit_page",
            EventType::CampaignView => "campaign_view",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = TrackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| TrackError::InvalidEventType(s.to_string()))
    }
}

/// Who produced the event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub visitor_id: VisitorId,
    pub session_id: SessionId,
    pub user_id: Option<String>,
}

/// A captured event. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    event_id: EventId,
    event_type: EventType,
    #[serde(default)]
    payload: Map<String, Value>,
    #[serde(default)]
    context: PageContext,
    identity: Identity,
    #[serde(rename = "ts", with = "chrono::serde::ts_milliseconds")]
    timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(
        event_id: EventId,
        event_type: EventType,
        payload: Map<String, Value>,
        context: PageContext,
        identity: Identity,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id,
            event_type,
            payload,
            context,
            identity,
            timestamp,
        }
    }

    pub fn event_id(&self) -> EventId {
        self.event_id
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    pub fn context(&self) -> &PageContext {
        &self.context
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Turns an arbitrary JSON value into an event payload.
///
/// Objects are used as-is, `null` becomes an empty map and any other value is
/// wrapped as `{"value": ...}`.
pub fn payload_from_value(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ulid::Ulid;

    fn sample_event() -> Event {
        Event::new(
            EventId::from_ulid(Ulid::new()),
            EventType::AddToCart,
            payload_from_value(serde_json::json!({"sku": "A-1", "qty": 2})),
            PageContext::default(),
            Identity {
                visitor_id: VisitorId::from_ulid(Ulid::new()),
                session_id: SessionId::from_ulid(Ulid::new()),
                user_id: None,
            },
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        )
    }

    #[test]
    fn every_allowed_kind_parses_back() {
        for kind in EventType::ALL {
            assert_eq!(kind.as_str().parse::<EventType>().unwrap(), kind);
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let err = "signup".parse::<EventType>().unwrap_err();
        assert!(matches!(err, TrackError::InvalidEventType(ref s) if s == "signup"));
    }

    #[test]
    fn event_uses_wire_field_names() {
        let event = sample_event();
        let v = serde_json::to_value(&event).unwrap();

        assert_eq!(v["eventType"], "add_to_cart");
        assert_eq!(v["payload"]["sku"], "A-1");
        assert_eq!(v["ts"], 1_704_110_400_000i64);
        assert!(v["identity"]["userId"].is_null());
        assert!(v["identity"]["visitorId"].is_string());
        assert!(v["eventId"].is_string());
    }

    #[test]
    fn non_object_payloads_are_wrapped() {
        assert!(payload_from_value(Value::Null).is_empty());
        let wrapped = payload_from_value(serde_json::json!(42));
        assert_eq!(wrapped["value"], 42);
    }
}
