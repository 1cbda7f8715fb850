//! TrackedEvent trait - 型付きイベントの定義
//!
//! # 学習ポイント
//! - Associated Constants (`const KIND`)
//! - 空の struct (`struct PageView {}`) は `{}` にシリアライズされる

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::context::truncate;
use crate::domain::event::{EventType, payload_from_value};

/// TrackedEvent は payload 型と event kind を対応付ける
///
/// # 使用例
/// ```ignore
/// handle.track_typed(&AddToCart::new("sku-1", 2));
/// ```
pub trait TrackedEvent: Serialize {
    const KIND: EventType;

    fn to_payload(&self) -> Result<Map<String, Value>, serde_json::Error> {
        serde_json::to_value(self).map(payload_from_value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageView {}

impl TrackedEvent for PageView {
    const KIND: EventType = EventType::PageView;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewProduct {
    pub product_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

impl TrackedEvent for ViewProduct {
    const KIND: EventType = EventType::ViewProduct;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddToCart {
    pub product_id: String,
    pub quantity: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

impl AddToCart {
    pub fn new(product_id: impl Into<String>, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
            price: None,
            currency: None,
        }
    }
}

impl TrackedEvent for AddToCart {
    const KIND: EventType = EventType::AddToCart;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeginCheckout {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<u32>,
}

impl TrackedEvent for BeginCheckout {
    const KIND: EventType = EventType::BeginCheckout;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Purchase {
    pub order_id: String,
    pub value: f64,
    pub currency: String,
}

impl TrackedEvent for Purchase {
    const KIND: EventType = EventType::Purchase;
}

/// Emitted once per threshold crossed (25, 50, 75, 100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrollDepth {
    pub percent: u8,
}

impl TrackedEvent for ScrollDepth {
    const KIND: EventType = EventType::ScrollDepth;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeOnPage {
    pub seconds: u64,
}

impl TrackedEvent for TimeOnPage {
    const KIND: EventType = EventType::TimeOnPage;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CtaClick {
    pub cta_id: String,
    pub text: Option<String>,
    pub href: Option<String>,
}

impl CtaClick {
    /// Truncates id (128), text (120) and href (512); text is trimmed.
    pub fn new(cta_id: &str, text: Option<&str>, href: Option<&str>) -> Self {
        Self {
            cta_id: truncate(cta_id, 128),
            text: text
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(|t| truncate(t, 120)),
            href: href.filter(|h| !h.is_empty()).map(|h| truncate(h, 512)),
        }
    }
}

impl TrackedEvent for CtaClick {
    const KIND: EventType = EventType::CtaClick;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitPage {
    pub reason: String,
}

impl TrackedEvent for ExitPage {
    const KIND: EventType = EventType::ExitPage;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignView {}

impl TrackedEvent for CampaignView {
    const KIND: EventType = EventType::CampaignView;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payloads_use_wire_field_names() {
        let payload = CtaClick::new("hero-buy", Some("  Buy now  "), Some("/checkout"))
            .to_payload()
            .unwrap();
        assert_eq!(payload["ctaId"], "hero-buy");
        assert_eq!(payload["text"], "Buy now");
        assert_eq!(payload["href"], "/checkout");

        let payload = AddToCart::new("sku-1", 2).to_payload().unwrap();
        assert_eq!(payload["productId"], "sku-1");
        assert!(!payload.contains_key("price"));
    }

    #[test]
    fn empty_payloads_are_empty_objects() {
        assert!(PageView {}.to_payload().unwrap().is_empty());
        assert!(CampaignView {}.to_payload().unwrap().is_empty());
    }

    #[test]
    fn kinds_match_event_types() {
        assert_eq!(ScrollDepth::KIND.as_str(), "scroll_depth");
        assert_eq!(TimeOnPage::KIND.as_str(), "time_on_page");
        assert_eq!(ExitPage::KIND.as_str(), "exit_page");
    }

    #[test]
    fn long_cta_fields_are_truncated() {
        let long = "x".repeat(1000);
        let cta = CtaClick::new(&long, Some(&long), Some(&long));
        assert_eq!(cta.cta_id.chars().count(), 128);
        assert_eq!(cta.text.unwrap().chars().count(), 120);
        assert_eq!(cta.href.unwrap().chars().count(), 512);
    }
}
