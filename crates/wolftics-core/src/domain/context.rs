//! Page context attached to every event (page, device, campaign snapshot).
//!
//! All free-form strings are truncated to fixed limits before they are stored
//! so a hostile page cannot blow up the queue with a single event.

use serde::{Deserialize, Serialize};
use url::Url;

const MAX_URL_LEN: usize = 2048;
const MAX_PATH_LEN: usize = 512;
const MAX_TITLE_LEN: usize = 256;
const MAX_LANGUAGE_LEN: usize = 32;
const MAX_TIMEZONE_LEN: usize = 64;
const MAX_PLATFORM_LEN: usize = 64;
const MAX_ROUTE_LEN: usize = 512;
const MAX_CAMPAIGN_SHORT_LEN: usize = 128;
const MAX_CAMPAIGN_LONG_LEN: usize = 256;

/// Truncates `value` to at most `max_chars` characters (not bytes).
pub fn truncate(value: &str, max_chars: usize) -> String {
    match value.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => value[..byte_idx].to_string(),
        None => value.to_string(),
    }
}

fn truncate_opt(value: Option<&str>, max_chars: usize) -> Option<String> {
    value
        .filter(|v| !v.is_empty())
        .map(|v| truncate(v, max_chars))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Mobile,
    Tablet,
    #[default]
    Desktop,
}

impl DeviceType {
    /// Classifies by the smaller screen dimension.
    pub fn from_screen(width: u32, height: u32) -> Self {
        match width.min(height) {
            0 => DeviceType::Desktop,
            w if w <= 767 => DeviceType::Mobile,
            w if w <= 1024 => DeviceType::Tablet,
            _ => DeviceType::Desktop,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Screen {
    pub w: Option<u32>,
    pub h: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    #[serde(rename = "type")]
    pub kind: DeviceType,
    pub platform: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub is_spa: bool,
    pub route: Option<String>,
}

/// UTM campaign parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    pub source: Option<String>,
    pub medium: Option<String>,
    pub campaign: Option<String>,
    pub term: Option<String>,
    pub content: Option<String>,
}

impl Campaign {
    /// Extracts `utm_*` query parameters from a page URL.
    pub fn from_url(url: &Url) -> Self {
        let mut campaign = Campaign::default();
        for (key, value) in url.query_pairs() {
            let slot = match &*key {
                "utm_source" => (&mut campaign.source, MAX_CAMPAIGN_SHORT_LEN),
                "utm_medium" => (&mut campaign.medium, MAX_CAMPAIGN_SHORT_LEN),
                "utm_campaign" => (&mut campaign.campaign, MAX_CAMPAIGN_LONG_LEN),
                "utm_term" => (&mut campaign.term, MAX_CAMPAIGN_LONG_LEN),
                "utm_content" => (&mut campaign.content, MAX_CAMPAIGN_LONG_LEN),
                _ => continue,
            };
            // first occurrence wins, as URLSearchParams.get does
            if slot.0.is_none() {
                *slot.0 = truncate_opt(Some(&*value), slot.1);
            }
        }
        campaign
    }

    pub fn has_any(&self) -> bool {
        self.source.is_some()
            || self.medium.is_some()
            || self.campaign.is_some()
            || self.term.is_some()
            || self.content.is_some()
    }
}

/// Snapshot of page, device and campaign at event creation time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageContext {
    pub url: Option<String>,
    pub path: Option<String>,
    pub referrer: Option<String>,
    pub title: Option<String>,
    pub language: Option<String>,
    pub timezone: Option<String>,
    pub screen: Screen,
    pub device: Device,
    pub page: PageInfo,
    pub campaign: Campaign,
}

impl PageContext {
    /// Builds url, path and campaign from a page URL.
    pub fn from_url(url: &Url) -> Self {
        Self {
            url: Some(truncate(url.as_str(), MAX_URL_LEN)),
            path: Some(truncate(url.path(), MAX_PATH_LEN)),
            campaign: Campaign::from_url(url),
            ..Self::default()
        }
    }

    pub fn with_referrer(mut self, referrer: Option<&str>) -> Self {
        self.referrer = truncate_opt(referrer, MAX_URL_LEN);
        self
    }

    pub fn with_title(mut self, title: Option<&str>) -> Self {
        self.title = truncate_opt(title, MAX_TITLE_LEN);
        self
    }

    pub fn with_language(mut self, language: Option<&str>) -> Self {
        self.language = truncate_opt(language, MAX_LANGUAGE_LEN);
        self
    }

    pub fn with_timezone(mut self, timezone: Option<&str>) -> Self {
        self.timezone = truncate_opt(timezone, MAX_TIMEZONE_LEN);
        self
    }

    pub fn with_screen(mut self, width: u32, height: u32) -> Self {
        self.screen = Screen {
            w: (width > 0).then_some(width),
            h: (height > 0).then_some(height),
        };
        self.device.kind = DeviceType::from_screen(width, height);
        self
    }

    pub fn with_platform(mut self, platform: Option<&str>) -> Self {
        self.device.platform = truncate_opt(platform, MAX_PLATFORM_LEN);
        self
    }

    pub fn with_spa(mut self, is_spa: bool) -> Self {
        self.page.is_spa = is_spa;
        self
    }

    pub fn set_route(&mut self, route: &str) {
        self.page.route = truncate_opt(Some(route), MAX_ROUTE_LEN);
    }
}
