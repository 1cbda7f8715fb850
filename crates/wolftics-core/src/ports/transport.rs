//! Transport port - バッチの送信
//!
//! 2 つの配送モード:
//! - **Acknowledged**: タイムアウト付きリクエスト。ステータスと拒否リストを受け取る
//! - **BestEffort**: beacon 相当。送りっぱなしで結果は観測しない
//!
//! どちらを使うかは `Transports::select` が送信のたびに決めます。

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use url::Url;

use crate::domain::errors::TransportError;
use crate::domain::event::Event;
use crate::domain::outcome::TransportReply;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    Acknowledged,
    BestEffort,
}

/// Request body: `{"propertyKey": ..., "batch": [...]}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryRequest {
    pub property_key: String,
    pub batch: Vec<Event>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    fn mode(&self) -> TransportMode;

    async fn send(&self, request: &DeliveryRequest) -> Result<TransportReply, TransportError>;
}

/// True when both URLs share scheme, host and port.
pub fn is_same_origin(endpoint: &Url, page_origin: Option<&Url>) -> bool {
    page_origin.is_some_and(|page| endpoint.origin() == page.origin())
}

/// The acknowledged transport plus an optional best-effort one.
#[derive(Clone)]
pub struct Transports {
    acknowledged: Arc<dyn Transport>,
    best_effort: Option<Arc<dyn Transport>>,
    same_origin: bool,
}

impl Transports {
    pub fn new(acknowledged: Arc<dyn Transport>) -> Self {
        Self {
            acknowledged,
            best_effort: None,
            same_origin: false,
        }
    }

    /// Registers a best-effort transport. It is only ever selected when the
    /// endpoint is same-origin with the page.
    pub fn with_best_effort(mut self, transport: Arc<dyn Transport>, same_origin: bool) -> Self {
        self.best_effort = Some(transport);
        self.same_origin = same_origin;
        self
    }

    pub fn best_effort_eligible(&self) -> bool {
        self.same_origin && self.best_effort.is_some()
    }

    pub fn select(&self, prefer_best_effort: bool) -> Arc<dyn Transport> {
        match &self.best_effort {
            Some(beacon) if prefer_best_effort && self.same_origin => Arc::clone(beacon),
            _ => Arc::clone(&self.acknowledged),
        }
    }
}
