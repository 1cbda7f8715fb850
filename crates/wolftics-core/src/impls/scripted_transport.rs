//! ScriptedTransport - 応答を台本どおりに返すテスト用 Transport
//!
//! 送られたリクエストはすべて記録されます。台本が尽きたら 200 を返します。

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::errors::TransportError;
use crate::domain::outcome::{Rejection, TransportReply};
use crate::ports::transport::{DeliveryRequest, Transport, TransportMode};

pub struct ScriptedTransport {
    mode: TransportMode,
    script: Mutex<VecDeque<Result<TransportReply, TransportError>>>,
    sent: Mutex<Vec<DeliveryRequest>>,
    latency: Duration,
}

impl ScriptedTransport {
    pub fn new(mode: TransportMode) -> Self {
        Self {
            mode,
            script: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            latency: Duration::ZERO,
        }
    }

    pub fn acknowledged() -> Self {
        Self::new(TransportMode::Acknowledged)
    }

    pub fn best_effort() -> Self {
        Self::new(TransportMode::BestEffort)
    }

    /// Every send waits this long before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn push(&self, result: Result<TransportReply, TransportError>) -> &Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(result);
        }
        self
    }

    pub fn push_status(&self, status: u16) -> &Self {
        self.push(Ok(TransportReply::status(status)))
    }

    pub fn push_rejections(&self, rejections: Vec<Rejection>) -> &Self {
        self.push(Ok(TransportReply::with_rejections(rejections)))
    }

    pub fn push_error(&self, error: TransportError) -> &Self {
        self.push(Err(error))
    }

    /// Requests seen so far, in send order.
    pub fn sent(&self) -> Vec<DeliveryRequest> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().map(|sent| sent.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn mode(&self) -> TransportMode {
        self.mode
    }

    async fn send(&self, request: &DeliveryRequest) -> Result<TransportReply, TransportError> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(request.clone());
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let next = self.script.lock().ok().and_then(|mut script| script.pop_front());
        match next {
            Some(result) => result,
            None if self.mode == TransportMode::BestEffort => Ok(TransportReply::Dispatched),
            None => Ok(TransportReply::ok()),
        }
    }
}
