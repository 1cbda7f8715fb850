//! BeaconTransport - 送りっぱなしの送信（BestEffort）
//!
//! ページ離脱時専用。リクエストをランタイムに渡した時点で成功とみなし、
//! 応答は観測しません。

use async_trait::async_trait;
use url::Url;

use crate::domain::errors::TransportError;
use crate::domain::outcome::TransportReply;
use crate::ports::transport::{DeliveryRequest, Transport, TransportMode};

/// Largest payload a beacon accepts.
pub const BEACON_MAX_BYTES: usize = 64 * 1024;

pub struct BeaconTransport {
    client: reqwest::Client,
    endpoint: Url,
    max_bytes: usize,
}

impl BeaconTransport {
    pub fn new(endpoint: Url) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self::with_client(client, endpoint))
    }

    pub fn with_client(client: reqwest::Client, endpoint: Url) -> Self {
        Self {
            client,
            endpoint,
            max_bytes: BEACON_MAX_BYTES,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

#[async_trait]
impl Transport for BeaconTransport {
    fn mode(&self) -> TransportMode {
        TransportMode::BestEffort
    }

    async fn send(&self, request: &DeliveryRequest) -> Result<TransportReply, TransportError> {
        let body = serde_json::to_vec(request).map_err(|e| TransportError::Client(e.to_string()))?;
        if body.len() > self.max_bytes {
            return Err(TransportError::BeaconRefused(format!(
                "payload of {} bytes exceeds {} byte limit",
                body.len(),
                self.max_bytes
            )));
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| TransportError::BeaconRefused("no async runtime".to_string()))?;

        let post = self
            .client
            .post(self.endpoint.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);
        let events = request.batch.len();
        runtime.spawn(async move {
            match post.send().await {
                Ok(response) => {
                    tracing::debug!(status = response.status().as_u16(), events, "beacon delivered");
                }
                Err(e) => {
                    tracing::debug!(error = %e, events, "beacon lost");
                }
            }
        });

        Ok(TransportReply::Dispatched)
    }
}
