//! HttpTransport - 応答を待つ送信（Acknowledged）
//!
//! JSON を POST し、ステータスと `rejections` を読み取ります。
//! タイムアウトは接続からボディ読み取りまで全体にかかります。

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use crate::domain::errors::TransportError;
use crate::domain::outcome::{Rejection, RejectionReason, TransportReply};
use crate::ports::transport::{DeliveryRequest, Transport, TransportMode};

pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: Url,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self::with_client(client, endpoint, timeout))
    }

    pub fn with_client(client: reqwest::Client, endpoint: Url, timeout: Duration) -> Self {
        Self {
            client,
            endpoint,
            timeout,
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn exchange(&self, request: &DeliveryRequest) -> Result<TransportReply, TransportError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Ok(TransportReply::status(status.as_u16()));
        }

        let body = response.text().await?;
        parse_reply(status.as_u16(), &body)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn mode(&self) -> TransportMode {
        TransportMode::Acknowledged
    }

    async fn send(&self, request: &DeliveryRequest) -> Result<TransportReply, TransportError> {
        match tokio::time::timeout(self.timeout, self.exchange(request)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(self.timeout)),
        }
    }
}

/// Interpret a 2xx response body.
///
/// An empty body, or one without a `rejections` array, carries no
/// rejections. Malformed entries (null, missing or non-integer index) are
/// skipped; a missing or non-string reason is never retry-eligible.
pub fn parse_reply(status: u16, body: &str) -> Result<TransportReply, TransportError> {
    if body.trim().is_empty() {
        return Ok(TransportReply::status(status));
    }

    let value: Value =
        serde_json::from_str(body).map_err(|e| TransportError::Decode(e.to_string()))?;

    let rejections = value
        .get("rejections")
        .and_then(Value::as_array)
        .map(|entries| entries.iter().filter_map(parse_rejection).collect())
        .unwrap_or_default();

    Ok(TransportReply::Acknowledged { status, rejections })
}

fn parse_rejection(entry: &Value) -> Option<Rejection> {
    let index = entry.get("index")?;
    let index = index.as_i64().or_else(|| {
        index
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
            .map(|f| f as i64)
    })?;
    let reason = match entry.get("reason").and_then(Value::as_str) {
        Some(reason) => RejectionReason::from(reason.to_string()),
        None => RejectionReason::Other(String::new()),
    };
    Some(Rejection::new(index, reason))
}
