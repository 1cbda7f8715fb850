//! Errors - エラー型と分類
//!
//! 埋め込み先アプリケーションに返るのは `ConfigError`（構築時）だけです。
//! それ以外はすべて内部で吸収され、リトライのタイミングとログにだけ現れます。

use std::time::Duration;

use thiserror::Error;

/// FailureKind は配送失敗の分類
///
/// - Transient: 一時的（ネットワーク / 408 / 429 / 5xx / timeout）→ バッチ全体を再キュー
/// - Permanent: 恒久的（その他の 4xx）→ バッチを破棄
/// - Partial: サーバーが一部のイベントだけを拒否 → 選択的に再キュー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Transient,
    Permanent,
    Partial,
}

/// Producer input rejected locally. Logged, never returned to the caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TrackError {
    #[error("invalid event type: {0}")]
    InvalidEventType(String),

    #[error("identify requires a non-empty user id")]
    MissingUserId,
}

/// Durable storage failure. The queue degrades to memory-only on these.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Transport-level failure. Always classified as transient.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("response decode error: {0}")]
    Decode(String),

    #[error("beacon refused: {0}")]
    BeaconRefused(String),

    #[error("{0}")]
    Client(String),
}

/// Invalid agent configuration, reported by the builder before anything runs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("propertyKey is required")]
    MissingPropertyKey,

    #[error("invalid endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("invalid page origin {origin:?}: {reason}")]
    InvalidPageOrigin { origin: String, reason: String },

    #[error("batchSize must be greater than zero")]
    ZeroBatchSize,

    #[error("maxQueueSize must be greater than zero")]
    ZeroQueueSize,

    #[error("initialRetryDelayMs ({initial}) must be > 0 and <= maxRetryDelayMs ({max})")]
    RetryDelayRange { initial: u64, max: u64 },
}
