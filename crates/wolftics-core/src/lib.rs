//! wolftics-core
//!
//! Client-side delivery engine for Wolftics telemetry events.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, event, context, outcome, decision, errors）
//! - **ports**: 抽象化レイヤー（Storage, Transport, Clock, IdGenerator, IdentityProvider, ContextProvider）
//! - **queue**: 永続キュー・バッチャー・バックオフ
//! - **app**: アプリケーションロジック（builder, engine, scheduler, handle, status）
//! - **typed**: 型付きイベント API（TrackedEvent trait）
//! - **impls**: 実装（HttpTransport, BeaconTransport, FileStorage, MemoryStorage など）
//! - **config**: AgentConfig

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod queue;
pub mod typed;

pub use app::{AgentBuilder, AgentHandle, DeliveryStatus, RunningAgent, Trigger};
pub use config::AgentConfig;
pub use domain::{Event, EventType};
