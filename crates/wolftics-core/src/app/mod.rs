//! App - アプリケーション層
//!
//! このモジュールは、ports と queue を組み合わせて配送ロジックを実装します。
//!
//! # 主要コンポーネント
//! - **AgentBuilder**: エージェントの構築とワイヤリング
//! - **DeliveryEngine**: キュー・バッチ・リトライの状態機械（同期、単一所有者）
//! - **Agent**: トリガー（定期・閾値・ページ離脱・ネットワーク復帰）を捌くタスク
//! - **AgentHandle**: 埋め込み側のプロデューサ API
//! - **DeliveryStatus**: 観測用のスナップショット

pub mod builder;
pub mod engine;
pub mod handle;
pub mod scheduler;
pub mod status;
pub mod trigger;

// 主要な型を再エクスポート
pub use self::builder::{AgentBuilder, BuildError};
pub use self::engine::{
    DeliveryConfig, DeliveryEngine, EnqueueEffect, FlushReport, FlushSkipped, InFlight,
};
pub use self::handle::{AgentHandle, EventFactory, IdentifyTraits};
pub use self::scheduler::{Agent, RunningAgent, Schedule};
pub use self::status::{DeliveryCounters, DeliveryStatus};
pub use self::trigger::Trigger;
