//! ContextProvider port - ページ / デバイス / キャンペーンのスナップショット
//!
//! # 実装
//! - **StaticContext**: 設定から作る固定スナップショット（`impls::static_context`）

use crate::domain::context::PageContext;

pub trait ContextProvider: Send + Sync {
    fn snapshot(&self) -> PageContext;
}
