//! IdentityProvider port - visitor / session / user の供給
//!
//! # 実装
//! - **StoredIdentity**: Storage に保存（`impls::stored_identity`）

use chrono::{DateTime, Utc};

use crate::domain::event::Identity;

/// IdentityProvider はイベントごとの identity を返す
///
/// `identity` の呼び出し自体がセッションの activity として扱われます
/// （非アクティブ期間がタイムアウトを超えるとセッションが更新される）。
pub trait IdentityProvider: Send + Sync {
    fn identity(&self, now: DateTime<Utc>) -> Identity;

    fn set_user_id(&self, user_id: &str);
}
