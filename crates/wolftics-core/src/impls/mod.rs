//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **MemoryStorage** / **FileStorage**: Storage
//! - **HttpTransport**: 応答を待つ Transport（reqwest）
//! - **BeaconTransport**: 送りっぱなしの Transport（ページ離脱用）
//! - **ScriptedTransport**: テスト用、台本どおりに応答
//! - **StoredIdentity**: Storage に保存する IdentityProvider
//! - **StaticContext**: 固定の ContextProvider

pub mod beacon_transport;
pub mod file_storage;
pub mod http_transport;
pub mod memory_storage;
pub mod scripted_transport;
pub mod static_context;
pub mod stored_identity;

pub use self::beacon_transport::{BEACON_MAX_BYTES, BeaconTransport};
pub use self::file_storage::FileStorage;
pub use self::http_transport::HttpTransport;
pub use self::memory_storage::MemoryStorage;
pub use self::scripted_transport::ScriptedTransport;
pub use self::static_context::StaticContext;
pub use self::stored_identity::StoredIdentity;
