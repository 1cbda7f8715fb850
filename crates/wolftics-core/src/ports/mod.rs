//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部（永続化、ネットワーク、時刻、identity、ページ）への
//! インターフェースを提供し、実装の詳細を隠蔽します。

pub mod clock;
pub mod context;
pub mod id_generator;
pub mod identity;
pub mod storage;
pub mod transport;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::context::ContextProvider;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::identity::IdentityProvider;
pub use self::storage::Storage;
pub use self::transport::{DeliveryRequest, Transport, TransportMode, Transports, is_same_origin};
