//! AgentBuilder - エージェントの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - ports の差し替え（テストでは MemoryStorage / FixedClock / ScriptedTransport）

use std::sync::Arc;

use super::engine::DeliveryEngine;
use super::handle::EventFactory;
use super::scheduler::{Agent, Schedule};
use crate::config::AgentConfig;
use crate::domain::context::PageContext;
use crate::domain::errors::{ConfigError, TransportError};
use crate::impls::{BeaconTransport, HttpTransport, MemoryStorage, StaticContext, StoredIdentity};
use crate::ports::clock::{Clock, SystemClock};
use crate::ports::context::ContextProvider;
use crate::ports::id_generator::{IdGenerator, UlidGenerator};
use crate::ports::identity::IdentityProvider;
use crate::ports::storage::Storage;
use crate::ports::transport::{Transport, Transports, is_same_origin};

/// AgentBuilder はエージェントを構築
///
/// # 使用例
/// ```ignore
/// let agent = AgentBuilder::new(AgentConfig::new("pk_live"))
///     .storage(Arc::new(FileStorage::open("./state")?))
///     .build()?;
/// let running = agent.spawn();
/// running.handle().track(EventType::PageView, json!({}));
/// ```
///
/// # Fail-fast 設計
/// - build() 時に AgentConfig::validate() を実行
/// - 不正な設定は BuildError として返し、何も起動しない
/// - 指定されなかった ports は既定の実装で埋める
pub struct AgentBuilder {
    config: AgentConfig,
    storage: Option<Arc<dyn Storage>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    identity: Option<Arc<dyn IdentityProvider>>,
    context: Option<Arc<dyn ContextProvider>>,
    acknowledged: Option<Arc<dyn Transport>>,
    beacon: Option<Arc<dyn Transport>>,
    beacon_enabled: bool,
    rng_seed: Option<u64>,
}

/// BuildError はエージェント構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("transport setup failed: {0}")]
    Transport(#[from] TransportError),
}

impl AgentBuilder {
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config,
            storage: None,
            clock: None,
            ids: None,
            identity: None,
            context: None,
            acknowledged: None,
            beacon: None,
            beacon_enabled: true,
            rng_seed: None,
        }
    }

    /// 既定: MemoryStorage（プロセス終了で消える）
    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// 既定: StoredIdentity（storage に保存）
    pub fn identity(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(identity);
        self
    }

    /// 既定: StaticContext（pageUrl から作る）
    pub fn context(mut self, context: Arc<dyn ContextProvider>) -> Self {
        self.context = Some(context);
        self
    }

    /// 既定: HttpTransport
    pub fn acknowledged_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.acknowledged = Some(transport);
        self
    }

    /// 既定: BeaconTransport。同一オリジンのときだけ使われる
    pub fn beacon_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.beacon = Some(transport);
        self
    }

    pub fn without_beacon(mut self) -> Self {
        self.beacon_enabled = false;
        self
    }

    /// ジッターを決定的にする（テスト用）
    pub fn rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    /// 検証してからワイヤリングする
    ///
    /// # 検証
    /// - AgentConfig::validate()
    /// - 既定の transport が作れること
    pub fn build(self) -> Result<Agent, BuildError> {
        self.config.validate()?;
        let endpoint = self.config.endpoint_url()?;
        let page_origin = self.config.page_origin_url()?;

        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };
        let ids: Arc<dyn IdGenerator> = match self.ids {
            Some(ids) => ids,
            None => Arc::new(UlidGenerator::new(Arc::clone(&clock))),
        };
        let storage: Arc<dyn Storage> = match self.storage {
            Some(storage) => storage,
            None => Arc::new(MemoryStorage::new()),
        };
        let identity: Arc<dyn IdentityProvider> = match self.identity {
            Some(identity) => identity,
            None => Arc::new(StoredIdentity::load(
                Arc::clone(&storage),
                Arc::clone(&ids),
                self.config.session_timeout(),
            )),
        };
        let context: Arc<dyn ContextProvider> = match self.context {
            Some(context) => context,
            None => {
                let mut context = self
                    .config
                    .page_url()
                    .map(|url| PageContext::from_url(&url))
                    .unwrap_or_default();
                context.page.is_spa = self.config.spa;
                Arc::new(StaticContext::new(context))
            }
        };

        let acknowledged: Arc<dyn Transport> = match self.acknowledged {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(
                endpoint.clone(),
                self.config.request_timeout(),
            )?),
        };
        let mut transports = Transports::new(acknowledged);
        if self.beacon_enabled {
            let beacon: Arc<dyn Transport> = match self.beacon {
                Some(transport) => transport,
                None => Arc::new(BeaconTransport::new(endpoint.clone())?),
            };
            let same_origin = is_same_origin(&endpoint, page_origin.as_ref());
            transports = transports.with_best_effort(beacon, same_origin);
        }

        let mut engine = DeliveryEngine::new(
            self.config.delivery(),
            storage,
            Arc::clone(&clock),
            Arc::clone(&ids),
        );
        if let Some(seed) = self.rng_seed {
            engine = engine.with_rng_seed(seed);
        }

        let factory = Arc::new(EventFactory::new(identity, context, clock, ids));
        let schedule = Schedule {
            flush_interval: self.config.flush_interval(),
            heartbeat: self.config.heartbeat(),
        };

        tracing::debug!(
            endpoint = %endpoint,
            beacon = transports.best_effort_eligible(),
            batch_size = self.config.batch_size,
            "delivery agent built"
        );

        Ok(Agent::new(
            engine,
            transports,
            schedule,
            factory,
            self.config.exit_events,
        ))
    }
}
