//! Agent - 配送スケジューラ（単一アクター）
//!
//! ひとつの tokio タスクがエンジンを所有し、次のものを select します:
//! - ハンドルからのコマンド
//! - 定期フラッシュのタイマー
//! - heartbeat タイマー（任意）
//! - shutdown シグナル
//! - 送信中のバッチ（高々 1 つ）の完了
//!
//! エンジンへのアクセスはこのループの中だけなのでロックは不要です。
//! 送信中に来たトリガーはエンジンの single-flight ガードで弾かれます。

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};

use super::engine::{DeliveryEngine, FlushSkipped, InFlight};
use super::handle::{AgentHandle, Command, EventFactory};
use crate::domain::errors::TransportError;
use crate::domain::event::Event;
use crate::domain::outcome::TransportReply;
use crate::ports::transport::Transports;
use crate::typed::{TimeOnPage, TrackedEvent};

pub use super::trigger::Trigger;

type SendResult = (InFlight, Result<TransportReply, TransportError>);
type PendingSend = Pin<Box<dyn Future<Output = SendResult> + Send>>;

/// Timer settings for the agent loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub flush_interval: Duration,
    pub heartbeat: Option<Duration>,
}

/// A configured agent, not yet running.
pub struct Agent {
    engine: DeliveryEngine,
    transports: Transports,
    schedule: Schedule,
    factory: Arc<EventFactory>,
    handle: AgentHandle,
    commands: mpsc::UnboundedReceiver<Command>,
    shutdown_rx: watch::Receiver<bool>,
    stopped_tx: watch::Sender<bool>,
    last_heartbeat_seconds: u64,
}

/// A spawned agent: its handle plus the task running the loop.
pub struct RunningAgent {
    handle: AgentHandle,
    join: JoinHandle<()>,
}

impl RunningAgent {
    pub fn handle(&self) -> AgentHandle {
        self.handle.clone()
    }

    /// Drain, stop and wait for the loop to exit.
    pub async fn shutdown_and_join(self) {
        self.handle.shutdown().await;
        let _ = self.join.await;
    }
}

impl Agent {
    pub(crate) fn new(
        engine: DeliveryEngine,
        transports: Transports,
        schedule: Schedule,
        factory: Arc<EventFactory>,
        exit_events: bool,
    ) -> Self {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (stopped_tx, stopped_rx) = watch::channel(false);
        let handle = AgentHandle::new(
            commands_tx,
            Arc::clone(&factory),
            exit_events,
            Arc::new(shutdown_tx),
            stopped_rx,
        );

        Self {
            engine,
            transports,
            schedule,
            factory,
            handle,
            commands,
            shutdown_rx,
            stopped_tx,
            last_heartbeat_seconds: 0,
        }
    }

    /// A handle usable before (and after) the agent is spawned.
    pub fn handle(&self) -> AgentHandle {
        self.handle.clone()
    }

    pub fn engine(&self) -> &DeliveryEngine {
        &self.engine
    }

    pub fn transports(&self) -> &Transports {
        &self.transports
    }

    /// Spawn the loop on the current tokio runtime.
    pub fn spawn(self) -> RunningAgent {
        let handle = self.handle.clone();
        let join = tokio::spawn(self.run());
        RunningAgent { handle, join }
    }

    /// Run the loop on the current task until shutdown.
    pub async fn run(mut self) {
        let mut flush_tick = ticker(self.schedule.flush_interval);
        let mut heartbeat_tick = self.schedule.heartbeat.map(ticker);
        let mut pending: Option<PendingSend> = None;

        tracing::debug!(
            flush_interval_ms = self.schedule.flush_interval.as_millis() as u64,
            queued = self.engine.queue().len(),
            "delivery agent started"
        );

        loop {
            if *self.shutdown_rx.borrow() {
                break;
            }

            tokio::select! {
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                (in_flight, result) = wait_for(&mut pending) => {
                    pending = None;
                    self.finish(in_flight, result, &mut pending);
                }
                command = self.commands.recv() => {
                    match command {
                        Some(command) => self.handle_command(command, &mut pending),
                        None => break,
                    }
                }
                _ = flush_tick.tick() => {
                    self.start(Trigger::Periodic, &mut pending);
                }
                _ = tick(&mut heartbeat_tick) => {
                    self.heartbeat(&mut pending);
                }
            }
        }

        self.drain(pending).await;
        tracing::debug!(queued = self.engine.queue().len(), "delivery agent stopped");
        let _ = self.stopped_tx.send(true);
    }

    fn handle_command(&mut self, command: Command, pending: &mut Option<PendingSend>) {
        match command {
            Command::Enqueue(event) => self.enqueue(event, pending),
            Command::Flush(trigger) => self.start(trigger, pending),
            Command::NetworkRestored => {
                self.engine.network_restored();
                self.start(Trigger::NetworkRestored, pending);
            }
            Command::Status(reply) => {
                let _ = reply.send(self.engine.status());
            }
        }
    }

    fn enqueue(&mut self, event: Event, pending: &mut Option<PendingSend>) {
        let effect = self.engine.enqueue(event);
        if effect.threshold_reached {
            self.start(Trigger::Threshold, pending);
        }
    }

    fn start(&mut self, trigger: Trigger, pending: &mut Option<PendingSend>) {
        match self.engine.begin_flush(trigger) {
            Ok(in_flight) => {
                let transport = self.transports.select(trigger.prefers_best_effort());
                let request = in_flight.request();
                *pending = Some(Box::pin(async move {
                    let result = transport.send(&request).await;
                    (in_flight, result)
                }));
            }
            Err(FlushSkipped::Empty) => {}
            Err(skipped) => {
                tracing::trace!(trigger = %trigger, ?skipped, "flush not started");
            }
        }
    }

    fn finish(
        &mut self,
        in_flight: InFlight,
        result: Result<TransportReply, TransportError>,
        pending: &mut Option<PendingSend>,
    ) {
        let report = self.engine.complete_flush(in_flight, result);
        if report.follow_up {
            self.start(report.trigger.follow_up(), pending);
        }
    }

    fn heartbeat(&mut self, pending: &mut Option<PendingSend>) {
        let seconds = self.factory.seconds_on_page();
        if seconds == 0 || seconds <= self.last_heartbeat_seconds {
            return;
        }
        self.last_heartbeat_seconds = seconds;
        match (TimeOnPage { seconds }).to_payload() {
            Ok(payload) => {
                let event = self.factory.build(TimeOnPage::KIND, payload);
                self.enqueue(event, pending);
            }
            Err(e) => tracing::debug!(error = %e, "heartbeat payload not serializable"),
        }
    }

    /// Finish the in-flight batch, then push what is left through page-exit
    /// flushes until the queue is empty or an attempt fails.
    async fn drain(&mut self, pending: Option<PendingSend>) {
        if let Some(send) = pending {
            let (in_flight, result) = send.await;
            self.engine.complete_flush(in_flight, result);
        }

        // Remaining commands were sent before shutdown; keep their events.
        while let Ok(command) = self.commands.try_recv() {
            match command {
                Command::Enqueue(event) => {
                    self.engine.enqueue(event);
                }
                Command::Status(reply) => {
                    let _ = reply.send(self.engine.status());
                }
                Command::Flush(_) | Command::NetworkRestored => {}
            }
        }

        let rounds = self.engine.queue().len() / self.engine.config().batch_size.max(1) + 1;
        for _ in 0..rounds {
            match self.engine.flush(Trigger::PageExit, &self.transports).await {
                Ok(report) if report.requeued == 0 && report.exhausted == 0 => {}
                Ok(_) | Err(_) => break,
            }
        }
    }
}

fn ticker(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn wait_for(pending: &mut Option<PendingSend>) -> SendResult {
    match pending {
        Some(send) => send.await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::builder::AgentBuilder;
    use crate::app::handle::IdentifyTraits;
    use crate::config::AgentConfig;
    use crate::domain::{
        EventId, EventType, Identity, PageContext, Rejection, RejectionReason, SessionId, VisitorId,
    };
    use crate::impls::memory_storage::MemoryStorage;
    use crate::impls::scripted_transport::ScriptedTransport;
    use crate::ports::clock::Clock;
    use crate::ports::clock::FixedClock;
    use crate::ports::storage::Storage;
    use crate::queue::{QueuedEvent, storage_key};
    use crate::typed::AddToCart;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use ulid::Ulid;

    fn config() -> AgentConfig {
        AgentConfig {
            batch_size: 5,
            flush_interval_ms: 60_000,
            heartbeat_seconds: 0,
            page_url: Some("https://shop.example/products?utm_source=mail".into()),
            endpoint: "https://shop.example/collect".into(),
            ..AgentConfig::new("pk_test")
        }
    }

    struct Setup {
        storage: Arc<MemoryStorage>,
        http: Arc<ScriptedTransport>,
        beacon: Arc<ScriptedTransport>,
        clock: Arc<FixedClock>,
    }

    fn setup() -> Setup {
        Setup {
            storage: Arc::new(MemoryStorage::new()),
            http: Arc::new(ScriptedTransport::acknowledged()),
            beacon: Arc::new(ScriptedTransport::best_effort()),
            clock: Arc::new(FixedClock::new(
                Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap(),
            )),
        }
    }

    fn build(config: AgentConfig, s: &Setup) -> Agent {
        AgentBuilder::new(config)
            .storage(s.storage.clone())
            .clock(s.clock.clone())
            .acknowledged_transport(s.http.clone())
            .beacon_transport(s.beacon.clone())
            .rng_seed(5)
            .build()
            .unwrap()
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn reaching_the_batch_threshold_flushes_immediately() {
        let s = setup();
        let running = build(config(), &s).spawn();
        let handle = running.handle();

        for i in 0..5 {
            handle.track_typed(&AddToCart::new(format!("sku-{i}"), 1));
        }
        let status = handle.status().await.unwrap();
        settle().await;

        assert_eq!(s.http.sent_count(), 1);
        assert_eq!(s.http.sent()[0].batch.len(), 5);
        assert!(status.counters.enqueued >= 5);
        running.shutdown_and_join().await;
    }

    #[tokio::test]
    async fn unknown_event_names_never_reach_the_queue() {
        let s = setup();
        let running = build(config(), &s).spawn();
        let handle = running.handle();

        assert!(handle.track_named("signup", json!({})).is_none());
        assert!(handle.track_named("purchase", json!({"orderId": "o-1"})).is_some());

        let status = handle.status().await.unwrap();
        assert_eq!(status.counters.enqueued, 1);
        running.shutdown_and_join().await;
    }

    #[tokio::test]
    async fn concurrent_triggers_keep_a_single_batch_in_flight() {
        let s = Setup {
            http: Arc::new(ScriptedTransport::acknowledged().with_latency(Duration::from_millis(50))),
            ..setup()
        };
        let running = build(config(), &s).spawn();
        let handle = running.handle();

        for _ in 0..12 {
            handle.track(EventType::ScrollDepth, json!({"percent": 25}));
        }
        handle.flush();
        handle.flush();
        handle.network_online();

        let status = handle.status().await.unwrap();
        assert!(status.sending);
        assert!(s.http.sent_count() <= 1);

        // the backlog drains through follow-ups; the 2 left over wait for
        // the periodic tick
        tokio::time::sleep(Duration::from_millis(400)).await;
        let status = handle.status().await.unwrap();
        assert_eq!(status.queued, 2);
        let sizes: Vec<usize> = s.http.sent().iter().map(|r| r.batch.len()).collect();
        assert_eq!(sizes, vec![5, 5]);
        running.shutdown_and_join().await;
    }

    #[tokio::test]
    async fn page_exit_emits_exit_events_and_uses_the_beacon() {
        let s = setup();
        let running = build(config(), &s).spawn();
        let handle = running.handle();

        handle.track(EventType::ViewProduct, json!({"productId": "p-1"}));
        s.clock.advance(Duration::from_secs(42));
        handle.page_exit(Some("hidden"));
        handle.status().await.unwrap();
        settle().await;

        assert_eq!(s.http.sent_count(), 0);
        let sent = s.beacon.sent();
        assert_eq!(sent.len(), 1);
        let kinds: Vec<EventType> = sent[0].batch.iter().map(Event::event_type).collect();
        assert_eq!(kinds, vec![
            EventType::ViewProduct,
            EventType::TimeOnPage,
            EventType::ExitPage,
        ]);
        assert_eq!(sent[0].batch[1].payload()["seconds"], 42);
        assert_eq!(sent[0].batch[2].payload()["reason"], "hidden");
        running.shutdown_and_join().await;
    }

    #[tokio::test]
    async fn cross_origin_page_exit_falls_back_to_acknowledged() {
        let s = setup();
        let config = AgentConfig {
            endpoint: "https://api.wolftics.com/collect".into(),
            ..config()
        };
        let running = build(config, &s).spawn();
        let handle = running.handle();

        handle.track(EventType::ExitPage, json!({"reason": "pagehide"}));
        handle.page_exit(None);
        handle.status().await.unwrap();
        settle().await;

        assert_eq!(s.beacon.sent_count(), 0);
        assert_eq!(s.http.sent_count(), 1);
        running.shutdown_and_join().await;
    }

    #[tokio::test]
    async fn page_with_utm_emits_campaign_view() {
        let s = setup();
        let running = build(config(), &s).spawn();
        let handle = running.handle();

        handle.page(Some("/products/42"));
        handle.flush();
        handle.status().await.unwrap();
        settle().await;

        let sent = s.http.sent();
        let batch = &sent[0].batch;
        assert_eq!(batch[0].event_type(), EventType::PageView);
        assert_eq!(batch[0].context().page.route.as_deref(), Some("/products/42"));
        assert_eq!(batch[1].event_type(), EventType::CampaignView);
        running.shutdown_and_join().await;
    }

    #[tokio::test]
    async fn identify_attaches_user_id_to_later_events() {
        let s = setup();
        let running = build(config(), &s).spawn();
        let handle = running.handle();

        assert!(handle.identify("  ", IdentifyTraits::default()).is_none());
        handle.identify(
            "u-9",
            IdentifyTraits {
                email: Some("a".repeat(400)),
                phone: None,
            },
        );
        handle.track(EventType::Purchase, json!({"orderId": "o-2"}));
        handle.flush();
        handle.status().await.unwrap();
        settle().await;

        let sent = s.http.sent();
        let batch = &sent[0].batch;
        assert_eq!(batch[0].event_type(), EventType::Identify);
        assert_eq!(batch[0].payload()["userId"], "u-9");
        assert_eq!(batch[0].payload()["email"].as_str().unwrap().len(), 150);
        assert_eq!(batch[1].identity().user_id.as_deref(), Some("u-9"));
        running.shutdown_and_join().await;
    }

    #[tokio::test]
    async fn shutdown_drains_and_failures_stay_persisted() {
        let s = setup();
        s.beacon
            .push_error(TransportError::BeaconRefused("too large".into()));
        let running = build(AgentConfig { exit_events: false, ..config() }, &s).spawn();
        let handle = running.handle();

        handle.track(EventType::AddToCart, json!({"productId": "p-1"}));
        handle.track(EventType::AddToCart, json!({"productId": "p-2"}));
        running.shutdown_and_join().await;

        assert!(handle.is_stopped());
        assert_eq!(s.beacon.sent_count(), 1);
        let blob = s.storage.get(&storage_key("pk_test")).unwrap().unwrap();
        let persisted: serde_json::Value = serde_json::from_str(&blob).unwrap();
        assert_eq!(persisted.as_array().unwrap().len(), 2);

        let restarted = build(config(), &s);
        assert_eq!(restarted.engine().queue().len(), 2);
    }

    #[tokio::test]
    async fn partial_rejections_are_retried_on_the_next_eligible_tick() {
        let s = setup();
        s.http.push_rejections(vec![
            Rejection::new(3, RejectionReason::PublishFailed),
            Rejection::new(4, RejectionReason::Invalid),
        ]);
        let running = build(config(), &s).spawn();
        let handle = running.handle();

        for i in 0..5 {
            handle.track(EventType::ScrollDepth, json!({"percent": i}));
        }
        handle.status().await.unwrap();
        settle().await;

        let status = handle.status().await.unwrap();
        assert_eq!(status.queued, 1);
        assert!(status.next_eligible_flush_at.is_some());
        running.shutdown_and_join().await;
    }

    fn stored_event(n: u64) -> QueuedEvent {
        QueuedEvent::new(Event::new(
            EventId::from_ulid(Ulid::from_parts(n, 7)),
            EventType::ScrollDepth,
            serde_json::Map::new(),
            PageContext::default(),
            Identity {
                visitor_id: VisitorId::from_ulid(Ulid::from_parts(1, 1)),
                session_id: SessionId::from_ulid(Ulid::from_parts(1, 2)),
                user_id: None,
            },
            Utc.timestamp_millis_opt(1_717_236_000_000).unwrap(),
        ))
    }

    #[tokio::test]
    async fn tracking_during_an_outage_waits_for_the_backoff() {
        let s = setup();
        s.http.push_status(503);
        let config = AgentConfig {
            flush_interval_ms: 20,
            ..config()
        };
        let running = build(config, &s).spawn();
        let handle = running.handle();

        for i in 0..5 {
            handle.track(EventType::ScrollDepth, json!({"percent": i}));
        }
        handle.status().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let status = handle.status().await.unwrap();
        assert_eq!(s.http.sent_count(), 1);
        assert!(status.is_backing_off(s.clock.now()));

        // the clock is frozen, so neither threshold nor periodic ticks may send
        for i in 0..10 {
            handle.track(EventType::ScrollDepth, json!({"percent": 10 + i}));
        }
        tokio::time::sleep(Duration::from_millis(120)).await;

        let status = handle.status().await.unwrap();
        assert_eq!(s.http.sent_count(), 1);
        assert_eq!(status.queued, 15);

        // once the gate opens the periodic tick resumes and follow-ups drain
        s.clock.advance(Duration::from_secs(60));
        tokio::time::sleep(Duration::from_millis(150)).await;

        let status = handle.status().await.unwrap();
        assert_eq!(status.queued, 0);
        let sizes: Vec<usize> = s.http.sent().iter().map(|r| r.batch.len()).collect();
        assert_eq!(sizes, vec![5, 5, 5, 5]);
        running.shutdown_and_join().await;
    }

    #[tokio::test]
    async fn refused_beacon_on_page_exit_backs_off_instead_of_resending() {
        let s = setup();
        let records: Vec<QueuedEvent> = (1..=10).map(stored_event).collect();
        s.storage
            .set(&storage_key("pk_test"), &serde_json::to_string(&records).unwrap())
            .unwrap();
        s.beacon
            .push_error(TransportError::BeaconRefused("too large".into()))
            .push_error(TransportError::BeaconRefused("too large".into()));

        let running = build(AgentConfig { exit_events: false, ..config() }, &s).spawn();
        let handle = running.handle();

        handle.page_exit(Some("hidden"));
        handle.status().await.unwrap();
        settle().await;

        let status = handle.status().await.unwrap();
        assert_eq!(s.beacon.sent_count(), 1);
        assert_eq!(status.queued, 10);
        assert_eq!(status.counters.exhausted, 0);
        assert!(status.next_eligible_flush_at.is_some());
        assert_eq!(s.http.sent_count(), 0);
        running.shutdown_and_join().await;
    }
}
