//! AgentHandle - 埋め込み側から使うプロデューサ API
//!
//! すべてのメソッドはノンブロッキングで、エラーを呼び出し側に返しません。
//! 不正な入力は warn ログを出して捨てます。イベントはハンドル側で同期的に
//! 組み立て、エージェントへはチャネル経由で渡すだけです。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot, watch};

use super::status::DeliveryStatus;
use super::trigger::Trigger;
use crate::domain::context::{PageContext, truncate};
use crate::domain::errors::TrackError;
use crate::domain::event::{Event, EventType, payload_from_value};
use crate::domain::ids::EventId;
use crate::ports::clock::Clock;
use crate::ports::context::ContextProvider;
use crate::ports::id_generator::IdGenerator;
use crate::ports::identity::IdentityProvider;
use crate::typed::{CampaignView, ExitPage, TimeOnPage, TrackedEvent};

const MAX_EMAIL_LEN: usize = 150;
const MAX_PHONE_LEN: usize = 50;

/// Messages from handles to the agent task.
#[derive(Debug)]
pub(crate) enum Command {
    Enqueue(Event),
    Flush(Trigger),
    NetworkRestored,
    Status(oneshot::Sender<DeliveryStatus>),
}

/// Builds complete events: id, identity, context and timestamp.
pub struct EventFactory {
    identity: Arc<dyn IdentityProvider>,
    context: Arc<dyn ContextProvider>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    page_started_at: DateTime<Utc>,
}

impl EventFactory {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        context: Arc<dyn ContextProvider>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        let page_started_at = clock.now();
        Self {
            identity,
            context,
            clock,
            ids,
            page_started_at,
        }
    }

    pub fn build(&self, kind: EventType, payload: Map<String, Value>) -> Event {
        self.build_with_context(kind, payload, self.context.snapshot())
    }

    pub fn build_with_context(
        &self,
        kind: EventType,
        payload: Map<String, Value>,
        context: PageContext,
    ) -> Event {
        let now = self.clock.now();
        Event::new(
            self.ids.generate_event_id(),
            kind,
            payload,
            context,
            self.identity.identity(now),
            now,
        )
    }

    pub fn context(&self) -> PageContext {
        self.context.snapshot()
    }

    pub fn identity_provider(&self) -> &dyn IdentityProvider {
        &*self.identity
    }

    /// Whole seconds since the factory was created (the page load).
    pub fn seconds_on_page(&self) -> u64 {
        let elapsed = self.clock.now() - self.page_started_at;
        u64::try_from(elapsed.num_seconds()).unwrap_or(0)
    }
}

/// Optional traits attached to an `identify` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct IdentifyTraits {
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Cloneable producer surface of a running agent.
#[derive(Clone)]
pub struct AgentHandle {
    commands: mpsc::UnboundedSender<Command>,
    factory: Arc<EventFactory>,
    exit_events: bool,
    shutdown_tx: Arc<watch::Sender<bool>>,
    stopped_rx: watch::Receiver<bool>,
}

impl AgentHandle {
    pub(crate) fn new(
        commands: mpsc::UnboundedSender<Command>,
        factory: Arc<EventFactory>,
        exit_events: bool,
        shutdown_tx: Arc<watch::Sender<bool>>,
        stopped_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            commands,
            factory,
            exit_events,
            shutdown_tx,
            stopped_rx,
        }
    }

    pub fn track(&self, kind: EventType, payload: Value) -> Option<EventId> {
        let event = self.factory.build(kind, payload_from_value(payload));
        self.submit(event)
    }

    /// Track by wire name; names outside the allow-list are dropped.
    pub fn track_named(&self, name: &str, payload: Value) -> Option<EventId> {
        match name.parse::<EventType>() {
            Ok(kind) => self.track(kind, payload),
            Err(e) => {
                tracing::warn!(error = %e, "event rejected");
                None
            }
        }
    }

    pub fn track_typed<T: TrackedEvent>(&self, event: &T) -> Option<EventId> {
        match event.to_payload() {
            Ok(payload) => self.submit(self.factory.build(T::KIND, payload)),
            Err(e) => {
                tracing::warn!(kind = %T::KIND, error = %e, "event payload not serializable");
                None
            }
        }
    }

    /// `page_view` for the current page, plus `campaign_view` when the page
    /// carries UTM parameters.
    pub fn page(&self, route: Option<&str>) -> Option<EventId> {
        let mut context = self.factory.context();
        if let Some(route) = route.filter(|r| !r.is_empty()) {
            context.set_route(route);
        }
        let has_campaign = context.campaign.has_any();

        let event = self
            .factory
            .build_with_context(EventType::PageView, Map::new(), context);
        let id = self.submit(event);

        if has_campaign {
            self.track_typed(&CampaignView {});
        }
        id
    }

    pub fn identify(&self, user_id: &str, traits: IdentifyTraits) -> Option<EventId> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            tracing::warn!(error = %TrackError::MissingUserId, "identify rejected");
            return None;
        }
        self.factory.identity_provider().set_user_id(user_id);

        let mut payload = Map::new();
        payload.insert("userId".to_string(), Value::from(user_id));
        if let Some(email) = traits.email.filter(|e| !e.is_empty()) {
            payload.insert("email".to_string(), Value::from(truncate(&email, MAX_EMAIL_LEN)));
        }
        if let Some(phone) = traits.phone.filter(|p| !p.is_empty()) {
            payload.insert("phone".to_string(), Value::from(truncate(&phone, MAX_PHONE_LEN)));
        }
        self.submit(self.factory.build(EventType::Identify, payload))
    }

    /// The page is going away: record exit events and drain via beacon.
    pub fn page_exit(&self, reason: Option<&str>) {
        if self.exit_events {
            let seconds = self.factory.seconds_on_page();
            if seconds > 0 {
                self.track_typed(&TimeOnPage { seconds });
            }
            let reason = reason.filter(|r| !r.is_empty()).unwrap_or("unload");
            self.track_typed(&ExitPage {
                reason: reason.to_string(),
            });
        }
        self.send(Command::Flush(Trigger::PageExit));
    }

    pub fn network_online(&self) {
        self.send(Command::NetworkRestored);
    }

    pub fn flush(&self) {
        self.send(Command::Flush(Trigger::Manual));
    }

    /// `None` once the agent has stopped.
    pub async fn status(&self) -> Option<DeliveryStatus> {
        let (tx, rx) = oneshot::channel();
        if !self.send(Command::Status(tx)) {
            return None;
        }
        rx.await.ok()
    }

    /// Ask the agent to drain and stop, then wait until it has.
    pub async fn shutdown(&self) {
        // ignore send error: the agent may already be gone
        let _ = self.shutdown_tx.send(true);
        let mut stopped = self.stopped_rx.clone();
        // Err means the agent task dropped its sender, i.e. it is gone.
        let _ = stopped.wait_for(|stopped| *stopped).await;
    }

    pub fn is_stopped(&self) -> bool {
        *self.stopped_rx.borrow() || self.commands.is_closed()
    }

    fn submit(&self, event: Event) -> Option<EventId> {
        let id = event.event_id();
        self.send(Command::Enqueue(event)).then_some(id)
    }

    fn send(&self, command: Command) -> bool {
        match self.commands.send(command) {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!("agent stopped, dropping command");
                false
            }
        }
    }
}
