//! StoredIdentity - visitor / session / user を Storage に保存する IdentityProvider
//!
//! # キー
//! - `wolftics:visitor`: 初回に一度だけ作成
//! - `wolftics:session` + `wolftics:session_ts`: 非アクティブ期間がタイムアウトを超えたら更新
//! - `wolftics:user`: `identify` で設定
//!
//! Storage が使えなくてもメモリ上の値で動作を続けます。

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

use crate::domain::event::Identity;
use crate::domain::ids::{SessionId, VisitorId};
use crate::ports::id_generator::IdGenerator;
use crate::ports::identity::IdentityProvider;
use crate::ports::storage::Storage;

pub const VISITOR_KEY: &str = "wolftics:visitor";
pub const SESSION_KEY: &str = "wolftics:session";
pub const SESSION_TS_KEY: &str = "wolftics:session_ts";
pub const USER_KEY: &str = "wolftics:user";

struct IdentityState {
    visitor_id: VisitorId,
    session_id: Option<SessionId>,
    last_activity: Option<DateTime<Utc>>,
    user_id: Option<String>,
}

pub struct StoredIdentity {
    storage: Arc<dyn Storage>,
    ids: Arc<dyn IdGenerator>,
    session_timeout: Duration,
    state: Mutex<IdentityState>,
}

impl StoredIdentity {
    /// Restores identity from storage, creating the visitor id if missing.
    pub fn load(
        storage: Arc<dyn Storage>,
        ids: Arc<dyn IdGenerator>,
        session_timeout: std::time::Duration,
    ) -> Self {
        let visitor_id = match read(&*storage, VISITOR_KEY).and_then(|v| v.parse().ok()) {
            Some(id) => id,
            None => {
                let id = ids.generate_visitor_id();
                write(&*storage, VISITOR_KEY, &id.as_ulid().to_string());
                id
            }
        };

        let session_id = read(&*storage, SESSION_KEY).and_then(|v| v.parse().ok());
        let last_activity = read(&*storage, SESSION_TS_KEY)
            .and_then(|v| v.parse::<i64>().ok())
            .and_then(DateTime::<Utc>::from_timestamp_millis);
        let user_id = read(&*storage, USER_KEY).filter(|u| !u.is_empty());

        Self {
            storage,
            ids,
            session_timeout: Duration::from_std(session_timeout).unwrap_or(Duration::MAX),
            state: Mutex::new(IdentityState {
                visitor_id,
                session_id,
                last_activity,
                user_id,
            }),
        }
    }
}

impl IdentityProvider for StoredIdentity {
    fn identity(&self, now: DateTime<Utc>) -> Identity {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let expired = match (state.session_id, state.last_activity) {
            (Some(_), Some(last)) => now - last > self.session_timeout,
            _ => true,
        };
        let session_id = match state.session_id {
            Some(id) if !expired => id,
            _ => {
                let id = self.ids.generate_session_id();
                tracing::debug!(session_id = %id, "starting new session");
                state.session_id = Some(id);
                write(&*self.storage, SESSION_KEY, &id.as_ulid().to_string());
                id
            }
        };

        state.last_activity = Some(now);
        write(&*self.storage, SESSION_TS_KEY, &now.timestamp_millis().to_string());

        Identity {
            visitor_id: state.visitor_id,
            session_id,
            user_id: state.user_id.clone(),
        }
    }

    fn set_user_id(&self, user_id: &str) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.user_id = Some(user_id.to_string());
        write(&*self.storage, USER_KEY, user_id);
    }
}

fn read(storage: &dyn Storage, key: &str) -> Option<String> {
    match storage.get(key) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(key, error = %e, "identity storage unreadable");
            None
        }
    }
}

fn write(storage: &dyn Storage, key: &str, value: &str) {
    if let Err(e) = storage.set(key, value) {
        tracing::warn!(key, error = %e, "identity storage write failed, keeping value in memory");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::memory_storage::MemoryStorage;
    use crate::ports::clock::{Clock, FixedClock};
    use crate::ports::id_generator::UlidGenerator;
    use chrono::TimeZone;

    fn setup() -> (Arc<MemoryStorage>, Arc<FixedClock>, Arc<dyn IdGenerator>) {
        let storage = Arc::new(MemoryStorage::new());
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()));
        let ids: Arc<dyn IdGenerator> = Arc::new(UlidGenerator::new(clock.clone()));
        (storage, clock, ids)
    }

    const THIRTY_MINUTES: std::time::Duration = std::time::Duration::from_secs(30 * 60);

    #[test]
    fn visitor_survives_reload() {
        let (storage, clock, ids) = setup();
        let first = StoredIdentity::load(storage.clone(), ids.clone(), THIRTY_MINUTES);
        let a = first.identity(clock.now());

        let second = StoredIdentity::load(storage, ids, THIRTY_MINUTES);
        let b = second.identity(clock.now());

        assert_eq!(a.visitor_id, b.visitor_id);
        assert_eq!(a.session_id, b.session_id);
    }

    #[test]
    fn session_rotates_after_inactivity() {
        let (storage, clock, ids) = setup();
        let identity = StoredIdentity::load(storage, ids, THIRTY_MINUTES);

        let first = identity.identity(clock.now());
        clock.advance(std::time::Duration::from_secs(29 * 60));
        let active = identity.identity(clock.now());
        clock.advance(std::time::Duration::from_secs(31 * 60));
        let resumed = identity.identity(clock.now());

        assert_eq!(first.session_id, active.session_id);
        assert_ne!(active.session_id, resumed.session_id);
        assert_eq!(first.visitor_id, resumed.visitor_id);
    }

    #[test]
    fn user_id_is_attached_and_persisted() {
        let (storage, clock, ids) = setup();
        let identity = StoredIdentity::load(storage.clone(), ids.clone(), THIRTY_MINUTES);
        assert_eq!(identity.identity(clock.now()).user_id, None);

        identity.set_user_id("u-42");

        assert_eq!(identity.identity(clock.now()).user_id.as_deref(), Some("u-42"));
        let reloaded = StoredIdentity::load(storage, ids, THIRTY_MINUTES);
        assert_eq!(reloaded.identity(clock.now()).user_id.as_deref(), Some("u-42"));
    }

    #[test]
    fn unavailable_storage_keeps_identity_in_memory() {
        let (storage, clock, ids) = setup();
        storage.set_failing(true);
        let identity = StoredIdentity::load(storage, ids, THIRTY_MINUTES);

        let a = identity.identity(clock.now());
        identity.set_user_id("u-1");
        let b = identity.identity(clock.now());

        assert_eq!(a.session_id, b.session_id);
        assert_eq!(b.user_id.as_deref(), Some("u-1"));
    }
}
