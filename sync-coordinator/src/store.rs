//! Durable session record storage contract.
//!
//! A completed session is written here before it travels anywhere:
//! local durable storage is the source of truth, every transport is a
//! mirror. Deduplication by session id lives behind this trait so a
//! session arriving twice over different transports lands once.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use sync_types::{SessionCompleteEvent, SessionId};

/// Session store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The storage backend failed.
    #[error("session store error: {0}")]
    Backend(String),
}

/// Contract to the durable per-device session history.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Record the session unless one with the same id already exists.
    ///
    /// Returns true when a new record was created, false when the id
    /// was already known. Insert-if-absent is the idempotency
    /// guarantee: callers never need to check first.
    async fn insert_if_absent(&self, event: &SessionCompleteEvent) -> Result<bool, StoreError>;
}

/// In-memory session store, used by tests and as the default until
/// the application wires its real history backend in.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    records: Arc<Mutex<HashMap<SessionId, SessionCompleteEvent>>>,
}

impl MemorySessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.lock().unwrap().is_empty()
    }

    /// Whether a record with this id exists.
    pub fn contains(&self, id: SessionId) -> bool {
        self.records.lock().unwrap().contains_key(&id)
    }
}

impl Clone for MemorySessionStore {
    fn clone(&self) -> Self {
        Self {
            records: Arc::clone(&self.records),
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert_if_absent(&self, event: &SessionCompleteEvent) -> Result<bool, StoreError> {
        let mut records = self.records.lock().unwrap();
        if records.contains_key(&event.session_id) {
            return Ok(false);
        }
        records.insert(event.session_id, event.clone());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_types::{unix_now_seconds, DeviceClass, DeviceId, StopReason};

    fn event(session_id: SessionId) -> SessionCompleteEvent {
        SessionCompleteEvent {
            session_id,
            mode_id: "classic-25".into(),
            mode_label: "Classic".into(),
            focus_seconds: 1500,
            focus_minutes: 25,
            stop_reason: StopReason::Completed,
            signals: Vec::new(),
            session_date: "2026-08-29".into(),
            session_time: "09:00".into(),
            completed_at: unix_now_seconds(),
            origin: DeviceId::random(),
            origin_class: DeviceClass::Desktop,
        }
    }

    #[tokio::test]
    async fn same_session_id_inserts_once() {
        let store = MemorySessionStore::new();
        let id = SessionId::new();

        assert!(store.insert_if_absent(&event(id)).await.unwrap());
        assert!(!store.insert_if_absent(&event(id)).await.unwrap());
        assert_eq!(store.len(), 1);
        assert!(store.contains(id));
    }

    #[tokio::test]
    async fn distinct_session_ids_all_insert() {
        let store = MemorySessionStore::new();
        assert!(store.insert_if_absent(&event(SessionId::new())).await.unwrap());
        assert!(store.insert_if_absent(&event(SessionId::new())).await.unwrap());
        assert_eq!(store.len(), 2);
    }
}
