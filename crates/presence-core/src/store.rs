//! Attendance log accessor.
//!
//! The log is append-only and owned by a collaborator. Implementations must
//! return events in write order and make each append atomic per actor.

use crate::types::{ClockEvent, EventDraft};
use crate::window::DayWindow;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("append conflict for actor '{actor_id}': expected head {expected:?}, found {actual:?}")]
    Conflict {
        actor_id: String,
        expected: Option<u64>,
        actual: Option<u64>,
    },

    #[error("attendance store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait AttendanceStore: Send + Sync {
    /// Append one event. Fails with `Conflict` when `draft.expected_head`
    /// no longer matches the actor's last sequence number.
    async fn append(&self, draft: EventDraft) -> Result<ClockEvent, StoreError>;

    /// The actor's events inside `window`, in write order.
    async fn list_day(&self, actor_id: &str, window: &DayWindow)
        -> Result<Vec<ClockEvent>, StoreError>;

    /// Sequence number of the actor's most recent event, if any.
    async fn head(&self, actor_id: &str) -> Result<Option<u64>, StoreError>;
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryLog {
    next_seq: u64,
    by_actor: HashMap<String, Vec<ClockEvent>>,
}

/// Process-local store. Appends are serialized by a mutex.
#[derive(Default)]
pub struct MemoryStore {
    log: Mutex<MemoryLog>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the log with already-committed events (fixtures, imports).
    /// Events keep their relative order; sequence numbers are reassigned.
    pub fn with_events(events: impl IntoIterator<Item = ClockEvent>) -> Self {
        let store = Self::new();
        {
            let mut log = store.log.lock().unwrap_or_else(|p| p.into_inner());
            for mut event in events {
                log.next_seq += 1;
                event.seq = log.next_seq;
                log.by_actor
                    .entry(event.actor_id.clone())
                    .or_default()
                    .push(event);
            }
        }
        store
    }

    /// Total number of events across all actors.
    pub fn len(&self) -> usize {
        let log = self.log.lock().unwrap_or_else(|p| p.into_inner());
        log.by_actor.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AttendanceStore for MemoryStore {
    async fn append(&self, draft: EventDraft) -> Result<ClockEvent, StoreError> {
        let mut log = self.log.lock().unwrap_or_else(|p| p.into_inner());
        let actual = log
            .by_actor
            .get(&draft.actor_id)
            .and_then(|events| events.last())
            .map(|e| e.seq);
        if actual != draft.expected_head {
            return Err(StoreError::Conflict {
                actor_id: draft.actor_id,
                expected: draft.expected_head,
                actual,
            });
        }
        log.next_seq += 1;
        let event = draft.into_event(uuid::Uuid::new_v4().to_string(), log.next_seq);
        log.by_actor
            .entry(event.actor_id.clone())
            .or_default()
            .push(event.clone());
        Ok(event)
    }

    async fn list_day(
        &self,
        actor_id: &str,
        window: &DayWindow,
    ) -> Result<Vec<ClockEvent>, StoreError> {
        let log = self.log.lock().unwrap_or_else(|p| p.into_inner());
        Ok(log
            .by_actor
            .get(actor_id)
            .map(|events| {
                events
                    .iter()
                    .filter(|e| window.contains(e.timestamp))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn head(&self, actor_id: &str) -> Result<Option<u64>, StoreError> {
        let log = self.log.lock().unwrap_or_else(|p| p.into_inner());
        Ok(log
            .by_actor
            .get(actor_id)
            .and_then(|events| events.last())
            .map(|e| e.seq))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
