//! Durable attendance log backed by redb.
//!
//! # Table design
//!
//! `EVENTS` uses a composite key so one range scan returns an actor's events
//! in write order:
//! ```text
//! [ actor_len: u16 BE | actor_id bytes | seq: u64 BE ]
//! ```
//! The length prefix keeps one actor's range from swallowing another actor
//! whose id shares a prefix. `EVENT_TIMES` indexes the same events by
//! timestamp so a day query only touches that day's entries:
//! ```text
//! [ actor_len: u16 BE | actor_id bytes | micros: u64 BE (sign-flipped) | seq: u64 BE ] -> seq
//! ```
//! `HEADS` maps actor id to the actor's last sequence number and `META` holds
//! the global sequence counter. An append reads and updates all four in one
//! write transaction, which is what makes the head check and the insert a
//! single atomic step.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition};

use crate::error::{PresenceError, Result};
use crate::store::{AttendanceStore, StoreError};
use crate::types::{ClockEvent, EventDraft};
use crate::window::DayWindow;

// ---------------------------------------------------------------------------
// Table definitions
// ---------------------------------------------------------------------------

const EVENTS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("events");
const EVENT_TIMES: TableDefinition<&[u8], u64> = TableDefinition::new("event_times");
const HEADS: TableDefinition<&str, u64> = TableDefinition::new("heads");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const SEQ_KEY: &str = "seq";

// ---------------------------------------------------------------------------
// Key helpers
// ---------------------------------------------------------------------------

fn event_key(actor_id: &str, seq: u64) -> Vec<u8> {
    let actor = actor_id.as_bytes();
    let mut key = Vec::with_capacity(2 + actor.len() + 8);
    key.extend_from_slice(&(actor.len() as u16).to_be_bytes());
    key.extend_from_slice(actor);
    key.extend_from_slice(&seq.to_be_bytes());
    key
}

fn time_key(actor_id: &str, at: DateTime<Utc>, seq: u64) -> Vec<u8> {
    let actor = actor_id.as_bytes();
    // Flipping the sign bit makes big-endian byte order match i64 order.
    let micros = (at.timestamp_micros() as u64) ^ (1 << 63);
    let mut key = Vec::with_capacity(2 + actor.len() + 16);
    key.extend_from_slice(&(actor.len() as u16).to_be_bytes());
    key.extend_from_slice(actor);
    key.extend_from_slice(&micros.to_be_bytes());
    key.extend_from_slice(&seq.to_be_bytes());
    key
}

fn unavailable(e: impl std::fmt::Display) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct Ledger {
    db: Arc<Database>,
}

impl Ledger {
    /// Open or create the ledger at `path`, creating all tables up front.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(|e| PresenceError::Ledger(e.to_string()))?;
        let wt = db
            .begin_write()
            .map_err(|e| PresenceError::Ledger(e.to_string()))?;
        wt.open_table(EVENTS)
            .map_err(|e| PresenceError::Ledger(e.to_string()))?;
        wt.open_table(EVENT_TIMES)
            .map_err(|e| PresenceError::Ledger(e.to_string()))?;
        wt.open_table(HEADS)
            .map_err(|e| PresenceError::Ledger(e.to_string()))?;
        wt.open_table(META)
            .map_err(|e| PresenceError::Ledger(e.to_string()))?;
        wt.commit()
            .map_err(|e| PresenceError::Ledger(e.to_string()))?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Compare-and-append in a single write transaction.
    pub fn append_blocking(&self, draft: EventDraft) -> std::result::Result<ClockEvent, StoreError> {
        if draft.actor_id.len() > usize::from(u16::MAX) {
            return Err(StoreError::Unavailable("actor id too long".into()));
        }
        let wt = self.db.begin_write().map_err(unavailable)?;
        let event = {
            let mut heads = wt.open_table(HEADS).map_err(unavailable)?;
            let actual = heads
                .get(draft.actor_id.as_str())
                .map_err(unavailable)?
                .map(|g| g.value());
            if actual != draft.expected_head {
                return Err(StoreError::Conflict {
                    actor_id: draft.actor_id,
                    expected: draft.expected_head,
                    actual,
                });
            }

            let mut meta = wt.open_table(META).map_err(unavailable)?;
            let seq = meta
                .get(SEQ_KEY)
                .map_err(unavailable)?
                .map(|g| g.value())
                .unwrap_or(0)
                + 1;
            meta.insert(SEQ_KEY, seq).map_err(unavailable)?;

            let event = draft.into_event(uuid::Uuid::new_v4().to_string(), seq);
            let value = serde_json::to_vec(&event).map_err(unavailable)?;
            let mut events = wt.open_table(EVENTS).map_err(unavailable)?;
            events
                .insert(event_key(&event.actor_id, seq).as_slice(), value.as_slice())
                .map_err(unavailable)?;
            let mut times = wt.open_table(EVENT_TIMES).map_err(unavailable)?;
            times
                .insert(time_key(&event.actor_id, event.timestamp, seq).as_slice(), seq)
                .map_err(unavailable)?;
            heads
                .insert(event.actor_id.as_str(), seq)
                .map_err(unavailable)?;
            event
        };
        wt.commit().map_err(unavailable)?;
        tracing::debug!(actor = %event.actor_id, seq = event.seq, kind = %event.kind, "ledger append");
        Ok(event)
    }

    /// All of an actor's events in write order.
    pub fn list_actor_blocking(&self, actor_id: &str) -> std::result::Result<Vec<ClockEvent>, StoreError> {
        let lower = event_key(actor_id, 0);
        let upper = event_key(actor_id, u64::MAX);
        let rt = self.db.begin_read().map_err(unavailable)?;
        let table = rt.open_table(EVENTS).map_err(unavailable)?;

        let mut result = Vec::new();
        for entry in table
            .range(lower.as_slice()..=upper.as_slice())
            .map_err(unavailable)?
        {
            let (_, v) = entry.map_err(unavailable)?;
            let event: ClockEvent = serde_json::from_slice(v.value()).map_err(unavailable)?;
            result.push(event);
        }
        Ok(result)
    }

    /// The actor's events inside `window`, in write order. Only the window's
    /// slice of the time index is read.
    pub fn list_day_blocking(
        &self,
        actor_id: &str,
        window: &DayWindow,
    ) -> std::result::Result<Vec<ClockEvent>, StoreError> {
        let lower = time_key(actor_id, window.start(), 0);
        let upper = time_key(actor_id, window.end(), 0);
        let rt = self.db.begin_read().map_err(unavailable)?;
        let times = rt.open_table(EVENT_TIMES).map_err(unavailable)?;
        let events = rt.open_table(EVENTS).map_err(unavailable)?;

        let mut seqs = Vec::new();
        for entry in times
            .range(lower.as_slice()..upper.as_slice())
            .map_err(unavailable)?
        {
            let (_, seq) = entry.map_err(unavailable)?;
            seqs.push(seq.value());
        }
        seqs.sort_unstable();

        let mut result = Vec::with_capacity(seqs.len());
        for seq in seqs {
            let value = events
                .get(event_key(actor_id, seq).as_slice())
                .map_err(unavailable)?
                .ok_or_else(|| unavailable(format!("time index points at missing event {seq}")))?;
            let event: ClockEvent = serde_json::from_slice(value.value()).map_err(unavailable)?;
            result.push(event);
        }
        Ok(result)
    }

    pub fn head_blocking(&self, actor_id: &str) -> std::result::Result<Option<u64>, StoreError> {
        let rt = self.db.begin_read().map_err(unavailable)?;
        let table = rt.open_table(HEADS).map_err(unavailable)?;
        let head = table.get(actor_id).map_err(unavailable)?.map(|g| g.value());
        Ok(head)
    }
}

async fn blocking<T, F>(f: F) -> std::result::Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce() -> std::result::Result<T, StoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Unavailable(format!("task join error: {e}")))?
}

#[async_trait]
impl AttendanceStore for Ledger {
    async fn append(&self, draft: EventDraft) -> std::result::Result<ClockEvent, StoreError> {
        let ledger = self.clone();
        blocking(move || ledger.append_blocking(draft)).await
    }

    async fn list_day(
        &self,
        actor_id: &str,
        window: &DayWindow,
    ) -> std::result::Result<Vec<ClockEvent>, StoreError> {
        let ledger = self.clone();
        let actor_id = actor_id.to_string();
        let window = *window;
        blocking(move || ledger.list_day_blocking(&actor_id, &window)).await
    }

    async fn head(&self, actor_id: &str) -> std::result::Result<Option<u64>, StoreError> {
        let ledger = self.clone();
        let actor_id = actor_id.to_string();
        blocking(move || ledger.head_blocking(&actor_id)).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
