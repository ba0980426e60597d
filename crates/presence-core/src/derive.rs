//! Derived per-actor day view.
//!
//! Nothing here is persisted. The view is a fold over the actor's events in
//! log order; the fold never re-sorts, so ties in wall-clock time resolve by
//! log position.

use crate::config::Config;
use crate::error::Result;
use crate::types::{ClockEvent, ClockStatus, ClockType, ImageRef};
use crate::window::DayWindow;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// A clock-in that carried a photo, as shown in the capture feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BiometricCapture {
    pub event_id: String,
    pub seq: u64,
    pub actor_id: String,
    pub site_id: String,
    pub photo_ref: ImageRef,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorDailyState {
    pub actor_id: String,
    pub date: NaiveDate,
    pub first_in: Option<DateTime<Utc>>,
    /// Site of the `first_in` event.
    pub first_in_site: Option<String>,
    pub last_out: Option<DateTime<Utc>>,
    pub current_status: ClockStatus,
    pub work_minutes: i64,
    pub late_by_minutes: i64,
    pub captures: Vec<BiometricCapture>,
}

// ---------------------------------------------------------------------------
// StateDeriver
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateDeriver {
    shift_start: NaiveTime,
}

impl Default for StateDeriver {
    fn default() -> Self {
        Self {
            shift_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

impl StateDeriver {
    pub fn new(shift_start: NaiveTime) -> Self {
        Self { shift_start }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(config.shift_start()?))
    }

    pub fn shift_start(&self) -> NaiveTime {
        self.shift_start
    }

    /// Fold `events` (in log order) into the actor's view of `window`.
    /// Events outside the window are ignored.
    pub fn derive(
        &self,
        actor_id: &str,
        events: &[ClockEvent],
        window: &DayWindow,
        now: DateTime<Utc>,
    ) -> ActorDailyState {
        let in_window: Vec<&ClockEvent> = events
            .iter()
            .filter(|e| window.contains(e.timestamp))
            .collect();

        let mut first_in: Option<&ClockEvent> = None;
        for &event in in_window.iter().filter(|e| e.kind == ClockType::ClockIn) {
            if first_in.map_or(true, |f| event.timestamp < f.timestamp) {
                first_in = Some(event);
            }
        }
        let first_in_at = first_in.map(|e| e.timestamp);

        let mut last_out: Option<DateTime<Utc>> = None;
        if let Some(start) = first_in_at {
            for event in in_window.iter().filter(|e| e.kind == ClockType::ClockOut) {
                if event.timestamp > start && last_out.map_or(true, |l| event.timestamp >= l) {
                    last_out = Some(event.timestamp);
                }
            }
        }

        let current_status = in_window
            .last()
            .map(|e| ClockStatus::from(e.kind))
            .unwrap_or(ClockStatus::ClockedOut);

        let work_minutes = match first_in_at {
            Some(start) => (last_out.unwrap_or(now) - start).num_minutes().max(0),
            None => 0,
        };

        let threshold = window.at(self.shift_start);
        let late_by_minutes = match first_in_at {
            Some(start) if start > threshold => {
                let secs = (start - threshold).num_seconds();
                (secs + 30) / 60
            }
            _ => 0,
        };

        let captures = in_window
            .iter()
            .filter(|e| e.kind == ClockType::ClockIn)
            .filter_map(|e| {
                e.photo_ref.as_ref().map(|photo| BiometricCapture {
                    event_id: e.id.clone(),
                    seq: e.seq,
                    actor_id: e.actor_id.clone(),
                    site_id: e.site_id.clone(),
                    photo_ref: photo.clone(),
                    timestamp: e.timestamp,
                })
            })
            .collect();

        ActorDailyState {
            actor_id: actor_id.to_string(),
            date: window.date(),
            first_in: first_in_at,
            first_in_site: first_in.map(|e| e.site_id.clone()),
            last_out,
            current_status,
            work_minutes,
            late_by_minutes,
            captures,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::window::offset_from_minutes;

    pub(crate) fn event(seq: u64, kind: ClockType, at: &str) -> ClockEvent {
        ClockEvent {
            id: format!("e{seq}"),
            seq,
            actor_id: "alice".into(),
            site_id: "hq".into(),
            kind,
            timestamp: at.parse().unwrap(),
            latitude: -6.2,
            longitude: 106.8,
            distance_meters: 5,
            photo_ref: None,
            note: None,
        }
    }

    fn window() -> DayWindow {
        DayWindow::containing(
            "2026-03-02T12:00:00Z".parse().unwrap(),
            offset_from_minutes(0).unwrap(),
        )
    }

    fn now() -> DateTime<Utc> {
        "2026-03-02T12:00:00Z".parse().unwrap()
    }

    #[test]
    fn empty_day_is_clocked_out_with_zero_work() {
        let state = StateDeriver::default().derive("alice", &[], &window(), now());
        assert_eq!(state.current_status, ClockStatus::ClockedOut);
        assert_eq!(state.first_in, None);
        assert_eq!(state.last_out, None);
        assert_eq!(state.work_minutes, 0);
        assert_eq!(state.late_by_minutes, 0);
        assert!(state.captures.is_empty());
    }

    #[test]
    fn early_arrival_is_not_late() {
        let events = [event(1, ClockType::ClockIn, "2026-03-02T08:55:00Z")];
        let state = StateDeriver::default().derive("alice", &events, &window(), now());
        assert_eq!(state.late_by_minutes, 0);
    }

    #[test]
    fn late_arrival_counts_minutes_past_threshold() {
        let events = [event(1, ClockType::ClockIn, "2026-03-02T09:15:00Z")];
        let state = StateDeriver::default().derive("alice", &events, &window(), now());
        assert_eq!(state.late_by_minutes, 15);
    }

    #[test]
    fn threshold_follows_org_offset() {
        // 09:15 local at UTC+07:00 is 02:15Z.
        let offset = offset_from_minutes(420).unwrap();
        let w = DayWindow::containing("2026-03-02T05:00:00Z".parse().unwrap(), offset);
        let events = [event(1, ClockType::ClockIn, "2026-03-02T02:15:00Z")];
        let state = StateDeriver::default().derive("alice", &events, &w, now());
        assert_eq!(state.late_by_minutes, 15);
    }

    #[test]
    fn open_session_counts_work_until_now() {
        let events = [event(1, ClockType::ClockIn, "2026-03-02T08:00:00Z")];
        let state = StateDeriver::default().derive("alice", &events, &window(), now());
        assert_eq!(state.current_status, ClockStatus::ClockedIn);
        assert_eq!(state.last_out, None);
        assert_eq!(state.work_minutes, 240);
    }

    #[test]
    fn closed_session_counts_work_until_last_out() {
        let events = [
            event(1, ClockType::ClockIn, "2026-03-02T08:00:00Z"),
            event(2, ClockType::ClockOut, "2026-03-02T10:30:59Z"),
        ];
        let state = StateDeriver::default().derive("alice", &events, &window(), now());
        assert_eq!(state.current_status, ClockStatus::ClockedOut);
        assert_eq!(state.work_minutes, 150);
        assert_eq!(state.last_out, Some("2026-03-02T10:30:59Z".parse().unwrap()));
    }

    #[test]
    fn duplicate_clock_in_keeps_status_from_last_event() {
        let events = [
            event(1, ClockType::ClockIn, "2026-03-02T08:00:00Z"),
            event(2, ClockType::ClockOut, "2026-03-02T09:00:00Z"),
            event(3, ClockType::ClockIn, "2026-03-02T09:30:00Z"),
            event(4, ClockType::ClockIn, "2026-03-02T09:31:00Z"),
        ];
        let state = StateDeriver::default().derive("alice", &events, &window(), now());
        assert_eq!(state.current_status, ClockStatus::ClockedIn);
        assert_eq!(state.first_in, Some("2026-03-02T08:00:00Z".parse().unwrap()));
        assert_eq!(state.last_out, Some("2026-03-02T09:00:00Z".parse().unwrap()));
    }

    #[test]
    fn clock_out_before_first_in_is_not_last_out() {
        let events = [
            event(1, ClockType::ClockOut, "2026-03-02T07:00:00Z"),
            event(2, ClockType::ClockIn, "2026-03-02T08:00:00Z"),
        ];
        let state = StateDeriver::default().derive("alice", &events, &window(), now());
        assert_eq!(state.last_out, None);
        assert_eq!(state.current_status, ClockStatus::ClockedIn);
    }

    #[test]
    fn status_follows_log_order_not_timestamps() {
        // Written last, but carries an earlier timestamp than the clock-out.
        let events = [
            event(1, ClockType::ClockIn, "2026-03-02T08:00:00Z"),
            event(2, ClockType::ClockOut, "2026-03-02T10:00:00Z"),
            event(3, ClockType::ClockIn, "2026-03-02T10:00:00Z"),
        ];
        let state = StateDeriver::default().derive("alice", &events, &window(), now());
        assert_eq!(state.current_status, ClockStatus::ClockedIn);
    }

    #[test]
    fn events_outside_window_are_ignored() {
        let events = [
            event(1, ClockType::ClockIn, "2026-03-01T23:59:00Z"),
            event(2, ClockType::ClockOut, "2026-03-03T00:00:00Z"),
        ];
        let state = StateDeriver::default().derive("alice", &events, &window(), now());
        assert_eq!(state.first_in, None);
        assert_eq!(state.current_status, ClockStatus::ClockedOut);
    }

    #[test]
    fn derive_is_idempotent() {
        let mut with_photo = event(1, ClockType::ClockIn, "2026-03-02T09:05:00Z");
        with_photo.photo_ref = Some(ImageRef::new("selfie-1"));
        let events = [
            with_photo,
            event(2, ClockType::ClockOut, "2026-03-02T11:00:00Z"),
        ];
        let deriver = StateDeriver::default();
        let a = deriver.derive("alice", &events, &window(), now());
        let b = deriver.derive("alice", &events, &window(), now());
        assert_eq!(a, b);
        assert_eq!(a.captures.len(), 1);
        assert_eq!(a.first_in_site.as_deref(), Some("hq"));
    }
}
