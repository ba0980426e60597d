//! Org-wide views rolled up from per-actor day states.

use crate::config::Config;
use crate::derive::{ActorDailyState, BiometricCapture};
use crate::types::{Actor, ClockStatus, Site};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteHeadcount {
    pub site_id: String,
    pub name: String,
    pub count: usize,
}

/// Shown for actors missing from the roster or enrolled without a name.
pub const UNKNOWN_NAME: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LateArrival {
    pub actor_id: String,
    pub name: String,
    pub first_in: DateTime<Utc>,
    pub late_by_minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresentActor {
    pub actor_id: String,
    pub name: String,
    pub first_in: DateTime<Utc>,
}

/// A capture-feed entry with the actor's display name attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentCapture {
    #[serde(flatten)]
    pub capture: BiometricCapture,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgSummary {
    pub total_actors: usize,
    /// Actors with at least one clock-in today.
    pub present_today: usize,
    /// Actors whose last event today is a clock-in.
    pub clocked_in_now: usize,
    /// Percentage of `total_actors` present today, 0 when the roster is empty.
    pub attendance_rate: u32,
    pub staff_by_site: Vec<SiteHeadcount>,
    pub late_arrivals: Vec<LateArrival>,
    /// Most recent first, by log sequence.
    pub recent_biometric_captures: Vec<RecentCapture>,
    pub present_staff: Vec<PresentActor>,
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aggregator {
    capture_limit: usize,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self { capture_limit: 10 }
    }
}

impl Aggregator {
    pub fn new(capture_limit: usize) -> Self {
        Self { capture_limit }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.policy.capture_feed_limit)
    }

    /// Roll up one state per roster actor. Duplicate states for the same
    /// actor count once (the first one wins). `roster` only supplies
    /// display names.
    pub fn summarize(
        &self,
        states: &[ActorDailyState],
        sites: &[Site],
        roster: &[Actor],
    ) -> OrgSummary {
        let names: HashMap<&str, &str> = roster
            .iter()
            .filter(|a| !a.name.trim().is_empty())
            .map(|a| (a.id.as_str(), a.name.as_str()))
            .collect();
        let name_of = |actor_id: &str| -> String {
            names.get(actor_id).copied().unwrap_or(UNKNOWN_NAME).to_string()
        };

        let mut seen = HashSet::new();
        let actors: Vec<&ActorDailyState> = states
            .iter()
            .filter(|s| seen.insert(s.actor_id.as_str()))
            .collect();

        let total_actors = actors.len();
        let present: Vec<&ActorDailyState> =
            actors.iter().copied().filter(|s| s.first_in.is_some()).collect();
        let present_today = present.len();
        let clocked_in_now = actors
            .iter()
            .filter(|s| s.current_status == ClockStatus::ClockedIn)
            .count();

        let attendance_rate = if total_actors == 0 {
            0
        } else {
            (100.0 * present_today as f64 / total_actors as f64).round() as u32
        };

        let mut by_site: HashMap<&str, HashSet<&str>> = HashMap::new();
        for state in &present {
            if let Some(site_id) = state.first_in_site.as_deref() {
                by_site
                    .entry(site_id)
                    .or_default()
                    .insert(state.actor_id.as_str());
            }
        }
        let staff_by_site = sites
            .iter()
            .map(|site| SiteHeadcount {
                site_id: site.id.clone(),
                name: site.name.clone(),
                count: by_site.get(site.id.as_str()).map_or(0, HashSet::len),
            })
            .collect();

        let mut late_arrivals: Vec<LateArrival> = present
            .iter()
            .filter(|s| s.late_by_minutes > 0)
            .filter_map(|s| {
                s.first_in.map(|first_in| LateArrival {
                    actor_id: s.actor_id.clone(),
                    name: name_of(&s.actor_id),
                    first_in,
                    late_by_minutes: s.late_by_minutes,
                })
            })
            .collect();
        late_arrivals.sort_by(|a, b| {
            b.late_by_minutes
                .cmp(&a.late_by_minutes)
                .then_with(|| a.actor_id.cmp(&b.actor_id))
        });

        let mut captures: Vec<&BiometricCapture> =
            actors.iter().flat_map(|s| s.captures.iter()).collect();
        captures.sort_by(|a, b| b.seq.cmp(&a.seq));
        captures.truncate(self.capture_limit);
        let captures = captures
            .into_iter()
            .map(|c| RecentCapture {
                name: name_of(&c.actor_id),
                capture: c.clone(),
            })
            .collect();

        let mut present_staff: Vec<PresentActor> = present
            .iter()
            .filter_map(|s| {
                s.first_in.map(|first_in| PresentActor {
                    actor_id: s.actor_id.clone(),
                    name: name_of(&s.actor_id),
                    first_in,
                })
            })
            .collect();
        present_staff.sort_by(|a, b| {
            a.first_in
                .cmp(&b.first_in)
                .then_with(|| a.actor_id.cmp(&b.actor_id))
        });

        OrgSummary {
            total_actors,
            present_today,
            clocked_in_now,
            attendance_rate,
            staff_by_site,
            late_arrivals,
            recent_biometric_captures: captures,
            present_staff,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
