use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// ClockType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockType {
    ClockIn,
    ClockOut,
}

impl ClockType {
    /// The type a new event must take when `self` is the actor's last event.
    pub fn complement(self) -> ClockType {
        match self {
            ClockType::ClockIn => ClockType::ClockOut,
            ClockType::ClockOut => ClockType::ClockIn,
        }
    }

    /// Infer the next event type from the last event seen, if any.
    pub fn next_after(last: Option<ClockType>) -> ClockType {
        match last {
            Some(ClockType::ClockIn) => ClockType::ClockOut,
            Some(ClockType::ClockOut) | None => ClockType::ClockIn,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ClockType::ClockIn => "clock_in",
            ClockType::ClockOut => "clock_out",
        }
    }
}

impl fmt::Display for ClockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ClockStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockStatus {
    ClockedIn,
    ClockedOut,
}

impl ClockStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ClockStatus::ClockedIn => "clocked_in",
            ClockStatus::ClockedOut => "clocked_out",
        }
    }
}

impl From<ClockType> for ClockStatus {
    fn from(kind: ClockType) -> Self {
        match kind {
            ClockType::ClockIn => ClockStatus::ClockedIn,
            ClockType::ClockOut => ClockStatus::ClockedOut,
        }
    }
}

impl fmt::Display for ClockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Site
// ---------------------------------------------------------------------------

/// A registered work location. Sites are managed elsewhere and only read here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: u32,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Position / ImageRef
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    /// Reported horizontal accuracy in meters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy: None,
        }
    }
}

/// Opaque reference to a captured or enrolled image (URL, data URI, storage key).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(pub String);

impl ImageRef {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// ClockEvent
// ---------------------------------------------------------------------------

/// An admitted clock action as stored in the attendance log.
///
/// `id` and `seq` are assigned by the log on append. `seq` is the ordering
/// key; timestamps may tie or drift and are never used to reorder events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClockEvent {
    pub id: String,
    pub seq: u64,
    pub actor_id: String,
    pub site_id: String,
    #[serde(rename = "type")]
    pub kind: ClockType,
    pub timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub distance_meters: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_ref: Option<ImageRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// An event awaiting append. `expected_head` is the actor's last `seq` as
/// observed when the type was inferred; the store refuses the append if
/// the actor's log has moved on since.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDraft {
    pub actor_id: String,
    pub site_id: String,
    pub kind: ClockType,
    pub timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub distance_meters: u32,
    pub photo_ref: Option<ImageRef>,
    pub note: Option<String>,
    pub expected_head: Option<u64>,
}

impl EventDraft {
    pub fn into_event(self, id: String, seq: u64) -> ClockEvent {
        ClockEvent {
            id,
            seq,
            actor_id: self.actor_id,
            site_id: self.site_id,
            kind: self.kind,
            timestamp: self.timestamp,
            latitude: self.latitude,
            longitude: self.longitude,
            distance_meters: self.distance_meters,
            photo_ref: self.photo_ref,
            note: self.note,
        }
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

/// A roster entry. `reference_image` is the enrolled face used for matching;
/// `avatar` stands in for it when no face was enrolled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_image: Option<ImageRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<ImageRef>,
}

impl Actor {
    /// The image a selfie is matched against: the enrolled face, else the avatar.
    pub fn reference(&self) -> Option<&ImageRef> {
        self.reference_image.as_ref().or(self.avatar.as_ref())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
