//! Clock action coordinator.
//!
//! One clock attempt walks a fixed pipeline of gates:
//!
//! ```text
//! Idle -> LocationPending -> LocationReady -> PhotoPending -> PhotoReady
//!      -> Verifying -> Admitted -> Committed
//! ```
//!
//! Any gate may end the attempt with `Rejected`. Each transition is pushed
//! onto a [`ClockStream`] as it happens. The attempt runs on its own task;
//! dropping the stream cancels it at the next suspension point, and the
//! commit step is skipped entirely once nobody is listening.
//!
//! At most one attempt per actor is in flight. The per-actor token is taken
//! synchronously inside [`Coordinator::request_clock`], so a second request
//! for the same actor sees `Busy` before any task is spawned.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

use crate::biometric::{BiometricDecision, BiometricGate};
use crate::directory::SiteDirectory;
use crate::geofence::{self, format_distance, GeoFenceOutcome};
use crate::store::{AttendanceStore, StoreError};
use crate::types::{ClockEvent, ClockType, EventDraft, ImageRef, Position};
use crate::window::DayWindow;

// ---------------------------------------------------------------------------
// Signal providers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PositionError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("position unavailable: {0}")]
    Unavailable(String),

    #[error("position request timed out")]
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("camera error: {0}")]
pub struct CaptureError(pub String);

#[async_trait]
pub trait PositionProvider: Send + Sync {
    async fn position(&self) -> Result<Position, PositionError>;
}

/// `Ok(None)` means the capture completed but produced no photo.
#[async_trait]
pub trait CaptureProvider: Send + Sync {
    async fn capture(&self) -> Result<Option<ImageRef>, CaptureError>;
}

/// A position acquired earlier, e.g. the one carried by an `OutOfRange`
/// rejection, replayed without asking the device again.
#[derive(Debug, Clone, Copy)]
pub struct RetainedPosition(pub Position);

#[async_trait]
impl PositionProvider for RetainedPosition {
    async fn position(&self) -> Result<Position, PositionError> {
        Ok(self.0)
    }
}

/// A photo the caller already holds.
#[derive(Debug, Clone)]
pub struct SuppliedImage(pub Option<ImageRef>);

#[async_trait]
impl CaptureProvider for SuppliedImage {
    async fn capture(&self) -> Result<Option<ImageRef>, CaptureError> {
        Ok(self.0.clone())
    }
}

// ---------------------------------------------------------------------------
// Phases and rejection reasons
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfraStage {
    Directory,
    Position,
    Capture,
    Store,
    Conflict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectCategory {
    /// Bad request, detected before any external call.
    Input,
    /// A gate ran and said no.
    Gate,
    /// A collaborator failed; the attempt can be retried as-is.
    Infrastructure,
    Busy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum RejectReason {
    NoSiteSelected,
    InvalidCoordinates {
        message: String,
    },
    UnknownSite {
        site_id: String,
    },
    OutOfRange {
        distance_meters: u32,
        radius_meters: u32,
        position: Position,
    },
    NoPhoto,
    VerificationFailed {
        decision: BiometricDecision,
    },
    Infrastructure {
        stage: InfraStage,
        message: String,
    },
    Busy,
}

impl RejectReason {
    pub fn category(&self) -> RejectCategory {
        match self {
            RejectReason::NoSiteSelected
            | RejectReason::InvalidCoordinates { .. }
            | RejectReason::UnknownSite { .. } => RejectCategory::Input,
            // The service never answered, so the caller may retry.
            RejectReason::VerificationFailed { decision } if decision.unavailable => {
                RejectCategory::Infrastructure
            }
            RejectReason::OutOfRange { .. }
            | RejectReason::NoPhoto
            | RejectReason::VerificationFailed { .. } => RejectCategory::Gate,
            RejectReason::Infrastructure { .. } => RejectCategory::Infrastructure,
            RejectReason::Busy => RejectCategory::Busy,
        }
    }

    fn infra(stage: InfraStage, e: impl fmt::Display) -> Self {
        RejectReason::Infrastructure {
            stage,
            message: e.to_string(),
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::NoSiteSelected => f.write_str("no site selected"),
            RejectReason::InvalidCoordinates { message } => {
                write!(f, "invalid coordinates: {message}")
            }
            RejectReason::UnknownSite { site_id } => write!(f, "unknown or inactive site '{site_id}'"),
            RejectReason::OutOfRange {
                distance_meters,
                radius_meters,
                ..
            } => write!(
                f,
                "outside site radius: {} away, allowed {}",
                format_distance(*distance_meters),
                format_distance(*radius_meters)
            ),
            RejectReason::NoPhoto => f.write_str("no photo captured"),
            RejectReason::VerificationFailed { decision } => {
                write!(f, "face verification failed: {}", decision.reason)
            }
            RejectReason::Infrastructure { stage, message } => {
                write!(f, "{stage:?} failure: {message}")
            }
            RejectReason::Busy => f.write_str("a clock attempt is already in progress"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum ClockPhase {
    Idle,
    LocationPending,
    LocationReady {
        position: Position,
        outcome: GeoFenceOutcome,
    },
    PhotoPending,
    PhotoReady,
    Verifying,
    Admitted {
        decision: BiometricDecision,
    },
    Committed {
        event: ClockEvent,
    },
    Rejected {
        reason: RejectReason,
    },
}

impl ClockPhase {
    pub fn name(&self) -> &'static str {
        match self {
            ClockPhase::Idle => "idle",
            ClockPhase::LocationPending => "location_pending",
            ClockPhase::LocationReady { .. } => "location_ready",
            ClockPhase::PhotoPending => "photo_pending",
            ClockPhase::PhotoReady => "photo_ready",
            ClockPhase::Verifying => "verifying",
            ClockPhase::Admitted { .. } => "admitted",
            ClockPhase::Committed { .. } => "committed",
            ClockPhase::Rejected { .. } => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ClockPhase::Committed { .. } | ClockPhase::Rejected { .. })
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ClockRequest {
    pub actor_id: String,
    pub site_id: Option<String>,
    pub note: Option<String>,
    /// The actor's enrolled face, if any.
    pub reference: Option<ImageRef>,
}

#[derive(Clone)]
pub struct ClockSignals {
    pub position: Arc<dyn PositionProvider>,
    pub camera: Arc<dyn CaptureProvider>,
    /// Overrides the gate's configured verification timeout.
    pub verify_timeout: Option<Duration>,
}

// ---------------------------------------------------------------------------
// ClockStream
// ---------------------------------------------------------------------------

/// Phases of one clock attempt, ending with `Committed` or `Rejected`.
/// Dropping the stream cancels the attempt.
pub struct ClockStream {
    rx: mpsc::Receiver<ClockPhase>,
}

impl ClockStream {
    /// Drain the stream and return its terminal phase.
    pub async fn final_phase(mut self) -> Option<ClockPhase> {
        let mut last = None;
        while let Some(phase) = self.rx.recv().await {
            last = Some(phase);
        }
        last
    }

    #[cfg(test)]
    pub(crate) fn from_channel(rx: mpsc::Receiver<ClockPhase>) -> Self {
        Self { rx }
    }
}

impl Stream for ClockStream {
    type Item = ClockPhase;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

// ---------------------------------------------------------------------------
// Flow token
// ---------------------------------------------------------------------------

type Inflight = Arc<Mutex<HashSet<String>>>;

/// Exclusive claim on an actor's clock flow, released on drop.
struct FlowToken {
    inflight: Inflight,
    actor_id: String,
}

impl FlowToken {
    fn acquire(inflight: &Inflight, actor_id: &str) -> Option<Self> {
        let mut held = inflight.lock().unwrap_or_else(|p| p.into_inner());
        if !held.insert(actor_id.to_string()) {
            return None;
        }
        Some(Self {
            inflight: inflight.clone(),
            actor_id: actor_id.to_string(),
        })
    }
}

impl Drop for FlowToken {
    fn drop(&mut self) {
        let mut held = self.inflight.lock().unwrap_or_else(|p| p.into_inner());
        held.remove(&self.actor_id);
    }
}

enum Halt {
    Rejected(RejectReason),
    Cancelled,
}

impl From<RejectReason> for Halt {
    fn from(reason: RejectReason) -> Self {
        Halt::Rejected(reason)
    }
}

/// Run `fut` unless the stream consumer goes away first.
async fn or_cancel<F: Future>(tx: &mpsc::Sender<ClockPhase>, fut: F) -> Result<F::Output, Halt> {
    tokio::select! {
        _ = tx.closed() => Err(Halt::Cancelled),
        out = fut => Ok(out),
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Clone)]
pub struct Coordinator {
    sites: Arc<dyn SiteDirectory>,
    store: Arc<dyn AttendanceStore>,
    gate: BiometricGate,
    offset: FixedOffset,
    inflight: Inflight,
    commits: broadcast::Sender<ClockEvent>,
    clock: Clock,
}

impl Coordinator {
    pub fn new(
        sites: Arc<dyn SiteDirectory>,
        store: Arc<dyn AttendanceStore>,
        gate: BiometricGate,
        offset: FixedOffset,
    ) -> Self {
        let (commits, _) = broadcast::channel(64);
        Self {
            sites,
            store,
            gate,
            offset,
            inflight: Arc::new(Mutex::new(HashSet::new())),
            commits,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the wall clock used for event timestamps and day windows.
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Every committed event, in commit order.
    pub fn subscribe(&self) -> broadcast::Receiver<ClockEvent> {
        self.commits.subscribe()
    }

    /// True while an attempt for `actor_id` holds the flow token.
    pub fn is_busy(&self, actor_id: &str) -> bool {
        let held = self.inflight.lock().unwrap_or_else(|p| p.into_inner());
        held.contains(actor_id)
    }

    /// Start one clock attempt. Must be called from within a tokio runtime.
    pub fn request_clock(&self, request: ClockRequest, signals: ClockSignals) -> ClockStream {
        let (tx, rx) = mpsc::channel(16);

        let Some(token) = FlowToken::acquire(&self.inflight, &request.actor_id) else {
            tracing::info!(actor = %request.actor_id, "clock attempt rejected: already in flight");
            let _ = tx.try_send(ClockPhase::Rejected {
                reason: RejectReason::Busy,
            });
            return ClockStream { rx };
        };

        let this = self.clone();
        tokio::spawn(async move {
            this.run(request, signals, token, tx).await;
        });
        ClockStream { rx }
    }

    async fn run(
        &self,
        request: ClockRequest,
        signals: ClockSignals,
        token: FlowToken,
        tx: mpsc::Sender<ClockPhase>,
    ) {
        let result = self.drive(&request, &signals, &tx).await;
        // The token is released before the terminal phase goes out, so a
        // caller that reacts to it can start the next attempt right away.
        drop(token);

        let actor = request.actor_id.as_str();
        match result {
            Ok(event) => {
                tracing::info!(actor, seq = event.seq, kind = %event.kind, site = %event.site_id, "clock committed");
                let _ = tx.send(ClockPhase::Committed { event }).await;
            }
            Err(Halt::Rejected(reason)) => {
                tracing::info!(actor, category = ?reason.category(), %reason, "clock rejected");
                let _ = tx.send(ClockPhase::Rejected { reason }).await;
            }
            Err(Halt::Cancelled) => {
                tracing::debug!(actor, "clock attempt cancelled");
            }
        }
    }

    async fn emit(
        &self,
        tx: &mpsc::Sender<ClockPhase>,
        actor: &str,
        phase: ClockPhase,
    ) -> Result<(), Halt> {
        tracing::debug!(actor, phase = phase.name(), "clock transition");
        tx.send(phase).await.map_err(|_| Halt::Cancelled)
    }

    async fn drive(
        &self,
        request: &ClockRequest,
        signals: &ClockSignals,
        tx: &mpsc::Sender<ClockPhase>,
    ) -> Result<ClockEvent, Halt> {
        let actor = request.actor_id.as_str();
        self.emit(tx, actor, ClockPhase::Idle).await?;

        // -- site selection -------------------------------------------------
        let site_id = request
            .site_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(RejectReason::NoSiteSelected)?;
        let sites = or_cancel(tx, self.sites.list_active_sites())
            .await?
            .map_err(|e| RejectReason::infra(InfraStage::Directory, e))?;
        let site = sites
            .into_iter()
            .find(|s| s.id == site_id)
            .ok_or_else(|| RejectReason::UnknownSite {
                site_id: site_id.to_string(),
            })?;
        tracing::debug!(actor, site = %site.id, "site selected");
        self.emit(tx, actor, ClockPhase::LocationPending).await?;

        // -- location gate --------------------------------------------------
        let position = or_cancel(tx, signals.position.position())
            .await?
            .map_err(|e| RejectReason::infra(InfraStage::Position, e))?;
        let outcome = geofence::evaluate(&position, &site).map_err(|e| {
            RejectReason::InvalidCoordinates {
                message: e.to_string(),
            }
        })?;
        if !outcome.within_radius {
            return Err(RejectReason::OutOfRange {
                distance_meters: outcome.distance_meters,
                radius_meters: outcome.radius_meters,
                position,
            }
            .into());
        }
        self.emit(tx, actor, ClockPhase::LocationReady { position, outcome })
            .await?;

        // -- photo gate -----------------------------------------------------
        self.emit(tx, actor, ClockPhase::PhotoPending).await?;
        let photo = or_cancel(tx, signals.camera.capture())
            .await?
            .map_err(|e| RejectReason::infra(InfraStage::Capture, e))?
            .ok_or(RejectReason::NoPhoto)?;
        self.emit(tx, actor, ClockPhase::PhotoReady).await?;

        // -- biometric gate -------------------------------------------------
        self.emit(tx, actor, ClockPhase::Verifying).await?;
        let timeout = signals
            .verify_timeout
            .unwrap_or_else(|| self.gate.default_timeout());
        let decision = or_cancel(
            tx,
            self.gate.check(&photo, request.reference.as_ref(), timeout),
        )
        .await?;
        if !decision.pass {
            return Err(RejectReason::VerificationFailed { decision }.into());
        }
        self.emit(tx, actor, ClockPhase::Admitted { decision }).await?;

        // -- commit ---------------------------------------------------------
        self.commit(request, &site.id, position, outcome, photo, tx)
            .await
    }

    /// Infer the event type from today's log and append it, guarded by the
    /// head observed before inference.
    async fn commit(
        &self,
        request: &ClockRequest,
        site_id: &str,
        position: Position,
        outcome: GeoFenceOutcome,
        photo: ImageRef,
        tx: &mpsc::Sender<ClockPhase>,
    ) -> Result<ClockEvent, Halt> {
        let actor = request.actor_id.as_str();
        let store_err = |e: StoreError| match e {
            StoreError::Conflict { .. } => RejectReason::infra(InfraStage::Conflict, e),
            StoreError::Unavailable(_) => RejectReason::infra(InfraStage::Store, e),
        };

        if tx.is_closed() {
            return Err(Halt::Cancelled);
        }
        let now = (self.clock)();
        let window = DayWindow::containing(now, self.offset);
        let head = self.store.head(actor).await.map_err(store_err)?;
        let today = self
            .store
            .list_day(actor, &window)
            .await
            .map_err(store_err)?;
        let kind = ClockType::next_after(today.last().map(|e| e.kind));
        tracing::debug!(actor, ?head, %kind, events_today = today.len(), "inferred clock type");

        if tx.is_closed() {
            return Err(Halt::Cancelled);
        }
        let draft = EventDraft {
            actor_id: actor.to_string(),
            site_id: site_id.to_string(),
            kind,
            timestamp: now,
            latitude: position.latitude,
            longitude: position.longitude,
            distance_meters: outcome.distance_meters,
            photo_ref: Some(photo),
            note: request.note.clone(),
            expected_head: head,
        };
        let event = self.store.append(draft).await.map_err(store_err)?;
        let _ = self.commits.send(event.clone());
        Ok(event)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biometric::tests::ScriptedService;
    use crate::config::BiometricPolicy;
    use crate::directory::StaticDirectory;
    use crate::store::MemoryStore;
    use crate::types::Site;
    use crate::window::offset_from_minutes;
    use futures::StreamExt;

    const HQ_LAT: f64 = -6.2;
    const HQ_LON: f64 = 106.8;

    struct NoFix;

    #[async_trait]
    impl PositionProvider for NoFix {
        async fn position(&self) -> Result<Position, PositionError> {
            Err(PositionError::PermissionDenied)
        }
    }

    fn hq() -> Site {
        Site {
            id: "hq".into(),
            name: "HQ".into(),
            address: None,
            latitude: HQ_LAT,
            longitude: HQ_LON,
            radius_meters: 200,
            active: true,
        }
    }

    fn coordinator(service: ScriptedService, store: Arc<MemoryStore>) -> Coordinator {
        let gate = BiometricGate::new(Arc::new(service), BiometricPolicy::default());
        Coordinator::new(
            Arc::new(StaticDirectory::new(vec![hq()], vec![])),
            store,
            gate,
            offset_from_minutes(0).unwrap(),
        )
        .with_clock(|| "2026-03-02T09:30:00Z".parse().unwrap())
    }

    fn request(site: Option<&str>) -> ClockRequest {
        ClockRequest {
            actor_id: "alice".into(),
            site_id: site.map(String::from),
            note: None,
            reference: Some(ImageRef::new("https://photos.example/alice.jpg")),
        }
    }

    fn signals_at(lat: f64, photo: Option<&str>) -> ClockSignals {
        ClockSignals {
            position: Arc::new(RetainedPosition(Position::new(lat, HQ_LON))),
            camera: Arc::new(SuppliedImage(photo.map(ImageRef::new))),
            verify_timeout: None,
        }
    }

    fn on_site() -> ClockSignals {
        signals_at(HQ_LAT + 0.0005, Some("selfie"))
    }

    fn rejection(phase: Option<ClockPhase>) -> RejectReason {
        match phase {
            Some(ClockPhase::Rejected { reason }) => reason,
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    fn committed(phase: Option<ClockPhase>) -> ClockEvent {
        match phase {
            Some(ClockPhase::Committed { event }) => event,
            other => panic!("expected commit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn happy_path_walks_every_phase() {
        let store = Arc::new(MemoryStore::new());
        let c = coordinator(ScriptedService::verdict(true, 91.0, true), store.clone());
        let phases: Vec<_> = c
            .request_clock(request(Some("hq")), on_site())
            .map(|p| p.name())
            .collect()
            .await;
        assert_eq!(
            phases,
            vec![
                "idle",
                "location_pending",
                "location_ready",
                "photo_pending",
                "photo_ready",
                "verifying",
                "admitted",
                "committed"
            ]
        );
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn first_commit_of_the_day_is_clock_in() {
        let store = Arc::new(MemoryStore::new());
        let c = coordinator(ScriptedService::verdict(true, 91.0, false), store);
        let event = committed(c.request_clock(request(Some("hq")), on_site()).final_phase().await);
        assert_eq!(event.kind, ClockType::ClockIn);
        assert_eq!(event.site_id, "hq");
        assert_eq!(event.photo_ref, Some(ImageRef::new("selfie")));
        assert!(event.distance_meters <= 200);
    }

    #[tokio::test]
    async fn out_of_range_never_reaches_admitted() {
        let store = Arc::new(MemoryStore::new());
        let service = Arc::new(ScriptedService::verdict(true, 99.0, true));
        let c = Coordinator::new(
            Arc::new(StaticDirectory::new(vec![hq()], vec![])),
            store.clone(),
            BiometricGate::new(service.clone(), BiometricPolicy::default()),
            offset_from_minutes(0).unwrap(),
        );
        let phases: Vec<ClockPhase> = c
            .request_clock(request(Some("hq")), signals_at(HQ_LAT + 0.0022483, Some("selfie")))
            .collect()
            .await;
        assert!(!phases.iter().any(|p| matches!(p, ClockPhase::Admitted { .. })));
        match rejection(phases.last().cloned()) {
            RejectReason::OutOfRange {
                distance_meters,
                radius_meters,
                position,
            } => {
                assert_eq!(distance_meters, 250);
                assert_eq!(radius_meters, 200);
                assert_eq!(position.longitude, HQ_LON);
            }
            other => panic!("unexpected reason {other:?}"),
        }
        assert_eq!(service.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn missing_site_is_input_error() {
        let c = coordinator(ScriptedService::verdict(true, 99.0, true), Arc::new(MemoryStore::new()));
        let reason = rejection(c.request_clock(request(None), on_site()).final_phase().await);
        assert_eq!(reason, RejectReason::NoSiteSelected);
        assert_eq!(reason.category(), RejectCategory::Input);

        let reason = rejection(c.request_clock(request(Some("depot")), on_site()).final_phase().await);
        assert!(matches!(reason, RejectReason::UnknownSite { .. }));
    }

    #[tokio::test]
    async fn missing_photo_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let c = coordinator(ScriptedService::verdict(true, 99.0, true), store.clone());
        let reason = rejection(
            c.request_clock(request(Some("hq")), signals_at(HQ_LAT, None))
                .final_phase()
                .await,
        );
        assert_eq!(reason, RejectReason::NoPhoto);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn position_failure_is_infrastructure() {
        let c = coordinator(ScriptedService::verdict(true, 99.0, true), Arc::new(MemoryStore::new()));
        let signals = ClockSignals {
            position: Arc::new(NoFix),
            ..on_site()
        };
        let reason = rejection(c.request_clock(request(Some("hq")), signals).final_phase().await);
        assert_eq!(reason.category(), RejectCategory::Infrastructure);
    }

    #[tokio::test]
    async fn low_score_fails_verification() {
        let store = Arc::new(MemoryStore::new());
        let c = coordinator(ScriptedService::verdict(true, 40.0, false), store.clone());
        let reason = rejection(c.request_clock(request(Some("hq")), on_site()).final_phase().await);
        assert_eq!(reason.category(), RejectCategory::Gate);
        match reason {
            RejectReason::VerificationFailed { decision } => {
                assert_eq!(decision.match_score, 40);
                assert!(!decision.unavailable);
            }
            other => panic!("unexpected reason {other:?}"),
        }
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn verification_timeout_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let c = coordinator(ScriptedService::slow(Duration::from_millis(500)), store.clone());
        let signals = ClockSignals {
            verify_timeout: Some(Duration::from_millis(20)),
            ..on_site()
        };
        let reason = rejection(c.request_clock(request(Some("hq")), signals).final_phase().await);
        assert_eq!(reason.category(), RejectCategory::Infrastructure);
        match reason {
            RejectReason::VerificationFailed { decision } => assert!(decision.unavailable),
            other => panic!("unexpected reason {other:?}"),
        }
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn duplicate_clock_in_infers_clock_out() {
        use crate::derive::tests::event;
        let store = Arc::new(MemoryStore::with_events([
            event(1, ClockType::ClockIn, "2026-03-02T08:00:00Z"),
            event(2, ClockType::ClockIn, "2026-03-02T08:05:00Z"),
        ]));
        let c = coordinator(ScriptedService::verdict(true, 99.0, true), store.clone());
        let event = committed(c.request_clock(request(Some("hq")), on_site()).final_phase().await);
        assert_eq!(event.kind, ClockType::ClockOut);
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn yesterdays_clock_in_does_not_carry_over() {
        use crate::derive::tests::event;
        let store = Arc::new(MemoryStore::with_events([event(
            1,
            ClockType::ClockIn,
            "2026-03-01T08:00:00Z",
        )]));
        let c = coordinator(ScriptedService::verdict(true, 99.0, true), store);
        let event = committed(c.request_clock(request(Some("hq")), on_site()).final_phase().await);
        assert_eq!(event.kind, ClockType::ClockIn);
    }

    #[tokio::test]
    async fn concurrent_requests_yield_one_commit_and_one_busy() {
        let store = Arc::new(MemoryStore::new());
        let c = coordinator(ScriptedService::slow(Duration::from_millis(100)), store.clone());
        let first = c.request_clock(request(Some("hq")), on_site());
        let second = c.request_clock(request(Some("hq")), on_site());

        let (a, b) = tokio::join!(first.final_phase(), second.final_phase());
        committed(a);
        assert_eq!(rejection(b), RejectReason::Busy);
        assert_eq!(store.len(), 1);
        assert!(!c.is_busy("alice"));
    }

    #[tokio::test]
    async fn other_actors_are_not_blocked() {
        let store = Arc::new(MemoryStore::new());
        let c = coordinator(ScriptedService::slow(Duration::from_millis(50)), store.clone());
        let alice = c.request_clock(request(Some("hq")), on_site());
        let bob = c.request_clock(
            ClockRequest {
                actor_id: "bob".into(),
                ..request(Some("hq"))
            },
            on_site(),
        );
        let (a, b) = tokio::join!(alice.final_phase(), bob.final_phase());
        committed(a);
        committed(b);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn dropping_the_stream_cancels_without_writing() {
        let store = Arc::new(MemoryStore::new());
        let c = coordinator(ScriptedService::slow(Duration::from_millis(200)), store.clone());
        let mut stream = c.request_clock(request(Some("hq")), on_site());
        while let Some(phase) = stream.next().await {
            if phase == ClockPhase::Verifying {
                break;
            }
        }
        drop(stream);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(store.is_empty());
        assert!(!c.is_busy("alice"));
    }

    /// Lets another writer append for the same actor right after the day is
    /// listed, so the head observed before inference is stale at append time.
    struct InterleavedStore {
        inner: MemoryStore,
    }

    #[async_trait]
    impl AttendanceStore for InterleavedStore {
        async fn append(&self, draft: EventDraft) -> Result<ClockEvent, StoreError> {
            self.inner.append(draft).await
        }

        async fn list_day(
            &self,
            actor_id: &str,
            window: &DayWindow,
        ) -> Result<Vec<ClockEvent>, StoreError> {
            let events = self.inner.list_day(actor_id, window).await?;
            let head = self.inner.head(actor_id).await?;
            self.inner
                .append(crate::store::tests::draft(
                    actor_id,
                    ClockType::ClockIn,
                    "2026-03-02T09:29:00Z",
                    head,
                ))
                .await?;
            Ok(events)
        }

        async fn head(&self, actor_id: &str) -> Result<Option<u64>, StoreError> {
            self.inner.head(actor_id).await
        }
    }

    #[tokio::test]
    async fn moved_head_is_a_conflict_and_writes_nothing() {
        let store = Arc::new(InterleavedStore {
            inner: MemoryStore::new(),
        });
        let gate = BiometricGate::new(
            Arc::new(ScriptedService::verdict(true, 99.0, true)),
            BiometricPolicy::default(),
        );
        let c = Coordinator::new(
            Arc::new(StaticDirectory::new(vec![hq()], vec![])),
            store.clone(),
            gate,
            offset_from_minutes(0).unwrap(),
        )
        .with_clock(|| "2026-03-02T09:30:00Z".parse().unwrap());
        let mut updates = c.subscribe();

        let reason = rejection(c.request_clock(request(Some("hq")), on_site()).final_phase().await);
        assert_eq!(reason.category(), RejectCategory::Infrastructure);
        match reason {
            RejectReason::Infrastructure { stage, message } => {
                assert_eq!(stage, InfraStage::Conflict);
                assert!(message.contains("append conflict"));
            }
            other => panic!("unexpected reason {other:?}"),
        }
        // Only the other writer's event landed, and nothing was broadcast.
        assert_eq!(store.inner.len(), 1);
        assert!(updates.try_recv().is_err());
        assert!(!c.is_busy("alice"));
    }

    #[tokio::test]
    async fn commits_are_broadcast() {
        let store = Arc::new(MemoryStore::new());
        let c = coordinator(ScriptedService::verdict(true, 99.0, true), store);
        let mut updates = c.subscribe();
        let event = committed(c.request_clock(request(Some("hq")), on_site()).final_phase().await);
        assert_eq!(updates.recv().await.unwrap().id, event.id);
    }

    #[tokio::test]
    async fn stream_wraps_raw_channel() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(ClockPhase::Idle).await.unwrap();
        tx.send(ClockPhase::Rejected {
            reason: RejectReason::NoPhoto,
        })
        .await
        .unwrap();
        drop(tx);
        let last = ClockStream::from_channel(rx).final_phase().await.unwrap();
        assert!(last.is_terminal());
    }

    #[test]
    fn phases_serialize_with_tag() {
        let json = serde_json::to_value(ClockPhase::Rejected {
            reason: RejectReason::OutOfRange {
                distance_meters: 250,
                radius_meters: 200,
                position: Position::new(1.0, 2.0),
            },
        })
        .unwrap();
        assert_eq!(json["phase"], "rejected");
        assert_eq!(json["reason"]["code"], "out_of_range");
        assert_eq!(json["reason"]["distance_meters"], 250);
    }

    #[test]
    fn out_of_range_message_formats_distance() {
        let reason = RejectReason::OutOfRange {
            distance_meters: 1250,
            radius_meters: 200,
            position: Position::new(0.0, 0.0),
        };
        assert_eq!(
            reason.to_string(),
            "outside site radius: 1.25 km away, allowed 200 m"
        );
    }
}
