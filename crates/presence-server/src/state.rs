use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use presence_core::aggregate::Aggregator;
use presence_core::biometric::{
    BiometricGate, VerificationError, VerificationReport, VerificationService,
};
use presence_core::config::Config;
use presence_core::coordinator::Coordinator;
use presence_core::derive::{ActorDailyState, StateDeriver};
use presence_core::directory::{Roster, StaticDirectory};
use presence_core::ledger::Ledger;
use presence_core::store::AttendanceStore;
use presence_core::types::{Actor, ClockEvent, ImageRef};
use presence_core::window::DayWindow;
use presence_core::{paths, PresenceError};

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Stands in when no verification service is configured; every call fails,
/// which the gate reports as "verification unavailable".
struct Unconfigured;

#[async_trait]
impl VerificationService for Unconfigured {
    async fn verify(
        &self,
        _image: &ImageRef,
        _reference: Option<&ImageRef>,
    ) -> Result<VerificationReport, VerificationError> {
        Err(VerificationError::Network(
            "no verification service configured".into(),
        ))
    }
}

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub directory: Arc<StaticDirectory>,
    pub store: Arc<dyn AttendanceStore>,
    pub coordinator: Coordinator,
    pub deriver: StateDeriver,
    pub aggregator: Aggregator,
    clock: Clock,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn AttendanceStore>,
        verifier: Arc<dyn VerificationService>,
    ) -> presence_core::Result<Self> {
        let directory = Arc::new(StaticDirectory::from_config(&config));
        let gate = BiometricGate::new(verifier, config.policy.biometric.clone());
        let coordinator = Coordinator::new(directory.clone(), store.clone(), gate, config.offset()?);
        Ok(Self {
            deriver: StateDeriver::from_config(&config)?,
            aggregator: Aggregator::from_config(&config),
            config: Arc::new(config),
            directory,
            store,
            coordinator,
            clock: Arc::new(Utc::now),
        })
    }

    /// Load `.presence/config.yaml`, open the ledger and connect the
    /// verification client.
    pub fn open(root: &Path) -> anyhow::Result<Self> {
        let config = Config::load(root)?;
        let ledger = Ledger::open(&paths::ledger_path(root))?;
        let verifier: Arc<dyn VerificationService> = match &config.verification {
            Some(v) => Arc::new(face_verify::VerifyClient::from_config(v)?),
            None => {
                tracing::warn!("no verification service configured; every clock attempt will fail verification");
                Arc::new(Unconfigured)
            }
        };
        Ok(Self::new(config, Arc::new(ledger), verifier)?)
    }

    /// Pin the wall clock, for the state and for the coordinator.
    pub fn with_clock(
        mut self,
        clock: impl Fn() -> DateTime<Utc> + Send + Sync + Clone + 'static,
    ) -> Self {
        self.coordinator = self.coordinator.with_clock(clock.clone());
        self.clock = Arc::new(clock);
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// The requested day, or today in the organization's offset.
    pub fn window(&self, date: Option<NaiveDate>) -> DayWindow {
        let offset = self.coordinator.offset();
        match date {
            Some(date) => DayWindow::new(date, offset),
            None => DayWindow::containing(self.now(), offset),
        }
    }

    pub fn actor(&self, actor_id: &str) -> Result<Actor, PresenceError> {
        self.directory
            .find(actor_id)
            .ok_or_else(|| PresenceError::ActorNotFound(actor_id.to_string()))
    }

    pub async fn day_events(
        &self,
        actor_id: &str,
        window: &DayWindow,
    ) -> Result<Vec<ClockEvent>, PresenceError> {
        Ok(self.store.list_day(actor_id, window).await?)
    }

    /// Derive one actor's day. Open sessions on past days are measured up to
    /// the end of that day.
    pub async fn daily_state(
        &self,
        actor_id: &str,
        window: &DayWindow,
    ) -> Result<ActorDailyState, PresenceError> {
        let events = self.day_events(actor_id, window).await?;
        let now = self.now().min(window.end());
        Ok(self.deriver.derive(actor_id, &events, window, now))
    }
}
