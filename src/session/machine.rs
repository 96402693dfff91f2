//! The tracker: session context, state machine and action dispatch.
//!
//! One `Tracker` is built at startup and shared (`Arc`) by the
//! acquisition loop, the per-category consumer loops and the background
//! schedules. Session state sits behind a single mutex that is never held
//! across an `.await`; file work runs on the blocking pool.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use super::conditions::{AutoSetCommand, ConditionKind, TrackingCondition};
use super::{Flight, LatestSnapshots, TrackingSession};
use crate::announce::Announcer;
use crate::config::TrackerConfig;
use crate::error::{TrackerError, TrackerResult};
use crate::event_log::{EventLog, MarkerUpdate, PositionMarker, TrackingEventLogEntry, TrackingEventMarker};
use crate::freshness::FreshnessTable;
use crate::persistence::artifact::{SaveArtifact, SaveStore, SessionProgress};
use crate::processors::integrity::IntegrityProcessor;
use crate::processors::landing::{LandingProcessor, LandingReport};
use crate::processors::primary::PrimaryProcessor;
use crate::processors::secondary::SecondaryProcessor;
use crate::processors::windows::VerticalProfile;
use crate::processors::{AbortReason, Action, EventColor, TrackingContext};
use crate::service::{FinalReport, FlightService, PositionReport};
use crate::source::TelemetrySource;
use crate::types::{Category, ChangeEvent, CrashSequence, Snapshot, TrackingStatus};

const OUTBOUND_CAPACITY: usize = 256;
const SIM_TEXT_SECS: u32 = 10;
const GROUND_HANDLING_POLL: Duration = Duration::from_secs(1);
const TOUCHDOWN_SOUND: &str = "touchdown";
const ABORT_SOUND: &str = "abort";

/// Notifications for whatever front end is attached
#[derive(Clone, Debug)]
pub enum TrackerEvent {
    StatusChanged { old: TrackingStatus, new: TrackingStatus },
    TrackingEvent(TrackingEventLogEntry),
    MarkerAdded(TrackingEventMarker),
    MarkerUpdated(TrackingEventMarker),
    PositionMarker(PositionMarker),
    Landing(LandingReport),
    ConditionsUpdated(Vec<TrackingCondition>),
    ConnectionChanged(bool),
    Aborted { flight_id: String, reason: AbortReason },
    FlightCompleted { flight_id: String },
    Toast(String),
}

#[derive(Debug, Default)]
struct SessionState {
    status: TrackingStatus,
    flight: Option<Flight>,
    session: Option<TrackingSession>,
    resume_snapshot: Option<SaveArtifact>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct Tracker {
    config: TrackerConfig,
    source: Arc<dyn TelemetrySource>,
    service: Arc<dyn FlightService>,
    announcer: Arc<dyn Announcer>,
    store: Arc<SaveStore>,
    state: Mutex<SessionState>,
    latest: Mutex<LatestSnapshots>,
    events: EventLog,
    freshness: FreshnessTable,
    outbound: broadcast::Sender<TrackerEvent>,
    primary: Mutex<PrimaryProcessor>,
    secondary: Mutex<SecondaryProcessor>,
    landing: Mutex<LandingProcessor>,
    integrity: Mutex<IntegrityProcessor>,
    /// Bumped whenever the session is replaced, paused or ended so that a
    /// queued auto-save of the old session is dropped
    epoch: Arc<AtomicU64>,
    connected: AtomicBool,
    closing: Arc<AtomicBool>,
}

impl Tracker {
    pub fn new(
        config: TrackerConfig,
        source: Arc<dyn TelemetrySource>,
        service: Arc<dyn FlightService>,
        announcer: Arc<dyn Announcer>,
    ) -> Arc<Self> {
        let store = SaveStore::new(
            config.save_dir.clone(),
            config.save_lock_wait(),
            config.autosave_lock_wait(),
        );
        let (outbound, _) = broadcast::channel(OUTBOUND_CAPACITY);
        Arc::new(Tracker {
            store: Arc::new(store),
            state: Mutex::new(SessionState::default()),
            latest: Mutex::new(LatestSnapshots::default()),
            events: EventLog::new(config.event_coalesce_distance_m),
            freshness: FreshnessTable::new(&config),
            outbound,
            primary: Mutex::new(PrimaryProcessor::new(&config)),
            secondary: Mutex::new(SecondaryProcessor::new(&config)),
            landing: Mutex::new(LandingProcessor),
            integrity: Mutex::new(IntegrityProcessor::new(&config)),
            epoch: Arc::new(AtomicU64::new(0)),
            connected: AtomicBool::new(false),
            closing: Arc::new(AtomicBool::new(false)),
            config,
            source,
            service,
            announcer,
        })
    }

    // ── Accessors ──

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn source(&self) -> &Arc<dyn TelemetrySource> {
        &self.source
    }

    pub fn store(&self) -> &SaveStore {
        &self.store
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn freshness(&self) -> &FreshnessTable {
        &self.freshness
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.outbound.subscribe()
    }

    pub fn status(&self) -> TrackingStatus {
        lock(&self.state).status
    }

    pub fn flight(&self) -> Option<Flight> {
        lock(&self.state).flight.clone()
    }

    pub fn has_flight(&self) -> bool {
        lock(&self.state).flight.is_some()
    }

    pub fn conditions(&self) -> Vec<TrackingCondition> {
        lock(&self.state)
            .session
            .as_ref()
            .map(|s| s.conditions.all())
            .unwrap_or_default()
    }

    pub fn landings(&self) -> Vec<LandingReport> {
        lock(&self.state)
            .session
            .as_ref()
            .map(|s| s.landings.clone())
            .unwrap_or_default()
    }

    pub fn resume_snapshot(&self) -> Option<SaveArtifact> {
        lock(&self.state).resume_snapshot.clone()
    }

    pub fn latest(&self) -> LatestSnapshots {
        lock(&self.latest).clone()
    }

    /// Climb/descent trend over the recent primary samples
    pub fn vertical_profile(&self) -> VerticalProfile {
        lock(&self.primary).vertical_profile()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn set_connected(&self, connected: bool) {
        if self.connected.swap(connected, Ordering::SeqCst) != connected {
            self.publish(TrackerEvent::ConnectionChanged(connected));
        }
    }

    pub fn closing_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closing)
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    /// Ask every loop to finish its current iteration and exit
    pub fn shutdown(&self) {
        self.closing.store(true, Ordering::SeqCst);
    }

    pub fn set_condition_enabled(&self, kind: ConditionKind, enabled: bool) {
        if let Some(session) = lock(&self.state).session.as_mut() {
            session.conditions.set_enabled(kind, enabled);
        }
    }

    pub fn set_condition_auto_set(&self, kind: ConditionKind, auto_set: bool) {
        if let Some(session) = lock(&self.state).session.as_mut() {
            session.conditions.set_auto_set(kind, auto_set);
        }
    }

    fn publish(&self, event: TrackerEvent) {
        // no subscribers is fine
        let _ = self.outbound.send(event);
    }

    fn transition(&self, state: &mut SessionState, new: TrackingStatus) {
        let old = state.status;
        if old == new {
            return;
        }
        state.status = new;
        log::info!("Tracking status: {} -> {}", old, new);
        self.publish(TrackerEvent::StatusChanged { old, new });
    }

    fn flight_id(&self) -> Option<String> {
        lock(&self.state).flight.as_ref().map(|f| f.id.clone())
    }

    fn reset_processors(&self) {
        lock(&self.primary).reset_session();
        *lock(&self.secondary) = SecondaryProcessor::new(&self.config);
        *lock(&self.integrity) = IntegrityProcessor::new(&self.config);
    }

    async fn with_store<R, F>(&self, op: F) -> TrackerResult<R>
    where
        F: FnOnce(&SaveStore) -> TrackerResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| TrackerError::Storage(format!("save task failed: {}", e)))?
    }

    // ── Telemetry ──

    /// Cache a freshly mapped snapshot and pair it with the one it replaces
    pub fn record_sample(&self, snapshot: Snapshot, at: DateTime<Utc>) -> ChangeEvent<Snapshot> {
        let category = snapshot.category();
        let (previous, previous_at) = lock(&self.latest).replace(snapshot.clone(), at);
        let old = previous.unwrap_or_else(|| Snapshot::sentinel(category));
        ChangeEvent::new(old, snapshot, previous_at, at)
    }

    /// Session facts handed to the processors
    pub fn context(&self) -> TrackingContext {
        let now = Utc::now();
        let (status, was_airborne, ground_handling_complete, landing_count) = {
            let mut state = lock(&self.state);
            let status = state.status;
            match state.session.as_mut() {
                Some(session) => (
                    status,
                    session.was_airborne,
                    session.ground_handling.is_complete(now),
                    session.landings.len(),
                ),
                None => (status, false, false, 0),
            }
        };
        let (primary, engine_type) = {
            let latest = lock(&self.latest);
            (
                latest.primary.clone(),
                latest.identity.as_ref().map(|i| i.engine_type).unwrap_or_default(),
            )
        };
        let taxi_in_turned_off = lock(&self.primary).taxi_in_state();
        TrackingContext {
            status,
            engine_type,
            was_airborne,
            ground_handling_complete,
            landing_count,
            primary,
            taxi_in_turned_off,
        }
    }

    /// Run one change through its processor and apply the outcome
    pub async fn handle_change(&self, change: ChangeEvent<Snapshot>) -> TrackerResult<()> {
        let ChangeEvent { old, new, previous_at, received_at } = change;
        let category = new.category();
        let ctx = self.context();

        let actions = match (old, new) {
            (Snapshot::Primary(old), Snapshot::Primary(new)) => {
                let change = ChangeEvent::new(old, new, previous_at, received_at);
                let actions = lock(&self.primary).process(&change, &ctx);
                actions
            }
            (Snapshot::Secondary(old), Snapshot::Secondary(new)) => {
                let change = ChangeEvent::new(old, new, previous_at, received_at);
                let actions = lock(&self.secondary).process(&change, &ctx);
                actions
            }
            (Snapshot::Fuel(old), Snapshot::Fuel(new)) => {
                let change = ChangeEvent::new(old, new, previous_at, received_at);
                let actions = lock(&self.integrity).process_fuel(&change, &ctx);
                actions
            }
            (Snapshot::Payload(old), Snapshot::Payload(new)) => {
                let change = ChangeEvent::new(old, new, previous_at, received_at);
                let actions = lock(&self.integrity).process_payload(&change, &ctx);
                actions
            }
            (Snapshot::Identity(old), Snapshot::Identity(new)) => {
                let change = ChangeEvent::new(old, new, previous_at, received_at);
                let actions = lock(&self.integrity).process_identity(&change, &ctx);
                actions
            }
            (Snapshot::WeightAndBalance(old), Snapshot::WeightAndBalance(new)) => {
                let change = ChangeEvent::new(old, new, previous_at, received_at);
                let actions = lock(&self.integrity).process_weight_and_balance(&change, &ctx);
                actions
            }
            (Snapshot::LandingAnalysis(old), Snapshot::LandingAnalysis(new)) => {
                let change = ChangeEvent::new(old, new, previous_at, received_at);
                let actions = lock(&self.landing).process(&change, &ctx);
                actions
            }
            (old, new) => {
                return Err(TrackerError::Mapping(format!(
                    "{} change paired with a {} snapshot",
                    new.category().name(),
                    old.category().name()
                )))
            }
        };

        self.apply_actions(actions).await;

        if category == Category::Secondary && self.status().is_preparing() {
            self.monitor_tracking_start_conditions();
        }
        Ok(())
    }

    async fn apply_actions(&self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Event { color, text } => self.add_tracking_event(color, &text),
                Action::Announce(text) => self.announce(&text),
                Action::Abort(reason) => {
                    self.abort(reason).await;
                    return;
                }
                Action::HaltWithoutFinish => {
                    self.halt_without_finish();
                    return;
                }
                Action::Finalize => {
                    if let Err(e) = self.finish_up_flight_tracking().await {
                        log::error!("Finalizing failed: {}", e);
                        self.publish(TrackerEvent::Toast(format!("Could not complete the flight: {}", e)));
                    }
                    return;
                }
                Action::MarkAirborne => {
                    if let Some(session) = lock(&self.state).session.as_mut() {
                        if !session.was_airborne {
                            log::info!("Flight {} is airborne", session.flight_id);
                            session.was_airborne = true;
                        }
                    }
                }
                Action::Landing(report) => {
                    if let Some(session) = lock(&self.state).session.as_mut() {
                        session.landings.push(report.clone());
                    }
                    self.announcer.play_sound(TOUCHDOWN_SOUND);
                    self.publish(TrackerEvent::Landing(report));
                }
                Action::SetLandingFastRate(fast) => {
                    let interval = if fast {
                        Duration::from_millis(self.config.landing_fast_interval_ms)
                    } else {
                        self.config.interval(Category::LandingAnalysis)
                    };
                    if self.freshness.set_interval(Category::LandingAnalysis, interval) {
                        log::debug!("Landing analysis every {:?}", interval);
                    }
                }
                Action::TimeSaved { secs } => {
                    if let Some(session) = lock(&self.state).session.as_mut() {
                        session.time_saved_secs += secs;
                    }
                }
                Action::PositionSample { turning } => self.record_position(turning),
            }
        }
    }

    fn record_position(&self, turning: bool) {
        let (primary, engine_type) = {
            let latest = lock(&self.latest);
            (
                latest.primary.clone(),
                latest.identity.as_ref().map(|i| i.engine_type).unwrap_or_default(),
            )
        };
        if let Some(primary) = primary {
            if let Some(marker) = self.events.add_position_report(Utc::now(), &primary, turning, engine_type) {
                self.publish(TrackerEvent::PositionMarker(marker));
            }
        }
    }

    /// Log an event at the current position; ignored unless a session is
    /// in GroundOperations or Tracking
    pub fn add_tracking_event(&self, color: EventColor, text: &str) {
        if !self.status().is_active() {
            log::debug!("Not tracking, event dropped: {}", text);
            return;
        }
        self.record_event(color, text);
    }

    fn record_event(&self, color: EventColor, text: &str) {
        let (position, altitude_ft) = lock(&self.latest)
            .primary
            .as_ref()
            .map(|p| (p.position(), p.altitude_ft))
            .unwrap_or_default();
        log::info!("[{:?}] {}", color, text);

        match self.events.add_event(Utc::now(), color, text, position, altitude_ft) {
            MarkerUpdate::Created(marker) => {
                if let Some(entry) = marker.events.last() {
                    self.publish(TrackerEvent::TrackingEvent(entry.clone()));
                }
                self.publish(TrackerEvent::MarkerAdded(marker));
            }
            MarkerUpdate::Appended(marker) => {
                if let Some(entry) = marker.events.last() {
                    self.publish(TrackerEvent::TrackingEvent(entry.clone()));
                }
                self.publish(TrackerEvent::MarkerUpdated(marker));
            }
        }
    }

    /// Speech plus in-sim banner
    fn announce(&self, text: &str) {
        self.announcer.speak_async(text);
        if self.source.is_connected() {
            if let Err(e) = self.source.set_text(text, SIM_TEXT_SECS) {
                log::debug!("Sim text not shown: {}", e);
            }
        }
    }

    // ── Conditions ──

    /// Re-evaluate the start conditions and push auto-set values; does
    /// nothing outside Preparing/Resuming
    pub fn monitor_tracking_start_conditions(&self) {
        let now = Utc::now();
        let latest = self.latest();
        let live = latest.live_values(now);
        let connected = self.source.is_connected();

        let (updated, auto_sets) = {
            let mut guard = lock(&self.state);
            let state = &mut *guard;
            if !state.status.is_preparing() {
                return;
            }
            let Some(session) = state.session.as_mut() else {
                return;
            };
            let changed = session.conditions.evaluate(&live);
            let mut auto_sets = Vec::new();
            if connected {
                for kind in ConditionKind::ALL {
                    if session.auto_set_attempted.contains(&kind) {
                        continue;
                    }
                    let commands = session.conditions.auto_set_commands(kind, &live);
                    if !commands.is_empty() {
                        session.auto_set_attempted.insert(kind);
                        auto_sets.push((kind, commands));
                    }
                }
            }
            (changed.then(|| session.conditions.all()), auto_sets)
        };

        if let Some(conditions) = updated {
            self.publish(TrackerEvent::ConditionsUpdated(conditions));
        }
        for (kind, commands) in auto_sets {
            self.auto_set(kind, commands);
        }
    }

    fn auto_set(&self, kind: ConditionKind, commands: Vec<AutoSetCommand>) {
        log::info!("Auto-setting {}", kind.label());
        for command in &commands {
            let result = match command {
                AutoSetCommand::Event(event, value) => self.source.transmit_event(*event, *value),
                AutoSetCommand::Write(sample) => self.source.set_sample(sample),
            };
            if let Err(e) = result {
                log::warn!("Auto-set of {} failed: {}", kind.label(), e);
                return;
            }
        }
        self.publish(TrackerEvent::Toast(format!("{} set for the flight", kind.label())));
    }

    // ── Transitions ──

    /// Bind a flight; a resumable flight is restored from its save (after
    /// checking the service for a newer copy)
    pub async fn bind_flight(&self, flight: Flight) -> TrackerResult<()> {
        let resuming = flight.resumable;
        {
            let mut guard = lock(&self.state);
            let state = &mut *guard;
            if state.status.is_active() {
                return Err(TrackerError::FlightAlreadyBound);
            }
            if state.status == TrackingStatus::Finished {
                return Err(TrackerError::InvalidState("a flight is being completed".to_string()));
            }
            let other_flight = state.flight.as_ref().map(|f| f.id != flight.id).unwrap_or(true);
            if other_flight {
                self.events.clear();
            }
            state.flight = Some(flight.clone());
            state.session = None;
            state.resume_snapshot = None;
            let status = if resuming { TrackingStatus::Resuming } else { TrackingStatus::Preparing };
            self.transition(state, status);
            self.epoch.fetch_add(1, Ordering::SeqCst);
        }
        self.reset_processors();

        let (session, snapshot) = if resuming {
            match self.load_resume_artifact(&flight.id).await {
                Ok(Some(artifact)) => {
                    log::info!("Resuming flight {} from save of {}", flight.id, artifact.saved_at);
                    (TrackingSession::resuming(&flight, &artifact, &self.config), Some(artifact))
                }
                Ok(None) => {
                    log::warn!("No save found for flight {}, starting it fresh", flight.id);
                    (TrackingSession::fresh(&flight, &self.config), None)
                }
                Err(e) => {
                    let mut guard = lock(&self.state);
                    guard.flight = None;
                    self.transition(&mut guard, TrackingStatus::NotTracking);
                    return Err(e);
                }
            }
        } else {
            (TrackingSession::fresh(&flight, &self.config), None)
        };

        {
            let mut guard = lock(&self.state);
            let state = &mut *guard;
            let still_bound = state.flight.as_ref().map(|f| f.id == flight.id).unwrap_or(false);
            if !still_bound || !state.status.is_preparing() {
                return Err(TrackerError::InvalidState("flight binding was replaced".to_string()));
            }
            if snapshot.is_none() {
                self.transition(state, TrackingStatus::Preparing);
            }
            state.session = Some(session);
            state.resume_snapshot = snapshot;
        }
        log::info!(
            "Bound flight {} ({} -> {})",
            flight.id,
            flight.origin_icao,
            flight.destination_icao
        );
        self.monitor_tracking_start_conditions();
        Ok(())
    }

    async fn load_resume_artifact(&self, flight_id: &str) -> TrackerResult<Option<SaveArtifact>> {
        match self.service.download_auto_save(flight_id).await {
            Ok(Some(remote)) => {
                let id = flight_id.to_string();
                match self.with_store(move |store| store.restore_if_newer(&id, &remote)).await {
                    Ok(true) => log::info!("Restored newer cloud save for flight {}", flight_id),
                    Ok(false) => {}
                    Err(e) => log::warn!("Cloud save for {} not restored: {}", flight_id, e),
                }
            }
            Ok(None) => {}
            Err(e) => log::warn!("Cloud save check for {} failed: {}", flight_id, e),
        }
        let id = flight_id.to_string();
        self.with_store(move |store| store.load(&id)).await
    }

    /// Begin tracking once every enabled condition holds
    pub fn start_tracking(&self) -> TrackerResult<()> {
        let now = Utc::now();
        let latest = self.latest();
        let engines_running = latest.secondary.as_ref().map(|s| s.engines_running).unwrap_or(false);

        let (flight_id, resumed, status) = {
            let mut guard = lock(&self.state);
            let state = &mut *guard;
            let prior = state.status;
            if !prior.is_preparing() {
                return Err(TrackerError::InvalidState(format!("cannot start tracking while {}", prior)));
            }
            let flight_id = state.flight.as_ref().map(|f| f.id.clone()).ok_or(TrackerError::NoFlightBound)?;
            let session = state.session.as_mut().ok_or(TrackerError::NoFlightBound)?;

            session.conditions.evaluate(&latest.live_values(now));
            let unmet = session.conditions.unmet_enabled();
            if !unmet.is_empty() {
                return Err(TrackerError::ConditionsNotMet(unmet));
            }

            let status = if session.ground_handling.is_complete(now) {
                session.tracking_started_at.get_or_insert(now);
                TrackingStatus::Tracking
            } else {
                if engines_running {
                    return Err(TrackerError::EnginesRunning);
                }
                session.ground_handling.start(now);
                TrackingStatus::GroundOperations
            };
            if let Some(saved_at) = session.resumed_from.take() {
                session.paused_secs += (now - saved_at).num_milliseconds().max(0) as f64 / 1000.0;
            }
            state.resume_snapshot = None;
            self.transition(state, status);
            (flight_id, prior == TrackingStatus::Resuming, status)
        };

        let text = match (status, resumed) {
            (TrackingStatus::GroundOperations, _) => "Ground handling started",
            (_, true) => "Flight tracking resumed",
            _ => "Flight tracking started",
        };
        log::info!("{} for flight {}", text, flight_id);
        self.add_tracking_event(EventColor::Blue, text);
        self.announce(text);
        Ok(())
    }

    /// GroundOperations -> Tracking once the loading estimate has elapsed
    pub fn poll_ground_handling(&self) {
        let now = Utc::now();
        let started = {
            let mut guard = lock(&self.state);
            let state = &mut *guard;
            if state.status != TrackingStatus::GroundOperations {
                return;
            }
            let Some(session) = state.session.as_mut() else {
                return;
            };
            let done = session.ground_handling.is_complete(now);
            if done {
                session.tracking_started_at.get_or_insert(now);
            }
            if done {
                self.transition(state, TrackingStatus::Tracking);
            }
            done
        };
        if started {
            let text = "Ground handling complete, flight tracking started";
            self.add_tracking_event(EventColor::Blue, text);
            self.announce(text);
        }
    }

    pub async fn run_ground_handling_loop(self: Arc<Self>) {
        while !self.is_closing() {
            self.poll_ground_handling();
            tokio::time::sleep(GROUND_HANDLING_POLL).await;
        }
        log::debug!("Ground handling poller stopped");
    }

    /// Stop the session. `resume_later` saves and pauses it, otherwise the
    /// save is deleted and the flight is aborted with the service.
    pub async fn stop_tracking(&self, resume_later: bool) -> TrackerResult<()> {
        let (flight, status) = {
            let state = lock(&self.state);
            (state.flight.clone().ok_or(TrackerError::NoFlightBound)?, state.status)
        };
        if resume_later {
            self.pause(flight, status).await
        } else {
            self.cancel(flight).await
        }
    }

    async fn cancel(&self, flight: Flight) -> TrackerResult<()> {
        let ended = {
            let mut guard = lock(&self.state);
            self.end_session(&mut guard)
        };
        if !ended {
            // a halted flight can still leave a save behind
            log::debug!("Flight {} is not being tracked, removing its save only", flight.id);
            let id = flight.id.clone();
            return self.with_store(move |store| store.delete(&id)).await.map(|_| ());
        }
        self.release_cancelled(&flight).await
    }

    /// Drop the session without saving it; the caller holds the state
    /// lock. False if nothing was open.
    fn end_session(&self, state: &mut SessionState) -> bool {
        if state.status == TrackingStatus::NotTracking && state.session.is_none() {
            return false;
        }
        state.session = None;
        state.resume_snapshot = None;
        if let Some(bound) = state.flight.as_mut() {
            bound.resumable = false;
        }
        self.transition(state, TrackingStatus::NotTracking);
        self.epoch.fetch_add(1, Ordering::SeqCst);
        true
    }

    async fn release_cancelled(&self, flight: &Flight) -> TrackerResult<()> {
        self.reset_processors();
        log::info!("Tracking of flight {} stopped", flight.id);

        let id = flight.id.clone();
        self.with_store(move |store| store.delete(&id)).await?;

        if let Err(e) = self.service.abort_flight(&flight.id).await {
            log::warn!("Abort of flight {} not reported: {}", flight.id, e);
        }
        Ok(())
    }

    async fn pause(&self, flight: Flight, status: TrackingStatus) -> TrackerResult<()> {
        if !status.is_active() {
            return Err(TrackerError::InvalidState(format!("cannot pause while {}", status)));
        }
        self.add_tracking_event(EventColor::Blue, "Tracking paused");

        let progress = {
            let mut state = lock(&self.state);
            self.epoch.fetch_add(1, Ordering::SeqCst);
            state.session.as_mut().map(|s| s.progress(Utc::now())).unwrap_or_default()
        };
        let artifact = self.capture_artifact(&flight.id, progress)?;
        let to_save = artifact.clone();
        self.with_store(move |store| store.save(&to_save)).await?;

        {
            let mut guard = lock(&self.state);
            let state = &mut *guard;
            let mut resumable = flight.clone();
            resumable.resumable = true;
            state.session = Some(TrackingSession::resuming(&resumable, &artifact, &self.config));
            state.resume_snapshot = Some(artifact.clone());
            state.flight = Some(resumable);
            self.transition(state, TrackingStatus::Resuming);
            self.epoch.fetch_add(1, Ordering::SeqCst);
        }
        lock(&self.primary).reset_session();
        log::info!("Tracking of flight {} paused", flight.id);
        self.announce("Tracking paused");

        if let Some(report) = self.position_report(&flight.id, TrackingStatus::Resuming) {
            if let Err(e) = self.service.position_report(&report).await {
                log::warn!("Position report for {} failed: {}", flight.id, e);
            }
        }
        match artifact.encode() {
            Ok(blob) => {
                if let Err(e) = self.service.upload_auto_save(&flight.id, &blob).await {
                    log::warn!("Auto-save upload for {} failed: {}", flight.id, e);
                }
            }
            Err(e) => log::warn!("Auto-save for {} not encoded: {}", flight.id, e),
        }
        if let Err(e) = self.service.pause_flight(&flight.id).await {
            log::warn!("Pause of flight {} not reported: {}", flight.id, e);
        }
        Ok(())
    }

    /// Integrity violation: end the active session and drop its save. The
    /// flight stays bound; binding it again starts it over. Only the first
    /// of several concurrent aborts has any effect.
    async fn abort(&self, reason: AbortReason) {
        let flight = {
            let mut guard = lock(&self.state);
            let state = &mut *guard;
            if !state.status.is_active() {
                log::debug!("Abort ({}) ignored, no active session", reason);
                return;
            }
            let Some(flight) = state.flight.clone() else {
                return;
            };
            self.end_session(state);
            flight
        };
        log::warn!(
            "Aborting tracking of flight {} ({}): {}",
            flight.id,
            reason.classification(),
            reason
        );
        let text = format!("Tracking aborted: {}", reason);
        self.record_event(EventColor::Red, &text);
        self.announcer.play_sound(ABORT_SOUND);
        self.announce(&text);
        self.publish(TrackerEvent::Aborted { flight_id: flight.id.clone(), reason });

        if let Err(e) = self.release_cancelled(&flight).await {
            log::error!("Stopping flight {} after abort failed: {}", flight.id, e);
        }
    }

    /// Engines shut down before the aircraft ever flew: stop, but keep
    /// the save and leave the flight open with the service
    fn halt_without_finish(&self) {
        self.add_tracking_event(EventColor::Orange, "Engines shut down before takeoff");
        {
            let mut guard = lock(&self.state);
            let state = &mut *guard;
            state.session = None;
            self.transition(state, TrackingStatus::NotTracking);
            self.epoch.fetch_add(1, Ordering::SeqCst);
        }
        self.reset_processors();
        self.announce("Tracking stopped, the aircraft never left the ground");
    }

    /// Submit the final report and release the flight. Calling it again,
    /// or with no flight bound, does nothing.
    pub async fn finish_up_flight_tracking(&self) -> TrackerResult<()> {
        let now = Utc::now();
        let (flight, mut session, prior) = {
            let mut guard = lock(&self.state);
            let state = &mut *guard;
            if state.status == TrackingStatus::Finished {
                log::warn!("Flight is already being completed");
                return Ok(());
            }
            let Some(flight) = state.flight.take() else {
                log::error!("Finalize requested with no flight bound");
                return Ok(());
            };
            let session = state.session.take();
            state.resume_snapshot = None;
            let prior = state.status;
            self.transition(state, TrackingStatus::Finished);
            self.epoch.fetch_add(1, Ordering::SeqCst);
            (flight, session, prior)
        };
        log::info!("Completing flight {}", flight.id);

        let progress = session.as_mut().map(|s| s.progress(now)).unwrap_or_default();
        match self.submit_final_report(&flight, &progress, now).await {
            Ok(()) => {
                {
                    let mut guard = lock(&self.state);
                    self.transition(&mut guard, TrackingStatus::NotTracking);
                }
                self.reset_processors();
                self.announcer.speak("Flight completed");
                self.publish(TrackerEvent::FlightCompleted { flight_id: flight.id });
                Ok(())
            }
            Err(e) => {
                log::error!("Completing flight {} failed: {}", flight.id, e);
                let mut guard = lock(&self.state);
                let state = &mut *guard;
                state.flight = Some(flight);
                state.session = session;
                self.transition(state, prior);
                Err(e)
            }
        }
    }

    async fn submit_final_report(
        &self,
        flight: &Flight,
        progress: &SessionProgress,
        now: DateTime<Utc>,
    ) -> TrackerResult<()> {
        match self.capture_artifact(&flight.id, progress.clone()) {
            Ok(artifact) => self.with_store(move |store| store.save(&artifact)).await?,
            Err(e) => log::warn!("No final save for flight {}: {}", flight.id, e),
        }
        let id = flight.id.clone();
        let blob = self.with_store(move |store| store.read_bytes(&id)).await?.unwrap_or_default();

        let crashed = lock(&self.latest)
            .primary
            .as_ref()
            .map(|p| p.crash_sequence != CrashSequence::Off)
            .unwrap_or(false);
        let report = FinalReport {
            flight_id: flight.id.clone(),
            completed_at: now,
            position: self.position_report(&flight.id, TrackingStatus::Finished),
            tracking_started_at: progress.tracking_started_at,
            paused_secs: progress.paused_secs,
            time_saved_secs: progress.time_saved_secs,
            crashed,
            landings: progress.landings.clone(),
            events: self.events.entries(),
            save_base64: BASE64.encode(&blob),
        };
        self.service.complete_flight(&report).await?;

        let id = flight.id.clone();
        if let Err(e) = self.with_store(move |store| store.delete(&id)).await {
            log::warn!("Save of completed flight {} not deleted: {}", flight.id, e);
        }
        Ok(())
    }

    /// Connection to the simulator went away: pause an active session
    pub async fn handle_connection_lost(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            log::warn!("Connection to the simulator lost");
            self.publish(TrackerEvent::ConnectionChanged(false));
        }
        if !self.status().is_active() {
            return;
        }
        let flight_id = self.flight_id().unwrap_or_default();
        log::warn!("Pausing flight {} after connection loss", flight_id);
        if let Err(e) = self.stop_tracking(true).await {
            log::error!("Could not pause flight {} after connection loss: {}", flight_id, e);
        }
    }

    // ── Saves and reports ──

    fn capture_artifact(&self, flight_id: &str, progress: SessionProgress) -> TrackerResult<SaveArtifact> {
        let latest = lock(&self.latest);
        let primary = latest
            .primary
            .as_ref()
            .ok_or_else(|| TrackerError::InvalidState("no position received yet".to_string()))?;
        Ok(SaveArtifact::capture(
            flight_id,
            Utc::now(),
            latest.secondary.as_ref().and_then(|s| s.utc_time),
            primary,
            &latest.fuel.clone().unwrap_or_default(),
            &latest.payload.clone().unwrap_or_default(),
            progress,
        ))
    }

    fn position_report(&self, flight_id: &str, status: TrackingStatus) -> Option<PositionReport> {
        let latest = lock(&self.latest);
        latest.primary.as_ref().map(|primary| {
            PositionReport::new(
                flight_id,
                Utc::now(),
                status,
                primary,
                latest.fuel.as_ref(),
                latest.secondary.as_ref().and_then(|s| s.utc_time),
            )
        })
    }

    /// Flight id, progress and the epoch they belong to, read together
    fn active_session_progress(&self) -> Option<(String, SessionProgress, u64)> {
        let mut guard = lock(&self.state);
        let state = &mut *guard;
        if !state.status.is_active() {
            return None;
        }
        let flight_id = state.flight.as_ref()?.id.clone();
        let progress = state.session.as_mut()?.progress(Utc::now());
        Some((flight_id, progress, self.epoch.load(Ordering::SeqCst)))
    }

    /// Explicit save of the active session; waits for the save lock
    pub async fn save(&self) -> TrackerResult<()> {
        let (flight_id, progress, _) = self
            .active_session_progress()
            .ok_or_else(|| TrackerError::InvalidState("no active session to save".to_string()))?;
        let artifact = self.capture_artifact(&flight_id, progress)?;
        self.with_store(move |store| store.save(&artifact)).await?;
        log::info!("Saved flight {}", flight_id);
        Ok(())
    }

    /// Background save; `Ok(false)` when skipped
    pub async fn autosave(&self) -> TrackerResult<bool> {
        let Some((flight_id, progress, epoch)) = self.active_session_progress() else {
            return Ok(false);
        };
        let artifact = self.capture_artifact(&flight_id, progress)?;
        let current = Arc::clone(&self.epoch);
        let saved = self
            .with_store(move |store| {
                store.try_autosave(&artifact, || current.load(Ordering::SeqCst) == epoch)
            })
            .await?;
        if saved {
            log::debug!("Auto-saved flight {}", flight_id);
        }
        Ok(saved)
    }

    pub async fn send_position_report(&self) -> TrackerResult<()> {
        let (flight_id, status) = {
            let state = lock(&self.state);
            match state.flight.as_ref() {
                Some(flight) if state.status.is_active() => (flight.id.clone(), state.status),
                _ => return Ok(()),
            }
        };
        if let Some(report) = self.position_report(&flight_id, status) {
            self.service.position_report(&report).await?;
        }
        Ok(())
    }

    pub async fn upload_auto_save(&self) -> TrackerResult<()> {
        let Some((flight_id, _, _)) = self.active_session_progress() else {
            return Ok(());
        };
        let id = flight_id.clone();
        let Some(blob) = self.with_store(move |store| store.read_bytes(&id)).await? else {
            return Ok(());
        };
        self.service.upload_auto_save(&flight_id, &blob).await?;
        log::debug!("Uploaded auto-save of flight {} ({} bytes)", flight_id, blob.len());
        Ok(())
    }
}
