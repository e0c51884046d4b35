use std::sync::Arc;

use chrono::Utc;
use log::{info, warn};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use uuid::Uuid;

use crate::{
    config::GameConfig,
    finalize,
    models::{LocationSample, Poi},
    proximity::{self, ProximityState},
    quota,
    store::ClaimStore,
};

use super::{
    events::GameEvent,
    state::{CapturePhase, CaptureSession, CaptureSnapshot, CaptureState},
};

/// Drives the capture state machine from the location feed. One ticker task
/// at a time serves the live session: it paces entry progress at the fast
/// cadence, then switches itself to one-second capture ticks, so entry and
/// capture timers can never run concurrently against the same session.
///
/// The caller identity is an explicit argument on every operation; the
/// controller holds no ambient user state.
#[derive(Clone)]
pub struct CaptureController {
    state: Arc<Mutex<CaptureState>>,
    last_proximity: Arc<Mutex<ProximityState>>,
    store: Arc<dyn ClaimStore>,
    events: broadcast::Sender<GameEvent>,
    ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
    config: GameConfig,
}

enum Transition {
    Stay,
    StartEntry(Poi),
    DiscardEntry,
    AbortCapture(CaptureSession),
    Switch {
        finished: Option<CaptureSession>,
        next: Poi,
    },
}

impl CaptureController {
    pub fn new(store: Arc<dyn ClaimStore>, config: GameConfig) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            state: Arc::new(Mutex::new(CaptureState::new())),
            last_proximity: Arc::new(Mutex::new(ProximityState::default())),
            store,
            events,
            ticker: Arc::new(Mutex::new(None)),
            config,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> CaptureSnapshot {
        self.state.lock().await.snapshot()
    }

    pub async fn proximity(&self) -> ProximityState {
        self.last_proximity.lock().await.clone()
    }

    /// Feed one location sample against the current candidate snapshot.
    /// Samples are processed in arrival order; a malformed sample is dropped
    /// and the previous proximity state stands.
    pub async fn handle_location(
        &self,
        user_id: &str,
        sample: &LocationSample,
        candidates: &[Poi],
    ) -> ProximityState {
        if !sample.is_valid() {
            warn!(
                "dropping malformed location sample ({}, {})",
                sample.latitude, sample.longitude
            );
            return self.last_proximity.lock().await.clone();
        }

        let resolved = proximity::resolve(
            sample.coordinates(),
            candidates,
            self.config.claim_radius_m,
        );
        {
            let mut guard = self.last_proximity.lock().await;
            *guard = resolved.clone();
        }

        self.apply_proximity(user_id, &resolved).await;
        resolved
    }

    /// Apply a proximity change to the state machine. Public so embedders
    /// with their own resolver can drive the machine directly.
    pub async fn apply_proximity(&self, user_id: &str, proximity: &ProximityState) {
        let transition = {
            let mut state = self.state.lock().await;
            match (&proximity.active_poi, state.phase) {
                // Entry is edge-triggered: a POI where a session just ended
                // while the user stayed inside does not re-arm until the
                // user leaves its radius.
                (Some(poi), CapturePhase::Idle) if state.is_resting_at(&poi.id) => {
                    Transition::Stay
                }
                (Some(poi), CapturePhase::Idle) => Transition::StartEntry(poi.clone()),
                (Some(poi), _) if state.active_poi_id() == Some(poi.id.as_str()) => {
                    Transition::Stay
                }
                // Nearest POI changed under a live session: the session is
                // bound to its POI, so it ends and a fresh entry begins.
                (Some(poi), CapturePhase::Entering) => {
                    state.take_session();
                    Transition::Switch {
                        finished: None,
                        next: poi.clone(),
                    }
                }
                (Some(poi), CapturePhase::Capturing) => Transition::Switch {
                    finished: state.take_session(),
                    next: poi.clone(),
                },
                (None, CapturePhase::Idle) => {
                    state.clear_resting();
                    Transition::Stay
                }
                (None, CapturePhase::Entering) => {
                    state.take_session();
                    Transition::DiscardEntry
                }
                (None, CapturePhase::Capturing) => match state.take_session() {
                    Some(session) => Transition::AbortCapture(session),
                    None => Transition::Stay,
                },
            }
        };

        match transition {
            Transition::Stay => {}
            Transition::StartEntry(poi) => self.start_entry(user_id, poi).await,
            Transition::DiscardEntry => {
                info!("left radius during entry, session discarded");
                self.cancel_ticker().await;
                self.emit_phase_changed().await;
            }
            Transition::AbortCapture(session) => {
                info!(
                    "left radius during capture at {}s, finalizing",
                    session.captured_seconds
                );
                self.cancel_ticker().await;
                self.submit_finalized(session);
                self.emit_phase_changed().await;
            }
            Transition::Switch { finished, next } => {
                self.cancel_ticker().await;
                if let Some(session) = finished {
                    info!(
                        "active POI changed mid-capture, finalizing {} before {}",
                        session.poi.id, next.id
                    );
                    self.submit_finalized(session);
                }
                self.start_entry(user_id, next).await;
            }
        }
    }

    async fn start_entry(&self, user_id: &str, poi: Poi) {
        let session_id = Uuid::new_v4().to_string();
        {
            let mut state = self.state.lock().await;
            state.begin_entry(
                session_id.clone(),
                user_id.to_string(),
                poi.clone(),
                self.config.entry_duration,
                Instant::now(),
            );
        }

        self.spawn_session_ticker(session_id.clone()).await;
        self.spawn_king_lookup(user_id.to_string(), poi.id.clone(), session_id);

        let _ = self.events.send(GameEvent::EntryStarted { poi });
        self.emit_phase_changed().await;
    }

    /// King status resolves asynchronously; entry starts at the standard
    /// duration and shortens when a positive result lands. The session-id
    /// check drops results that arrive after the session is gone.
    fn spawn_king_lookup(&self, user_id: String, poi_id: String, session_id: String) {
        let controller = self.clone();
        tokio::spawn(async move {
            match quota::is_king(controller.store.as_ref(), &user_id, &poi_id).await {
                Ok(true) => {
                    let mut state = controller.state.lock().await;
                    if state.set_entry_duration(&session_id, controller.config.king_entry_duration)
                    {
                        info!("king status confirmed at {poi_id}, entry shortened");
                    }
                }
                Ok(false) => {}
                Err(err) => warn!("king status lookup failed for {poi_id}: {err}"),
            }
        });
    }

    async fn spawn_session_ticker(&self, session_id: String) {
        let mut guard = self.ticker.lock().await;
        if let Some(handle) = guard.take() {
            handle.abort();
        }

        let controller = self.clone();
        let handle = tokio::spawn(async move {
            controller.run_session(session_id).await;
        });
        *guard = Some(handle);
    }

    async fn cancel_ticker(&self) {
        if let Some(handle) = self.ticker.lock().await.take() {
            handle.abort();
        }
    }

    /// The single per-session timer task: entry pacing, then capture ticks.
    async fn run_session(self, session_id: String) {
        let mut ticker = time::interval(self.config.entry_tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks: u32 = 0;
        loop {
            ticker.tick().await;
            let (progress, poi_id) = {
                let mut state = self.state.lock().await;
                if !state.is_session(&session_id) {
                    return;
                }
                let poi_id = match state.active_poi_id() {
                    Some(id) => id.to_string(),
                    None => return,
                };
                match state.tick_entry(Instant::now()) {
                    Some(progress) => (progress, poi_id),
                    None => return,
                }
            };

            if progress >= 1.0 {
                break;
            }

            ticks = ticks.wrapping_add(1);
            if ticks % self.config.heartbeat_every_ticks.max(1) == 0 {
                let _ = self.events.send(GameEvent::EntryProgress { poi_id, progress });
            }
        }

        if !self.complete_entry(&session_id).await {
            return;
        }

        let mut ticker = time::interval(self.config.capture_tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of a fresh interval fires immediately; second zero
        // has not elapsed yet.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let (outcome, poi_id) = {
                let mut state = self.state.lock().await;
                if !state.is_session(&session_id) {
                    return;
                }
                let poi_id = match state.active_poi_id() {
                    Some(id) => id.to_string(),
                    None => return,
                };
                let outcome = state.record_capture_tick(
                    self.config.minute_bonus_seconds,
                    self.config.max_daily_seconds,
                );
                (outcome, poi_id)
            };

            let Some(outcome) = outcome else { return };
            let _ = self.events.send(GameEvent::CaptureTick {
                poi_id,
                captured_seconds: outcome.captured_seconds,
                session_earned_seconds: outcome.session_earned_seconds,
            });

            if outcome.reached_ceiling {
                let finished = {
                    let mut state = self.state.lock().await;
                    if !state.is_session(&session_id) {
                        return;
                    }
                    state.finish_while_inside()
                };
                if let Some(session) = finished {
                    info!(
                        "capture complete at {}s at {}, finalizing",
                        session.captured_seconds, session.poi.id
                    );
                    self.submit_finalized(session);
                }
                self.emit_phase_changed().await;
                return;
            }
        }
    }

    /// Entry finished: gate on the daily quota, then flip to capturing.
    /// The quota fetch is the one await between the phases; the session may
    /// be torn down while it is in flight, so every step re-checks identity.
    /// Returns true when the capture loop should run.
    async fn complete_entry(&self, session_id: &str) -> bool {
        let (user_id, poi) = {
            let state = self.state.lock().await;
            if !state.is_session(session_id) {
                return false;
            }
            match state.session.as_ref() {
                Some(session) => (session.user_id.clone(), session.poi.clone()),
                None => return false,
            }
        };

        let offset =
            match quota::daily_seconds_used(self.store.as_ref(), &user_id, &poi.id, Utc::now())
                .await
            {
                Ok(seconds) => seconds,
                Err(err) => {
                    warn!("daily quota lookup failed for {}: {err}", poi.id);
                    let discarded = {
                        let mut state = self.state.lock().await;
                        state.is_session(session_id).then(|| state.take_session())
                    };
                    if discarded.is_some() {
                        self.emit_phase_changed().await;
                    }
                    return false;
                }
            };

        if offset >= self.config.max_daily_seconds {
            let discarded = {
                let mut state = self.state.lock().await;
                if !state.is_session(session_id) {
                    return false;
                }
                state.finish_while_inside()
            };
            if discarded.is_some() {
                info!(
                    "daily limit already reached at {} ({offset}s), no capture",
                    poi.id
                );
                let _ = self.events.send(GameEvent::DailyLimitReached { poi });
                self.emit_phase_changed().await;
            }
            return false;
        }

        {
            let mut state = self.state.lock().await;
            if !state.is_session(session_id) {
                return false;
            }
            state.begin_capture(offset, Utc::now());
        }
        info!(
            "entry complete at {}, capturing from {offset}s",
            poi.id
        );
        self.emit_phase_changed().await;
        true
    }

    /// Hand a finished session to the finalizer. Fire-and-forget: the state
    /// machine has already moved on, and a failed submission is reported as
    /// an event rather than rolled back into live state.
    fn submit_finalized(&self, session: CaptureSession) {
        let store = Arc::clone(&self.store);
        let events = self.events.clone();
        let daily_cap = self.config.max_daily_seconds;
        tokio::spawn(async move {
            finalize::finalize_session(store, events, session, daily_cap).await;
        });
    }

    async fn emit_phase_changed(&self) {
        let snapshot = self.state.lock().await.snapshot();
        let _ = self.events.send(GameEvent::PhaseChanged { snapshot });
    }
}
