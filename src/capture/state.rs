use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

use crate::models::Poi;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CapturePhase {
    Idle,
    Entering,
    Capturing,
}

impl Default for CapturePhase {
    fn default() -> Self {
        CapturePhase::Idle
    }
}

/// One capture attempt at one POI. Owned exclusively by the state machine;
/// bound to its POI at creation and replaced, never rebound, if the active
/// POI changes.
#[derive(Debug, Clone)]
pub struct CaptureSession {
    pub id: String,
    pub user_id: String,
    pub poi: Poi,
    pub entry_started_at: Instant,
    pub entry_duration: Duration,
    pub entry_progress: f64,
    /// Seconds already claimed today at this POI, fetched once at entry
    /// completion.
    pub starting_offset_seconds: u32,
    /// Cumulative counter seeded from the starting offset.
    pub captured_seconds: u32,
    /// Seconds earned in this session only, bonus included.
    pub session_earned_seconds: u32,
    /// Bonus portion of `session_earned_seconds`.
    pub session_bonus_seconds: u32,
    pub capture_started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy)]
pub struct CaptureTickOutcome {
    pub captured_seconds: u32,
    pub session_earned_seconds: u32,
    pub bonus_awarded: bool,
    pub reached_ceiling: bool,
}

/// Serializable view of the machine for event payloads and polling UIs.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureSnapshot {
    pub phase: CapturePhase,
    pub poi_id: Option<String>,
    pub entry_progress: f64,
    pub captured_seconds: u32,
    pub session_earned_seconds: u32,
}

/// Pure state of the capture machine. Transitions are plain methods so the
/// timing rules stay testable without a runtime; the controller owns the
/// tickers that drive them.
#[derive(Debug, Default)]
pub struct CaptureState {
    pub phase: CapturePhase,
    pub session: Option<CaptureSession>,
    /// POI whose session finished (or was blocked) while the user was still
    /// inside its radius. Suppresses a fresh entry there until the user
    /// leaves; entry is edge-triggered on radius crossings, not on lingering.
    pub resting_poi_id: Option<String>,
}

impl CaptureState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_session(&self, session_id: &str) -> bool {
        self.session
            .as_ref()
            .map(|s| s.id == session_id)
            .unwrap_or(false)
    }

    pub fn active_poi_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.poi.id.as_str())
    }

    pub fn begin_entry(
        &mut self,
        id: String,
        user_id: String,
        poi: Poi,
        entry_duration: Duration,
        now: Instant,
    ) {
        debug_assert!(
            self.session.is_none(),
            "entry begun over a live session; callers must take_session first"
        );
        self.phase = CapturePhase::Entering;
        self.resting_poi_id = None;
        self.session = Some(CaptureSession {
            id,
            user_id,
            poi,
            entry_started_at: now,
            entry_duration,
            entry_progress: 0.0,
            starting_offset_seconds: 0,
            captured_seconds: 0,
            session_earned_seconds: 0,
            session_bonus_seconds: 0,
            capture_started_at: None,
        });
    }

    /// Apply a resolved entry duration (king-status lookup). Returns false
    /// when the result is stale: wrong session, or past the entry phase.
    pub fn set_entry_duration(&mut self, session_id: &str, duration: Duration) -> bool {
        if self.phase != CapturePhase::Entering || !self.is_session(session_id) {
            return false;
        }
        if let Some(session) = self.session.as_mut() {
            session.entry_duration = duration;
            return true;
        }
        false
    }

    /// Advance entry progress from the start anchor. Elapsed time is derived
    /// from the anchor rather than accumulated tick deltas, so throttled
    /// scheduling cannot drift the total. Progress never goes backwards,
    /// even when the duration is shortened mid-entry.
    pub fn tick_entry(&mut self, now: Instant) -> Option<f64> {
        if self.phase != CapturePhase::Entering {
            return None;
        }
        let session = self.session.as_mut()?;
        let elapsed = now.duration_since(session.entry_started_at).as_secs_f64();
        let duration = session.entry_duration.as_secs_f64().max(f64::MIN_POSITIVE);
        let progress = (elapsed / duration).min(1.0);
        session.entry_progress = session.entry_progress.max(progress);
        Some(session.entry_progress)
    }

    pub fn begin_capture(&mut self, starting_offset: u32, start_at: DateTime<Utc>) {
        if let Some(session) = self.session.as_mut() {
            session.entry_progress = 1.0;
            session.starting_offset_seconds = starting_offset;
            session.captured_seconds = starting_offset;
            session.session_earned_seconds = 0;
            session.session_bonus_seconds = 0;
            session.capture_started_at = Some(start_at);
        }
        self.phase = CapturePhase::Capturing;
    }

    /// One elapsed capture second. The minute bonus is edge-triggered off
    /// the counter itself, so it is deterministic under timer jitter and
    /// fires exactly once per minute boundary.
    pub fn record_capture_tick(
        &mut self,
        minute_bonus: u32,
        ceiling: u32,
    ) -> Option<CaptureTickOutcome> {
        if self.phase != CapturePhase::Capturing {
            return None;
        }
        let session = self.session.as_mut()?;
        session.captured_seconds += 1;
        let bonus = if session.captured_seconds % 60 == 0 {
            minute_bonus
        } else {
            0
        };
        session.session_earned_seconds += 1 + bonus;
        session.session_bonus_seconds += bonus;
        Some(CaptureTickOutcome {
            captured_seconds: session.captured_seconds,
            session_earned_seconds: session.session_earned_seconds,
            bonus_awarded: bonus > 0,
            reached_ceiling: session.captured_seconds >= ceiling,
        })
    }

    /// Tear the session out and return to Idle. Radius exit, completion,
    /// daily-limit block and POI switches all funnel through here.
    pub fn take_session(&mut self) -> Option<CaptureSession> {
        self.phase = CapturePhase::Idle;
        self.session.take()
    }

    /// Like [`take_session`](Self::take_session), for session ends where the
    /// user is still inside the radius (ceiling reached, daily-limit block).
    /// The POI is marked resting so the next entry there needs a radius exit
    /// first.
    pub fn finish_while_inside(&mut self) -> Option<CaptureSession> {
        let session = self.take_session();
        self.resting_poi_id = session.as_ref().map(|s| s.poi.id.clone());
        session
    }

    pub fn is_resting_at(&self, poi_id: &str) -> bool {
        self.resting_poi_id.as_deref() == Some(poi_id)
    }

    pub fn clear_resting(&mut self) {
        self.resting_poi_id = None;
    }

    pub fn snapshot(&self) -> CaptureSnapshot {
        CaptureSnapshot {
            phase: self.phase,
            poi_id: self.session.as_ref().map(|s| s.poi.id.clone()),
            entry_progress: self
                .session
                .as_ref()
                .map(|s| s.entry_progress)
                .unwrap_or(0.0),
            captured_seconds: self
                .session
                .as_ref()
                .map(|s| s.captured_seconds)
                .unwrap_or(0),
            session_earned_seconds: self
                .session
                .as_ref()
                .map(|s| s.session_earned_seconds)
                .unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Coordinates, PoiKind};

    fn poi() -> Poi {
        Poi {
            id: "osm_1".into(),
            name: "Vondelpark".into(),
            coordinates: Coordinates::new(52.3579, 4.8686),
            kind: PoiKind::Park,
            category: "leisure".into(),
        }
    }

    fn entering(duration_secs: u64) -> (CaptureState, Instant) {
        let mut state = CaptureState::new();
        let start = Instant::now();
        state.begin_entry(
            "sess-1".into(),
            "user-1".into(),
            poi(),
            Duration::from_secs(duration_secs),
            start,
        );
        (state, start)
    }

    #[test]
    fn entry_progress_is_monotonic_and_completes_on_schedule() {
        let (mut state, start) = entering(10);
        let mut last = 0.0;
        for tenths in 0..=100 {
            let now = start + Duration::from_millis(tenths * 100);
            let progress = state.tick_entry(now).unwrap();
            assert!(progress >= last, "progress regressed at {tenths}");
            last = progress;
        }
        assert_eq!(last, 1.0);
        // Well past the duration it stays clamped.
        assert_eq!(
            state.tick_entry(start + Duration::from_secs(60)).unwrap(),
            1.0
        );
    }

    #[test]
    fn shortened_entry_duration_never_regresses_progress() {
        let (mut state, start) = entering(10);
        let early = state.tick_entry(start + Duration::from_secs(4)).unwrap();
        assert!((early - 0.4).abs() < 1e-9);
        // King lookup resolves mid-entry.
        assert!(state.set_entry_duration("sess-1", Duration::from_secs(5)));
        let after = state.tick_entry(start + Duration::from_secs(4)).unwrap();
        assert!(after >= early);
        assert_eq!(state.tick_entry(start + Duration::from_secs(5)).unwrap(), 1.0);
    }

    #[test]
    fn stale_entry_duration_is_rejected() {
        let (mut state, _) = entering(10);
        assert!(!state.set_entry_duration("sess-0", Duration::from_secs(5)));
        state.begin_capture(0, Utc::now());
        assert!(!state.set_entry_duration("sess-1", Duration::from_secs(5)));
    }

    #[test]
    fn minute_bonus_fires_exactly_on_the_boundary() {
        let (mut state, _) = entering(10);
        state.begin_capture(0, Utc::now());
        let mut earned_at = Vec::new();
        for _ in 0..61 {
            let outcome = state.record_capture_tick(10, 120).unwrap();
            earned_at.push(outcome.session_earned_seconds);
        }
        // Increments around the 60 s boundary: 58→+1, 59→+1, 60→+11, 61→+1.
        assert_eq!(earned_at[57], 58);
        assert_eq!(earned_at[58], 59);
        assert_eq!(earned_at[59], 70);
        assert_eq!(earned_at[60], 71);
    }

    #[test]
    fn offset_seed_reaches_ceiling_with_bonus() {
        let (mut state, _) = entering(10);
        state.begin_capture(55, Utc::now());
        let mut last = None;
        for _ in 0..5 {
            last = state.record_capture_tick(10, 60);
        }
        let outcome = last.unwrap();
        assert!(outcome.reached_ceiling);
        assert_eq!(outcome.captured_seconds, 60);
        // 5 ticks + the minute bonus at 60.
        assert_eq!(outcome.session_earned_seconds, 15);
    }

    #[test]
    fn finishing_inside_marks_the_poi_resting_until_cleared() {
        let (mut state, _) = entering(10);
        state.begin_capture(0, Utc::now());
        let finished = state.finish_while_inside().unwrap();
        assert_eq!(finished.id, "sess-1");
        assert_eq!(state.phase, CapturePhase::Idle);
        assert!(state.is_resting_at("osm_1"));
        assert!(!state.is_resting_at("osm_2"));

        // A radius exit clears the marker; a new entry there is allowed and
        // resets it on its own.
        state.clear_resting();
        assert!(!state.is_resting_at("osm_1"));
        state.begin_entry(
            "sess-2".into(),
            "user-1".into(),
            poi(),
            Duration::from_secs(10),
            Instant::now(),
        );
        assert!(state.resting_poi_id.is_none());
    }

    #[test]
    fn take_session_resets_to_idle() {
        let (mut state, _) = entering(10);
        let session = state.take_session().unwrap();
        assert_eq!(session.id, "sess-1");
        assert_eq!(state.phase, CapturePhase::Idle);
        assert!(state.session.is_none());
        assert!(state.take_session().is_none());
    }
}
