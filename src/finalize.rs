//! Claim finalization: package a finished session into an immutable claim
//! and submit it once.

use std::sync::Arc;

use chrono::Utc;
use log::{error, info, warn};
use tokio::sync::broadcast;

use crate::{
    capture::{CaptureSession, GameEvent},
    models::NewClaim,
    quota,
    store::ClaimStore,
};

/// Submit one claim for a finished session, or nothing if it earned nothing.
/// Called exactly once per session termination; submission failure is
/// reported as an event and never resurrects the session.
pub async fn finalize_session(
    store: Arc<dyn ClaimStore>,
    events: broadcast::Sender<GameEvent>,
    session: CaptureSession,
    daily_cap: u32,
) {
    if session.session_earned_seconds == 0 {
        info!("session {} earned nothing, no claim submitted", session.id);
        return;
    }

    let end_time = Utc::now();
    let start_time = session.capture_started_at.unwrap_or(end_time);
    let base_earned = session
        .session_earned_seconds
        .saturating_sub(session.session_bonus_seconds);
    let to_submit = quota::clamp_submission(
        base_earned,
        session.session_bonus_seconds,
        session.starting_offset_seconds,
        daily_cap,
    );

    // Lazy creation: the POI may not exist at the boundary yet. If the
    // upsert fails the claim is still attempted, since the boundary may
    // already know the POI from another source.
    if let Err(err) = store.upsert_poi(&session.poi).await {
        warn!(
            "poi upsert failed for {}, submitting claim anyway: {err}",
            session.poi.id
        );
    }

    let claim = NewClaim {
        user_id: session.user_id.clone(),
        poi_id: session.poi.id.clone(),
        start_time,
        end_time,
        seconds_earned: to_submit,
        period_key: quota::period_key(start_time),
    };

    match store.insert_claim(claim).await {
        Ok(saved) => {
            info!(
                "claim saved: {}s at {} ({})",
                saved.seconds_earned, session.poi.name, saved.period_key
            );
            let _ = events.send(GameEvent::ClaimSaved {
                poi: session.poi,
                seconds_earned: saved.seconds_earned,
            });
        }
        Err(err) => {
            error!("claim submission failed at {}: {err}", session.poi.id);
            let _ = events.send(GameEvent::ClaimFailed {
                poi: session.poi,
                reason: err.to_string(),
            });
        }
    }
}
