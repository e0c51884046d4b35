use serde::Serialize;

use crate::models::Poi;

use super::state::CaptureSnapshot;

/// Discrete notifications for the surrounding UI layer. The core emits them
/// on a broadcast channel and never formats or localizes user-facing text.
#[derive(Debug, Clone, Serialize)]
#[serde(
    rename_all = "camelCase",
    rename_all_fields = "camelCase",
    tag = "event",
    content = "payload"
)]
pub enum GameEvent {
    EntryStarted {
        poi: Poi,
    },
    /// Throttled entry-progress heartbeat.
    EntryProgress {
        poi_id: String,
        progress: f64,
    },
    PhaseChanged {
        snapshot: CaptureSnapshot,
    },
    CaptureTick {
        poi_id: String,
        captured_seconds: u32,
        session_earned_seconds: u32,
    },
    DailyLimitReached {
        poi: Poi,
    },
    ClaimSaved {
        poi: Poi,
        seconds_earned: u32,
    },
    ClaimFailed {
        poi: Poi,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Coordinates, PoiKind};

    #[test]
    fn events_serialize_with_camel_case_tags() {
        let poi = Poi {
            id: "osm_1".into(),
            name: "Rijksmuseum".into(),
            coordinates: Coordinates::new(52.36, 4.885),
            kind: PoiKind::Museum,
            category: "tourism".into(),
        };
        let json = serde_json::to_value(GameEvent::ClaimSaved {
            poi,
            seconds_earned: 70,
        })
        .unwrap();
        assert_eq!(json["event"], "claimSaved");
        assert_eq!(json["payload"]["secondsEarned"], 70);
        assert_eq!(json["payload"]["poi"]["kind"], "museum");
    }
}
