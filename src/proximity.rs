//! Nearest-POI selection against the current candidate snapshot.

use serde::Serialize;

use crate::geo;
use crate::models::{Coordinates, Poi};

/// Derived per-sample proximity. `active_poi` is the nearest candidate when
/// it falls inside the claim radius, otherwise everything is cleared.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProximityState {
    pub active_poi: Option<Poi>,
    pub is_inside_radius: bool,
    pub distance_meters: Option<f64>,
}

/// Resolve the nearest candidate. Exact distance ties keep the first
/// candidate in input order, so successive calls with near-identical
/// distances do not flicker between two equidistant POIs. Oscillation
/// damping beyond that is the state machine's concern, not this function's.
pub fn resolve(location: Coordinates, candidates: &[Poi], radius_meters: f64) -> ProximityState {
    let mut nearest: Option<(&Poi, f64)> = None;

    for poi in candidates {
        let distance = geo::distance_meters(location, poi.coordinates);
        match nearest {
            Some((_, best)) if distance >= best => {}
            _ => nearest = Some((poi, distance)),
        }
    }

    match nearest {
        Some((poi, distance)) if distance <= radius_meters => ProximityState {
            active_poi: Some(poi.clone()),
            is_inside_radius: true,
            distance_meters: Some(distance),
        },
        _ => ProximityState::default(),
    }
}
