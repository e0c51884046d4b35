//! Great-circle distance. Pure and total for finite inputs.

use crate::models::Coordinates;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance in meters between two coordinates.
pub fn distance_meters(a: Coordinates, b: Coordinates) -> f64 {
    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let d_phi = (b.latitude - a.latitude).to_radians();
    let d_lambda = (b.longitude - a.longitude).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    // Rounding can push h a hair outside [0, 1] near antipodal points.
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coincident_points_are_zero() {
        let a = Coordinates::new(52.3676, 4.9041);
        assert!(distance_meters(a, a) < 1e-6);
    }

    #[test]
    fn symmetric() {
        let a = Coordinates::new(52.3676, 4.9041);
        let b = Coordinates::new(51.9244, 4.4777);
        assert_eq!(distance_meters(a, b), distance_meters(b, a));
    }

    #[test]
    fn one_degree_longitude_at_equator() {
        let a = Coordinates::new(0.0, 0.0);
        let b = Coordinates::new(0.0, 1.0);
        let expected = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;
        assert!((distance_meters(a, b) - expected).abs() < 1.0);
    }

    #[test]
    fn antipodal_is_finite_and_half_circumference() {
        let a = Coordinates::new(0.0, 0.0);
        let b = Coordinates::new(0.0, 180.0);
        let d = distance_meters(a, b);
        assert!(d.is_finite());
        assert!((d - EARTH_RADIUS_M * std::f64::consts::PI).abs() < 1.0);
    }

    #[test]
    fn amsterdam_to_rotterdam_is_about_57km() {
        let amsterdam = Coordinates::new(52.3676, 4.9041);
        let rotterdam = Coordinates::new(51.9244, 4.4777);
        let d = distance_meters(amsterdam, rotterdam);
        assert!((55_000.0..60_000.0).contains(&d), "got {d}");
    }
}
