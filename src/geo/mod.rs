use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;
pub const DEFAULT_GATE_METERS: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Rejects non-finite and out-of-range coordinates.
    pub fn validated(lat: f64, lng: f64) -> Result<Self, AppError> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(AppError::Validation(
                "lat must be between -90 and 90".to_string(),
            ));
        }
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            return Err(AppError::Validation(
                "lng must be between -180 and 180".to_string(),
            ));
        }
        Ok(Self { lat, lng })
    }
}

pub fn haversine_m(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    // rounding can push the term a hair past 1 for antipodal points
    let central_angle = 2.0 * haversine.clamp(0.0, 1.0).sqrt().asin();

    EARTH_RADIUS_M * central_angle
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GateDecision {
    pub distance_m: f64,
    pub within: bool,
}

/// Proximity gate for physical-state transitions. The boundary is inclusive.
#[derive(Debug, Clone, Copy)]
pub struct Geofence {
    radius_m: f64,
}

impl Geofence {
    pub fn new(radius_m: f64) -> Self {
        Self { radius_m }
    }

    pub fn radius_m(&self) -> f64 {
        self.radius_m
    }

    pub fn admits(&self, distance_m: f64) -> bool {
        distance_m <= self.radius_m
    }

    pub fn check(&self, rider: &GeoPoint, target: &GeoPoint) -> GateDecision {
        let distance_m = haversine_m(rider, target);
        GateDecision {
            distance_m,
            within: self.admits(distance_m),
        }
    }
}

impl Default for Geofence {
    fn default() -> Self {
        Self::new(DEFAULT_GATE_METERS)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn zero_distance_for_same_point() {
        let p = GeoPoint::new(13.7563, 100.5018);
        assert!(haversine_m(&p, &p) < 1e-9);
    }

    #[test]
    fn bangkok_hundredth_of_a_degree_east_is_about_1080_m() {
        let a = GeoPoint::new(13.7563, 100.5018);
        let b = GeoPoint::new(13.7563, 100.5118);
        let distance = haversine_m(&a, &b);
        assert!((distance - 1080.0).abs() < 5.0, "got {distance}");
    }

    #[test]
    fn london_to_paris_is_around_343_km() {
        let london = GeoPoint::new(51.5074, -0.1278);
        let paris = GeoPoint::new(48.8566, 2.3522);
        let distance = haversine_m(&london, &paris);
        assert!((distance - 343_000.0).abs() < 5_000.0);
    }

    #[test]
    fn gate_boundary_is_inclusive() {
        let gate = Geofence::new(20.0);
        assert!(gate.admits(20.0));
        assert!(gate.admits(19.999));
        assert!(!gate.admits(20.001));
    }

    #[test]
    fn check_reports_distance_even_when_outside() {
        let gate = Geofence::default();
        let a = GeoPoint::new(13.7563, 100.5018);
        let b = GeoPoint::new(13.7563, 100.5118);
        let decision = gate.check(&a, &b);
        assert!(!decision.within);
        assert!(decision.distance_m > 1000.0);
    }

    #[test]
    fn validated_rejects_out_of_range() {
        assert!(GeoPoint::validated(90.0, 180.0).is_ok());
        assert!(GeoPoint::validated(-90.0, -180.0).is_ok());
        assert!(matches!(GeoPoint::validated(90.5, 0.0), Err(AppError::Validation(_))));
        assert!(matches!(GeoPoint::validated(0.0, -180.1), Err(AppError::Validation(_))));
        assert!(matches!(GeoPoint::validated(f64::NAN, 0.0), Err(AppError::Validation(_))));
    }

    fn point() -> impl Strategy<Value = GeoPoint> {
        (-90.0f64..=90.0, -180.0f64..=180.0).prop_map(|(lat, lng)| GeoPoint::new(lat, lng))
    }

    proptest! {
        #[test]
        fn distance_is_symmetric(a in point(), b in point()) {
            let ab = haversine_m(&a, &b);
            let ba = haversine_m(&b, &a);
            prop_assert!((ab - ba).abs() < 1e-6);
        }

        #[test]
        fn distance_is_bounded_by_half_circumference(a in point(), b in point()) {
            let d = haversine_m(&a, &b);
            prop_assert!(d >= 0.0);
            prop_assert!(d <= std::f64::consts::PI * EARTH_RADIUS_M + 1e-6);
        }

        #[test]
        fn distance_to_self_is_zero(a in point()) {
            prop_assert!(haversine_m(&a, &a) < 1e-6);
        }
    }
}
