use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use crate::geo::GeoPoint;
use crate::models::location::RiderLocation;

/// Latest position per rider. Reports replace the stored row unconditionally,
/// so a late-arriving older fix overwrites a newer one.
#[derive(Default)]
pub struct LocationTracker {
    latest: DashMap<Uuid, RiderLocation>,
}

impl LocationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(
        &self,
        rider_id: Uuid,
        point: GeoPoint,
        heading_deg: Option<f64>,
        speed_mps: Option<f64>,
    ) -> RiderLocation {
        let location = RiderLocation {
            rider_id,
            lat: point.lat,
            lng: point.lng,
            heading_deg,
            speed_mps,
            updated_at: Utc::now(),
        };
        self.latest.insert(rider_id, location.clone());
        location
    }

    pub fn latest(&self, rider_id: Uuid) -> Option<RiderLocation> {
        self.latest.get(&rider_id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.latest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_rider_has_no_position() {
        let tracker = LocationTracker::new();
        assert!(tracker.latest(Uuid::new_v4()).is_none());
    }

    #[test]
    fn last_write_wins() {
        let tracker = LocationTracker::new();
        let rider = Uuid::new_v4();

        tracker.report(rider, GeoPoint::new(13.0, 100.0), Some(90.0), Some(4.0));
        tracker.report(rider, GeoPoint::new(14.0, 101.0), None, None);

        let latest = tracker.latest(rider).unwrap();
        assert_eq!(latest.point(), GeoPoint::new(14.0, 101.0));
        assert_eq!(latest.heading_deg, None);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn repeated_identical_reports_keep_the_same_position() {
        let tracker = LocationTracker::new();
        let rider = Uuid::new_v4();
        let point = GeoPoint::new(13.7563, 100.5018);

        let first = tracker.report(rider, point, Some(45.0), Some(2.5));
        let second = tracker.report(rider, point, Some(45.0), Some(2.5));

        let latest = tracker.latest(rider).unwrap();
        assert_eq!(latest.point(), first.point());
        assert_eq!(latest.point(), second.point());
        assert_eq!(latest.heading_deg, Some(45.0));
        assert_eq!(latest.speed_mps, Some(2.5));
    }
}
