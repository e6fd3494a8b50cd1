use chrono::{DateTime, Duration, Utc};
use geo::{Distance, Haversine, Point};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Great-circle distance in meters
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        Haversine::distance(self.point(), other.point())
    }

    fn point(&self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }
}

/// One reported position sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fix {
    pub coordinate: Coordinate,
    /// Radius of uncertainty in meters, negative for an invalid reading
    pub horizontal_accuracy: f64,
    pub timestamp: DateTime<Utc>,
}

impl Fix {
    pub fn new(
        latitude: f64,
        longitude: f64,
        horizontal_accuracy: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            coordinate: Coordinate::new(latitude, longitude),
            horizontal_accuracy,
            timestamp,
        }
    }

    pub fn latitude(&self) -> f64 {
        self.coordinate.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.coordinate.longitude
    }

    pub fn distance_to(&self, other: &Fix) -> f64 {
        self.coordinate.distance_to(&other.coordinate)
    }

    /// How long before `now` the fix was taken; negative for fixes stamped in the future
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.timestamp
    }

    pub fn has_valid_accuracy(&self) -> bool {
        self.horizontal_accuracy >= 0.0
    }

    pub fn is_more_accurate_than(&self, other: &Fix) -> bool {
        self.horizontal_accuracy < other.horizontal_accuracy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 7, 21, 12, 0, 0).unwrap()
    }

    #[test]
    fn distance_between_identical_points_is_zero() {
        let a = Fix::new(37.3318, -122.0312, 10.0, t0());
        assert_eq!(a.distance_to(&a), 0.0);
    }

    #[test]
    fn distance_of_one_millidegree_latitude() {
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(0.001, 0.0);
        let d = a.distance_to(&b);
        assert!((d - 111.2).abs() < 0.5, "got {d}");
    }

    #[test]
    fn age_is_measured_from_now() {
        let fix = Fix::new(0.0, 0.0, 5.0, t0());
        assert_eq!(fix.age(t0() + Duration::seconds(7)), Duration::seconds(7));
        assert!(fix.age(t0() - Duration::seconds(1)) < Duration::zero());
    }

    #[test]
    fn accuracy_comparisons() {
        let coarse = Fix::new(0.0, 0.0, 50.0, t0());
        let fine = Fix::new(0.0, 0.0, 5.0, t0());
        assert!(fine.is_more_accurate_than(&coarse));
        assert!(!coarse.is_more_accurate_than(&fine));
        assert!(!fine.is_more_accurate_than(&fine));
        assert!(!Fix::new(0.0, 0.0, -1.0, t0()).has_valid_accuracy());
        assert!(Fix::new(0.0, 0.0, 0.0, t0()).has_valid_accuracy());
    }
}
