//! Great-circle distance for range and speed checks.

use crate::types::Position;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Meters per nautical mile.
pub const METERS_PER_NM: f64 = 1852.0;

/// Great-circle distance in meters (haversine).
pub fn haversine_m(a: &Position, b: &Position) -> f64 {
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();
    let h = (dlat / 2.0).sin().powi(2)
        + a.latitude.to_radians().cos()
            * b.latitude.to_radians().cos()
            * (dlon / 2.0).sin().powi(2);
    EARTH_RADIUS_M * 2.0 * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Great-circle distance in nautical miles.
pub fn haversine_nm(a: &Position, b: &Position) -> f64 {
    haversine_m(a, b) / METERS_PER_NM
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_distance() {
        let p = Position::new(52.0, 4.0);
        assert!(haversine_m(&p, &p) < 1e-6);
    }

    #[test]
    fn test_one_degree_latitude() {
        let d = haversine_m(&Position::new(0.0, 0.0), &Position::new(1.0, 0.0));
        assert!((d - 111_195.0).abs() < 10.0, "got {d}");
    }

    #[test]
    fn test_across_antimeridian() {
        let d = haversine_nm(&Position::new(0.0, 179.9), &Position::new(0.0, -179.9));
        assert!((d - 12.0).abs() < 0.1, "got {d}");
    }
}
