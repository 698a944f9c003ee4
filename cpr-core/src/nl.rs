//! Longitude zone count (the NL function).
//!
//! NL(lat) = floor(2π / acos(1 − (1 − cos(π / 2NZ)) / cos²(lat))) with NZ = 15,
//! precomputed as the 58 latitudes at which the zone count drops by one
//! (1090-WP-9-14). Symmetric about the equator.

/// Latitude breakpoints: `|lat| < NL_BREAKPOINTS[i]` gives `59 - i` zones.
const NL_BREAKPOINTS: [f64; 58] = [
    10.47047130, 14.82817437, 18.18626357, 21.02939493, 23.54504487, 25.82924707,
    27.93898710, 29.91135686, 31.77209708, 33.53993436, 35.22899598, 36.85025108,
    38.41241892, 39.92256684, 41.38651832, 42.80914012, 44.19454951, 45.54626723,
    46.86733252, 48.16039128, 49.42776439, 50.67150166, 51.89342469, 53.09516153,
    54.27817472, 55.44378444, 56.59318756, 57.72747354, 58.84763776, 59.95459277,
    61.04917774, 62.13216659, 63.20427479, 64.26616523, 65.31845310, 66.36171008,
    67.39646774, 68.42322022, 69.44242631, 70.45451075, 71.45986473, 72.45884545,
    73.45177442, 74.43893416, 75.42056257, 76.39684391, 77.36789461, 78.33374083,
    79.29428225, 80.24923213, 81.19801349, 82.13956981, 83.07199445, 83.99173563,
    84.89166191, 85.75541621, 86.53536998, 87.00000000,
];

/// Number of longitude zones at a given latitude.
///
/// Ranges from 59 at the equator down to 1 for `|lat| >= 87°`. NaN maps to 1.
pub fn zone_count(lat: f64) -> u8 {
    if lat.is_nan() {
        return 1;
    }
    let lat = lat.abs();
    let below = NL_BREAKPOINTS.partition_point(|&b| b <= lat);
    (59 - below) as u8
}

/// Closed-form NL, used to cross-check the table.
#[cfg(test)]
fn zone_count_exact(lat: f64) -> u8 {
    use std::f64::consts::PI;

    if lat.abs() >= 87.0 {
        return 1;
    }
    let a = 1.0 - (PI / 30.0).cos();
    let b = lat.to_radians().cos().powi(2);
    ((2.0 * PI / (1.0 - a / b).acos()).floor() as u8).max(1)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
