//! Compact Position Reporting (CPR) decode for ADS-B positions.
//!
//! Two decode modes:
//! - Global: even+odd frame pair received within the freshness window.
//!   No reference needed for airborne frames; surface frames need one to
//!   pick the quadrant.
//! - Local: single frame + reference position within half a zone.
//!
//! Key constants:
//! - NZ = 15 (latitude zones per hemisphere for even frames)
//! - Nb = 17 (bits per coordinate)
//! - Dlat_even = 360 / (4 * NZ) = 6.0 degrees (1.5 for surface)
//! - Dlat_odd = 360 / (4 * NZ - 1) ≈ 6.1017 degrees (≈1.5254 for surface)

use crate::geo;
use crate::nl::zone_count;
use crate::state::CprState;
use crate::trace::{TraceEvent, TraceSink, TraceStage, TRACING};
use crate::types::*;

/// Maximum age of the complementary airborne frame for global decode (seconds).
pub const AIRBORNE_WINDOW: f64 = 10.0;

/// Surface positions are sent less often, so the pair may be older.
pub const SURFACE_WINDOW: f64 = 25.0;

/// How old the opposite-parity frame may be before a pair is rejected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FreshnessWindows {
    pub airborne: f64,
    pub surface: f64,
}

impl Default for FreshnessWindows {
    fn default() -> Self {
        FreshnessWindows {
            airborne: AIRBORNE_WINDOW,
            surface: SURFACE_WINDOW,
        }
    }
}

impl FreshnessWindows {
    pub fn for_format(&self, format: FormatKind) -> f64 {
        match format {
            FormatKind::Airborne => self.airborne,
            FormatKind::Surface => self.surface,
        }
    }
}

/// Decode context: freshness windows plus the sink that receives diagnostics.
#[derive(Clone, Copy)]
pub struct Decoder<'a> {
    pub windows: FreshnessWindows,
    trace: &'a dyn TraceSink,
}

impl Default for Decoder<'static> {
    fn default() -> Self {
        Decoder::new(FreshnessWindows::default())
    }
}

impl std::fmt::Debug for Decoder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decoder")
            .field("windows", &self.windows)
            .finish_non_exhaustive()
    }
}

impl Decoder<'static> {
    pub fn new(windows: FreshnessWindows) -> Self {
        Decoder {
            windows,
            trace: &TRACING,
        }
    }
}

impl<'a> Decoder<'a> {
    /// Same windows, different diagnostics sink.
    pub fn with_trace<'b>(self, trace: &'b dyn TraceSink) -> Decoder<'b> {
        Decoder {
            windows: self.windows,
            trace,
        }
    }

    /// Global decode of `report` against the opposite-parity frame in `state`.
    ///
    /// `report` is stored in `state` whatever the outcome. `reference` is only
    /// read for surface frames.
    pub fn global(
        &self,
        state: &mut CprState,
        report: RawReport,
        now: f64,
        reference: &ReferencePosition,
    ) -> Result<Position> {
        state.store(report);
        let result = self.global_pair(state, &report, now, reference);
        self.emit(TraceStage::Global, &report, now, &result);
        result
    }

    fn global_pair(
        &self,
        state: &CprState,
        report: &RawReport,
        now: f64,
        reference: &ReferencePosition,
    ) -> Result<Position> {
        let other = state
            .complement(report.parity)
            .filter(|o| o.format == report.format)
            .ok_or(CprError::NoComplementaryFrame)?;

        let window = self.windows.for_format(report.format);
        let age = (now - other.timestamp).abs();
        if age > window {
            return Err(CprError::StaleFrame { age, window });
        }

        let (even, odd) = match report.parity {
            Parity::Even => (report, other),
            Parity::Odd => (other, report),
        };
        pair_decode(even, odd, report.parity, report.format, reference)
    }

    /// Local decode of a single frame relative to `reference`.
    pub fn local(
        &self,
        report: &RawReport,
        reference: &ReferencePosition,
        now: f64,
    ) -> Result<Position> {
        let result = relative_decode(report, reference);
        self.emit(TraceStage::Local, report, now, &result);
        result
    }

    fn emit(&self, stage: TraceStage, report: &RawReport, now: f64, result: &Result<Position>) {
        self.trace.event(&TraceEvent {
            stage,
            parity: report.parity,
            format: report.format,
            now,
            outcome: result.as_ref().copied(),
            detail: None,
        });
    }
}

/// Global decode with default windows, tracing through `tracing`.
pub fn decode_global(
    state: &mut CprState,
    report: RawReport,
    now: f64,
    reference: &ReferencePosition,
) -> Result<Position> {
    Decoder::default().global(state, report, now, reference)
}

/// Local decode with default settings, tracing through `tracing`.
pub fn decode_local(report: &RawReport, reference: &ReferencePosition, now: f64) -> Result<Position> {
    Decoder::default().local(report, reference, now)
}

// ---------------------------------------------------------------------------
// Math
// ---------------------------------------------------------------------------

/// Modulo that always returns a non-negative result.
pub(crate) fn modulo(x: f64, y: f64) -> f64 {
    x - y * (x / y).floor()
}

/// Wrap a longitude into `[-180, 180)`.
fn normalize_lon(lon: f64) -> f64 {
    lon - 360.0 * ((lon + 180.0) / 360.0).floor()
}

/// Surface latitudes decode into `[0, 90)`; the true one is either there or
/// 90° south of it, whichever is nearer the reference.
fn surface_lat(rlat: f64, ref_lat: f64) -> f64 {
    if rlat - ref_lat > 45.0 {
        rlat - 90.0
    } else {
        rlat
    }
}

fn pair_decode(
    even: &RawReport,
    odd: &RawReport,
    latest: Parity,
    format: FormatKind,
    reference: &ReferencePosition,
) -> Result<Position> {
    if format == FormatKind::Surface && !reference.valid {
        return Err(CprError::SurfaceHemisphereAmbiguous);
    }

    let span = format.span();
    let lat_even = even.latitude.fraction();
    let lat_odd = odd.latitude.fraction();

    // Latitude zone index
    let j = (59.0 * lat_even - 60.0 * lat_odd + 0.5).floor();

    let mut rlat_even = span / 60.0 * (modulo(j, 60.0) + lat_even);
    let mut rlat_odd = span / 59.0 * (modulo(j, 59.0) + lat_odd);

    match format {
        FormatKind::Airborne => {
            // Southern hemisphere comes out as 270..360
            if rlat_even >= 270.0 {
                rlat_even -= 360.0;
            }
            if rlat_odd >= 270.0 {
                rlat_odd -= 360.0;
            }
        }
        FormatKind::Surface => {
            rlat_even = surface_lat(rlat_even, reference.latitude);
            rlat_odd = surface_lat(rlat_odd, reference.latitude);
        }
    }

    for lat in [rlat_even, rlat_odd] {
        if !(-90.0..=90.0).contains(&lat) {
            return Err(CprError::LatitudeOutOfBounds(lat));
        }
    }

    let nl = zone_count(rlat_even) as i32;
    if nl != zone_count(rlat_odd) as i32 {
        return Err(CprError::ZoneMismatch);
    }

    let (rlat, lon_frac) = match latest {
        Parity::Even => (rlat_even, even.longitude.fraction()),
        Parity::Odd => (rlat_odd, odd.longitude.fraction()),
    };

    let ni = (nl - latest.offset()).max(1) as f64;
    let m = (even.longitude.fraction() * (nl - 1) as f64 - odd.longitude.fraction() * nl as f64
        + 0.5)
        .floor();
    let mut rlon = span / ni * (modulo(m, ni) + lon_frac);

    if format == FormatKind::Surface {
        // Four 90° quadrants are possible; take the one nearest the reference.
        rlon += ((reference.longitude - rlon + 45.0) / 90.0).floor() * 90.0;
    }

    Ok(Position::new(rlat, normalize_lon(rlon)))
}

fn relative_decode(report: &RawReport, reference: &ReferencePosition) -> Result<Position> {
    if !reference.valid {
        return Err(CprError::NoReference);
    }

    let span = report.format.span();
    let dlat = span / report.parity.lat_zones();
    let lat_frac = report.latitude.fraction();

    // Zone index nearest the reference
    let j = (reference.latitude / dlat + 0.5 - lat_frac).floor();
    let rlat = dlat * (j + lat_frac);

    if !(-90.0..=90.0).contains(&rlat) || (rlat - reference.latitude).abs() > dlat / 2.0 {
        return Err(CprError::OutOfRange);
    }

    let ni = (zone_count(rlat) as i32 - report.parity.offset()).max(1) as f64;
    let dlon = span / ni;
    let lon_frac = report.longitude.fraction();

    let m = (reference.longitude / dlon + 0.5 - lon_frac).floor();
    let rlon = dlon * (m + lon_frac);

    if (rlon - reference.longitude).abs() > dlon / 2.0 {
        return Err(CprError::OutOfRange);
    }

    let pos = Position::new(rlat, normalize_lon(rlon));
    if let Some(limit) = reference.range_limit_m {
        if geo::haversine_m(&pos, &reference.position()) > limit {
            return Err(CprError::OutOfRange);
        }
    }
    Ok(pos)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::MemorySink;

    fn airborne(parity: Parity, lat: u32, lon: u32, ts: f64) -> RawReport {
        RawReport::from_raw(lat, lon, parity, FormatKind::Airborne, ts).unwrap()
    }

    fn surface(parity: Parity, lat: u32, lon: u32, ts: f64) -> RawReport {
        RawReport::from_raw(lat, lon, parity, FormatKind::Surface, ts).unwrap()
    }

    fn assert_close(pos: Position, lat: f64, lon: f64, tol: f64) {
        assert!(
            (pos.latitude - lat).abs() < tol && (pos.longitude - lon).abs() < tol,
            "expected ({lat}, {lon}), got ({}, {})",
            pos.latitude,
            pos.longitude
        );
    }

    #[test]
    fn test_global_decode_known_pair() {
        // Test vectors from "The 1090MHz Riddle"
        let mut state = CprState::new();
        let odd = airborne(Parity::Odd, 74158, 50194, 0.0);
        let even = airborne(Parity::Even, 93000, 51372, 1.0);

        let first = decode_global(&mut state, odd, 0.0, &ReferencePosition::UNKNOWN);
        assert!(matches!(first, Err(CprError::NoComplementaryFrame)));

        let pos = decode_global(&mut state, even, 1.0, &ReferencePosition::UNKNOWN).unwrap();
        assert_close(pos, 52.2572021484375, 3.91937255859375, 1e-9);
    }

    #[test]
    fn test_global_decode_odd_latest() {
        let mut state = CprState::new();
        state.store(airborne(Parity::Even, 93000, 51372, 0.0));
        let odd = airborne(Parity::Odd, 74158, 50194, 1.0);

        let pos = decode_global(&mut state, odd, 1.0, &ReferencePosition::UNKNOWN).unwrap();
        assert_close(pos, 52.26578017412606, 3.938912527901786, 1e-9);
    }

    #[test]
    fn test_global_decode_southern_east() {
        let mut state = CprState::new();
        state.store(airborne(Parity::Odd, 58218, 20972, 0.0));
        let even = airborne(Parity::Even, 45875, 76022, 0.5);

        let pos = decode_global(&mut state, even, 0.5, &ReferencePosition::UNKNOWN).unwrap();
        assert_close(pos, -33.90000915527344, 151.2000134526467, 1e-9);
    }

    #[test]
    fn test_global_decode_stale_pair() {
        let mut state = CprState::new();
        state.store(airborne(Parity::Odd, 74158, 50194, 0.0));
        let even = airborne(Parity::Even, 93000, 51372, 11.0);

        let result = decode_global(&mut state, even, 11.0, &ReferencePosition::UNKNOWN);
        assert!(matches!(result, Err(CprError::StaleFrame { .. })));
        // Current frame is still stored
        assert_eq!(state.even_slot.unwrap().timestamp, 11.0);
    }

    #[test]
    fn test_global_decode_surface_window_is_longer() {
        let mut state = CprState::new();
        state.store(surface(Parity::Even, 52429, 41943, 0.0));
        let odd = surface(Parity::Odd, 101799, 83886, 20.0);
        let reference = ReferencePosition::new(-33.6, 150.9);

        let pos = decode_global(&mut state, odd, 20.0, &reference).unwrap();
        assert_close(pos, -33.9000029483084, 151.19999885559082, 1e-9);

        let odd = surface(Parity::Odd, 101799, 83886, 26.0);
        let result = decode_global(&mut state, odd, 26.0, &reference);
        assert!(matches!(result, Err(CprError::StaleFrame { .. })));
    }

    #[test]
    fn test_global_decode_custom_window() {
        let decoder = Decoder::new(FreshnessWindows {
            airborne: 30.0,
            surface: 60.0,
        });
        let mut state = CprState::new();
        state.store(airborne(Parity::Odd, 74158, 50194, 0.0));
        let even = airborne(Parity::Even, 93000, 51372, 20.0);

        let pos = decoder
            .global(&mut state, even, 20.0, &ReferencePosition::UNKNOWN)
            .unwrap();
        assert_close(pos, 52.2572021484375, 3.91937255859375, 1e-9);
    }

    #[test]
    fn test_global_decode_zone_mismatch() {
        // Even encoded at 10.46°N (NL 59), odd at 10.48°N (NL 58)
        let mut state = CprState::new();
        state.store(airborne(Parity::Even, 97430, 36409, 0.0));
        let odd = airborne(Parity::Odd, 94051, 21845, 1.0);

        let result = decode_global(&mut state, odd, 1.0, &ReferencePosition::UNKNOWN);
        assert!(matches!(result, Err(CprError::ZoneMismatch)));
    }

    #[test]
    fn test_global_decode_mixed_formats_not_paired() {
        let mut state = CprState::new();
        state.store(surface(Parity::Odd, 74158, 50194, 0.0));
        let even = airborne(Parity::Even, 93000, 51372, 1.0);

        let result = decode_global(&mut state, even, 1.0, &ReferencePosition::UNKNOWN);
        assert!(matches!(result, Err(CprError::NoComplementaryFrame)));
    }

    #[test]
    fn test_global_surface_needs_reference() {
        let mut state = CprState::new();
        state.store(surface(Parity::Even, 52429, 41943, 0.0));
        let odd = surface(Parity::Odd, 101799, 83886, 1.0);

        let result = decode_global(&mut state, odd, 1.0, &ReferencePosition::UNKNOWN);
        assert!(matches!(result, Err(CprError::SurfaceHemisphereAmbiguous)));
        assert!(state.odd_slot.is_some());
    }

    #[test]
    fn test_global_surface_even_latest() {
        let mut state = CprState::new();
        state.store(surface(Parity::Odd, 101799, 83886, 0.0));
        let even = surface(Parity::Even, 52429, 41943, 1.0);
        let reference = ReferencePosition::new(-33.6, 150.9);

        let pos = decode_global(&mut state, even, 1.0, &reference).unwrap();
        assert_close(pos, -33.89999771118164, 151.19999943947306, 1e-9);
    }

    #[test]
    fn test_global_surface_across_antimeridian() {
        // Encoded at 0.5°N 179.9°W, reference on the eastern side of the line.
        let mut state = CprState::new();
        state.store(surface(Parity::Odd, 42962, 8447, 0.0));
        let even = surface(Parity::Even, 43691, 8592, 2.0);
        let reference = ReferencePosition::new(0.8, 179.9);

        let pos = decode_global(&mut state, even, 2.0, &reference).unwrap();
        assert_close(pos, 0.5000038146972656, -179.90000579316737, 1e-9);
    }

    #[test]
    fn test_global_decode_traces_each_attempt() {
        let sink = MemorySink::new();
        let decoder = Decoder::default().with_trace(&sink);
        let mut state = CprState::new();

        let _ = decoder.global(
            &mut state,
            airborne(Parity::Odd, 74158, 50194, 0.0),
            0.0,
            &ReferencePosition::UNKNOWN,
        );
        let _ = decoder.global(
            &mut state,
            airborne(Parity::Even, 93000, 51372, 1.0),
            1.0,
            &ReferencePosition::UNKNOWN,
        );

        let lines = sink.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("no complementary frame"), "{}", lines[0]);
        assert!(lines[1].starts_with("global airborne even: 52.25720"), "{}", lines[1]);
    }

    #[test]
    fn test_local_decode() {
        let even = airborne(Parity::Even, 93000, 51372, 0.0);
        let pos = decode_local(&even, &ReferencePosition::new(52.258, 3.918), 0.0).unwrap();
        assert_close(pos, 52.2572021484375, 3.91937255859375, 1e-9);

        // Reference a degree away still lands in the same zone
        let pos = decode_local(&even, &ReferencePosition::new(53.0, 3.0), 0.0).unwrap();
        assert_close(pos, 52.2572021484375, 3.91937255859375, 1e-9);
    }

    #[test]
    fn test_local_decode_odd() {
        let odd = airborne(Parity::Odd, 74158, 50194, 0.0);
        let pos = decode_local(&odd, &ReferencePosition::new(52.258, 3.918), 0.0).unwrap();
        assert_close(pos, 52.26578017412606, 3.938912527901786, 1e-6);
    }

    #[test]
    fn test_local_decode_surface() {
        let even = surface(Parity::Even, 52429, 41943, 0.0);
        let pos = decode_local(&even, &ReferencePosition::new(-33.8, 151.1), 0.0).unwrap();
        assert_close(pos, -33.89999771118164, 151.19999943947306, 1e-9);
    }

    #[test]
    fn test_local_surface_without_reference() {
        let even = surface(Parity::Even, 52429, 41943, 0.0);
        let result = decode_local(&even, &ReferencePosition::UNKNOWN, 0.0);
        assert!(matches!(result, Err(CprError::NoReference)));
    }

    #[test]
    fn test_local_decode_past_pole_rejected() {
        // Fraction 0.1 with a reference at 89.9°N resolves to 90.6°N
        let even = airborne(Parity::Even, 13107, 0, 0.0);
        let result = decode_local(&even, &ReferencePosition::new(89.9, 0.0), 0.0);
        assert!(matches!(result, Err(CprError::OutOfRange)));
    }

    #[test]
    fn test_local_decode_range_limit() {
        let even = airborne(Parity::Even, 93000, 51372, 0.0);
        let near = ReferencePosition::new(52.258, 3.918);

        let result = decode_local(&even, &near.with_range_limit(50.0), 0.0);
        assert!(matches!(result, Err(CprError::OutOfRange)));

        let pos = decode_local(&even, &near.with_range_limit(1_000.0), 0.0).unwrap();
        assert_close(pos, 52.2572021484375, 3.91937255859375, 1e-9);
    }

    #[test]
    fn test_local_matches_global() {
        let mut state = CprState::new();
        state.store(airborne(Parity::Odd, 58218, 20972, 0.0));
        let even = airborne(Parity::Even, 45875, 76022, 1.0);
        let global = decode_global(&mut state, even, 1.0, &ReferencePosition::UNKNOWN).unwrap();

        // Within one zone width (6°) of the true position
        let reference = ReferencePosition::new(global.latitude + 2.5, global.longitude - 2.0);
        let local = decode_local(&even, &reference, 1.0).unwrap();
        assert!(local.approx_eq(&global, 1e-9), "{local} vs {global}");
    }

    #[test]
    fn test_local_never_touches_state() {
        let state = CprState::new();
        let even = airborne(Parity::Even, 93000, 51372, 0.0);
        let _ = decode_local(&even, &ReferencePosition::new(52.0, 4.0), 0.0);
        assert!(state.is_empty());
    }

    #[test]
    fn test_normalize_lon() {
        assert_eq!(normalize_lon(190.0), -170.0);
        assert_eq!(normalize_lon(-190.0), 170.0);
        assert_eq!(normalize_lon(180.0), -180.0);
        assert_eq!(normalize_lon(3.5), 3.5);
    }

    #[test]
    fn test_modulo_positive() {
        assert!((modulo(7.0, 3.0) - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_modulo_negative() {
        // modulo(-1, 60) should return 59
        assert!((modulo(-1.0, 60.0) - 59.0).abs() < 1e-10);
    }
}
