//! Receiver-side position resolution.
//!
//! Wraps the two decoders with the policy a receiver needs around them:
//! global decode first, local decode as fallback, reference selection,
//! range limits, speed plausibility and NUC bookkeeping.
//!
//! Pure logic, no I/O. The caller owns the per-aircraft records.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::cpr::{Decoder, FreshnessWindows};
use crate::geo::{self, METERS_PER_NM};
use crate::state::CprState;
use crate::trace::TraceSink;
use crate::types::*;

/// Range limit when decoding relative to the aircraft's own last fix.
pub const LAST_FIX_RANGE_M: f64 = 50e3;

/// A last fix older than this is not used as a local reference (seconds).
pub const FIX_MAX_AGE: f64 = 60.0;

/// Default receiver range used to bound receiver-relative decodes.
pub const DEFAULT_MAX_RANGE_NM: f64 = 300.0;

/// Smallest CPR cell is 360 NM, so a receiver-relative decode is only
/// unambiguous out to half of it.
const CELL_NM: f64 = 360.0;

/// Resolver settings. Usually built from `config::Config`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolverConfig {
    /// Receiver location.
    pub receiver: Option<Position>,
    /// Receiver maximum range in meters. `None` disables receiver range checks
    /// and receiver-relative local decoding.
    pub max_range_m: Option<f64>,
    pub windows: FreshnessWindows,
    pub last_fix_range_m: f64,
    pub fix_max_age: f64,
    pub speed_check: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            receiver: None,
            max_range_m: Some(DEFAULT_MAX_RANGE_NM * METERS_PER_NM),
            windows: FreshnessWindows::default(),
            last_fix_range_m: LAST_FIX_RANGE_M,
            fix_max_age: FIX_MAX_AGE,
            speed_check: true,
        }
    }
}

/// CPR-related state for one aircraft.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AircraftCpr {
    pub cpr: CprState,
    pub last_fix: Option<Fix>,
    /// Latest ground speed from velocity messages, if known.
    pub ground_speed_kts: Option<f64>,
    pub last_seen: f64,
}

impl AircraftCpr {
    pub fn new(timestamp: f64) -> Self {
        AircraftCpr {
            last_seen: timestamp,
            ..Default::default()
        }
    }

    pub fn position(&self) -> Option<Position> {
        self.last_fix.map(|f| f.position)
    }
}

/// Decode counters, safe to bump from several threads.
#[derive(Debug, Default)]
pub struct CprStats {
    global_ok: AtomicU64,
    global_skipped: AtomicU64,
    global_bad: AtomicU64,
    global_range: AtomicU64,
    global_speed: AtomicU64,
    local_ok: AtomicU64,
    local_skipped: AtomicU64,
    local_range: AtomicU64,
    local_speed: AtomicU64,
}

/// Point-in-time copy of `CprStats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub global_ok: u64,
    pub global_skipped: u64,
    pub global_bad: u64,
    pub global_range: u64,
    pub global_speed: u64,
    pub local_ok: u64,
    pub local_skipped: u64,
    pub local_range: u64,
    pub local_speed: u64,
}

impl CprStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            global_ok: get(&self.global_ok),
            global_skipped: get(&self.global_skipped),
            global_bad: get(&self.global_bad),
            global_range: get(&self.global_range),
            global_speed: get(&self.global_speed),
            local_ok: get(&self.local_ok),
            local_skipped: get(&self.local_skipped),
            local_range: get(&self.local_range),
            local_speed: get(&self.local_speed),
        }
    }
}

/// Turns reports into fixes for any number of aircraft.
#[derive(Debug)]
pub struct Resolver<'a> {
    config: ResolverConfig,
    decoder: Decoder<'a>,
    stats: CprStats,
}

impl Resolver<'static> {
    pub fn new(config: ResolverConfig) -> Self {
        let decoder = Decoder::new(config.windows);
        Resolver {
            config,
            decoder,
            stats: CprStats::default(),
        }
    }
}

impl<'a> Resolver<'a> {
    pub fn with_trace<'b>(self, trace: &'b dyn TraceSink) -> Resolver<'b> {
        Resolver {
            config: self.config,
            decoder: self.decoder.with_trace(trace),
            stats: self.stats,
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Resolve one report for one aircraft.
    ///
    /// On success the fix is also stored as the aircraft's last fix. On
    /// failure the aircraft keeps its previous fix.
    pub fn resolve(&self, ac: &mut AircraftCpr, report: RawReport, now: f64) -> Result<Fix> {
        ac.last_seen = now;

        let global_err = match self.try_global(ac, report, now) {
            Ok(fix) => {
                ac.last_fix = Some(fix);
                return Ok(fix);
            }
            Err(e) if is_bad_data(&e) => {
                // Keep the new frame, drop the one it was paired with.
                ac.cpr.clear();
                ac.cpr.store(report);
                return Err(e);
            }
            Err(e) => e,
        };

        let Some((reference, anchor_nuc)) = self.local_reference(ac, &report, now) else {
            return Err(global_err);
        };

        let fix = self.try_local(ac, &report, &reference, anchor_nuc, now)?;
        ac.last_fix = Some(fix);
        Ok(fix)
    }

    fn try_global(&self, ac: &mut AircraftCpr, report: RawReport, now: f64) -> Result<Fix> {
        let reference = self.surface_reference(ac, now);
        let pos = match self.decoder.global(&mut ac.cpr, report, now, &reference) {
            Ok(pos) => pos,
            Err(e) => {
                if is_bad_data(&e) {
                    CprStats::bump(&self.stats.global_bad);
                } else {
                    CprStats::bump(&self.stats.global_skipped);
                }
                return Err(e);
            }
        };

        // Both slots are filled once global decode succeeded.
        let nuc = match (ac.cpr.even_slot, ac.cpr.odd_slot) {
            (Some(e), Some(o)) => e.nuc.min(o.nuc),
            _ => report.nuc,
        };

        if let (Some(rx), Some(max)) = (self.config.receiver, self.config.max_range_m) {
            if geo::haversine_m(&rx, &pos) > max {
                CprStats::bump(&self.stats.global_range);
                return Err(CprError::OutOfRange);
            }
        }

        if let Err(e) = self.speed_check(ac, &pos, report.format, nuc, now) {
            CprStats::bump(&self.stats.global_speed);
            return Err(e);
        }

        CprStats::bump(&self.stats.global_ok);
        Ok(Fix {
            position: pos,
            nuc,
            timestamp: now,
            method: DecodeMethod::Global,
            format: report.format,
        })
    }

    fn try_local(
        &self,
        ac: &AircraftCpr,
        report: &RawReport,
        reference: &ReferencePosition,
        anchor_nuc: Option<Nuc>,
        now: f64,
    ) -> Result<Fix> {
        let pos = match self.decoder.local(report, reference, now) {
            Ok(pos) => pos,
            Err(e) => {
                if matches!(e, CprError::OutOfRange) {
                    CprStats::bump(&self.stats.local_range);
                } else {
                    CprStats::bump(&self.stats.local_skipped);
                }
                return Err(e);
            }
        };

        let nuc = anchor_nuc.map_or(report.nuc, |n| n.min(report.nuc));

        if let Err(e) = self.speed_check(ac, &pos, report.format, nuc, now) {
            CprStats::bump(&self.stats.local_speed);
            return Err(e);
        }

        CprStats::bump(&self.stats.local_ok);
        Ok(Fix {
            position: pos,
            nuc,
            timestamp: now,
            method: DecodeMethod::Local,
            format: report.format,
        })
    }

    fn recent_fix(&self, ac: &AircraftCpr, now: f64) -> Option<Fix> {
        ac.last_fix
            .filter(|f| (now - f.timestamp).abs() <= self.config.fix_max_age)
    }

    /// Reference for surface quadrant selection: own recent fix, else receiver.
    fn surface_reference(&self, ac: &AircraftCpr, now: f64) -> ReferencePosition {
        if let Some(fix) = self.recent_fix(ac, now) {
            return fix.position.into();
        }
        match self.config.receiver {
            Some(rx) => rx.into(),
            None => ReferencePosition::UNKNOWN,
        }
    }

    /// Reference for local decode plus the NUC of the fix it came from.
    fn local_reference(
        &self,
        ac: &AircraftCpr,
        report: &RawReport,
        now: f64,
    ) -> Option<(ReferencePosition, Option<Nuc>)> {
        if let Some(fix) = self.recent_fix(ac, now) {
            let reference =
                ReferencePosition::from(fix.position).with_range_limit(self.config.last_fix_range_m);
            return Some((reference, Some(fix.nuc)));
        }

        // Receiver-relative only for airborne: surface cells are too small.
        if report.format == FormatKind::Surface {
            return None;
        }
        let rx = self.config.receiver?;
        let limit = receiver_range_limit(self.config.max_range_m?)?;
        Some((ReferencePosition::from(rx).with_range_limit(limit), None))
    }

    /// Reject positions further from the last fix than the aircraft could
    /// plausibly have flown. Only applied when the last fix is at least as
    /// precise as the new one.
    fn speed_check(
        &self,
        ac: &AircraftCpr,
        pos: &Position,
        format: FormatKind,
        nuc: Nuc,
        now: f64,
    ) -> Result<()> {
        if !self.config.speed_check {
            return Ok(());
        }
        let Some(fix) = ac.last_fix else {
            return Ok(());
        };
        if fix.nuc < nuc {
            return Ok(());
        }

        let surface = format == FormatKind::Surface;
        let elapsed = (now - fix.timestamp).max(0.0);
        let base_kts = ac
            .ground_speed_kts
            .unwrap_or(if surface { 100.0 } else { 600.0 });
        let speed_kts = if surface {
            (base_kts * 4.0 / 3.0).clamp(20.0, 150.0)
        } else {
            (base_kts * 4.0 / 3.0).max(200.0)
        };
        let slack_m = if surface { 100.0 } else { 500.0 };
        let limit_m = slack_m + (elapsed + 1.0) * speed_kts * METERS_PER_NM / 3600.0;

        let distance_m = geo::haversine_m(&fix.position, pos);
        if distance_m > limit_m {
            return Err(CprError::ImplausibleSpeed {
                distance_m,
                limit_m,
            });
        }
        Ok(())
    }
}

/// How far from the receiver a receiver-relative decode may land.
///
/// Within half a cell the nearest zone is always right. Beyond that, a
/// report from `max_range` away could alias to `cell - max_range` on the
/// other side, so the usable radius shrinks. Past a full cell nothing is safe.
pub fn receiver_range_limit(max_range_m: f64) -> Option<f64> {
    let half_cell = CELL_NM / 2.0 * METERS_PER_NM;
    let cell = CELL_NM * METERS_PER_NM;
    if max_range_m <= 0.0 {
        None
    } else if max_range_m <= half_cell {
        Some(max_range_m)
    } else if max_range_m < cell {
        Some(cell - max_range_m)
    } else {
        None
    }
}

/// Failures that mean the frame pair itself is garbage.
fn is_bad_data(e: &CprError) -> bool {
    matches!(
        e,
        CprError::LatitudeOutOfBounds(_) | CprError::OutOfRange | CprError::ImplausibleSpeed { .. }
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
